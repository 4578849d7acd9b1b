//! The operator registry and the operator plugin interface.
//!
//! Every operator is described by an [`OpDescriptor`]: the rank of structure
//! it consumes ([`Rank`]), the shape of value it produces ([`RankOut`]), its
//! table-operand arity, optional output column names, and the callable
//! itself. The registry is an explicit value constructed per interpreter
//! instance and passed by reference into the parser, engine and session;
//! there is no process-global operator table. Plugins register once at
//! startup, and the `def` meta-operator extends the registry at parse time.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::EvalError;
use crate::session::Session;
use crate::table::{LazyRow, Table};
use crate::value::Value;

/// Normalizes an operator or argument identifier: hyphens become
/// underscores and a leading `!` is stripped.
pub fn clean_to_id(s: &str) -> String {
    s.trim_start_matches('!').replace('-', "_")
}

/// Declared input rank of an operator: how deep a structure the callable
/// consumes before the engine broadcasts instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Rank {
    /// Consumes one leaf value.
    Scalar,
    /// Consumes one row view ([`LazyRow`]).
    Row,
    /// Consumes the flat list of leaf values of a rank-1 table.
    Vector,
    /// Consumes a rank-1 table.
    Nested,
    /// Consumes whatever table it is given, at any rank.
    Any,
}

impl Rank {
    /// Base-case test of the dispatcher: whether an input of the given
    /// actual rank is applied directly (true) or broadcast over (false).
    pub fn accepts(&self, input_rank: usize) -> bool {
        match self {
            Rank::Scalar | Rank::Row => input_rank == 0,
            Rank::Vector | Rank::Nested => input_rank <= 1,
            Rank::Any => true,
        }
    }
}

/// Declared output shape of an operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum RankOut {
    /// No output; the prior input is retained unchanged.
    None,
    /// A single leaf value.
    Scalar,
    /// A mapping; each key becomes a column on the current row.
    Row,
    /// An ordered sequence; one new parent-linked row per element.
    Vector,
    /// A fully formed table, or a sequence of row mappings to materialize.
    Nested,
}

/// The operand the engine hands an operator after rank adaptation.
#[derive(Debug, Clone)]
pub enum OpInput {
    /// Arity-0 operators take no table operand.
    None,
    Scalar(Value),
    Row(LazyRow),
    Values(Vec<Value>),
    Table(Table),
}

impl OpInput {
    pub fn kind(&self) -> &'static str {
        match self {
            OpInput::None => "none",
            OpInput::Scalar(_) => "scalar",
            OpInput::Row(_) => "row",
            OpInput::Values(_) => "vector",
            OpInput::Table(_) => "table",
        }
    }
}

/// Raw return value of an operator callable, shaped by the engine
/// according to the declared [`RankOut`].
#[derive(Debug, Clone)]
pub enum OpValue {
    None,
    Scalar(Value),
    /// Named fields emitted for the current row.
    Row(Vec<(String, Value)>),
    /// Ordered leaf elements.
    Values(Vec<Value>),
    /// Row mappings to materialize into a table.
    Rows(Vec<Vec<(String, Value)>>),
    Table(Table),
}

/// One invocation of an operator: adapted operands plus parsed arguments.
#[derive(Debug, Clone)]
pub struct OpCall {
    pub input: OpInput,
    /// Second table operand for binary operators.
    pub second: OpInput,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    pub prompt: Option<String>,
}

impl OpCall {
    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn str_kwarg(&self, key: &str) -> Option<String> {
        self.kwarg(key).map(|v| v.to_string())
    }

    pub fn int_kwarg(&self, key: &str) -> Option<i64> {
        self.kwarg(key).and_then(|v| v.as_int())
    }

    pub fn str_arg(&self, i: usize) -> Option<String> {
        self.args.get(i).map(|v| v.to_string())
    }

    pub fn int_arg(&self, i: usize) -> Option<i64> {
        self.args.get(i).and_then(|v| v.as_int())
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or("")
    }

    /// The scalar operand, or a type-mismatch error.
    pub fn scalar(&self) -> Result<&Value, EvalError> {
        match &self.input {
            OpInput::Scalar(v) => Ok(v),
            other => Err(EvalError::TypeMismatch {
                expected: "scalar",
                actual: other.kind(),
            }),
        }
    }

    pub fn row(&self) -> Result<&LazyRow, EvalError> {
        match &self.input {
            OpInput::Row(r) => Ok(r),
            other => Err(EvalError::TypeMismatch {
                expected: "row",
                actual: other.kind(),
            }),
        }
    }

    pub fn values(&self) -> Result<&[Value], EvalError> {
        match &self.input {
            OpInput::Values(v) => Ok(v),
            other => Err(EvalError::TypeMismatch {
                expected: "vector",
                actual: other.kind(),
            }),
        }
    }

    pub fn table(&self) -> Result<&Table, EvalError> {
        match &self.input {
            OpInput::Table(t) => Ok(t),
            other => Err(EvalError::TypeMismatch {
                expected: "table",
                actual: other.kind(),
            }),
        }
    }
}

/// The operator callable: `(session, call) -> shaped-by-rankout value`.
pub type OpFn = Arc<dyn Fn(&Session, OpCall) -> Result<OpValue, EvalError>>;

/// Descriptor registered for each operator name.
#[derive(Clone)]
pub struct OpDescriptor {
    pub name: String,
    pub rankin: Rank,
    /// Declared rank of the second operand for binary operators.
    pub rankin2: Option<Rank>,
    pub rankout: RankOut,
    /// Number of table operands: 0, 1 or 2.
    pub arity: u8,
    /// Column names assigned when the operator yields unlabeled row
    /// mappings; empty means infer from the union of keys seen.
    pub outcols: Vec<String>,
    pub func: OpFn,
}

impl OpDescriptor {
    pub fn new(
        name: &str,
        rankin: Rank,
        rankout: RankOut,
        func: impl Fn(&Session, OpCall) -> Result<OpValue, EvalError> + 'static,
    ) -> OpDescriptor {
        OpDescriptor {
            name: clean_to_id(name),
            rankin,
            rankin2: None,
            rankout,
            arity: 1,
            outcols: Vec::new(),
            func: Arc::new(func),
        }
    }

    pub fn arity(mut self, arity: u8) -> OpDescriptor {
        self.arity = arity;
        self
    }

    pub fn rankin2(mut self, rank: Rank) -> OpDescriptor {
        self.rankin2 = Some(rank);
        self
    }

    pub fn outcols(mut self, names: &[&str]) -> OpDescriptor {
        self.outcols = names.iter().map(|s| s.to_string()).collect();
        self
    }
}

impl std::fmt::Debug for OpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDescriptor")
            .field("name", &self.name)
            .field("rankin", &self.rankin)
            .field("rankin2", &self.rankin2)
            .field("rankout", &self.rankout)
            .field("arity", &self.arity)
            .field("outcols", &self.outcols)
            .finish()
    }
}

/// Operator name -> descriptor table. Cloning shares the underlying map, so
/// a registry handed to a session keeps seeing `def`-registered operators.
#[derive(Clone, Default)]
pub struct Registry {
    ops: Arc<DashMap<String, Arc<OpDescriptor>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Registry {
        Registry::default()
    }

    /// A registry pre-populated with the built-in operator set.
    pub fn with_builtins() -> Registry {
        let reg = Registry::new();
        crate::ops::register_builtins(&reg);
        reg
    }

    pub fn register(&self, desc: OpDescriptor) {
        self.ops.insert(desc.name.clone(), Arc::new(desc));
    }

    /// Registers `new` as another name for an existing operator.
    pub fn alias(&self, new: &str, existing: &str) {
        if let Some(desc) = self.get(existing) {
            let mut d = (*desc).clone();
            d.name = clean_to_id(new);
            self.register(d);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<OpDescriptor>> {
        self.ops.get(&clean_to_id(name)).map(|e| e.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(&clean_to_id(name))
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_accepts_thresholds() {
        assert!(Rank::Scalar.accepts(0));
        assert!(!Rank::Scalar.accepts(1));
        assert!(Rank::Row.accepts(0));
        assert!(Rank::Vector.accepts(1));
        assert!(!Rank::Vector.accepts(2));
        assert!(Rank::Nested.accepts(1));
        assert!(!Rank::Nested.accepts(2));
        assert!(Rank::Any.accepts(7));
    }

    #[test]
    fn names_are_normalized() {
        let reg = Registry::new();
        reg.register(OpDescriptor::new("grade-up", Rank::Nested, RankOut::Vector, |_, _| {
            Ok(OpValue::None)
        }));
        assert!(reg.contains("grade_up"));
        assert!(reg.contains("grade-up"));
        assert!(reg.contains("!grade-up"));
    }

    #[test]
    fn alias_shares_behavior() {
        let reg = Registry::new();
        reg.register(OpDescriptor::new("nop", Rank::Any, RankOut::None, |_, _| {
            Ok(OpValue::None)
        }));
        reg.alias("identity", "nop");
        let d = reg.get("identity").expect("alias registered");
        assert_eq!(d.rankout, RankOut::None);
    }
}
