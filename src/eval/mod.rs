//! The rank-dispatch evaluation engine.
//!
//! Given a command and an input table, the engine compares the input's
//! actual rank against the operator's declared input rank. When the input
//! is no deeper than the operator expects, the operand is adapted to the
//! declared shape and the operator applied directly (*base case*). When the
//! input is deeper, the engine broadcasts: it rebuilds the table one row at
//! a time, recursively evaluating the same command against each row's
//! nested value and linking produced sub-rows back to their originating row
//! (*recursive case*). The recursion terminates because rank strictly
//! decreases at each descent.
//!
//! A row whose nested evaluation fails recoverably is skipped, contributing
//! nothing to the output; in strict mode the error is re-raised immediately.
//! Fatal errors (abort, assertion failures) always propagate through every
//! level.

pub mod template;

use tracing::{debug, instrument, warn};

use crate::error::EvalError;
use crate::parser::{Command, TableRef};
use crate::registry::{OpCall, OpDescriptor, OpInput, OpValue, Rank, RankOut};
use crate::session::Session;
use crate::table::{Column, LazyRow, RowAccess, Table};
use crate::value::Value;
use template::format_value;

/// What a command did to the working value.
#[derive(Debug)]
pub enum StepResult {
    /// The operator produced no output; the prior input is retained.
    Keep,
    /// A brand-new table replaces the working value.
    Replace(Table),
}

/// The value being evaluated at one broadcast level.
#[derive(Debug, Clone)]
enum EvalTarget {
    Table(Table),
    Row(LazyRow),
}

impl EvalTarget {
    /// Actual rank: 0 for a row holding a leaf, else the nested table rank.
    fn rank(&self) -> usize {
        match self {
            EvalTarget::Table(t) => t.rank(),
            EvalTarget::Row(r) => match r.value() {
                Some(Value::Table(t)) => t.rank(),
                _ => 0,
            },
        }
    }
}

/// Result of one level of evaluation, before the enclosing level stores it.
enum LevelOutcome {
    /// Rankout none: keep the row/input unchanged.
    Keep,
    /// A value to store under the level's new column.
    Value(Value),
    /// Named fields to merge into the current row as columns.
    Cells(Vec<(String, Value)>),
}

/// Second table operand of a binary operator, prepared once.
enum SecondOperand {
    None,
    /// Passed whole to every invocation.
    Whole(OpInput),
    /// Scalar-rank second operand paired row by row, extended cyclically
    /// when the counts differ.
    Cyclic(Vec<Value>),
}

impl SecondOperand {
    fn at(&self, index: usize) -> OpInput {
        match self {
            SecondOperand::None => OpInput::None,
            SecondOperand::Whole(input) => input.clone(),
            SecondOperand::Cyclic(values) => {
                if values.is_empty() {
                    OpInput::None
                } else {
                    OpInput::Scalar(values[index % values.len()].clone())
                }
            }
        }
    }
}

/// The evaluation engine, borrowing the session for globals, the registry,
/// unique keys and configuration.
pub struct Engine<'a> {
    session: &'a Session,
}

impl<'a> Engine<'a> {
    pub fn new(session: &'a Session) -> Engine<'a> {
        Engine { session }
    }

    /// Evaluates one command against the working table.
    #[instrument(level = "debug", skip(self, input), fields(op = %cmd.opname, line = cmd.linenum))]
    pub fn eval_command(&self, cmd: &Command, input: &Table) -> Result<StepResult, EvalError> {
        let op = self
            .session
            .registry()
            .get(&cmd.opname)
            .ok_or_else(|| EvalError::Op(format!("no such operator \"!{}\"", cmd.opname)))?;

        debug!(shape = %input, rankin = %op.rankin, "dispatch");

        if op.arity == 0 {
            let call = OpCall {
                input: OpInput::None,
                second: OpInput::None,
                args: self.fmt_values(&cmd.args, &[])?,
                kwargs: self.fmt_kwargs(&cmd.kwargs, &[])?,
                prompt: cmd.prompt.clone(),
            };
            let raw = (op.func)(self.session, call)?;
            return match self.shape_output(&op, raw, None)? {
                LevelOutcome::Keep => Ok(StepResult::Keep),
                LevelOutcome::Value(Value::Table(t)) => Ok(StepResult::Replace(t)),
                LevelOutcome::Value(v) => Ok(StepResult::Replace(self.wrap_value(v))),
                LevelOutcome::Cells(cells) => Ok(StepResult::Replace(Table::from_cells(
                    self.session.arena().clone(),
                    cells,
                ))),
            };
        }

        // A single ref on a binary operator names the second operand; the
        // chained input stays primary.
        let (primary_ref, second_ref) = match (op.arity, cmd.table_refs.as_slice()) {
            (2, [s]) => (None, Some(s)),
            (2, [p, s, ..]) => (Some(p), Some(s)),
            (_, [p, ..]) => (Some(p), None),
            _ => (None, None),
        };
        let primary = match primary_ref {
            Some(r) => self.resolve_ref(r)?,
            None => input.clone(),
        };
        let second = if op.arity == 2 {
            let second_table = match second_ref {
                Some(r) => self.resolve_ref(r)?,
                None => input.clone(),
            };
            self.prepare_second(&op, second_table)
        } else {
            SecondOperand::None
        };

        let mut scopes = Vec::new();
        match self.eval_rank(&op, cmd, EvalTarget::Table(primary), &second, &mut scopes, 0, 0)? {
            LevelOutcome::Keep => Ok(StepResult::Keep),
            LevelOutcome::Value(Value::Table(t)) => Ok(StepResult::Replace(t)),
            LevelOutcome::Value(v) => Ok(StepResult::Replace(self.wrap_value(v))),
            LevelOutcome::Cells(cells) => Ok(StepResult::Replace(Table::from_cells(
                self.session.arena().clone(),
                cells,
            ))),
        }
    }

    /// One level of rank dispatch: base-apply or recurse-descend.
    fn eval_rank(
        &self,
        op: &OpDescriptor,
        cmd: &Command,
        target: EvalTarget,
        second: &SecondOperand,
        scopes: &mut Vec<LazyRow>,
        depth: usize,
        row_index: usize,
    ) -> Result<LevelOutcome, EvalError> {
        let input_rank = target.rank();
        if op.rankin.accepts(input_rank) {
            return self.apply_base(op, cmd, target, second, scopes, row_index);
        }

        // Broadcast: rebuild this level row by row, recursing into each
        // row's nested value.
        let table = match &target {
            EvalTarget::Table(t) => t.clone(),
            EvalTarget::Row(r) => match r.value() {
                Some(Value::Table(t)) => t,
                _ => {
                    return Err(EvalError::TypeMismatch {
                        expected: "table",
                        actual: "scalar",
                    })
                }
            },
        };

        let (key, colname) = match cmd.varname_at(depth) {
            Some(name) => (name.to_string(), Some(name.to_string())),
            None => (self.session.unique_key(), None),
        };

        let mut out = table.clone_structure();
        let mut keys_served: Vec<String> = Vec::new();
        let mut stored_any = false;
        let mut nerrors = 0usize;

        for (i, row) in table.iter().enumerate() {
            scopes.push(row.clone());
            let result = self.eval_rank(
                op,
                cmd,
                EvalTarget::Row(row.clone()),
                second,
                scopes,
                depth + 1,
                i,
            );
            scopes.pop();

            match result {
                Ok(LevelOutcome::Keep) => out.push_row(row.id()),
                Ok(LevelOutcome::Value(v)) => {
                    self.session.arena().set(row.id(), &key, v);
                    stored_any = true;
                    out.push_row(row.id());
                }
                Ok(LevelOutcome::Cells(cells)) => {
                    for (k, v) in cells {
                        self.session.arena().set(row.id(), &k, v);
                        if !keys_served.contains(&k) {
                            keys_served.push(k);
                        }
                    }
                    out.push_row(row.id());
                }
                Err(e) if e.is_fatal() || self.session.config().strict => return Err(e),
                Err(e) => {
                    warn!(op = %op.name, row = i, error = %e, "row dropped");
                    nerrors += 1;
                }
            }
        }

        if out.is_empty() && nerrors > 0 {
            return Err(EvalError::EmptyBroadcast { errors: nerrors });
        }

        if !keys_served.is_empty() {
            for k in &keys_served {
                out.add_column(Column::named(k));
            }
        } else if stored_any {
            out.add_column(match &colname {
                Some(name) => Column::named(name),
                None => Column::auto(&key),
            });
        }

        Ok(LevelOutcome::Value(Value::Table(out)))
    }

    /// Base case: adapt the operand to the declared input rank, invoke the
    /// operator, shape the raw result.
    fn apply_base(
        &self,
        op: &OpDescriptor,
        cmd: &Command,
        target: EvalTarget,
        second: &SecondOperand,
        scopes: &[LazyRow],
        row_index: usize,
    ) -> Result<LevelOutcome, EvalError> {
        let input = self.adapt(op.rankin, &target)?;
        let call = OpCall {
            input,
            second: second.at(row_index),
            args: self.fmt_values(&cmd.args, scopes)?,
            kwargs: self.fmt_kwargs(&cmd.kwargs, scopes)?,
            prompt: cmd.prompt.clone(),
        };
        let raw = (op.func)(self.session, call)?;
        self.shape_output(op, raw, Some(&target))
    }

    fn adapt(&self, rankin: Rank, target: &EvalTarget) -> Result<OpInput, EvalError> {
        match rankin {
            Rank::Scalar => match target {
                EvalTarget::Row(r) => Ok(OpInput::Scalar(r.value_or_null())),
                EvalTarget::Table(_) => Err(EvalError::TypeMismatch {
                    expected: "scalar",
                    actual: "table",
                }),
            },
            Rank::Row => match target {
                EvalTarget::Row(r) => Ok(OpInput::Row(r.clone())),
                EvalTarget::Table(_) => Err(EvalError::TypeMismatch {
                    expected: "row",
                    actual: "table",
                }),
            },
            Rank::Vector => match target {
                EvalTarget::Table(t) => Ok(OpInput::Values(t.values())),
                EvalTarget::Row(r) => Ok(OpInput::Values(match r.value() {
                    Some(Value::Table(t)) => t.values(),
                    Some(v) => vec![v],
                    None => Vec::new(),
                })),
            },
            Rank::Nested | Rank::Any => match target {
                EvalTarget::Table(t) => Ok(OpInput::Table(t.clone())),
                EvalTarget::Row(r) => match r.value() {
                    Some(Value::Table(t)) => Ok(OpInput::Table(t)),
                    _ => Err(EvalError::TypeMismatch {
                        expected: "table",
                        actual: "scalar",
                    }),
                },
            },
        }
    }

    /// Shapes an operator's raw return per its declared output rank.
    fn shape_output(
        &self,
        op: &OpDescriptor,
        raw: OpValue,
        target: Option<&EvalTarget>,
    ) -> Result<LevelOutcome, EvalError> {
        if op.rankout == RankOut::None {
            return Ok(LevelOutcome::Keep);
        }
        let parent_row = match target {
            Some(EvalTarget::Row(r)) => Some(r.id()),
            _ => None,
        };
        match raw {
            OpValue::None => Ok(LevelOutcome::Keep),
            OpValue::Scalar(v) => Ok(LevelOutcome::Value(v)),
            OpValue::Row(cells) => Ok(LevelOutcome::Cells(cells)),
            OpValue::Values(values) => {
                let key = self.session.unique_key();
                let arena = self.session.arena().clone();
                let mut t = Table::new(arena.clone());
                for v in values {
                    let id = arena.alloc(vec![(key.clone(), v)], parent_row);
                    t.push_row(id);
                }
                t.add_column(Column::auto(&key));
                Ok(LevelOutcome::Value(Value::Table(t)))
            }
            OpValue::Rows(rows) => {
                let mut t = Table::new(self.session.arena().clone());
                for cells in rows {
                    t.add_row(cells, parent_row);
                }
                if !op.outcols.is_empty() {
                    t.set_columns(op.outcols.iter().map(|n| Column::named(n)).collect());
                }
                Ok(LevelOutcome::Value(Value::Table(t)))
            }
            OpValue::Table(t) => Ok(LevelOutcome::Value(Value::Table(t))),
        }
    }

    fn prepare_second(&self, op: &OpDescriptor, table: Table) -> SecondOperand {
        match op.rankin2 {
            None => SecondOperand::None,
            Some(Rank::Scalar) => SecondOperand::Cyclic(table.values()),
            Some(Rank::Vector) => SecondOperand::Whole(OpInput::Values(table.values())),
            Some(Rank::Row) => match table.iter().next() {
                Some(row) => SecondOperand::Whole(OpInput::Row(row)),
                None => SecondOperand::None,
            },
            Some(Rank::Nested) | Some(Rank::Any) => {
                SecondOperand::Whole(OpInput::Table(table))
            }
        }
    }

    fn resolve_ref(&self, r: &TableRef) -> Result<Table, EvalError> {
        self.session
            .named_table(&r.name, r.global)
            .ok_or_else(|| EvalError::NoSuchTable(r.name.clone()))
    }

    fn wrap_value(&self, v: Value) -> Table {
        Table::from_values(self.session.arena().clone(), &self.session.unique_key(), vec![v])
    }

    fn fmt_values(&self, args: &[Value], scopes: &[LazyRow]) -> Result<Vec<Value>, EvalError> {
        args.iter()
            .map(|v| format_value(v, scopes, self.session))
            .collect()
    }

    fn fmt_kwargs(
        &self,
        kwargs: &[(String, Value)],
        scopes: &[LazyRow],
    ) -> Result<Vec<(String, Value)>, EvalError> {
        kwargs
            .iter()
            .map(|(k, v)| Ok((k.clone(), format_value(v, scopes, self.session)?)))
            .collect()
    }
}
