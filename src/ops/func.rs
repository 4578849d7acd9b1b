//! The `def` meta-operator: composite operators defined in script text.
//!
//! `!!def name` takes its prompt as a script body, parses it against the
//! current registry, and registers a new operator that runs the body as a
//! sub-pipeline. The composite inherits its input rank from the body's first
//! command and its output shape from the last, so it broadcasts exactly as
//! if the body were spliced in at the call site.

use tracing::debug;

use crate::error::EvalError;
use crate::registry::{OpCall, OpDescriptor, OpInput, OpValue, Rank, RankOut, Registry};
use crate::session::Session;
use crate::table::{RowAccess, Table};
use crate::value::Value;

pub fn register(registry: &Registry) {
    registry.register(OpDescriptor::new("def", Rank::Any, RankOut::None, op_def).arity(0));
}

fn op_def(session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let name = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("def requires an operator name".into()))?;
    let body = session.parse(call.prompt_text())?;
    let first = body
        .first()
        .ok_or_else(|| EvalError::Op(format!("def {}: empty body", name)))?;
    let last = body.last().ok_or_else(|| EvalError::Op("empty body".into()))?;

    // The registry resolved every body operator during parse.
    let first_op = session
        .registry()
        .get(&first.opname)
        .ok_or_else(|| EvalError::Op(format!("no such operator \"!{}\"", first.opname)))?;
    let last_op = session
        .registry()
        .get(&last.opname)
        .ok_or_else(|| EvalError::Op(format!("no such operator \"!{}\"", last.opname)))?;

    let rankout = last_op.rankout;
    debug!(name = %name, rankin = %first_op.rankin, rankout = %rankout, steps = body.len(), "def");

    let composite = move |session: &Session, call: OpCall| -> Result<OpValue, EvalError> {
        let input = table_from_input(session, call.input);
        let result = session.run_commands(&body, input)?;
        Ok(shape_result(rankout, result))
    };

    session.registry().register(
        OpDescriptor::new(&name, first_op.rankin, rankout, composite).arity(first_op.arity),
    );
    Ok(OpValue::None)
}

/// Wraps whatever operand the engine adapted into a table the sub-pipeline
/// can run over.
fn table_from_input(session: &Session, input: OpInput) -> Table {
    match input {
        OpInput::Table(t) => t,
        OpInput::Row(r) => {
            let mut t = r.table().clone_structure();
            t.push_row(r.id());
            t
        }
        OpInput::Scalar(v) => session.new_input(vec![v]),
        OpInput::Values(vs) => session.new_input(vs),
        OpInput::None => session.new_input(Vec::new()),
    }
}

/// Converts the sub-pipeline's final table back into the raw shape the
/// engine expects from an operator with the composite's declared output.
fn shape_result(rankout: RankOut, table: Table) -> OpValue {
    match rankout {
        RankOut::None => OpValue::None,
        RankOut::Scalar => match table.iter().next() {
            Some(row) => OpValue::Scalar(row.value_or_null()),
            None => OpValue::Scalar(Value::Null),
        },
        RankOut::Row => match table.iter().next() {
            Some(row) => OpValue::Row(row.as_cells()),
            None => OpValue::Row(Vec::new()),
        },
        RankOut::Vector => OpValue::Values(table.values()),
        RankOut::Nested => OpValue::Table(table),
    }
}
