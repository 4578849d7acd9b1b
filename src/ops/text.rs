//! Text operators: chunking, joining, substitution, templating.

use regex::Regex;

use crate::error::EvalError;
use crate::eval::template::format_template;
use crate::registry::{OpCall, OpDescriptor, OpValue, Rank, RankOut, Registry};
use crate::session::Session;
use crate::value::Value;

pub fn register(registry: &Registry) {
    registry.register(OpDescriptor::new("split", Rank::Scalar, RankOut::Vector, op_split));
    registry.register(OpDescriptor::new(
        "split-into",
        Rank::Scalar,
        RankOut::Row,
        op_split_into,
    ));
    registry.register(OpDescriptor::new("join", Rank::Vector, RankOut::Scalar, op_join));
    registry.register(OpDescriptor::new("replace", Rank::Scalar, RankOut::Scalar, op_replace));
    registry.register(OpDescriptor::new("match", Rank::Scalar, RankOut::Scalar, op_match));
    registry.register(OpDescriptor::new("format", Rank::Row, RankOut::Scalar, op_format));
}

/// Split text into chunks based on `sep`, keeping each chunk below
/// `maxsize`. With no `maxsize`, every unit is its own chunk.
fn op_split(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let text = call.scalar()?.to_string();
    let sep = call.str_kwarg("sep");
    let maxsize = call.int_kwarg("maxsize").unwrap_or(0).max(0) as usize;

    let units: Vec<&str> = match &sep {
        Some(s) => text.split(s.as_str()).collect(),
        None => text.split_whitespace().collect(),
    };
    let glue = sep.unwrap_or_else(|| " ".to_string());

    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;
    for unit in units {
        if total + unit.len() > maxsize && !window.is_empty() {
            chunks.push(Value::Str(window.join(&glue)));
            window.clear();
            total = 0;
        }
        window.push(unit);
        total += unit.len();
    }
    if !window.is_empty() {
        chunks.push(Value::Str(window.join(&glue)));
    }
    Ok(OpValue::Values(chunks))
}

/// Split text and name the parts after the positional args.
fn op_split_into(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let text = call.scalar()?.to_string();
    let sep = call.str_kwarg("sep");
    let parts: Vec<&str> = match &sep {
        Some(s) => text.split(s.as_str()).collect(),
        None => text.split_whitespace().collect(),
    };
    let cells = call
        .args
        .iter()
        .zip(parts)
        .map(|(name, part)| (name.to_string(), Value::Str(part.to_string())))
        .collect();
    Ok(OpValue::Row(cells))
}

/// Join inputs with `sep` into a single output scalar.
fn op_join(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let sep = call.str_kwarg("sep").unwrap_or_else(|| " ".to_string());
    let joined = call
        .values()?
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(OpValue::Scalar(Value::Str(joined)))
}

/// Replace `find` in the leaf value with `repl`.
fn op_replace(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let text = call.scalar()?.to_string();
    let find = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("replace requires find and repl args".into()))?;
    let repl = call.str_arg(1).unwrap_or_default();
    Ok(OpValue::Scalar(Value::Str(text.replace(&find, &repl))))
}

/// 1 when the regex matches the leaf value, else 0.
fn op_match(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let pattern = call
        .str_arg(0)
        .ok_or_else(|| EvalError::Op("match requires a regex arg".into()))?;
    let re = Regex::new(&pattern).map_err(|e| EvalError::Op(e.to_string()))?;
    let text = call.scalar()?.to_string();
    Ok(OpValue::Scalar(Value::Int(re.is_match(&text) as i64)))
}

/// Format the prompt as a template, substituting values from the row and
/// the global context.
fn op_format(session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let row = call.row()?.clone();
    let text = format_template(call.prompt_text(), &[row], session)?;
    Ok(OpValue::Scalar(Value::Str(text)))
}
