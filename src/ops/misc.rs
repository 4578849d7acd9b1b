//! Output, JSON conversion, and control operators.

use serde_json::Value as Json;

use crate::error::EvalError;
use crate::registry::{OpCall, OpDescriptor, OpValue, Rank, RankOut, Registry};
use crate::session::Session;
use crate::table::RowAccess;
use crate::value::Value;

pub fn register(registry: &Registry) {
    registry.register(OpDescriptor::new("print", Rank::Scalar, RankOut::None, op_print));
    registry.register(OpDescriptor::new("json", Rank::Any, RankOut::Scalar, op_json));
    registry.register(OpDescriptor::new(
        "json-parse",
        Rank::Scalar,
        RankOut::Row,
        op_json_parse,
    ));
    registry.register(OpDescriptor::new(
        "parse-keyval",
        Rank::Scalar,
        RankOut::Row,
        op_parse_keyval,
    ));
    registry.register(OpDescriptor::new(
        "combine-dict",
        Rank::Nested,
        RankOut::Row,
        op_combine_dict,
    ));
    registry.register(OpDescriptor::new("nop", Rank::Any, RankOut::None, op_nop).arity(0));
    registry.alias("identity", "nop");
    registry.register(OpDescriptor::new("abort", Rank::Any, RankOut::None, op_abort).arity(0));
}

/// Write each leaf value to stdout; the working table is unchanged.
fn op_print(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    println!("{}", call.scalar()?);
    Ok(OpValue::None)
}

/// Serialize the input table to a JSON string.
fn op_json(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let indent = call.int_kwarg("indent").unwrap_or(0);
    let json = t.to_json();
    let text = if indent > 0 {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .map_err(|e| EvalError::Op(e.to_string()))?;
    Ok(OpValue::Scalar(Value::Str(text)))
}

/// Parse a JSON string. Objects become row fields; anything else becomes
/// the new leaf value.
fn op_json_parse(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let text = call.scalar()?.to_string();
    let json: Json = serde_json::from_str(&text).map_err(|e| EvalError::Op(e.to_string()))?;
    match json {
        Json::Object(map) => Ok(OpValue::Row(
            map.into_iter().map(|(k, v)| (k, Value::from_json(&v))).collect(),
        )),
        other => Ok(OpValue::Scalar(Value::from_json(&other))),
    }
}

/// Parse `key=value` text into a single row field.
fn op_parse_keyval(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let text = call.scalar()?.to_string();
    let sep = call.str_kwarg("sep").unwrap_or_else(|| "=".to_string());
    let (key, value) = text
        .split_once(&sep)
        .ok_or_else(|| EvalError::Op(format!("no \"{}\" in \"{}\"", sep, text)))?;
    Ok(OpValue::Row(vec![(
        key.trim().to_string(),
        Value::Str(value.trim().to_string()),
    )]))
}

/// Merge every row's fields into one mapping; later rows win on key clash.
fn op_combine_dict(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let t = call.table()?;
    let mut cells: Vec<(String, Value)> = Vec::new();
    for row in t.iter() {
        for (k, v) in row.as_cells() {
            if let Some(cell) = cells.iter_mut().find(|(key, _)| *key == k) {
                cell.1 = v;
            } else {
                cells.push((k, v));
            }
        }
    }
    Ok(OpValue::Row(cells))
}

/// Do nothing.
fn op_nop(_session: &Session, _call: OpCall) -> Result<OpValue, EvalError> {
    Ok(OpValue::None)
}

/// Terminate the run unconditionally.
fn op_abort(_session: &Session, call: OpCall) -> Result<OpValue, EvalError> {
    let message = match call.str_arg(0) {
        Some(m) => m,
        None => call.prompt_text().trim().to_string(),
    };
    Err(EvalError::Abort(if message.is_empty() {
        "abort".to_string()
    } else {
        message
    }))
}
