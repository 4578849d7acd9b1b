//! Memoization wrapper for expensive operators.
//!
//! An *expensive* operator is one whose callable is costly or
//! non-deterministic (an external API call, a subprocess). Wrapping it with
//! [`Expensive`] makes it idempotent and replayable: the call arguments are
//! encoded into a canonical key, looked up in the session's persisted
//! store, and only invoked on a miss, with the result persisted for the
//! next run.
//!
//! In dry-run mode the wrapper short-circuits to a caller-supplied mock
//! with the identical signature (or a deterministic placeholder string);
//! the store is neither consulted nor written.

use std::sync::Arc;

use tracing::debug;

use crate::error::{EvalError, StoreError};
use crate::registry::{OpCall, OpFn, OpValue};
use crate::session::Session;
use crate::value::Value;

/// Builder wrapping an operator callable with persistent caching.
pub struct Expensive {
    name: String,
    func: OpFn,
    mock: Option<OpFn>,
}

impl Expensive {
    pub fn new(
        name: &str,
        func: impl Fn(&Session, OpCall) -> Result<OpValue, EvalError> + 'static,
    ) -> Expensive {
        Expensive {
            name: name.to_string(),
            func: Arc::new(func),
            mock: None,
        }
    }

    /// Substitute called instead of the real function during dry runs.
    pub fn with_mock(
        mut self,
        mock: impl Fn(&Session, OpCall) -> Result<OpValue, EvalError> + 'static,
    ) -> Expensive {
        self.mock = Some(Arc::new(mock));
        self
    }

    /// The caching callable, ready to register.
    pub fn into_fn(self) -> OpFn {
        let Expensive { name, func, mock } = self;
        let namespace = format!("cached_{}", name);

        Arc::new(move |session: &Session, call: OpCall| {
            if session.config().dry_run {
                return match &mock {
                    Some(m) => m(session, call),
                    None => Ok(OpValue::Scalar(Value::Str(placeholder(&name, &call)))),
                };
            }

            let key = cache_key(&call);
            let filter = [("key".to_string(), Value::Str(key.clone()))];
            let hits = session.store().select(&namespace, &filter)?;
            if let Some(row) = hits.last() {
                debug!(op = %name, "cache hit");
                return stored_to_value(row);
            }

            let result = func(session, call)?;
            let mut fields = vec![("key".to_string(), Value::Str(key))];
            match &result {
                OpValue::Row(cells) => {
                    fields.push(("_shape".to_string(), Value::Str("row".into())));
                    fields.extend(cells.iter().cloned());
                }
                OpValue::Scalar(v) => {
                    fields.push(("_shape".to_string(), Value::Str("scalar".into())));
                    fields.push(("output".to_string(), v.clone()));
                }
                OpValue::Values(vs) => {
                    fields.push(("_shape".to_string(), Value::Str("vector".into())));
                    fields.push((
                        "output".to_string(),
                        Value::Str(
                            serde_json::Value::Array(vs.iter().map(|v| v.to_json()).collect())
                                .to_string(),
                        ),
                    ));
                }
                OpValue::None => {
                    fields.push(("_shape".to_string(), Value::Str("none".into())));
                }
                OpValue::Table(_) | OpValue::Rows(_) => {
                    return Err(EvalError::Op(format!(
                        "cached operator \"{}\" returned a table; only scalar, row and \
                         vector results are cacheable",
                        name
                    )));
                }
            }
            session.store().insert(&namespace, &fields)?;
            Ok(result)
        })
    }
}

/// Canonical structural encoding of the call arguments.
fn cache_key(call: &OpCall) -> String {
    let mut parts = Vec::new();
    if let Ok(v) = serde_json::to_string(&input_json(call)) {
        parts.push(v);
    }
    parts.join(" ")
}

fn input_json(call: &OpCall) -> serde_json::Value {
    let input = match &call.input {
        crate::registry::OpInput::Scalar(v) => v.to_json(),
        crate::registry::OpInput::Values(vs) => {
            serde_json::Value::Array(vs.iter().map(|v| v.to_json()).collect())
        }
        crate::registry::OpInput::Table(t) => t.to_json(),
        crate::registry::OpInput::Row(r) => r.to_json(),
        crate::registry::OpInput::None => serde_json::Value::Null,
    };
    serde_json::json!({
        "input": input,
        "args": call.args.iter().map(|v| v.to_json()).collect::<Vec<_>>(),
        "kwargs": call
            .kwargs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>(),
        "prompt": call.prompt,
    })
}

fn placeholder(name: &str, call: &OpCall) -> String {
    format!("<{}({})>", name, cache_key(call))
}

/// Reconstructs the operator result from a stored row in its original
/// shape, as recorded in the `_shape` field. Rows without a shape tag fall
/// back to the output-field heuristic: an `output` field was a scalar
/// result, anything else a dict-shaped result.
fn stored_to_value(row: &[(String, Value)]) -> Result<OpValue, EvalError> {
    let field = |k: &str| row.iter().find(|(rk, _)| rk == k).map(|(_, v)| v);
    let as_row = || {
        OpValue::Row(
            row.iter()
                .filter(|(k, _)| k != "key" && k != "_shape")
                .cloned()
                .collect(),
        )
    };

    match field("_shape").map(|v| v.to_string()).as_deref() {
        Some("scalar") => Ok(OpValue::Scalar(
            field("output").cloned().unwrap_or(Value::Null),
        )),
        Some("vector") => {
            let text = field("output").map(|v| v.to_string()).unwrap_or_default();
            let json: serde_json::Value =
                serde_json::from_str(&text).map_err(StoreError::from)?;
            let items = match json {
                serde_json::Value::Array(items) => items,
                other => vec![other],
            };
            Ok(OpValue::Values(items.iter().map(Value::from_json).collect()))
        }
        Some("none") => Ok(OpValue::None),
        Some(_) => Ok(as_row()),
        None => match field("output") {
            Some(v) => Ok(OpValue::Scalar(v.clone())),
            None => Ok(as_row()),
        },
    }
}
