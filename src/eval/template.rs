//! `{name}` template substitution against the lexical scope chain.
//!
//! String arguments and prompt bodies may reference columns of the rows
//! enclosing the current broadcast position. Resolution tries the innermost
//! row first, walks outward through the enclosing rows (each of which also
//! resolves through its own table parent chain), and falls back to the
//! session's global bindings. `{{` and `}}` escape literal braces.

use crate::error::EvalError;
use crate::session::Session;
use crate::table::{LazyRow, RowAccess};
use crate::value::Value;

/// Substitutes `{name}` placeholders. A key with no value anywhere in scope
/// is a recoverable error (drops the row during a broadcast).
pub fn format_template(
    template: &str,
    scopes: &[LazyRow],
    session: &Session,
) -> Result<String, EvalError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                if !closed {
                    return Err(EvalError::Op(format!(
                        "unterminated placeholder \"{{{}\"",
                        key
                    )));
                }
                let v = resolve(&key, scopes, session)
                    .ok_or_else(|| EvalError::MissingKey(key.clone()))?;
                out.push_str(&v.to_string());
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn resolve(key: &str, scopes: &[LazyRow], session: &Session) -> Option<Value> {
    for row in scopes.iter().rev() {
        if let Some(v) = row.get(key) {
            return Some(v);
        }
    }
    session.global_value(key)
}

/// Formats a string value when it contains a placeholder; other values pass
/// through untouched.
pub fn format_value(
    v: &Value,
    scopes: &[LazyRow],
    session: &Session,
) -> Result<Value, EvalError> {
    match v {
        Value::Str(s) if s.contains('{') => {
            Ok(Value::Str(format_template(s, scopes, session)?))
        }
        other => Ok(other.clone()),
    }
}
