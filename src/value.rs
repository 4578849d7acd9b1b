//! The value type flowing through pipelines.
//!
//! A cell holds either a leaf scalar (int, float, string) or a nested
//! [`Table`], which is what gives the working value its recursive shape.
//! Values convert to and from `serde_json::Value` for the cache store and
//! the `json` / `json-parse` operators.

use std::cmp::Ordering;
use std::fmt;

use crate::table::Table;

/// A single cell value: a leaf scalar or a nested table.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    Table(Table),
}

impl Value {
    /// Parses a bare script token, coercing to int or float when the token
    /// parses as such, else keeping it as a string.
    pub fn coerce(token: &str) -> Value {
        if let Ok(i) = token.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = token.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Str(token.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Table(_) => "table",
        }
    }

    /// Truthiness in the `filter` sense: zero, empty and null are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Table(t) => !t.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Total ordering used by `sort` and `grade-up`: numeric values compare
    /// numerically, strings lexically, and mixed types by kind.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Int(a), Value::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Value::Float(a), Value::Int(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self.kind_order().cmp(&other.kind_order()),
        }
    }

    fn kind_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::Table(_) => 3,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Table(t) => t.to_json(),
        }
    }

    /// Converts a JSON value back into a pipeline value. Nested objects and
    /// arrays keep their JSON text form; `json-parse` materializes the
    /// top-level object into row cells itself.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Int(*b as i64),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Table(a), Value::Table(b)) => a.to_json() == b.to_json(),
            (a, b) => a.to_json() == b.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Table(t) => write!(f, "{}", t),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<Table> for Value {
    fn from(t: Table) -> Value {
        Value::Table(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn coerce_prefers_int_then_float_then_str() {
        assert_eq!(Value::coerce("42"), Value::Int(42));
        assert_eq!(Value::coerce("4.5"), Value::Float(4.5));
        assert_eq!(Value::coerce("4x"), Value::Str("4x".into()));
        assert_eq!(Value::coerce("-7"), Value::Int(-7));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Str(String::new()).truthy());
        assert!(Value::Int(3).truthy());
        assert!(Value::Str("x".into()).truthy());
    }

    #[test]
    fn mixed_compare_is_total() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(
            Value::Str("a".into()).compare(&Value::Str("b".into())),
            Ordering::Less
        );
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
    }
}
