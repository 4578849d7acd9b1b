//! Named accessors over rows.

use crate::table::arena::{RowArena, RowId};
use crate::value::Value;

/// How a column reaches its value on a row.
#[derive(Debug, Clone)]
pub enum ColumnSource {
    /// Reads the cell stored under the column key on the row itself.
    Direct,
    /// Reads an original column of an ancestor table through the row's
    /// parent link, possibly transitively.
    Parent(Box<Column>),
}

/// A named accessor over rows, by key. Auto-generated columns carry an
/// empty display name and are *hidden*: excluded from exported dict form
/// unless they are the table's last ("current") column.
#[derive(Debug, Clone)]
pub struct Column {
    pub key: String,
    pub name: String,
    pub source: ColumnSource,
}

impl Column {
    /// A visible column whose display name equals its key.
    pub fn named(key: &str) -> Column {
        Column {
            key: key.to_string(),
            name: key.to_string(),
            source: ColumnSource::Direct,
        }
    }

    /// A hidden auto-generated column (empty display name).
    pub fn auto(key: &str) -> Column {
        Column {
            key: key.to_string(),
            name: String::new(),
            source: ColumnSource::Direct,
        }
    }

    pub fn with_name(key: &str, name: &str) -> Column {
        Column {
            key: key.to_string(),
            name: name.to_string(),
            source: ColumnSource::Direct,
        }
    }

    /// Wraps a column of an ancestor table so it resolves through the row's
    /// parent link.
    pub fn parented(inner: Column) -> Column {
        Column {
            key: inner.key.clone(),
            name: if inner.name.is_empty() {
                inner.key.clone()
            } else {
                inner.name.clone()
            },
            source: ColumnSource::Parent(Box::new(inner)),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.name.is_empty()
    }

    /// The value of this column for the given row, or `None` when the row
    /// has no such cell (or the parent chain runs out).
    pub fn get_value(&self, arena: &RowArena, row: RowId) -> Option<Value> {
        match &self.source {
            ColumnSource::Direct => arena.get(row, &self.key),
            ColumnSource::Parent(inner) => {
                let mut cur = arena.parent(row);
                while let Some(id) = cur {
                    if let Some(v) = inner.get_value(arena, id) {
                        return Some(v);
                    }
                    cur = arena.parent(id);
                }
                None
            }
        }
    }
}
