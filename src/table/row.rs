//! Row views: a row bound to its owning table.

use crate::error::EvalError;
use crate::table::arena::RowId;
use crate::table::Table;
use crate::value::Value;

/// Column-oriented access to one row, including through ancestor tables
/// and ancestor rows.
pub trait RowAccess {
    /// Looks a column up by name. Misses fall back to the table parent
    /// chain, then to the row parent chain, so a nested row sees every
    /// enclosing row's columns.
    fn get(&self, name: &str) -> Option<Value>;

    /// The row's implicit "current" output: the table's last column's value.
    fn value(&self) -> Option<Value>;

    /// Exports named cells in column order, nested tables kept as values.
    /// The last column is exported as `"value"` when it has no name.
    fn as_cells(&self) -> Vec<(String, Value)>;
}

/// A view onto one row of a table, resolving column values on demand.
#[derive(Debug, Clone)]
pub struct LazyRow {
    table: Table,
    id: RowId,
}

impl LazyRow {
    pub fn new(table: Table, id: RowId) -> LazyRow {
        LazyRow { table, id }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Like [`RowAccess::get`] but raising the not-found signal when the
    /// parent chain is exhausted.
    pub fn require(&self, name: &str) -> Result<Value, EvalError> {
        self.get(name)
            .ok_or_else(|| EvalError::NoSuchColumn(name.to_string()))
    }

    /// The current value, `Null` when the row has no cell for the current
    /// column yet.
    pub fn value_or_null(&self) -> Value {
        self.value().unwrap_or(Value::Null)
    }

    /// Exports the row as a JSON object, materializing nested tables
    /// recursively.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (k, v) in self.as_cells() {
            obj.insert(k, v.to_json());
        }
        serde_json::Value::Object(obj)
    }
}

impl RowAccess for LazyRow {
    fn get(&self, name: &str) -> Option<Value> {
        let arena = self.table.arena();
        if let Some(col) = self.table.get_column(name) {
            if let Some(v) = col.get_value(arena, self.id) {
                return Some(v);
            }
        } else if name == "value" {
            // The export name of a trailing anonymous column.
            if let Some(col) = self.table.columns().last() {
                if col.is_hidden() {
                    if let Some(v) = col.get_value(arena, self.id) {
                        return Some(v);
                    }
                }
            }
        }
        // Scoped lookup: ancestor rows' cells, innermost first.
        let mut cur = arena.parent(self.id);
        while let Some(id) = cur {
            if let Some(v) = arena.get(id, name) {
                return Some(v);
            }
            cur = arena.parent(id);
        }
        None
    }

    fn value(&self) -> Option<Value> {
        let col = self.table.columns().last()?;
        col.get_value(self.table.arena(), self.id)
    }

    fn as_cells(&self) -> Vec<(String, Value)> {
        let cols = self.table.columns();
        let mut out = Vec::new();
        for (i, col) in cols.iter().enumerate() {
            let last = i + 1 == cols.len();
            let key = if col.is_hidden() {
                if !last {
                    continue;
                }
                "value".to_string()
            } else {
                col.name.clone()
            };
            if let Some(v) = col.get_value(self.table.arena(), self.id) {
                out.push((key, v));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, RowArena};
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_falls_back_to_ancestor_row_cells() {
        let arena = RowArena::new();
        let outer = arena.alloc(vec![("k".into(), Value::Str("a".into()))], None);
        let leaf = arena.alloc(vec![("_1".into(), Value::Str("1".into()))], Some(outer));

        let mut nested = Table::new(arena);
        nested.push_row(leaf);
        nested.add_column(Column::auto("_1"));

        let row = nested.iter().next().expect("one row");
        assert_eq!(row.get("k"), Some(Value::Str("a".into())));
        assert_eq!(row.get("value"), Some(Value::Str("1".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn own_columns_shadow_ancestor_cells() {
        let arena = RowArena::new();
        let outer = arena.alloc(vec![("k".into(), Value::Str("outer".into()))], None);
        let leaf = arena.alloc(vec![("k".into(), Value::Str("inner".into()))], Some(outer));

        let mut nested = Table::new(arena);
        nested.push_row(leaf);
        nested.add_column(Column::named("k"));

        let row = nested.iter().next().expect("one row");
        assert_eq!(row.get("k"), Some(Value::Str("inner".into())));
    }
}
