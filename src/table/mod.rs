//! The hierarchical table data model.
//!
//! A [`Table`] is an ordered sequence of rows plus an ordered sequence of
//! [`Column`]s. Rows live in a shared [`RowArena`] and are referenced by id,
//! so a derived table shares rows with its ancestor instead of copying them.
//! A table may track a parent table whose columns remain transparently
//! resolvable after a column-reducing step.
//!
//! A table's *shape* is `[rows.len(), ..nested shape]` where the nested
//! shape is the shape of the first row's current value when that value is
//! itself a table; *rank* is the length of the shape. Rank is the dispatch
//! key of the evaluation engine.

pub mod arena;
pub mod column;
pub mod row;

pub use arena::{RowArena, RowId};
pub use column::{Column, ColumnSource};
pub use row::{LazyRow, RowAccess};

use std::fmt;

use crate::value::Value;

/// Ordered rows + ordered columns over a shared row arena.
#[derive(Debug, Clone)]
pub struct Table {
    arena: RowArena,
    rows: Vec<RowId>,
    columns: Vec<Column>,
    parent: Option<Box<Table>>,
}

impl Table {
    /// An empty table with no columns.
    pub fn new(arena: RowArena) -> Table {
        Table {
            arena,
            rows: Vec::new(),
            columns: Vec::new(),
            parent: None,
        }
    }

    /// A one-column table holding the given leaf values, one row each,
    /// stored under `key` as a hidden column.
    pub fn from_values(arena: RowArena, key: &str, values: Vec<Value>) -> Table {
        let mut t = Table::new(arena.clone());
        for v in values {
            let id = arena.alloc(vec![(key.to_string(), v)], None);
            t.rows.push(id);
        }
        t.add_column(Column::auto(key));
        t
    }

    /// A single-row table built from named cells.
    pub fn from_cells(arena: RowArena, cells: Vec<(String, Value)>) -> Table {
        let mut t = Table::new(arena);
        t.add_row(cells, None);
        t
    }

    pub fn arena(&self) -> &RowArena {
        &self.arena
    }

    pub fn rows(&self) -> &[RowId] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn parent(&self) -> Option<&Table> {
        self.parent.as_deref()
    }

    pub fn set_parent(&mut self, parent: Table) {
        self.parent = Some(Box::new(parent));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row built from cells, allocating it in the arena and
    /// registering any new non-internal keys (not `_`-prefixed) as columns
    /// in first-seen order.
    pub fn add_row(&mut self, cells: Vec<(String, Value)>, parent: Option<RowId>) -> RowId {
        let keys: Vec<String> = cells.iter().map(|(k, _)| k.clone()).collect();
        let id = self.arena.alloc(cells, parent);
        self.rows.push(id);
        for k in keys {
            if !k.starts_with('_') {
                self.add_column(Column::named(&k));
            }
        }
        id
    }

    /// Appends an already-allocated row.
    pub fn push_row(&mut self, id: RowId) {
        self.rows.push(id);
    }

    /// Appends a column unless one with the same key or same non-empty
    /// display name already exists.
    pub fn add_column(&mut self, col: Column) {
        let dup = self.columns.iter().any(|c| {
            c.key == col.key || (!col.name.is_empty() && c.name == col.name)
        });
        if !dup {
            self.columns.push(col);
        }
    }

    /// Replaces the column list wholesale (column-restricting operators).
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        self.columns = columns;
    }

    /// Linear search of own columns by display name (or key for hidden
    /// columns); on miss, delegates to the parent table.
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name || (c.name.is_empty() && c.key == name))
            .or_else(|| self.parent.as_ref().and_then(|p| p.get_column(name)))
    }

    /// The last ("current") column.
    pub fn current_column(&self) -> Option<&Column> {
        self.columns.last()
    }

    /// A table with the same arena, columns and parent, but no rows.
    /// Broadcast levels use this to inherit structure before re-filling.
    pub fn clone_structure(&self) -> Table {
        Table {
            arena: self.arena.clone(),
            rows: Vec::new(),
            columns: self.columns.clone(),
            parent: self.parent.clone(),
        }
    }

    /// `[len(rows), ..nested shape]`; an empty table has shape `[0]`.
    pub fn shape(&self) -> Vec<usize> {
        let mut dims = vec![self.rows.len()];
        if let Some(first) = self.iter().next() {
            if let Some(Value::Table(nested)) = first.value() {
                dims.extend(nested.shape());
            }
        }
        dims
    }

    /// Nesting depth: `rank == shape().len()`.
    pub fn rank(&self) -> usize {
        self.shape().len()
    }

    pub fn iter(&self) -> impl Iterator<Item = LazyRow> + '_ {
        self.rows.iter().map(move |id| LazyRow::new(self.clone(), *id))
    }

    /// Current-column value per row, in row order.
    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|r| r.value_or_null()).collect()
    }

    pub fn colnames(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// JSON array of exported row objects, nested tables materialized.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.iter().map(|r| r.to_json()).collect())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Table) -> bool {
        self.to_json() == other.to_json()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self
            .shape()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("x");
        write!(f, "[{} {}]", shape, self.colnames().join(","))
    }
}
