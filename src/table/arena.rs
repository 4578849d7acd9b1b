//! Append-only row storage shared by every table derived in a run.
//!
//! Rows are never owned by a single table: a derived table shares row ids
//! with its ancestor, and a nested table's rows point back at the row they
//! were produced from. Modeling parentage as an `Option<RowId>` on the slot
//! keeps the back-reference non-owning and makes the "resolve column through
//! ancestor" walk a bounded loop over ids.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

/// Index of a row in its [`RowArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowId(usize);

#[derive(Debug)]
struct RowSlot {
    /// Ordered cells, first-seen key order. Rows are small; lookups are
    /// linear scans.
    cells: Vec<(String, Value)>,
    parent: Option<RowId>,
}

/// Shared, append-only arena of rows. Cloning the arena clones the handle,
/// not the rows.
#[derive(Debug, Clone, Default)]
pub struct RowArena {
    slots: Rc<RefCell<Vec<RowSlot>>>,
}

impl RowArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new row and returns its id.
    pub fn alloc(&self, cells: Vec<(String, Value)>, parent: Option<RowId>) -> RowId {
        let mut slots = self.slots.borrow_mut();
        slots.push(RowSlot { cells, parent });
        RowId(slots.len() - 1)
    }

    /// Reads one cell. `None` when the row has no cell under `key`.
    pub fn get(&self, id: RowId, key: &str) -> Option<Value> {
        let slots = self.slots.borrow();
        slots[id.0]
            .cells
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Writes one cell, replacing an existing cell with the same key.
    pub fn set(&self, id: RowId, key: &str, value: Value) {
        let mut slots = self.slots.borrow_mut();
        let cells = &mut slots[id.0].cells;
        if let Some(cell) = cells.iter_mut().find(|(k, _)| k == key) {
            cell.1 = value;
        } else {
            cells.push((key.to_string(), value));
        }
    }

    pub fn parent(&self, id: RowId) -> Option<RowId> {
        self.slots.borrow()[id.0].parent
    }

    /// Keys of the row's cells in first-seen order.
    pub fn keys(&self, id: RowId) -> Vec<String> {
        self.slots.borrow()[id.0]
            .cells
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Clones the row's cells in order.
    pub fn cells(&self, id: RowId) -> Vec<(String, Value)> {
        self.slots.borrow()[id.0].cells.clone()
    }

    /// Whether two handles share the same underlying storage.
    pub fn same_arena(&self, other: &RowArena) -> bool {
        Rc::ptr_eq(&self.slots, &other.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn alloc_get_set_roundtrip() {
        let arena = RowArena::new();
        let id = arena.alloc(vec![("a".into(), Value::Int(1))], None);
        assert_eq!(arena.get(id, "a"), Some(Value::Int(1)));
        assert_eq!(arena.get(id, "b"), None);

        arena.set(id, "a", Value::Int(2));
        arena.set(id, "b", Value::Str("x".into()));
        assert_eq!(arena.get(id, "a"), Some(Value::Int(2)));
        assert_eq!(arena.get(id, "b"), Some(Value::Str("x".into())));
        assert_eq!(arena.keys(id), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn parent_chain_is_ids() {
        let arena = RowArena::new();
        let top = arena.alloc(vec![("a".into(), Value::Int(1))], None);
        let child = arena.alloc(vec![("b".into(), Value::Int(2))], Some(top));
        let grandchild = arena.alloc(vec![], Some(child));
        assert_eq!(arena.parent(grandchild), Some(child));
        assert_eq!(arena.parent(child), Some(top));
        assert_eq!(arena.parent(top), None);
    }
}
