//! Built-in operators.
//!
//! These are the operators the core itself exercises: text chunking,
//! column/table management, cross products, JSON conversion and the test
//! assertion family. They are registered through the same plugin interface
//! external operator packs use; LLM, web, shell and database operators
//! live outside the core.

pub mod func;
pub mod misc;
pub mod table;
pub mod text;

use crate::registry::Registry;

/// Registers the built-in operator set into the given registry.
pub fn register_builtins(registry: &Registry) {
    text::register(registry);
    table::register(registry);
    misc::register(registry);
    test::register(registry);
    func::register(registry);
}
