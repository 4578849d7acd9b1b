//! # ARPEL: A Rank-Polymorphic Pipeline Language
//!
//! ARPEL is an interpreter for a small line-oriented scripting language in
//! which each `!operator` transforms an implicit working value, and
//! operators written against simple shapes (a single string, a row, a flat
//! list) are applied automatically over arbitrarily nested tables.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Script Text → Parser → Command List → Rank-Dispatch Engine → Table
//! ```
//!
//! ### Stage 1: Parsing
//!
//! The [`parser`] module turns script text into an ordered [`parser::Command`]
//! list: `!op` command lines with positional and `key=value` arguments,
//! dedented prompt bodies, `>name` result bindings and `<name` table
//! references. Unknown operator names are fatal before anything executes;
//! `!!op` immediate commands (notably `def`) run during this stage.
//!
//! ### Stage 2: Rank Dispatch
//!
//! The [`eval`] module compares each input table's actual rank against the
//! operator's declared input rank ([`registry::Rank`]) and either applies
//! the operator directly or broadcasts it over the rows, recursing into
//! nested values. Output shaping per [`registry::RankOut`] turns operator
//! results into new columns, rows, or whole tables.
//!
//! ### Data Model
//!
//! The [`table`] module holds the hierarchical table: rows live in a shared
//! append-only [`table::RowArena`], derived tables share rows by id, and
//! nested rows link back to the row they came from so ancestor columns stay
//! resolvable in templates and joins.
//!
//! ### Runtime
//!
//! A [`session::Session`] ties together the operator [`registry::Registry`],
//! the [`config::SessionConfig`] (strict, test and dry-run modes), the
//! variable namespaces and the persistent [`store`] behind the [`cache`]
//! wrapper for expensive operators.
//!
//! ## Quick Start
//!
//! ```no_run
//! use arpel::{Registry, Session};
//!
//! let session = Session::new(Registry::with_builtins());
//! let out = session
//!     .run("!split\n!join sep=,\n", &["hello world"])
//!     .expect("script runs");
//! println!("{}", out);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod eval;
pub mod ops;
pub mod parser;
pub mod registry;
pub mod session;
pub mod store;
pub mod table;
pub mod value;

pub use config::SessionConfig;
pub use error::{Error, EvalError, ParseError, StoreError};
pub use registry::{OpCall, OpDescriptor, OpFn, OpInput, OpValue, Rank, RankOut, Registry};
pub use session::{run_test, Session};
pub use table::{Column, LazyRow, RowAccess, RowArena, RowId, Table};
pub use value::Value;
