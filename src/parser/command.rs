//! The parsed command unit.

use crate::value::Value;

/// A `<name` / `<<name` reference to a previously named table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    /// `<<name` explicitly reads the global namespace.
    pub global: bool,
}

/// One parsed `!operator` invocation. Commands are created once by the
/// parser and reused for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Command {
    /// Normalized operator name (hyphens replaced, sigil stripped).
    pub opname: String,
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
    /// Multi-line body accumulated from the lines following the command.
    pub prompt: Option<String>,
    /// `>name` bindings; one per broadcast depth, empty string for a bare
    /// `>` (anonymous slot).
    pub varnames: Vec<String>,
    /// `>>name` binding into the global namespace.
    pub global_bind: Option<String>,
    /// `<name` / `<<name` operand references.
    pub table_refs: Vec<TableRef>,
    /// `!!op`: executed at parse time rather than queued.
    pub immediate: bool,
    /// 1-based source line, for diagnostics.
    pub linenum: usize,
}

impl Command {
    pub fn new(opname: &str, linenum: usize) -> Command {
        Command {
            opname: opname.to_string(),
            args: Vec::new(),
            kwargs: Vec::new(),
            prompt: None,
            varnames: Vec::new(),
            global_bind: None,
            table_refs: Vec::new(),
            immediate: false,
            linenum,
        }
    }

    /// The binding name for the new column created at the given broadcast
    /// depth, if one was supplied.
    pub fn varname_at(&self, depth: usize) -> Option<&str> {
        self.varnames
            .get(depth)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}
