//! Error types for the ARPEL interpreter.
//!
//! Errors are split by pipeline stage: [`ParseError`] for script text that
//! cannot be turned into commands (always fatal, raised before anything
//! executes), [`EvalError`] for failures during evaluation, and
//! [`StoreError`] for the cache store.
//!
//! `EvalError` carries the recoverable-vs-fatal distinction explicitly via
//! [`EvalError::is_fatal`]: a recoverable error raised while an operator is
//! applied to one row of a broadcast drops that row and nothing else, while
//! a fatal error (abort, assertion failure) propagates through every
//! broadcast level and terminates the run.

use thiserror::Error;

/// Fatal script errors, raised at parse time before any command executes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The script names an operator that is not in the registry.
    #[error("no such operator \"!{name}\" (line {line})")]
    UnknownOperator { name: String, line: usize },

    /// The command line could not be tokenized.
    #[error("malformed command (line {line}): {message}")]
    Malformed { line: usize, message: String },

    /// An immediate (`!!`) command failed while executing at parse time.
    #[error("immediate !{name} failed (line {line}): {message}")]
    ImmediateFailed {
        name: String,
        line: usize,
        message: String,
    },
}

/// Errors raised while evaluating commands.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Explicit user-triggered abort; terminates the entire run.
    #[error("aborted: {0}")]
    Abort(String),

    /// A `test-*` operator assertion failed (only raised in test mode).
    #[error("assertion failed: {0}")]
    AssertFailed(String),

    /// Column lookup failed on the row and its whole parent chain.
    #[error("no such column \"{0}\"")]
    NoSuchColumn(String),

    /// A `<name` / `<<name` reference does not resolve to a stored table.
    #[error("no such table \"{0}\"")]
    NoSuchTable(String),

    /// A `{key}` template substitution found no value in scope.
    #[error("no value for template key \"{0}\"")]
    MissingKey(String),

    /// A broadcast level produced no output rows while rows were erroring.
    #[error("no rows left ({errors} errors)")]
    EmptyBroadcast { errors: usize },

    /// The operand had a different shape than the operator expected.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Operator-reported failure.
    #[error("{0}")]
    Op(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Raised when a meta-operator (e.g. `def`) parses script text at
    /// evaluation time.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl EvalError {
    /// Whether this error must terminate the whole run instead of being
    /// swallowed at the broadcast level where it occurred.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EvalError::Abort(_) | EvalError::AssertFailed(_) | EvalError::Parse(_)
        )
    }
}

/// Umbrella error for the runtime entrypoints.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Errors from the persisted cache store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_and_assert_are_fatal() {
        assert!(EvalError::Abort("stop".into()).is_fatal());
        assert!(EvalError::AssertFailed("ne".into()).is_fatal());
    }

    #[test]
    fn row_level_errors_are_recoverable() {
        assert!(!EvalError::NoSuchColumn("x".into()).is_fatal());
        assert!(!EvalError::MissingKey("x".into()).is_fatal());
        assert!(!EvalError::EmptyBroadcast { errors: 2 }.is_fatal());
        assert!(!EvalError::Op("boom".into()).is_fatal());
    }
}
