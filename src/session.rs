//! The session: drives a full command list against an initial input.
//!
//! A [`Session`] owns the run-wide state: the operator registry, the shared
//! row arena, the global variable bindings and named intermediate tables,
//! the cache store, and the unique-key counter. Each pipeline step produces
//! a new table (or signals "no output", retaining the prior one); existing
//! tables are never destructively mutated across steps.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tracing::{debug, error, instrument};

use crate::config::SessionConfig;
use crate::error::{Error, EvalError, ParseError, StoreError};
use crate::eval::{Engine, StepResult};
use crate::parser::{parse_source, Command};
use crate::registry::{OpCall, OpInput, OpValue, Registry};
use crate::store::{JsonFileStore, MemoryStore, ObjStore};
use crate::table::{RowArena, Table};
use crate::value::Value;

pub struct Session {
    registry: Registry,
    config: SessionConfig,
    arena: RowArena,
    store: Box<dyn ObjStore>,
    /// `>>name` bindings and `!global`-saved tables.
    globals: RefCell<HashMap<String, Value>>,
    /// `>name` bindings, scoped to the session's runs.
    locals: RefCell<HashMap<String, Table>>,
    next_key: Cell<u64>,
}

impl Session {
    /// A session with the default configuration and an in-memory store.
    pub fn new(registry: Registry) -> Session {
        Session {
            registry,
            config: SessionConfig::default(),
            arena: RowArena::new(),
            store: Box::new(MemoryStore::new()),
            globals: RefCell::new(HashMap::new()),
            locals: RefCell::new(HashMap::new()),
            next_key: Cell::new(0),
        }
    }

    /// A configured session; opens the file store when `cache_path` is set.
    pub fn with_config(registry: Registry, config: SessionConfig) -> Result<Session, StoreError> {
        let store: Box<dyn ObjStore> = match &config.cache_path {
            Some(path) => Box::new(JsonFileStore::open(path)?),
            None => Box::new(MemoryStore::new()),
        };
        let mut session = Session::new(registry);
        session.config = config;
        session.store = store;
        Ok(session)
    }

    /// Replaces the store (tests, alternative backends).
    pub fn with_store(mut self, store: Box<dyn ObjStore>) -> Session {
        self.store = store;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn arena(&self) -> &RowArena {
        &self.arena
    }

    pub fn store(&self) -> &dyn ObjStore {
        self.store.as_ref()
    }

    /// The next auto-generated column key (`_0`, `_1`, ...). Keys with the
    /// `_` prefix never surface as visible columns.
    pub fn unique_key(&self) -> String {
        let n = self.next_key.get();
        self.next_key.set(n + 1);
        format!("_{}", n)
    }

    pub fn global_value(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    pub fn set_local(&self, name: &str, table: Table) {
        self.locals.borrow_mut().insert(name.to_string(), table);
    }

    /// Resolves a `<name` / `<<name` reference. `<<` reads the global
    /// namespace only; `<` tries run-local names first.
    pub fn named_table(&self, name: &str, global: bool) -> Option<Table> {
        if !global {
            if let Some(t) = self.locals.borrow().get(name) {
                return Some(t.clone());
            }
        }
        match self.globals.borrow().get(name) {
            Some(Value::Table(t)) => Some(t.clone()),
            _ => None,
        }
    }

    /// A fresh single-column input table over the session arena.
    pub fn new_input(&self, values: Vec<Value>) -> Table {
        Table::from_values(self.arena.clone(), &self.unique_key(), values)
    }

    /// Parses script text, executing `!!` immediate commands as they are
    /// encountered (this is how `def` registers composite operators) and
    /// validating every queued operator name. Fatal on the first unknown
    /// name or failed immediate, before any queued command executes.
    pub fn parse(&self, source: &str) -> Result<Vec<Command>, ParseError> {
        let mut queued = Vec::new();
        for cmd in parse_source(source)? {
            if !cmd.immediate {
                if !self.registry.contains(&cmd.opname) {
                    return Err(ParseError::UnknownOperator {
                        name: cmd.opname.clone(),
                        line: cmd.linenum,
                    });
                }
                queued.push(cmd);
                continue;
            }

            let op = self.registry.get(&cmd.opname).ok_or_else(|| {
                ParseError::UnknownOperator {
                    name: cmd.opname.clone(),
                    line: cmd.linenum,
                }
            })?;
            let call = OpCall {
                input: OpInput::None,
                second: OpInput::None,
                args: cmd.args.clone(),
                kwargs: cmd.kwargs.clone(),
                prompt: cmd.prompt.clone(),
            };
            let result = (op.func)(self, call).map_err(|e| ParseError::ImmediateFailed {
                name: cmd.opname.clone(),
                line: cmd.linenum,
                message: e.to_string(),
            })?;
            if let Some(name) = cmd.varname_at(0) {
                match result {
                    OpValue::Scalar(v) => self.set_global(name, v),
                    OpValue::Table(t) => self.set_global(name, Value::Table(t)),
                    _ => {}
                }
            }
        }
        Ok(queued)
    }

    /// Runs an already-parsed command list against an input table,
    /// threading each step's output into the next.
    pub fn run_commands(&self, commands: &[Command], input: Table) -> Result<Table, EvalError> {
        let engine = Engine::new(self);
        let mut current = input;
        for cmd in commands {
            debug!(input = %current, op = %cmd.opname, line = cmd.linenum, "step");
            match engine.eval_command(cmd, &current) {
                Ok(StepResult::Replace(t)) => current = t,
                Ok(StepResult::Keep) => {}
                Err(e) => {
                    error!(op = %cmd.opname, line = cmd.linenum, error = %e, "step failed");
                    return Err(e);
                }
            }
            if let Some(name) = cmd.varname_at(0) {
                self.set_local(name, current.clone());
            }
            if let Some(name) = &cmd.global_bind {
                self.set_global(name, Value::Table(current.clone()));
            }
        }
        Ok(current)
    }

    /// Parses and runs a script against the given initial input lines.
    #[instrument(level = "debug", skip(self, script, inputs))]
    pub fn run(&self, script: &str, inputs: &[&str]) -> Result<Table, Error> {
        let commands = self.parse(script)?;
        let input = self.new_input(inputs.iter().map(|s| Value::Str(s.to_string())).collect());
        Ok(self.run_commands(&commands, input)?)
    }
}

/// Test-oriented entrypoint: strict test-mode session over the built-in
/// operators, in-memory cache, `test-*` assertions armed.
pub fn run_test(script: &str, inputs: &[&str]) -> Result<Table, Error> {
    let session = Session::with_config(Registry::with_builtins(), SessionConfig::for_tests())
        .map_err(EvalError::from)?;
    session.run(script, inputs)
}
