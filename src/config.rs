//! Session configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Runtime options for one interpreter session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Expensive operators call their mock (or emit a placeholder) instead
    /// of the real function; the cache store is never touched.
    #[serde(default)]
    pub dry_run: bool,

    /// Re-raise per-row broadcast errors immediately instead of dropping
    /// the row (debug / single-step behavior).
    #[serde(default)]
    pub strict: bool,

    /// Arms the `test-*` assertion operators; outside test mode they are
    /// no-ops.
    #[serde(default)]
    pub test: bool,

    /// Path of the persisted cache store; `None` keeps the cache in memory
    /// for the lifetime of the session.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl SessionConfig {
    /// Strict test-mode configuration used by `run_test`: assertions armed,
    /// row errors fatal, cache in memory.
    pub fn for_tests() -> SessionConfig {
        SessionConfig {
            dry_run: false,
            strict: true,
            test: true,
            cache_path: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<SessionConfig, StoreError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let config: SessionConfig = serde_json::from_str("{}").expect("parses");
        assert!(!config.dry_run);
        assert!(!config.strict);
        assert!(!config.test);
        assert!(config.cache_path.is_none());
    }

    #[test]
    fn partial_config_file() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"dry_run": true, "cache_path": "out.jsonl"}"#)
                .expect("parses");
        assert!(config.dry_run);
        assert_eq!(config.cache_path, Some(PathBuf::from("out.jsonl")));
    }
}
