//! CLI Common Utilities
//!
//! Shared context and argument helpers for command handlers.

use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::agent::ChatMessage;
use crate::config::{Config, ConfigLoader};
use crate::types::{Result, TransitError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        self == Self::Json
    }
}

/// Command execution context
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
}

impl CommandContext {
    /// Resolve configuration, merging `config_override` last when given
    pub fn load(config_override: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::load_with_override(config_override)?;
        Ok(Self { config })
    }

    pub fn db_path(&self) -> &Path {
        &self.config.database.path
    }

    /// Database file path, failing when `transitq init` has not run
    pub fn require_database(&self) -> Result<PathBuf> {
        let path = self.db_path();
        if !path.exists() {
            return Err(TransitError::Config(format!(
                "Database not found: {}. Run 'transitq init' first.",
                path.display()
            )));
        }
        Ok(path.to_path_buf())
    }
}

/// Read prior turns from a JSON file: `[{"role": "user", "content": "..."}]`
pub fn read_history(path: &Path) -> Result<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TransitError::Config(format!("Cannot read history {}: {}", path.display(), e))
    })?;
    let history: Vec<ChatMessage> = serde_json::from_str(&content)?;
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Role;
    use std::io::Write;

    #[test]
    fn test_read_history() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"role": "user", "content": "stops on route 10"}},
               {{"role": "assistant", "content": "Stops on route 10: 4 rows."}}]"#
        )
        .unwrap();

        let history = read_history(file.path()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "Stops on route 10: 4 rows.");
    }

    #[test]
    fn test_read_history_rejects_bad_role() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"role": "system", "content": "x"}}]"#).unwrap();
        assert!(matches!(
            read_history(file.path()),
            Err(TransitError::Json(_))
        ));
    }

    #[test]
    fn test_missing_database_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("missing.db");
        let ctx = CommandContext { config };

        let err = ctx.require_database().unwrap_err();
        assert!(err.to_string().contains("transitq init"));
    }
}
