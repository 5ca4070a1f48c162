use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lock ID for the migration advisory lock.
/// Derived from "SYSMIG" ascii values so every deployment agrees on it.
pub const DEFAULT_LOCK_ID: i64 = 0x5359_534D_4947;

/// Migration engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Directory holding revision scripts (`*.toml`).
    #[serde(default)]
    pub script_location: Option<PathBuf>,

    /// Name of the bookkeeping table holding the applied revision(s).
    #[serde(default = "default_version_table")]
    pub version_table: String,

    /// Advisory lock key taken for the duration of a run.
    #[serde(default = "default_lock_id")]
    pub lock_id: i64,

    /// What to do when another run already holds the lock.
    #[serde(default)]
    pub lock_mode: LockMode,

    /// Transaction wrapping applied around migration steps.
    #[serde(default)]
    pub transaction_mode: TransactionMode,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            script_location: None,
            version_table: default_version_table(),
            lock_id: default_lock_id(),
            lock_mode: LockMode::default(),
            transaction_mode: TransactionMode::default(),
        }
    }
}

fn default_version_table() -> String {
    "syspace_version".to_string()
}

fn default_lock_id() -> i64 {
    DEFAULT_LOCK_ID
}

/// Behaviour when the migration lock is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Block until the other run finishes.
    #[default]
    Wait,
    /// Fail immediately with a lock contention error.
    FailFast,
}

/// Transaction wrapping for migration runs.
///
/// Whether DDL is transactional depends on the target database, so nothing is
/// wrapped unless asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Steps run outside any transaction; a failure leaves partial state.
    #[default]
    None,
    /// Each revision commits together with its marker update.
    PerRevision,
    /// The whole run is a single transaction.
    All,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_migrations_config() {
        let config = MigrationsConfig::default();
        assert_eq!(config.version_table, "syspace_version");
        assert_eq!(config.lock_id, DEFAULT_LOCK_ID);
        assert_eq!(config.lock_mode, LockMode::Wait);
        assert_eq!(config.transaction_mode, TransactionMode::None);
        assert!(config.script_location.is_none());
    }

    #[test]
    fn test_parse_modes() {
        let toml = r#"
            script_location = "migrations/versions"
            lock_mode = "fail_fast"
            transaction_mode = "per_revision"
        "#;

        let config: MigrationsConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.lock_mode, LockMode::FailFast);
        assert_eq!(config.transaction_mode, TransactionMode::PerRevision);
        assert_eq!(
            config.script_location,
            Some(PathBuf::from("migrations/versions"))
        );
    }

    #[test]
    fn test_reject_unknown_mode() {
        let result: std::result::Result<MigrationsConfig, _> =
            toml::from_str(r#"transaction_mode = "sometimes""#);
        assert!(result.is_err());
    }
}
