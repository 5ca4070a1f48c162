//! The platform's own revision scripts, compiled into the binary.

use std::path::Path;

use syspace_runtime::migrations::{load_scripts_from_dir, parse_script, MigrationScript, Result};

/// Embedded scripts as `(file name, content)`.
const BUILTIN: &[(&str, &str)] = &[
    (
        "1a2b3c4d5e6f_create_users.toml",
        include_str!("../migrations/versions/1a2b3c4d5e6f_create_users.toml"),
    ),
    (
        "2b7e9f014c3d_create_companies_and_startups.toml",
        include_str!("../migrations/versions/2b7e9f014c3d_create_companies_and_startups.toml"),
    ),
    (
        "3c91d4a7e220_link_users_to_companies_and_startups.toml",
        include_str!(
            "../migrations/versions/3c91d4a7e220_link_users_to_companies_and_startups.toml"
        ),
    ),
    (
        "7bd0250369dc_create_user_profiles_and_connections.toml",
        include_str!(
            "../migrations/versions/7bd0250369dc_create_user_profiles_and_connections.toml"
        ),
    ),
    (
        "0581da68b2ba_change_connection_status_to_enum.toml",
        include_str!("../migrations/versions/0581da68b2ba_change_connection_status_to_enum.toml"),
    ),
];

/// Parse the embedded scripts.
pub fn builtin_scripts() -> Result<Vec<MigrationScript>> {
    BUILTIN
        .iter()
        .map(|(name, content)| parse_script(content, name))
        .collect()
}

/// Where scripts come from for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource<'a> {
    Directory(&'a Path),
    Builtin,
}

impl ScriptSource<'_> {
    /// Use `dir` when it exists, otherwise the embedded set.
    pub fn pick(dir: Option<&Path>) -> ScriptSource<'_> {
        match dir {
            Some(dir) if dir.is_dir() => ScriptSource::Directory(dir),
            _ => ScriptSource::Builtin,
        }
    }

    pub fn load(&self) -> Result<Vec<MigrationScript>> {
        match self {
            ScriptSource::Directory(dir) => load_scripts_from_dir(dir),
            ScriptSource::Builtin => builtin_scripts(),
        }
    }
}

impl std::fmt::Display for ScriptSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptSource::Directory(dir) => write!(f, "{}", dir.display()),
            ScriptSource::Builtin => write!(f, "built-in scripts"),
        }
    }
}
