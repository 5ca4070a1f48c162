//! Revision script discovery.
//!
//! Scripts are TOML files:
//!
//! ```toml
//! revision = "8b4e6d2f0a31"
//! down_revision = "3f1c2a9b7d10"      # omitted for a root, a list for a merge
//! branch_labels = ["spaces"]
//! message = "add company links to users"
//! created = "2025-03-02T10:15:00Z"
//!
//! [[upgrade]]
//! op = "add_column"
//! table = "users"
//! column = { name = "company_id", type = "INTEGER" }
//!
//! [[downgrade]]
//! op = "drop_column"
//! table = "users"
//! column = "company_id"
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use syspace_core::SyspaceError;

use super::error::{MigrationError, Result};
use super::operation::Operation;
use super::revision::{MigrationScript, Revision, RevisionId};

/// A single id or a list of ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_ids(self) -> Vec<RevisionId> {
        match self {
            OneOrMany::One(id) => vec![RevisionId::new(id)],
            OneOrMany::Many(ids) => ids.into_iter().map(RevisionId::new).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptFile {
    revision: String,
    #[serde(default)]
    down_revision: Option<OneOrMany>,
    #[serde(default)]
    branch_labels: Vec<String>,
    #[serde(default)]
    depends_on: Option<OneOrMany>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default)]
    upgrade: Vec<Operation>,
    #[serde(default)]
    downgrade: Vec<Operation>,
}

/// Parse one script. `origin` names the source in error messages.
pub fn parse_script(content: &str, origin: &str) -> Result<MigrationScript> {
    let file: ScriptFile = toml::from_str(content).map_err(|e| MigrationError::Script {
        path: origin.to_string(),
        message: e.to_string(),
    })?;

    if file.revision.trim().is_empty() {
        return Err(MigrationError::Script {
            path: origin.to_string(),
            message: "revision id is empty".into(),
        });
    }

    let revision = Revision {
        id: RevisionId::new(file.revision.trim()),
        down_revisions: file.down_revision.map(OneOrMany::into_ids).unwrap_or_default(),
        branch_labels: file.branch_labels,
        depends_on: file.depends_on.map(OneOrMany::into_ids).unwrap_or_default(),
        message: file.message,
        created: file.created,
    };

    Ok(MigrationScript {
        revision,
        upgrade: file.upgrade,
        downgrade: file.downgrade,
    })
}

/// Load every `*.toml` script in `dir`, ordered by file name.
///
/// A missing directory yields no scripts.
pub fn load_scripts_from_dir(dir: &Path) -> Result<Vec<MigrationScript>> {
    if !dir.exists() {
        debug!("Script directory does not exist: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(SyspaceError::Io)? {
        let path = entry.map_err(SyspaceError::Io)?.path();
        if path.is_file() && path.extension().map(|e| e == "toml").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut scripts = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(SyspaceError::Io)?;
        scripts.push(parse_script(&content, &path.display().to_string())?);
    }

    debug!("Loaded {} revision scripts from {:?}", scripts.len(), dir);
    Ok(scripts)
}
