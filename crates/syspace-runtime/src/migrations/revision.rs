use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::operation::Operation;

/// Opaque revision identifier, conventionally 12 hex digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(hex[hex.len() - 12..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RevisionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RevisionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single named point in the schema history graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Revision {
    /// Revision identifier.
    pub id: RevisionId,
    /// Parent revisions. Empty for a root, several for a merge point.
    pub down_revisions: Vec<RevisionId>,
    /// Branch labels attached to this revision.
    pub branch_labels: Vec<String>,
    /// Revisions that must be applied first without being parents.
    pub depends_on: Vec<RevisionId>,
    /// Human-readable description.
    pub message: String,
    /// When the revision was authored.
    pub created: Option<DateTime<Utc>>,
}

impl Revision {
    /// Create a revision with the given parent.
    pub fn new(id: &str, down_revision: Option<&str>, message: &str) -> Self {
        Self {
            id: RevisionId::new(id),
            down_revisions: down_revision.map(RevisionId::new).into_iter().collect(),
            branch_labels: Vec::new(),
            depends_on: Vec::new(),
            message: message.to_string(),
            created: None,
        }
    }

    /// Whether this revision has no parent.
    pub fn is_base(&self) -> bool {
        self.down_revisions.is_empty()
    }

    /// Whether this revision joins several parents.
    pub fn is_merge_point(&self) -> bool {
        self.down_revisions.len() > 1
    }

    /// Parents and dependencies: everything that must be applied first.
    pub fn requirements(&self) -> impl Iterator<Item = &RevisionId> {
        self.down_revisions.iter().chain(self.depends_on.iter())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parents = if self.down_revisions.is_empty() {
            "<base>".to_string()
        } else {
            self.down_revisions
                .iter()
                .map(RevisionId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(f, "{} -> {}", parents, self.id)?;
        if !self.branch_labels.is_empty() {
            write!(f, " ({})", self.branch_labels.join(", "))?;
        }
        write!(f, ", {}", self.message)
    }
}

/// The upgrade/downgrade operation pair attached to one revision.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    pub revision: Revision,
    /// Steps run parent -> child.
    pub upgrade: Vec<Operation>,
    /// Steps that undo `upgrade`, listed in the order they run.
    pub downgrade: Vec<Operation>,
}

impl MigrationScript {
    pub fn new(revision: Revision) -> Self {
        Self {
            revision,
            upgrade: Vec::new(),
            downgrade: Vec::new(),
        }
    }

    pub fn with_upgrade(mut self, ops: Vec<Operation>) -> Self {
        self.upgrade = ops;
        self
    }

    pub fn with_downgrade(mut self, ops: Vec<Operation>) -> Self {
        self.downgrade = ops;
        self
    }

    pub fn id(&self) -> &RevisionId {
        &self.revision.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_short_hex() {
        let id = RevisionId::generate();
        assert_eq!(id.as_str().len(), 12);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, RevisionId::generate());
    }

    #[test]
    fn test_revision_display() {
        let mut rev = Revision::new("8b4e6d2f0a31", Some("3f1c2a9b7d10"), "create organisations");
        assert_eq!(
            rev.to_string(),
            "3f1c2a9b7d10 -> 8b4e6d2f0a31, create organisations"
        );

        rev.down_revisions.clear();
        rev.branch_labels.push("spaces".into());
        assert!(rev.is_base());
        assert_eq!(
            rev.to_string(),
            "<base> -> 8b4e6d2f0a31 (spaces), create organisations"
        );
    }
}
