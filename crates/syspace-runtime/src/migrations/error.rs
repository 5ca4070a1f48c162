use std::fmt;

use serde::Serialize;
use syspace_core::SyspaceError;
use thiserror::Error;

use super::revision::RevisionId;

/// Direction a migration step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    /// Name of the script operation run in this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upgrade => "upgrade",
            Direction::Downgrade => "downgrade",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the migration engine. All of them end the run.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("revision prefix '{prefix}' is ambiguous: {}", join(.candidates))]
    AmbiguousRevision {
        prefix: String,
        candidates: Vec<RevisionId>,
    },

    #[error("'{target}' is ambiguous, multiple heads present: {}; name a head or use a branch target", join(.heads))]
    AmbiguousHead {
        target: String,
        heads: Vec<RevisionId>,
    },

    #[error("no {direction} path from {from} to {to}: {reason}")]
    NoPath {
        direction: Direction,
        from: String,
        to: String,
        reason: String,
    },

    #[error("invalid revision graph: {0}")]
    InvalidGraph(String),

    #[error("{direction} of revision {revision} failed at step {step} ({operation}): {source}")]
    StepExecution {
        revision: RevisionId,
        direction: Direction,
        step: usize,
        operation: String,
        #[source]
        source: SyspaceError,
    },

    #[error("another migration run holds the lock")]
    LockContention,

    #[error("invalid migration script {path}: {message}")]
    Script { path: String, message: String },

    #[error(transparent)]
    Core(#[from] SyspaceError),
}

fn join(ids: &[RevisionId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using MigrationError.
pub type Result<T> = std::result::Result<T, MigrationError>;
