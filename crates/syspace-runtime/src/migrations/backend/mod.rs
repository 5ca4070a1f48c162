//! Storage backends the migration engine drives.
//!
//! A backend owns one session against a target database. It interprets
//! operations, stores the version marker and provides the run lock.

mod memory;
mod offline;
mod postgres;

pub use memory::{MemoryBackend, MemoryDatabase};
pub use offline::OfflineBackend;
pub use postgres::PgBackend;

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;

use syspace_core::Result;

use super::operation::Operation;
use super::revision::RevisionId;

/// Boxed future returned by backend methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One session against a migration target.
pub trait MigrationBackend: Send {
    /// Take the exclusive migration lock.
    ///
    /// With `wait` the call blocks until the lock is free; otherwise it
    /// returns `false` when another session holds it.
    fn acquire_lock(&mut self, wait: bool) -> BackendFuture<'_, bool>;

    /// Release the migration lock taken by this session.
    fn release_lock(&mut self) -> BackendFuture<'_, ()>;

    /// Read the version marker. `None` means the marker table does not exist.
    fn read_version(&mut self) -> BackendFuture<'_, Option<BTreeSet<RevisionId>>>;

    /// Replace the marker rows `from` with `to`, creating the table if needed.
    fn write_version<'a>(
        &'a mut self,
        from: &'a BTreeSet<RevisionId>,
        to: &'a BTreeSet<RevisionId>,
    ) -> BackendFuture<'a, ()>;

    /// Run one schema operation.
    fn apply<'a>(&'a mut self, op: &'a Operation) -> BackendFuture<'a, ()>;

    fn begin(&mut self) -> BackendFuture<'_, ()>;

    fn commit(&mut self) -> BackendFuture<'_, ()>;

    fn rollback(&mut self) -> BackendFuture<'_, ()>;
}

/// Statements that move the marker rows from `from` to `to`.
///
/// A one-for-one replacement becomes a single UPDATE, so a linear step never
/// leaves the table empty in between.
pub(crate) fn version_statements(
    table: &str,
    from: &BTreeSet<RevisionId>,
    to: &BTreeSet<RevisionId>,
) -> Vec<VersionChange> {
    let mut removed = from.difference(to);
    let mut added = to.difference(from);
    let mut changes = Vec::new();

    loop {
        match (removed.next(), added.next()) {
            (Some(old), Some(new)) => changes.push(VersionChange::Update {
                table: table.to_string(),
                old: old.clone(),
                new: new.clone(),
            }),
            (Some(old), None) => {
                changes.push(VersionChange::Delete {
                    table: table.to_string(),
                    old: old.clone(),
                });
                changes.extend(removed.by_ref().map(|old| VersionChange::Delete {
                    table: table.to_string(),
                    old: old.clone(),
                }));
                break;
            }
            (None, Some(new)) => {
                changes.push(VersionChange::Insert {
                    table: table.to_string(),
                    new: new.clone(),
                });
                changes.extend(added.by_ref().map(|new| VersionChange::Insert {
                    table: table.to_string(),
                    new: new.clone(),
                }));
                break;
            }
            (None, None) => break,
        }
    }

    changes
}

/// A single marker row change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VersionChange {
    Update {
        table: String,
        old: RevisionId,
        new: RevisionId,
    },
    Insert {
        table: String,
        new: RevisionId,
    },
    Delete {
        table: String,
        old: RevisionId,
    },
}

impl VersionChange {
    /// Literal SQL for offline scripts.
    pub(crate) fn to_sql(&self) -> String {
        match self {
            VersionChange::Update { table, old, new } => format!(
                "UPDATE {} SET version_num = {} WHERE version_num = {}",
                table,
                literal(new.as_str()),
                literal(old.as_str())
            ),
            VersionChange::Insert { table, new } => format!(
                "INSERT INTO {} (version_num) VALUES ({})",
                table,
                literal(new.as_str())
            ),
            VersionChange::Delete { table, old } => format!(
                "DELETE FROM {} WHERE version_num = {}",
                table,
                literal(old.as_str())
            ),
        }
    }
}

/// DDL for the marker table.
pub(crate) fn version_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    version_num VARCHAR(32) NOT NULL,\n    PRIMARY KEY (version_num)\n)",
        table
    )
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<RevisionId> {
        ids.iter().map(|id| RevisionId::new(*id)).collect()
    }

    #[test]
    fn test_linear_step_is_single_update() {
        let changes = version_statements("syspace_version", &set(&["a1"]), &set(&["b2"]));
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].to_sql(),
            "UPDATE syspace_version SET version_num = 'b2' WHERE version_num = 'a1'"
        );
    }

    #[test]
    fn test_first_and_last_steps() {
        let first = version_statements("syspace_version", &BTreeSet::new(), &set(&["a1"]));
        assert_eq!(
            first[0].to_sql(),
            "INSERT INTO syspace_version (version_num) VALUES ('a1')"
        );

        let last = version_statements("syspace_version", &set(&["a1"]), &BTreeSet::new());
        assert_eq!(
            last[0].to_sql(),
            "DELETE FROM syspace_version WHERE version_num = 'a1'"
        );
    }

    #[test]
    fn test_branch_merge_updates_then_deletes() {
        let changes = version_statements("v", &set(&["b2", "c2"]), &set(&["m3"]));
        assert_eq!(changes.len(), 2);
        assert!(matches!(changes[0], VersionChange::Update { .. }));
        assert!(matches!(changes[1], VersionChange::Delete { .. }));

        assert!(version_statements("v", &set(&["a1"]), &set(&["a1"])).is_empty());
    }
}
