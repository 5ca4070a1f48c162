use std::collections::BTreeSet;

use syspace_core::schema::quote_ident;

use super::{version_statements, version_table_sql, BackendFuture, MigrationBackend};
use crate::migrations::operation::Operation;
use crate::migrations::revision::RevisionId;

/// Renders a run as a SQL script instead of executing it.
///
/// The starting marker is supplied up front since there is no database to
/// read it from.
pub struct OfflineBackend {
    version_table: String,
    start: Option<BTreeSet<RevisionId>>,
    statements: Vec<String>,
    table_created: bool,
}

impl OfflineBackend {
    /// `start` is the marker the script assumes; `None` means a fresh database.
    pub fn new(version_table: &str, start: Option<BTreeSet<RevisionId>>) -> Self {
        let table_created = start.is_some();
        Self {
            version_table: quote_ident(version_table),
            start,
            statements: Vec::new(),
            table_created,
        }
    }

    /// Statements collected so far.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The collected statements as one script.
    pub fn to_script(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(statement);
            if statement.starts_with("--") && !statement.contains('\n') {
                out.push('\n');
            } else {
                out.push_str(";\n\n");
            }
        }
        out
    }

    fn push(&mut self, sql: impl Into<String>) {
        self.statements.push(sql.into());
    }
}

impl MigrationBackend for OfflineBackend {
    fn acquire_lock(&mut self, _wait: bool) -> BackendFuture<'_, bool> {
        Box::pin(async { Ok(true) })
    }

    fn release_lock(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn read_version(&mut self) -> BackendFuture<'_, Option<BTreeSet<RevisionId>>> {
        Box::pin(async move { Ok(self.start.clone()) })
    }

    fn write_version<'a>(
        &'a mut self,
        from: &'a BTreeSet<RevisionId>,
        to: &'a BTreeSet<RevisionId>,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if !self.table_created {
                let ddl = version_table_sql(&self.version_table);
                self.push(ddl);
                self.table_created = true;
            }
            for change in version_statements(&self.version_table, from, to) {
                self.push(change.to_sql());
            }
            Ok(())
        })
    }

    fn apply<'a>(&'a mut self, op: &'a Operation) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.push(format!("-- {}", op.describe()));
            for statement in op.to_sql() {
                self.push(statement);
            }
            Ok(())
        })
    }

    fn begin(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.push("BEGIN");
            Ok(())
        })
    }

    fn commit(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.push("COMMIT");
            Ok(())
        })
    }

    fn rollback(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.push("ROLLBACK");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_database_creates_marker_table_once() {
        let mut backend = OfflineBackend::new("syspace_version", None);
        assert_eq!(backend.read_version().await.unwrap(), None);

        let a: BTreeSet<RevisionId> = [RevisionId::new("a1")].into_iter().collect();
        let b: BTreeSet<RevisionId> = [RevisionId::new("b2")].into_iter().collect();
        backend.write_version(&BTreeSet::new(), &a).await.unwrap();
        backend.write_version(&a, &b).await.unwrap();

        let stmts = backend.statements();
        assert_eq!(stmts.len(), 3);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS syspace_version"));
        assert!(stmts[1].starts_with("INSERT INTO syspace_version"));
        assert!(stmts[2].starts_with("UPDATE syspace_version"));
    }

    #[tokio::test]
    async fn test_operations_render_with_comment_header() {
        let mut backend = OfflineBackend::new("syspace_version", Some(BTreeSet::new()));
        backend
            .apply(&Operation::drop_column("users", "startup_id"))
            .await
            .unwrap();

        assert_eq!(
            backend.to_script(),
            "-- drop_column users.startup_id\nALTER TABLE users DROP COLUMN startup_id;\n\n"
        );
    }
}
