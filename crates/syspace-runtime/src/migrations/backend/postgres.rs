use std::collections::BTreeSet;

use sqlx::pool::PoolConnection;
use sqlx::{Executor, Postgres};
use tracing::debug;

use syspace_core::config::MigrationsConfig;
use syspace_core::error::{Result, SyspaceError};
use syspace_core::schema::quote_ident;

use super::{version_statements, version_table_sql, BackendFuture, MigrationBackend, VersionChange};
use crate::db::Database;
use crate::migrations::operation::Operation;
use crate::migrations::revision::RevisionId;

/// PostgreSQL session used for a migration run.
///
/// Holds one pooled connection for its lifetime; the advisory lock and any
/// open transaction belong to that connection.
pub struct PgBackend {
    conn: PoolConnection<Postgres>,
    version_table: String,
    lock_id: i64,
    table_created: bool,
}

impl PgBackend {
    /// Check out a session from the pool.
    pub async fn connect(db: &Database, config: &MigrationsConfig) -> Result<Self> {
        Ok(Self {
            conn: db.session().await?,
            version_table: config.version_table.clone(),
            lock_id: config.lock_id,
            table_created: false,
        })
    }

    /// Run a statement without preparing it.
    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing");
        (&mut *self.conn).execute(sql).await?;
        Ok(())
    }

    /// Resolve the marker table the same way the marker reads and writes name it.
    async fn version_table_exists(&mut self) -> Result<bool> {
        let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
            .bind(quote_ident(&self.version_table))
            .fetch_one(&mut *self.conn)
            .await?;
        if found.is_some() {
            self.table_created = true;
        }
        Ok(found.is_some())
    }

    async fn ensure_version_table(&mut self, table: &str) -> Result<()> {
        if !self.table_created {
            self.execute(&version_table_sql(table)).await?;
            self.table_created = true;
        }
        Ok(())
    }
}

impl MigrationBackend for PgBackend {
    fn acquire_lock(&mut self, wait: bool) -> BackendFuture<'_, bool> {
        Box::pin(async move {
            debug!(lock_id = self.lock_id, wait, "Acquiring migration lock");
            if wait {
                sqlx::query("SELECT pg_advisory_lock($1)")
                    .bind(self.lock_id)
                    .execute(&mut *self.conn)
                    .await
                    .map_err(|e| {
                        SyspaceError::Database(format!("Failed to acquire migration lock: {}", e))
                    })?;
                return Ok(true);
            }

            let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                .bind(self.lock_id)
                .fetch_one(&mut *self.conn)
                .await
                .map_err(|e| {
                    SyspaceError::Database(format!("Failed to acquire migration lock: {}", e))
                })?;
            Ok(acquired)
        })
    }

    fn release_lock(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.lock_id)
                .execute(&mut *self.conn)
                .await
                .map_err(|e| {
                    SyspaceError::Database(format!("Failed to release migration lock: {}", e))
                })?;
            debug!("Migration lock released");
            Ok(())
        })
    }

    fn read_version(&mut self) -> BackendFuture<'_, Option<BTreeSet<RevisionId>>> {
        Box::pin(async move {
            if !self.version_table_exists().await? {
                return Ok(None);
            }

            let sql = format!("SELECT version_num FROM {}", quote_ident(&self.version_table));
            let rows: Vec<(String,)> = sqlx::query_as(&sql).fetch_all(&mut *self.conn).await?;
            Ok(Some(rows.into_iter().map(|(v,)| RevisionId::new(v)).collect()))
        })
    }

    fn write_version<'a>(
        &'a mut self,
        from: &'a BTreeSet<RevisionId>,
        to: &'a BTreeSet<RevisionId>,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let table = quote_ident(&self.version_table);
            self.ensure_version_table(&table).await?;

            for change in version_statements(&table, from, to) {
                let (sql, values) = match change {
                    VersionChange::Update { old, new, .. } => (
                        format!(
                            "UPDATE {} SET version_num = $1 WHERE version_num = $2",
                            table
                        ),
                        vec![new.to_string(), old.to_string()],
                    ),
                    VersionChange::Insert { new, .. } => (
                        format!("INSERT INTO {} (version_num) VALUES ($1)", table),
                        vec![new.to_string()],
                    ),
                    VersionChange::Delete { old, .. } => (
                        format!("DELETE FROM {} WHERE version_num = $1", table),
                        vec![old.to_string()],
                    ),
                };

                let mut query = sqlx::query(&sql);
                for value in values {
                    query = query.bind(value);
                }
                query.execute(&mut *self.conn).await?;
            }
            debug!(?to, "Version marker updated");
            Ok(())
        })
    }

    fn apply<'a>(&'a mut self, op: &'a Operation) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            for statement in op.to_sql() {
                self.execute(&statement).await?;
            }
            Ok(())
        })
    }

    fn begin(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.execute("BEGIN").await })
    }

    fn commit(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.execute("COMMIT").await })
    }

    fn rollback(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            // The marker table may have been created inside the rolled back transaction.
            self.table_created = false;
            self.execute("ROLLBACK").await
        })
    }
}
