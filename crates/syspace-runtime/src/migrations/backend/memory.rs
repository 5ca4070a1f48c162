//! In-memory migration target.
//!
//! Applies operations to a [`Catalog`] with the same structural rules as the
//! database, and supports the lock and transaction behaviour of a real
//! server. Used by `check` and throughout the tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use syspace_core::error::{Result, SyspaceError};
use syspace_core::schema::Catalog;

use super::{BackendFuture, MigrationBackend};
use crate::migrations::operation::Operation;
use crate::migrations::revision::RevisionId;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    catalog: Catalog,
    version: Option<BTreeSet<RevisionId>>,
    executed: Vec<String>,
    operations: usize,
}

/// A shared in-memory database. Clones refer to the same data.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<RwLock<MemoryState>>,
    lock: Arc<Mutex<()>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session.
    pub fn connect(&self) -> MemoryBackend {
        MemoryBackend {
            db: self.clone(),
            guard: None,
            snapshot: None,
        }
    }

    /// Current schema.
    pub async fn catalog(&self) -> Catalog {
        self.state.read().await.catalog.clone()
    }

    /// Stored marker rows, `None` when the marker table was never created.
    pub async fn version(&self) -> Option<BTreeSet<RevisionId>> {
        self.state.read().await.version.clone()
    }

    /// Raw SQL passed through `execute` operations, in order.
    pub async fn executed_sql(&self) -> Vec<String> {
        self.state.read().await.executed.clone()
    }

    /// Number of operations applied so far.
    pub async fn operations_applied(&self) -> usize {
        self.state.read().await.operations
    }

    /// Whether some session holds the migration lock.
    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// A session on a [`MemoryDatabase`].
pub struct MemoryBackend {
    db: MemoryDatabase,
    guard: Option<OwnedMutexGuard<()>>,
    snapshot: Option<MemoryState>,
}

impl MemoryBackend {
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }
}

impl MigrationBackend for MemoryBackend {
    fn acquire_lock(&mut self, wait: bool) -> BackendFuture<'_, bool> {
        Box::pin(async move {
            if self.guard.is_some() {
                return Ok(true);
            }
            let lock = self.db.lock.clone();
            let guard = if wait {
                Some(lock.lock_owned().await)
            } else {
                lock.try_lock_owned().ok()
            };
            let acquired = guard.is_some();
            self.guard = guard;
            debug!(acquired, "Memory migration lock");
            Ok(acquired)
        })
    }

    fn release_lock(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.guard = None;
            Ok(())
        })
    }

    fn read_version(&mut self) -> BackendFuture<'_, Option<BTreeSet<RevisionId>>> {
        Box::pin(async move { Ok(self.db.version().await) })
    }

    fn write_version<'a>(
        &'a mut self,
        from: &'a BTreeSet<RevisionId>,
        to: &'a BTreeSet<RevisionId>,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.db.state.write().await;
            let rows = state.version.get_or_insert_with(BTreeSet::new);
            for old in from.difference(to) {
                rows.remove(old);
            }
            rows.extend(to.difference(from).cloned());
            Ok(())
        })
    }

    fn apply<'a>(&'a mut self, op: &'a Operation) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.db.state.write().await;
            op.apply_to(&mut state.catalog)?;
            if let Operation::Execute { .. } = op {
                state.executed.extend(op.to_sql());
            }
            state.operations += 1;
            Ok(())
        })
    }

    fn begin(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if self.snapshot.is_some() {
                return Err(SyspaceError::Database(
                    "a transaction is already in progress".into(),
                ));
            }
            self.snapshot = Some(self.db.state.read().await.clone());
            Ok(())
        })
    }

    fn commit(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.snapshot
                .take()
                .map(|_| ())
                .ok_or_else(|| SyspaceError::Database("no transaction in progress".into()))
        })
    }

    fn rollback(&mut self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let snapshot = self
                .snapshot
                .take()
                .ok_or_else(|| SyspaceError::Database("no transaction in progress".into()))?;
            *self.db.state.write().await = snapshot;
            Ok(())
        })
    }
}
