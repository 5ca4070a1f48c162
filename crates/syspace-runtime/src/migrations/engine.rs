//! Migration engine with an exclusive run lock.
//!
//! Resolves targets against the revision graph, runs each revision's steps
//! through a backend and advances the version marker after every revision.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use syspace_core::config::{LockMode, MigrationsConfig, TransactionMode};
use syspace_core::SyspaceConfig;

use super::backend::{MigrationBackend, PgBackend};
use super::error::{Direction, MigrationError, Result};
use super::graph::{describe_marker, History, MigrationPlan, PlanStep, RevisionGraph};
use super::revision::RevisionId;
use super::target::Target;
use super::verify::{verify_graph, VerifyReport};
use crate::db::Database;

/// The recorded state of a target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "heads", rename_all = "snake_case")]
pub enum VersionMarker {
    /// The marker table does not exist yet.
    Unversioned,
    /// The applied heads; empty means base.
    Heads(BTreeSet<RevisionId>),
}

impl VersionMarker {
    /// Applied heads, empty for base and unversioned.
    pub fn heads(&self) -> BTreeSet<RevisionId> {
        match self {
            VersionMarker::Unversioned => BTreeSet::new(),
            VersionMarker::Heads(heads) => heads.clone(),
        }
    }

    /// Whether nothing is applied.
    pub fn is_base(&self) -> bool {
        match self {
            VersionMarker::Unversioned => true,
            VersionMarker::Heads(heads) => heads.is_empty(),
        }
    }

    /// The single applied head, if exactly one.
    pub fn single(&self) -> Option<&RevisionId> {
        match self {
            VersionMarker::Heads(heads) if heads.len() == 1 => heads.iter().next(),
            _ => None,
        }
    }
}

impl From<Option<BTreeSet<RevisionId>>> for VersionMarker {
    fn from(value: Option<BTreeSet<RevisionId>>) -> Self {
        match value {
            None => VersionMarker::Unversioned,
            Some(heads) => VersionMarker::Heads(heads),
        }
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionMarker::Unversioned => f.write_str("unversioned"),
            VersionMarker::Heads(heads) => f.write_str(&describe_marker(heads)),
        }
    }
}

/// Outcome of an upgrade or downgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub direction: Direction,
    pub from: VersionMarker,
    pub to: VersionMarker,
    /// Revisions run, in the order they ran.
    pub revisions: Vec<RevisionId>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.revisions.is_empty()
    }
}

/// Runs migrations for one revision graph against one backend.
pub struct MigrationEngine<B> {
    graph: RevisionGraph,
    backend: B,
    config: MigrationsConfig,
}

impl MigrationEngine<PgBackend> {
    /// Connect to the configured PostgreSQL database.
    pub async fn connect(config: &SyspaceConfig, graph: RevisionGraph) -> Result<Self> {
        let db = Database::from_config(&config.database).await?;
        let backend = PgBackend::connect(&db, &config.migrations).await?;
        Ok(Self::new(graph, backend, config.migrations.clone()))
    }
}

impl<B: MigrationBackend> MigrationEngine<B> {
    pub fn new(graph: RevisionGraph, backend: B, config: MigrationsConfig) -> Self {
        Self {
            graph,
            backend,
            config,
        }
    }

    pub fn graph(&self) -> &RevisionGraph {
        &self.graph
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Read the recorded marker without taking the lock.
    pub async fn current(&mut self) -> Result<VersionMarker> {
        Ok(self.backend.read_version().await?.into())
    }

    /// Revisions parent before child; restartable.
    pub fn history(&self) -> History<'_> {
        self.graph.history()
    }

    pub fn heads(&self) -> Vec<RevisionId> {
        self.graph.heads()
    }

    /// Revisions with more than one child.
    pub fn branches(&self) -> Vec<RevisionId> {
        self.graph.branch_points()
    }

    /// Check every script's upgrade and downgrade against an in-memory schema.
    pub fn verify(&self) -> VerifyReport {
        verify_graph(&self.graph)
    }

    /// Upgrade to `target` (`head`, `heads`, an id, a label, `label@head`, `+N`).
    pub async fn upgrade(&mut self, target: &str) -> Result<MigrationReport> {
        let target: Target = target.parse()?;
        self.locked_run(Direction::Upgrade, &target).await
    }

    /// Downgrade to `target` (`base`, an id, a label, `-N`).
    pub async fn downgrade(&mut self, target: &str) -> Result<MigrationReport> {
        let target: Target = target.parse()?;
        self.locked_run(Direction::Downgrade, &target).await
    }

    /// Record `target` as the applied state without running any steps.
    pub async fn stamp(&mut self, target: &str) -> Result<VersionMarker> {
        let target: Target = target.parse()?;
        self.acquire_lock().await?;
        let result = self.stamp_inner(&target).await;
        self.release_lock().await;
        result
    }

    async fn stamp_inner(&mut self, target: &Target) -> Result<VersionMarker> {
        let stored = self.backend.read_version().await?;
        let from = stored.clone().unwrap_or_default();
        let to = self.graph.resolve(target, &from)?;

        if stored.as_ref() == Some(&to) {
            info!("Already stamped at {}", describe_marker(&to));
            return Ok(VersionMarker::Heads(to));
        }

        self.backend.write_version(&from, &to).await?;
        info!("Stamped {} -> {}", describe_marker(&from), describe_marker(&to));
        Ok(VersionMarker::Heads(to))
    }

    async fn acquire_lock(&mut self) -> Result<()> {
        let wait = self.config.lock_mode == LockMode::Wait;
        debug!("Acquiring migration lock...");
        if !self.backend.acquire_lock(wait).await? {
            return Err(MigrationError::LockContention);
        }
        debug!("Migration lock acquired");
        Ok(())
    }

    async fn release_lock(&mut self) {
        if let Err(e) = self.backend.release_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }
    }

    /// Run under the lock; the lock is released even when the run fails.
    async fn locked_run(&mut self, direction: Direction, target: &Target) -> Result<MigrationReport> {
        self.acquire_lock().await?;
        let result = self.run(direction, target).await;
        self.release_lock().await;
        result
    }

    async fn run(&mut self, direction: Direction, target: &Target) -> Result<MigrationReport> {
        let stored = self.backend.read_version().await?;
        let current = stored.clone().unwrap_or_default();
        let from = VersionMarker::from(stored);

        let wanted = self.graph.resolve(target, &current)?;
        let plan = match direction {
            Direction::Upgrade => self.graph.upgrade_plan(&current, &wanted)?,
            Direction::Downgrade => self.graph.downgrade_plan(&current, &wanted)?,
        };

        if plan.is_empty() {
            info!("Nothing to {}; database is at {}", direction, from);
            return Ok(MigrationReport {
                direction,
                to: from.clone(),
                from,
                revisions: Vec::new(),
            });
        }

        info!(
            "Running {} {} -> {} ({} revision(s))",
            direction,
            from,
            describe_marker(&wanted),
            plan.len()
        );

        let (revisions, marker) = self.execute(&plan, current).await?;
        Ok(MigrationReport {
            direction,
            from,
            to: VersionMarker::Heads(marker),
            revisions,
        })
    }

    async fn execute(
        &mut self,
        plan: &MigrationPlan,
        mut marker: BTreeSet<RevisionId>,
    ) -> Result<(Vec<RevisionId>, BTreeSet<RevisionId>)> {
        let mode = self.config.transaction_mode;
        if mode == TransactionMode::All {
            self.backend.begin().await?;
        }

        let mut done = Vec::with_capacity(plan.len());
        for step in &plan.steps {
            if mode == TransactionMode::PerRevision {
                self.backend.begin().await?;
            }

            if let Err(e) = self.run_step(plan.direction, step, &marker).await {
                if mode != TransactionMode::None {
                    if let Err(rollback) = self.backend.rollback().await {
                        warn!("Rollback after failed step also failed: {}", rollback);
                    }
                }
                return Err(e);
            }

            if mode == TransactionMode::PerRevision {
                self.backend.commit().await?;
            }
            marker = step.marker_after.clone();
            done.push(step.revision.clone());
        }

        if mode == TransactionMode::All {
            self.backend.commit().await?;
        }
        Ok((done, marker))
    }

    /// Run one revision's steps, then move the marker.
    async fn run_step(
        &mut self,
        direction: Direction,
        step: &PlanStep,
        marker: &BTreeSet<RevisionId>,
    ) -> Result<()> {
        let script = self
            .graph
            .get(step.revision.as_str())
            .ok_or_else(|| MigrationError::UnknownRevision(step.revision.to_string()))?;

        let ops = match direction {
            Direction::Upgrade => &script.upgrade,
            Direction::Downgrade => &script.downgrade,
        };

        match direction {
            Direction::Upgrade => info!("Applying revision {}: {}", script.id(), script.revision.message),
            Direction::Downgrade => info!("Reverting revision {}: {}", script.id(), script.revision.message),
        }

        for (i, op) in ops.iter().enumerate() {
            debug!(revision = %script.id(), step = i + 1, "{}", op.describe());
            self.backend
                .apply(op)
                .await
                .map_err(|source| MigrationError::StepExecution {
                    revision: script.id().clone(),
                    direction,
                    step: i + 1,
                    operation: op.describe(),
                    source,
                })?;
        }

        self.backend
            .write_version(marker, &step.marker_after)
            .await?;
        debug!("Version marker now {}", describe_marker(&step.marker_after));
        Ok(())
    }
}
