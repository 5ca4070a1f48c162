pub mod backend;
mod diff;
mod engine;
mod error;
mod generator;
mod graph;
mod loader;
mod operation;
mod revision;
mod sql;
mod target;
mod verify;

pub use backend::{MemoryBackend, MemoryDatabase, MigrationBackend, OfflineBackend, PgBackend};
pub use diff::{DiffAction, DiffEntry, SchemaDiff};
pub use engine::{MigrationEngine, MigrationReport, VersionMarker};
pub use error::{Direction, MigrationError, Result};
pub use generator::{GeneratedScript, GeneratorError, NewRevision, ScriptGenerator};
pub use graph::{describe_marker, History, MigrationPlan, PlanStep, RevisionGraph};
pub use loader::{load_scripts_from_dir, parse_script};
pub use operation::{ForeignKeySpec, Operation, UniqueSpec};
pub use revision::{MigrationScript, Revision, RevisionId};
pub use sql::split_statements;
pub use target::Target;
pub use verify::{verify_graph, VerifyIssue, VerifyReport};
