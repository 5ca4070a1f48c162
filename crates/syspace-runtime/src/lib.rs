pub mod db;
pub mod migrations;

pub use db::Database;
pub use migrations::{
    MigrationEngine, MigrationError, MigrationScript, Operation, Revision, RevisionGraph,
    RevisionId, VersionMarker,
};
