pub mod config;
pub mod error;
pub mod schema;

pub use config::SyspaceConfig;
pub use error::{Result, SyspaceError};
pub use schema::{Catalog, ColumnDef, SchemaError, SqlType, TableDef};
