use thiserror::Error;

use crate::schema::SchemaError;

/// Core error type for syspace operations.
#[derive(Error, Debug)]
pub enum SyspaceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using SyspaceError.
pub type Result<T> = std::result::Result<T, SyspaceError>;
