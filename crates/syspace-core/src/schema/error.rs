use thiserror::Error;

/// Structural errors raised when a schema change does not fit the current schema.
///
/// These mirror the errors PostgreSQL itself reports for the same DDL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table \"{0}\" already exists")]
    DuplicateTable(String),

    #[error("table \"{0}\" does not exist")]
    UnknownTable(String),

    #[error("column \"{column}\" of table \"{table}\" already exists")]
    DuplicateColumn { table: String, column: String },

    #[error("column \"{column}\" of table \"{table}\" does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("index \"{0}\" already exists")]
    DuplicateIndex(String),

    #[error("index \"{0}\" does not exist")]
    UnknownIndex(String),

    #[error("constraint \"{name}\" for table \"{table}\" already exists")]
    DuplicateConstraint { table: String, name: String },

    #[error("constraint \"{name}\" of table \"{table}\" does not exist")]
    UnknownConstraint { table: String, name: String },

    #[error("foreign key \"{name}\" references {columns} column(s) but {ref_columns} referenced column(s)")]
    ForeignKeyArity {
        name: String,
        columns: usize,
        ref_columns: usize,
    },

    #[error("cannot drop table \"{table}\": constraint \"{constraint}\" on table \"{by}\" depends on it")]
    TableReferenced {
        table: String,
        by: String,
        constraint: String,
    },

    #[error("cannot drop column \"{column}\" of table \"{table}\": constraint \"{constraint}\" on table \"{by}\" depends on it")]
    ColumnReferenced {
        table: String,
        column: String,
        by: String,
        constraint: String,
    },

    #[error("type \"{0}\" already exists")]
    DuplicateEnum(String),

    #[error("type \"{0}\" does not exist")]
    UnknownEnum(String),

    #[error("cannot drop type \"{name}\": column \"{column}\" of table \"{table}\" depends on it")]
    EnumInUse {
        name: String,
        table: String,
        column: String,
    },
}
