mod catalog;
mod column;
mod error;
mod table;
mod types;

pub use catalog::Catalog;
pub use column::{quote_ident, ColumnDef};
pub use error::SchemaError;
pub use table::{join_idents, EnumDef, ForeignKeyDef, IndexDef, TableDef, UniqueConstraintDef};
pub use types::SqlType;
