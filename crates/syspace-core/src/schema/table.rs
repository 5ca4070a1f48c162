use serde::{Deserialize, Serialize};

use super::column::{quote_ident, ColumnDef};

/// Definition of a table as the schema sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,

    /// Columns in declaration order.
    pub columns: Vec<ColumnDef>,

    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,

    /// Foreign key constraints.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,

    /// Unique constraints.
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraintDef>,
}

impl TableDef {
    /// Create a table with no columns.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary key columns, in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Find a foreign key or unique constraint by name.
    pub fn has_constraint(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.name == name)
            || self.unique_constraints.iter().any(|uc| uc.name == name)
    }

    /// Generate the CREATE TABLE statement.
    pub fn to_create_table_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.to_sql_column()))
            .collect();

        let pk = self.primary_key_columns();
        if !pk.is_empty() {
            lines.push(format!("    PRIMARY KEY ({})", join_idents(&pk)));
        }

        for uc in &self.unique_constraints {
            lines.push(format!("    {}", uc.to_constraint_sql()));
        }

        for fk in &self.foreign_keys {
            lines.push(format!("    {}", fk.to_constraint_sql()));
        }

        format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(&self.name),
            lines.join(",\n")
        )
    }
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name (schema-wide).
    pub name: String,

    /// Indexed columns. An entry may carry an operator class,
    /// e.g. `"profile_vector vector_cosine_ops"`.
    pub columns: Vec<String>,

    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,

    /// Access method (`btree` when unset), e.g. `hnsw`.
    #[serde(default)]
    pub method: Option<String>,
}

impl IndexDef {
    /// Column names referenced by this index, without operator classes.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.split_whitespace().next())
    }

    /// Generate the CREATE INDEX statement for `table`.
    pub fn to_create_index_sql(&self, table: &str) -> String {
        let unique = if self.unique { "UNIQUE " } else { "" };
        let method = self
            .method
            .as_ref()
            .map(|m| format!(" USING {}", m))
            .unwrap_or_default();

        format!(
            "CREATE {}INDEX {} ON {}{} ({})",
            unique,
            quote_ident(&self.name),
            quote_ident(table),
            method,
            self.columns.join(", ")
        )
    }
}

/// Foreign key constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Constraint name.
    pub name: String,

    /// Referencing columns on the owning table.
    pub columns: Vec<String>,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns.
    pub ref_columns: Vec<String>,

    /// ON DELETE action, e.g. `CASCADE` or `SET NULL`.
    #[serde(default)]
    pub on_delete: Option<String>,
}

impl ForeignKeyDef {
    /// Generate the constraint clause.
    pub fn to_constraint_sql(&self) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&self.name),
            join_idents(&self.columns),
            quote_ident(&self.ref_table),
            join_idents(&self.ref_columns)
        );
        if let Some(ref action) = self.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action));
        }
        sql
    }
}

/// Unique constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraintDef {
    /// Constraint name.
    pub name: String,

    /// Constrained columns.
    pub columns: Vec<String>,
}

impl UniqueConstraintDef {
    /// Generate the constraint clause.
    pub fn to_constraint_sql(&self) -> String {
        format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_ident(&self.name),
            join_idents(&self.columns)
        )
    }
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDef {
    /// Type name in SQL.
    pub name: String,

    /// Allowed labels in order.
    pub values: Vec<String>,
}

impl EnumDef {
    /// Generate the CREATE TYPE statement.
    pub fn to_create_type_sql(&self) -> String {
        let labels: Vec<String> = self
            .values
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect();
        format!(
            "CREATE TYPE {} AS ENUM ({})",
            quote_ident(&self.name),
            labels.join(", ")
        )
    }
}

/// Join identifiers with `, `, quoting where needed.
pub fn join_idents<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}
