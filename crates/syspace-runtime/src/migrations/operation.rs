//! Typed schema-change operations.
//!
//! Every migration step is one of these variants. Backends interpret them
//! uniformly: Postgres renders them to DDL, the in-memory backend applies them
//! to a [`Catalog`].

use serde::{Deserialize, Serialize};
use syspace_core::schema::{
    quote_ident, Catalog, ColumnDef, EnumDef, ForeignKeyDef, IndexDef, SchemaError,
    SqlType, TableDef, UniqueConstraintDef,
};

use super::sql::split_statements;

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        #[serde(default)]
        foreign_keys: Vec<ForeignKeySpec>,
        #[serde(default)]
        unique_constraints: Vec<UniqueSpec>,
    },
    DropTable {
        table: String,
    },
    RenameTable {
        table: String,
        new_name: String,
    },
    AddColumn {
        table: String,
        column: ColumnDef,
    },
    DropColumn {
        table: String,
        column: String,
    },
    AlterColumn {
        table: String,
        column: String,
        #[serde(default)]
        nullable: Option<bool>,
        #[serde(default, rename = "type")]
        sql_type: Option<SqlType>,
        /// Cast expression for a type change, e.g. `status::text`.
        #[serde(default)]
        using: Option<String>,
        #[serde(default)]
        new_name: Option<String>,
    },
    CreateIndex {
        table: String,
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
        #[serde(default)]
        method: Option<String>,
    },
    DropIndex {
        name: String,
    },
    AddForeignKey {
        table: String,
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        #[serde(default)]
        on_delete: Option<String>,
    },
    AddUniqueConstraint {
        table: String,
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
    },
    DropConstraint {
        table: String,
        name: String,
    },
    CreateEnum {
        name: String,
        values: Vec<String>,
    },
    DropEnum {
        name: String,
    },
    /// Raw SQL. Runs on real databases only; structural checks skip it.
    Execute {
        sql: String,
    },
}

/// Foreign key as written in a script; the name defaults to `<table>_<cols>_fkey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
}

impl ForeignKeySpec {
    pub fn resolve(&self, table: &str) -> ForeignKeyDef {
        ForeignKeyDef {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_{}_fkey", table, self.columns.join("_"))),
            columns: self.columns.clone(),
            ref_table: self.ref_table.clone(),
            ref_columns: self.ref_columns.clone(),
            on_delete: self.on_delete.clone(),
        }
    }
}

/// Unique constraint as written in a script; the name defaults to `<table>_<cols>_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

impl UniqueSpec {
    pub fn resolve(&self, table: &str) -> UniqueConstraintDef {
        UniqueConstraintDef {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("{}_{}_key", table, self.columns.join("_"))),
            columns: self.columns.clone(),
        }
    }
}

impl Operation {
    pub fn create_table(table: &str, columns: Vec<ColumnDef>) -> Self {
        Operation::CreateTable {
            table: table.to_string(),
            columns,
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    pub fn drop_table(table: &str) -> Self {
        Operation::DropTable {
            table: table.to_string(),
        }
    }

    pub fn add_column(table: &str, column: ColumnDef) -> Self {
        Operation::AddColumn {
            table: table.to_string(),
            column,
        }
    }

    pub fn drop_column(table: &str, column: &str) -> Self {
        Operation::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    /// Single-column foreign key to `ref_table.id`, named by convention.
    pub fn add_foreign_key(table: &str, column: &str, ref_table: &str) -> Self {
        Operation::AddForeignKey {
            table: table.to_string(),
            name: None,
            columns: vec![column.to_string()],
            ref_table: ref_table.to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: None,
        }
    }

    pub fn drop_constraint(table: &str, name: &str) -> Self {
        Operation::DropConstraint {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    /// Snake-case name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateTable { .. } => "create_table",
            Operation::DropTable { .. } => "drop_table",
            Operation::RenameTable { .. } => "rename_table",
            Operation::AddColumn { .. } => "add_column",
            Operation::DropColumn { .. } => "drop_column",
            Operation::AlterColumn { .. } => "alter_column",
            Operation::CreateIndex { .. } => "create_index",
            Operation::DropIndex { .. } => "drop_index",
            Operation::AddForeignKey { .. } => "add_foreign_key",
            Operation::AddUniqueConstraint { .. } => "add_unique_constraint",
            Operation::DropConstraint { .. } => "drop_constraint",
            Operation::CreateEnum { .. } => "create_enum",
            Operation::DropEnum { .. } => "drop_enum",
            Operation::Execute { .. } => "execute",
        }
    }

    /// Short description used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateTable { table, .. }
            | Operation::DropTable { table }
            | Operation::AddForeignKey { table, .. }
            | Operation::AddUniqueConstraint { table, .. } => {
                format!("{} {}", self.kind(), table)
            }
            Operation::RenameTable { table, new_name } => {
                format!("{} {} -> {}", self.kind(), table, new_name)
            }
            Operation::AddColumn { table, column } => {
                format!("{} {}.{}", self.kind(), table, column.name)
            }
            Operation::DropColumn { table, column } | Operation::AlterColumn { table, column, .. } => {
                format!("{} {}.{}", self.kind(), table, column)
            }
            Operation::CreateIndex { table, .. } => match self.index_def() {
                Some(index) => format!("{} {} on {}", self.kind(), index.name, table),
                None => self.kind().to_string(),
            },
            Operation::DropIndex { name }
            | Operation::CreateEnum { name, .. }
            | Operation::DropEnum { name } => format!("{} {}", self.kind(), name),
            Operation::DropConstraint { table, name } => {
                format!("{} {} on {}", self.kind(), name, table)
            }
            Operation::Execute { sql } => {
                let first = sql.trim().lines().next().unwrap_or_default();
                format!("{} {}", self.kind(), truncate(first, 48))
            }
        }
    }

    fn foreign_key_def(&self) -> Option<ForeignKeyDef> {
        match self {
            Operation::AddForeignKey {
                table,
                name,
                columns,
                ref_table,
                ref_columns,
                on_delete,
            } => Some(
                ForeignKeySpec {
                    name: name.clone(),
                    columns: columns.clone(),
                    ref_table: ref_table.clone(),
                    ref_columns: ref_columns.clone(),
                    on_delete: on_delete.clone(),
                }
                .resolve(table),
            ),
            _ => None,
        }
    }

    fn unique_def(&self) -> Option<UniqueConstraintDef> {
        match self {
            Operation::AddUniqueConstraint {
                table,
                name,
                columns,
            } => Some(
                UniqueSpec {
                    name: name.clone(),
                    columns: columns.clone(),
                }
                .resolve(table),
            ),
            _ => None,
        }
    }

    fn index_def(&self) -> Option<IndexDef> {
        match self {
            Operation::CreateIndex {
                table,
                name,
                columns,
                unique,
                method,
            } => {
                let name = name.clone().unwrap_or_else(|| {
                    let cols: Vec<&str> = columns
                        .iter()
                        .filter_map(|c| c.split_whitespace().next())
                        .collect();
                    format!("ix_{}_{}", table, cols.join("_"))
                });
                Some(IndexDef {
                    name,
                    columns: columns.clone(),
                    unique: *unique,
                    method: method.clone(),
                })
            }
            _ => None,
        }
    }

    fn table_def(&self) -> Option<TableDef> {
        match self {
            Operation::CreateTable {
                table,
                columns,
                foreign_keys,
                unique_constraints,
            } => Some(TableDef {
                name: table.clone(),
                columns: columns.clone(),
                indexes: Vec::new(),
                foreign_keys: foreign_keys.iter().map(|fk| fk.resolve(table)).collect(),
                unique_constraints: unique_constraints
                    .iter()
                    .map(|uc| uc.resolve(table))
                    .collect(),
            }),
            _ => None,
        }
    }

    /// Render the PostgreSQL statements for this operation.
    pub fn to_sql(&self) -> Vec<String> {
        match self {
            Operation::CreateTable { .. } => self
                .table_def()
                .map(|t| vec![t.to_create_table_sql()])
                .unwrap_or_default(),
            Operation::DropTable { table } => vec![format!("DROP TABLE {}", quote_ident(table))],
            Operation::RenameTable { table, new_name } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(table),
                quote_ident(new_name)
            )],
            Operation::AddColumn { table, column } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column.to_sql_column()
            )],
            Operation::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(column)
            )],
            Operation::AlterColumn {
                table,
                column,
                nullable,
                sql_type,
                using,
                new_name,
            } => {
                let prefix = format!(
                    "ALTER TABLE {} ALTER COLUMN {}",
                    quote_ident(table),
                    quote_ident(column)
                );
                let mut statements = Vec::new();
                if let Some(ty) = sql_type {
                    let mut stmt = format!("{} TYPE {}", prefix, ty.to_sql());
                    if let Some(expr) = using {
                        stmt.push_str(&format!(" USING {}", expr));
                    }
                    statements.push(stmt);
                }
                match nullable {
                    Some(true) => statements.push(format!("{} DROP NOT NULL", prefix)),
                    Some(false) => statements.push(format!("{} SET NOT NULL", prefix)),
                    None => {}
                }
                if let Some(new_name) = new_name {
                    statements.push(format!(
                        "ALTER TABLE {} RENAME COLUMN {} TO {}",
                        quote_ident(table),
                        quote_ident(column),
                        quote_ident(new_name)
                    ));
                }
                statements
            }
            Operation::CreateIndex { table, .. } => self
                .index_def()
                .map(|i| vec![i.to_create_index_sql(table)])
                .unwrap_or_default(),
            Operation::DropIndex { name } => vec![format!("DROP INDEX {}", quote_ident(name))],
            Operation::AddForeignKey { table, .. } => self
                .foreign_key_def()
                .map(|fk| {
                    vec![format!(
                        "ALTER TABLE {} ADD {}",
                        quote_ident(table),
                        fk.to_constraint_sql()
                    )]
                })
                .unwrap_or_default(),
            Operation::AddUniqueConstraint { table, .. } => self
                .unique_def()
                .map(|uc| {
                    vec![format!(
                        "ALTER TABLE {} ADD {}",
                        quote_ident(table),
                        uc.to_constraint_sql()
                    )]
                })
                .unwrap_or_default(),
            Operation::DropConstraint { table, name } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                quote_ident(table),
                quote_ident(name)
            )],
            Operation::CreateEnum { name, values } => vec![EnumDef {
                name: name.clone(),
                values: values.clone(),
            }
            .to_create_type_sql()],
            Operation::DropEnum { name } => vec![format!("DROP TYPE {}", quote_ident(name))],
            Operation::Execute { sql } => split_statements(sql),
        }
    }

    /// Apply the structural effect of this operation to a catalog.
    pub fn apply_to(&self, catalog: &mut Catalog) -> Result<(), SchemaError> {
        match self {
            Operation::CreateTable { .. } => match self.table_def() {
                Some(table) => catalog.create_table(table),
                None => Ok(()),
            },
            Operation::DropTable { table } => catalog.drop_table(table),
            Operation::RenameTable { table, new_name } => catalog.rename_table(table, new_name),
            Operation::AddColumn { table, column } => catalog.add_column(table, column.clone()),
            Operation::DropColumn { table, column } => catalog.drop_column(table, column),
            Operation::AlterColumn {
                table,
                column,
                nullable,
                sql_type,
                new_name,
                ..
            } => catalog.alter_column(
                table,
                column,
                *nullable,
                sql_type.clone(),
                new_name.as_deref(),
            ),
            Operation::CreateIndex { table, .. } => match self.index_def() {
                Some(index) => catalog.create_index(table, index),
                None => Ok(()),
            },
            Operation::DropIndex { name } => catalog.drop_index(name),
            Operation::AddForeignKey { table, .. } => match self.foreign_key_def() {
                Some(fk) => catalog.add_foreign_key(table, fk),
                None => Ok(()),
            },
            Operation::AddUniqueConstraint { table, .. } => match self.unique_def() {
                Some(uc) => catalog.add_unique_constraint(table, uc),
                None => Ok(()),
            },
            Operation::DropConstraint { table, name } => catalog.drop_constraint(table, name),
            Operation::CreateEnum { name, values } => catalog.create_enum(EnumDef {
                name: name.clone(),
                values: values.clone(),
            }),
            Operation::DropEnum { name } => catalog.drop_enum(name),
            Operation::Execute { .. } => Ok(()),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_and_catalog() {
        let op = Operation::create_table(
            "companies",
            vec![
                ColumnDef::new("id", SqlType::Serial).primary_key(),
                ColumnDef::new("name", SqlType::Varchar(None)).not_null(),
            ],
        );

        let sql = op.to_sql();
        assert_eq!(sql.len(), 1);
        assert!(sql[0].starts_with("CREATE TABLE companies"));

        let mut catalog = Catalog::new();
        op.apply_to(&mut catalog).unwrap();
        assert!(catalog.table("companies").is_some());
    }

    #[test]
    fn test_foreign_key_default_name() {
        let op = Operation::add_foreign_key("users", "company_id", "companies");
        assert_eq!(
            op.to_sql(),
            vec![
                "ALTER TABLE users ADD CONSTRAINT users_company_id_fkey FOREIGN KEY (company_id) REFERENCES companies (id)"
                    .to_string()
            ]
        );
        assert_eq!(op.describe(), "add_foreign_key users");
    }

    #[test]
    fn test_alter_column_renders_each_change() {
        let op = Operation::AlterColumn {
            table: "connections".into(),
            column: "status_new".into(),
            nullable: Some(false),
            sql_type: None,
            using: None,
            new_name: Some("status".into()),
        };
        assert_eq!(
            op.to_sql(),
            vec![
                "ALTER TABLE connections ALTER COLUMN status_new SET NOT NULL".to_string(),
                "ALTER TABLE connections RENAME COLUMN status_new TO status".to_string(),
            ]
        );
    }

    #[test]
    fn test_alter_column_type_with_using() {
        let op = Operation::AlterColumn {
            table: "invitations".into(),
            column: "status".into(),
            nullable: None,
            sql_type: Some(SqlType::Text),
            using: Some("status::text".into()),
            new_name: None,
        };
        assert_eq!(
            op.to_sql(),
            vec!["ALTER TABLE invitations ALTER COLUMN status TYPE TEXT USING status::text".to_string()]
        );
    }

    #[test]
    fn test_index_default_name_ignores_opclass() {
        let op = Operation::CreateIndex {
            table: "user_profiles".into(),
            name: None,
            columns: vec!["profile_vector vector_cosine_ops".into()],
            unique: false,
            method: Some("hnsw".into()),
        };
        assert_eq!(op.describe(), "create_index ix_user_profiles_profile_vector on user_profiles");
    }

    #[test]
    fn test_execute_is_structurally_opaque() {
        let op = Operation::Execute {
            sql: "UPDATE connections SET status = 'PENDING';\n".into(),
        };
        assert_eq!(
            op.to_sql(),
            vec!["UPDATE connections SET status = 'PENDING'".to_string()]
        );

        let mut catalog = Catalog::new();
        op.apply_to(&mut catalog).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_apply_reports_structural_error() {
        let mut catalog = Catalog::new();
        let err = Operation::add_column("users", ColumnDef::new("company_id", SqlType::Integer))
            .apply_to(&mut catalog)
            .unwrap_err();
        assert_eq!(err, SchemaError::UnknownTable("users".into()));
    }

    #[test]
    fn test_deserialize_tagged_operations() {
        #[derive(Deserialize)]
        struct Steps {
            steps: Vec<Operation>,
        }

        let steps: Steps = toml::from_str(
            r#"
            [[steps]]
            op = "create_table"
            table = "startups"
            columns = [
                { name = "id", type = "SERIAL", primary_key = true },
                { name = "name", type = "VARCHAR", nullable = false },
            ]

            [[steps]]
            op = "add_foreign_key"
            table = "users"
            columns = ["startup_id"]
            ref_table = "startups"
            ref_columns = ["id"]
            on_delete = "SET NULL"

            [[steps]]
            op = "alter_column"
            table = "users"
            column = "role"
            type = "VARCHAR(32)"
            "#,
        )
        .unwrap();

        assert_eq!(steps.steps.len(), 3);
        assert_eq!(steps.steps[0].kind(), "create_table");
        assert!(steps.steps[1].to_sql()[0].contains("CONSTRAINT users_startup_id_fkey"));
        match &steps.steps[1] {
            Operation::AddForeignKey { on_delete, .. } => {
                assert_eq!(on_delete.as_deref(), Some("SET NULL"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &steps.steps[2] {
            Operation::AlterColumn { sql_type, .. } => {
                assert_eq!(sql_type, &Some(SqlType::Varchar(Some(32))));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
