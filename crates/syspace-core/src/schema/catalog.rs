//! In-memory structural description of a database schema.
//!
//! The catalog applies schema changes with the same structural rules the
//! database enforces, which lets migrations be checked without a server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::column::ColumnDef;
use super::error::SchemaError;
use super::table::{EnumDef, ForeignKeyDef, IndexDef, TableDef, UniqueConstraintDef};
use super::types::SqlType;

/// Tables and enum types making up a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Tables by name.
    pub tables: BTreeMap<String, TableDef>,

    /// Enum types by name.
    pub enums: BTreeMap<String, EnumDef>,
}

type SchemaResult<T> = std::result::Result<T, SchemaError>;

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the catalog holds nothing.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.enums.is_empty()
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    fn table_mut(&mut self, name: &str) -> SchemaResult<&mut TableDef> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    fn index_name_taken(&self, name: &str) -> bool {
        self.tables.values().any(|t| {
            t.indexes.iter().any(|i| i.name == name)
                || t.unique_constraints.iter().any(|u| u.name == name)
        })
    }

    /// Foreign keys on tables other than `table` whose target is `table`.
    fn inbound_foreign_keys<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ForeignKeyDef)> + 'a {
        self.tables
            .values()
            .filter(move |t| t.name != table)
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t.name.as_str(), fk)))
            .filter(move |(_, fk)| fk.ref_table == table)
    }

    /// Create a table, validating its columns and constraints.
    pub fn create_table(&mut self, table: TableDef) -> SchemaResult<()> {
        if self.tables.contains_key(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name));
        }

        let mut staged = TableDef::new(&table.name);
        for column in &table.columns {
            if staged.column(&column.name).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                });
            }
            self.check_type_exists(&column.sql_type)?;
            staged.columns.push(column.clone());
        }

        // Constraints are checked against the staged table so self-references resolve.
        self.tables.insert(table.name.clone(), staged);

        let result = self.attach_constraints(&table);
        if result.is_err() {
            self.tables.remove(&table.name);
        }
        result
    }

    fn attach_constraints(&mut self, table: &TableDef) -> SchemaResult<()> {
        for uc in &table.unique_constraints {
            self.add_unique_constraint(&table.name, uc.clone())?;
        }
        for fk in &table.foreign_keys {
            self.add_foreign_key(&table.name, fk.clone())?;
        }
        for index in &table.indexes {
            self.create_index(&table.name, index.clone())?;
        }
        Ok(())
    }

    /// Drop a table. Fails while another table's foreign key references it.
    pub fn drop_table(&mut self, name: &str) -> SchemaResult<()> {
        if !self.tables.contains_key(name) {
            return Err(SchemaError::UnknownTable(name.to_string()));
        }

        if let Some((by, fk)) = self.inbound_foreign_keys(name).next() {
            return Err(SchemaError::TableReferenced {
                table: name.to_string(),
                by: by.to_string(),
                constraint: fk.name.clone(),
            });
        }

        self.tables.remove(name);
        Ok(())
    }

    /// Rename a table, following references from other tables.
    pub fn rename_table(&mut self, from: &str, to: &str) -> SchemaResult<()> {
        if self.tables.contains_key(to) {
            return Err(SchemaError::DuplicateTable(to.to_string()));
        }
        let mut table = self
            .tables
            .remove(from)
            .ok_or_else(|| SchemaError::UnknownTable(from.to_string()))?;
        table.name = to.to_string();

        for fk in &mut table.foreign_keys {
            if fk.ref_table == from {
                fk.ref_table = to.to_string();
            }
        }
        for other in self.tables.values_mut() {
            for fk in &mut other.foreign_keys {
                if fk.ref_table == from {
                    fk.ref_table = to.to_string();
                }
            }
        }

        self.tables.insert(to.to_string(), table);
        Ok(())
    }

    /// Add a column to an existing table.
    pub fn add_column(&mut self, table: &str, column: ColumnDef) -> SchemaResult<()> {
        self.check_type_exists(&column.sql_type)?;
        let t = self.table_mut(table)?;
        if t.column(&column.name).is_some() {
            return Err(SchemaError::DuplicateColumn {
                table: table.to_string(),
                column: column.name,
            });
        }
        t.columns.push(column);
        Ok(())
    }

    /// Drop a column together with the indexes and constraints of its own
    /// table that include it. Fails while another table references it.
    pub fn drop_column(&mut self, table: &str, column: &str) -> SchemaResult<()> {
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        if t.column(column).is_none() {
            return Err(SchemaError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let referencing = self
            .tables
            .values()
            .flat_map(|other| other.foreign_keys.iter().map(move |fk| (other, fk)))
            .find(|(other, fk)| {
                fk.ref_table == table
                    && fk.ref_columns.iter().any(|c| c == column)
                    && !(other.name == table && fk.columns.iter().any(|c| c == column))
            });
        if let Some((other, fk)) = referencing {
            return Err(SchemaError::ColumnReferenced {
                table: table.to_string(),
                column: column.to_string(),
                by: other.name.clone(),
                constraint: fk.name.clone(),
            });
        }

        let t = self.table_mut(table)?;
        t.columns.retain(|c| c.name != column);
        t.indexes.retain(|i| !i.column_names().any(|c| c == column));
        t.foreign_keys.retain(|fk| !fk.columns.iter().any(|c| c == column));
        t.unique_constraints
            .retain(|uc| !uc.columns.iter().any(|c| c == column));
        Ok(())
    }

    /// Alter nullability, type, or name of a column.
    pub fn alter_column(
        &mut self,
        table: &str,
        column: &str,
        nullable: Option<bool>,
        sql_type: Option<SqlType>,
        new_name: Option<&str>,
    ) -> SchemaResult<()> {
        if let Some(ty) = &sql_type {
            self.check_type_exists(ty)?;
        }

        let t = self.table_mut(table)?;
        if let Some(new_name) = new_name {
            if new_name != column && t.column(new_name).is_some() {
                return Err(SchemaError::DuplicateColumn {
                    table: table.to_string(),
                    column: new_name.to_string(),
                });
            }
        }

        let col = t
            .columns
            .iter_mut()
            .find(|c| c.name == column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })?;

        if let Some(nullable) = nullable {
            col.nullable = nullable;
        }
        if let Some(ty) = sql_type {
            col.sql_type = ty;
        }

        if let Some(new_name) = new_name {
            col.name = new_name.to_string();
            self.rename_column_references(table, column, new_name);
        }
        Ok(())
    }

    fn rename_column_references(&mut self, table: &str, from: &str, to: &str) {
        let rename = |cols: &mut Vec<String>| {
            for c in cols.iter_mut() {
                if c.as_str() == from {
                    *c = to.to_string();
                }
            }
        };

        for t in self.tables.values_mut() {
            let own = t.name == table;
            for fk in &mut t.foreign_keys {
                if own {
                    rename(&mut fk.columns);
                }
                if fk.ref_table == table {
                    rename(&mut fk.ref_columns);
                }
            }
            if own {
                for uc in &mut t.unique_constraints {
                    rename(&mut uc.columns);
                }
                for index in &mut t.indexes {
                    for entry in &mut index.columns {
                        if let Some(renamed) = rename_index_entry(entry, from, to) {
                            *entry = renamed;
                        }
                    }
                }
            }
        }
    }

    fn check_columns_exist<'a>(
        &self,
        table: &str,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> SchemaResult<()> {
        let t = self
            .tables
            .get(table)
            .ok_or_else(|| SchemaError::UnknownTable(table.to_string()))?;
        for column in columns {
            if t.column(column).is_none() {
                return Err(SchemaError::UnknownColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_type_exists(&self, ty: &SqlType) -> SchemaResult<()> {
        match ty.named_type() {
            // Named types that are not enums belong to extensions (e.g. pgvector).
            Some(name) if looks_like_enum(name) && !self.enums.contains_key(name) => {
                Err(SchemaError::UnknownEnum(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Create an index on a table.
    pub fn create_index(&mut self, table: &str, index: IndexDef) -> SchemaResult<()> {
        self.check_columns_exist(table, index.column_names())?;
        if self.index_name_taken(&index.name) {
            return Err(SchemaError::DuplicateIndex(index.name));
        }
        self.table_mut(table)?.indexes.push(index);
        Ok(())
    }

    /// Drop an index by its schema-wide name.
    pub fn drop_index(&mut self, name: &str) -> SchemaResult<()> {
        let owner = self
            .tables
            .values_mut()
            .find(|t| t.indexes.iter().any(|i| i.name == name))
            .ok_or_else(|| SchemaError::UnknownIndex(name.to_string()))?;
        owner.indexes.retain(|i| i.name != name);
        Ok(())
    }

    /// Add a foreign key constraint.
    pub fn add_foreign_key(&mut self, table: &str, fk: ForeignKeyDef) -> SchemaResult<()> {
        self.check_columns_exist(table, fk.columns.iter().map(String::as_str))?;
        if fk.columns.len() != fk.ref_columns.len() {
            return Err(SchemaError::ForeignKeyArity {
                name: fk.name,
                columns: fk.columns.len(),
                ref_columns: fk.ref_columns.len(),
            });
        }
        self.check_columns_exist(&fk.ref_table, fk.ref_columns.iter().map(String::as_str))?;

        let t = self.table_mut(table)?;
        if t.has_constraint(&fk.name) {
            return Err(SchemaError::DuplicateConstraint {
                table: table.to_string(),
                name: fk.name,
            });
        }
        t.foreign_keys.push(fk);
        Ok(())
    }

    /// Add a unique constraint.
    pub fn add_unique_constraint(
        &mut self,
        table: &str,
        uc: UniqueConstraintDef,
    ) -> SchemaResult<()> {
        self.check_columns_exist(table, uc.columns.iter().map(String::as_str))?;
        if self.index_name_taken(&uc.name) {
            return Err(SchemaError::DuplicateIndex(uc.name));
        }
        let t = self.table_mut(table)?;
        if t.has_constraint(&uc.name) {
            return Err(SchemaError::DuplicateConstraint {
                table: table.to_string(),
                name: uc.name,
            });
        }
        t.unique_constraints.push(uc);
        Ok(())
    }

    /// Drop a foreign key or unique constraint by name.
    pub fn drop_constraint(&mut self, table: &str, name: &str) -> SchemaResult<()> {
        let t = self.table_mut(table)?;
        if !t.has_constraint(name) {
            return Err(SchemaError::UnknownConstraint {
                table: table.to_string(),
                name: name.to_string(),
            });
        }
        t.foreign_keys.retain(|fk| fk.name != name);
        t.unique_constraints.retain(|uc| uc.name != name);
        Ok(())
    }

    /// Create an enum type.
    pub fn create_enum(&mut self, def: EnumDef) -> SchemaResult<()> {
        if self.enums.contains_key(&def.name) {
            return Err(SchemaError::DuplicateEnum(def.name));
        }
        self.enums.insert(def.name.clone(), def);
        Ok(())
    }

    /// Drop an enum type. Fails while a column still uses it.
    pub fn drop_enum(&mut self, name: &str) -> SchemaResult<()> {
        if !self.enums.contains_key(name) {
            return Err(SchemaError::UnknownEnum(name.to_string()));
        }
        for t in self.tables.values() {
            if let Some(c) = t.columns.iter().find(|c| c.sql_type.named_type() == Some(name)) {
                return Err(SchemaError::EnumInUse {
                    name: name.to_string(),
                    table: t.name.clone(),
                    column: c.name.clone(),
                });
            }
        }
        self.enums.remove(name);
        Ok(())
    }

    /// Check that a column type refers to a known enum.
    pub fn check_column_type(&self, column: &ColumnDef) -> SchemaResult<()> {
        self.check_type_exists(&column.sql_type)
    }
}

/// Rename the column part of an index entry such as `"col opclass"`.
fn rename_index_entry(entry: &str, from: &str, to: &str) -> Option<String> {
    let mut parts = entry.splitn(2, char::is_whitespace);
    if parts.next() != Some(from) {
        return None;
    }
    Some(match parts.next() {
        Some(rest) => format!("{} {}", to, rest),
        None => to.to_string(),
    })
}

/// Built-in types `SqlType` keeps by name rather than as a variant.
const BUILTIN_TYPES: &[&str] = &[
    "bit", "citext", "int4range", "int8range", "macaddr", "macaddr8", "money", "numrange",
    "oid", "point", "tsquery", "tsrange", "tstzrange", "tsvector", "varbit", "xml",
];

/// Extension types carry a modifier or a dot (`vector(768)`, `public.citext`);
/// other plain identifiers are treated as enum references.
fn looks_like_enum(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !BUILTIN_TYPES.contains(&name.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ColumnDef {
        ColumnDef::new("id", SqlType::Serial).primary_key()
    }

    fn table(name: &str, columns: Vec<ColumnDef>) -> TableDef {
        let mut t = TableDef::new(name);
        t.columns = columns;
        t
    }

    fn fk(name: &str, column: &str, ref_table: &str) -> ForeignKeyDef {
        ForeignKeyDef {
            name: name.into(),
            columns: vec![column.into()],
            ref_table: ref_table.into(),
            ref_columns: vec!["id".into()],
            on_delete: None,
        }
    }

    fn users_and_companies() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.create_table(table("companies", vec![id()])).unwrap();
        catalog
            .create_table(table(
                "users",
                vec![id(), ColumnDef::new("company_id", SqlType::Integer)],
            ))
            .unwrap();
        catalog
            .add_foreign_key("users", fk("users_company_id_fkey", "company_id", "companies"))
            .unwrap();
        catalog
    }

    #[test]
    fn test_duplicate_table() {
        let mut catalog = Catalog::new();
        catalog.create_table(table("users", vec![id()])).unwrap();
        let err = catalog.create_table(table("users", vec![id()])).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable("users".into()));
    }

    #[test]
    fn test_duplicate_column_in_create() {
        let mut catalog = Catalog::new();
        let err = catalog
            .create_table(table("users", vec![id(), id()]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_foreign_key_to_missing_table() {
        let mut catalog = Catalog::new();
        let mut users = table("users", vec![id(), ColumnDef::new("company_id", SqlType::Integer)]);
        users
            .foreign_keys
            .push(fk("users_company_id_fkey", "company_id", "companies"));

        let err = catalog.create_table(users).unwrap_err();
        assert_eq!(err, SchemaError::UnknownTable("companies".into()));
        assert!(catalog.table("users").is_none());
    }

    #[test]
    fn test_self_referencing_table() {
        let mut catalog = Catalog::new();
        let mut nodes = table("space_nodes", vec![id(), ColumnDef::new("parent_id", SqlType::Integer)]);
        nodes
            .foreign_keys
            .push(fk("space_nodes_parent_id_fkey", "parent_id", "space_nodes"));
        catalog.create_table(nodes).unwrap();
        catalog.drop_table("space_nodes").unwrap();
    }

    #[test]
    fn test_drop_referenced_table_fails() {
        let mut catalog = users_and_companies();
        let err = catalog.drop_table("companies").unwrap_err();
        assert!(matches!(err, SchemaError::TableReferenced { ref by, .. } if by == "users"));

        catalog
            .drop_constraint("users", "users_company_id_fkey")
            .unwrap();
        catalog.drop_table("companies").unwrap();
    }

    #[test]
    fn test_drop_column_removes_own_constraints() {
        let mut catalog = users_and_companies();
        catalog
            .create_index(
                "users",
                IndexDef {
                    name: "ix_users_company_id".into(),
                    columns: vec!["company_id".into()],
                    unique: false,
                    method: None,
                },
            )
            .unwrap();

        catalog.drop_column("users", "company_id").unwrap();
        let users = catalog.table("users").unwrap();
        assert!(users.indexes.is_empty());
        assert!(users.foreign_keys.is_empty());
    }

    #[test]
    fn test_drop_referenced_column_fails() {
        let mut catalog = users_and_companies();
        let err = catalog.drop_column("companies", "id").unwrap_err();
        assert!(matches!(err, SchemaError::ColumnReferenced { .. }));
    }

    #[test]
    fn test_rename_column_follows_references() {
        let mut catalog = users_and_companies();
        catalog
            .alter_column("companies", "id", None, None, Some("company_pk"))
            .unwrap();
        let users = catalog.table("users").unwrap();
        assert_eq!(users.foreign_keys[0].ref_columns, vec!["company_pk".to_string()]);
    }

    #[test]
    fn test_rename_table_follows_references() {
        let mut catalog = users_and_companies();
        catalog.rename_table("companies", "organizations").unwrap();
        let users = catalog.table("users").unwrap();
        assert_eq!(users.foreign_keys[0].ref_table, "organizations");
    }

    #[test]
    fn test_index_names_are_schema_wide() {
        let mut catalog = users_and_companies();
        let index = IndexDef {
            name: "ix_id".into(),
            columns: vec!["id".into()],
            unique: false,
            method: None,
        };
        catalog.create_index("users", index.clone()).unwrap();
        let err = catalog.create_index("companies", index).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateIndex("ix_id".into()));

        catalog.drop_index("ix_id").unwrap();
        assert_eq!(
            catalog.drop_index("ix_id").unwrap_err(),
            SchemaError::UnknownIndex("ix_id".into())
        );
    }

    #[test]
    fn test_enum_lifecycle() {
        let mut catalog = users_and_companies();
        catalog
            .create_enum(EnumDef {
                name: "connectionstatus".into(),
                values: vec!["PENDING".into(), "ACCEPTED".into()],
            })
            .unwrap();
        catalog
            .add_column(
                "users",
                ColumnDef::new("status", SqlType::Named("connectionstatus".into())),
            )
            .unwrap();

        assert!(matches!(
            catalog.drop_enum("connectionstatus"),
            Err(SchemaError::EnumInUse { .. })
        ));
        catalog.drop_column("users", "status").unwrap();
        catalog.drop_enum("connectionstatus").unwrap();
    }

    #[test]
    fn test_unknown_enum_type_rejected() {
        let catalog = Catalog::new();
        let column = ColumnDef::new("status", SqlType::Named("nosuchtype".into()));
        assert_eq!(
            catalog.check_column_type(&column).unwrap_err(),
            SchemaError::UnknownEnum("nosuchtype".into())
        );

        let vector = ColumnDef::new("profile_vector", SqlType::Named("vector(768)".into()));
        assert!(catalog.check_column_type(&vector).is_ok());
    }

    #[test]
    fn test_builtin_column_types_need_no_enum() {
        let types = [
            "smallint", "json", "float", "float(8)", "time", "timetz", "numeric",
            "numeric(6)", "inet", "cidr", "interval", "char(2)", "money", "tsvector",
            "json[]",
        ];
        let columns: Vec<ColumnDef> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| ColumnDef::new(&format!("c{}", i), ty.parse::<SqlType>().unwrap()))
            .collect();
        for column in &columns {
            assert!(
                Catalog::new().check_column_type(column).is_ok(),
                "{} rejected",
                column.sql_type
            );
        }

        let mut catalog = Catalog::new();
        let mut columns = columns;
        columns.insert(0, id());
        catalog.create_table(table("measurements", columns)).unwrap();
        assert_eq!(catalog.table("measurements").unwrap().columns.len(), types.len() + 1);
    }
}
