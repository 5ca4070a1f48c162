use std::fmt;

use syspace_core::schema::{Catalog, TableDef};

/// Structural difference between two catalogs.
///
/// Columns are compared by name, so reordering alone is not a difference.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    /// Changes that turn the first catalog into the second.
    pub entries: Vec<DiffEntry>,
}

impl SchemaDiff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `before` to `after`.
    pub fn between(before: &Catalog, after: &Catalog) -> Self {
        let mut entries = Vec::new();

        for (name, def) in &after.enums {
            match before.enums.get(name) {
                None => entries.push(DiffEntry::new(DiffAction::CreateEnum, name, "create enum")),
                Some(old) if old.values != def.values => entries.push(DiffEntry::new(
                    DiffAction::AlterEnum,
                    name,
                    format!("values {:?} -> {:?}", old.values, def.values),
                )),
                Some(_) => {}
            }
        }
        for name in before.enums.keys() {
            if !after.enums.contains_key(name) {
                entries.push(DiffEntry::new(DiffAction::DropEnum, name, "drop enum"));
            }
        }

        for (name, table) in &after.tables {
            match before.tables.get(name) {
                None => entries.push(DiffEntry::new(DiffAction::CreateTable, name, "create table")),
                Some(old) => Self::compare_tables(old, table, &mut entries),
            }
        }
        for name in before.tables.keys() {
            if !after.tables.contains_key(name) {
                entries.push(DiffEntry::new(DiffAction::DropTable, name, "drop table"));
            }
        }

        Self { entries }
    }

    fn compare_tables(before: &TableDef, after: &TableDef, entries: &mut Vec<DiffEntry>) {
        let table = &after.name;

        for col in &after.columns {
            match before.column(&col.name) {
                None => entries.push(DiffEntry::new(
                    DiffAction::AddColumn,
                    format!("{}.{}", table, col.name),
                    col.to_sql_column(),
                )),
                Some(old) if old != col => entries.push(DiffEntry::new(
                    DiffAction::AlterColumn,
                    format!("{}.{}", table, col.name),
                    format!("{} -> {}", describe_column(old), describe_column(col)),
                )),
                Some(_) => {}
            }
        }
        for col in &before.columns {
            if after.column(&col.name).is_none() {
                entries.push(DiffEntry::new(
                    DiffAction::DropColumn,
                    format!("{}.{}", table, col.name),
                    "drop column",
                ));
            }
        }

        for index in &after.indexes {
            match before.indexes.iter().find(|i| i.name == index.name) {
                Some(old) if old == index => {}
                Some(_) => entries.push(DiffEntry::new(
                    DiffAction::AlterIndex,
                    &index.name,
                    index.to_create_index_sql(table),
                )),
                None => entries.push(DiffEntry::new(
                    DiffAction::AddIndex,
                    &index.name,
                    index.to_create_index_sql(table),
                )),
            }
        }
        for index in &before.indexes {
            if !after.indexes.iter().any(|i| i.name == index.name) {
                entries.push(DiffEntry::new(DiffAction::DropIndex, &index.name, "drop index"));
            }
        }

        let constraints = |t: &TableDef| -> Vec<(String, String)> {
            t.foreign_keys
                .iter()
                .map(|fk| (fk.name.clone(), fk.to_constraint_sql()))
                .chain(
                    t.unique_constraints
                        .iter()
                        .map(|uc| (uc.name.clone(), uc.to_constraint_sql())),
                )
                .collect()
        };
        let old_constraints = constraints(before);
        let new_constraints = constraints(after);

        for (name, sql) in &new_constraints {
            match old_constraints.iter().find(|(n, _)| n == name) {
                Some((_, old_sql)) if old_sql == sql => {}
                Some(_) => entries.push(DiffEntry::new(
                    DiffAction::AlterConstraint,
                    format!("{}.{}", table, name),
                    sql.as_str(),
                )),
                None => entries.push(DiffEntry::new(
                    DiffAction::AddConstraint,
                    format!("{}.{}", table, name),
                    sql.as_str(),
                )),
            }
        }
        for (name, _) in &old_constraints {
            if !new_constraints.iter().any(|(n, _)| n == name) {
                entries.push(DiffEntry::new(
                    DiffAction::DropConstraint,
                    format!("{}.{}", table, name),
                    "drop constraint",
                ));
            }
        }
    }

    /// Check if there are any changes.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

fn describe_column(col: &syspace_core::ColumnDef) -> String {
    let mut s = col.sql_type.to_sql();
    if col.primary_key {
        s.push_str(" PRIMARY KEY");
    } else if !col.nullable {
        s.push_str(" NOT NULL");
    }
    if let Some(default) = &col.default {
        s.push_str(&format!(" DEFAULT {}", default));
    }
    s
}

/// A single diff entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    /// Type of action.
    pub action: DiffAction,
    /// Affected object, e.g. `users` or `users.company_id`.
    pub object: String,
    /// Human-readable description.
    pub details: String,
}

impl DiffEntry {
    fn new(action: DiffAction, object: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            action,
            object: object.into(),
            details: details.into(),
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.action, self.object, self.details)
    }
}

/// Type of schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAction {
    CreateTable,
    DropTable,
    AddColumn,
    DropColumn,
    AlterColumn,
    AddIndex,
    AlterIndex,
    DropIndex,
    AddConstraint,
    AlterConstraint,
    DropConstraint,
    CreateEnum,
    AlterEnum,
    DropEnum,
}

#[cfg(test)]
mod tests {
    use super::*;
    use syspace_core::schema::{ColumnDef, ForeignKeyDef, SqlType};

    fn users() -> TableDef {
        let mut t = TableDef::new("users");
        t.columns = vec![
            ColumnDef::new("id", SqlType::Serial).primary_key(),
            ColumnDef::new("email", SqlType::Varchar(None)).not_null(),
        ];
        t
    }

    #[test]
    fn test_identical_catalogs_have_empty_diff() {
        let mut a = Catalog::new();
        a.create_table(users()).unwrap();
        let b = a.clone();
        assert!(SchemaDiff::between(&a, &b).is_empty());
    }

    #[test]
    fn test_column_order_is_ignored() {
        let mut a = Catalog::new();
        a.create_table(users()).unwrap();

        let mut reordered = users();
        reordered.columns.reverse();
        let mut b = Catalog::new();
        b.create_table(reordered).unwrap();

        assert!(SchemaDiff::between(&a, &b).is_empty());
    }

    #[test]
    fn test_detects_added_column_and_constraint() {
        let mut a = Catalog::new();
        let mut companies = TableDef::new("companies");
        companies.columns = vec![ColumnDef::new("id", SqlType::Serial).primary_key()];
        a.create_table(companies).unwrap();
        a.create_table(users()).unwrap();

        let mut b = a.clone();
        b.add_column("users", ColumnDef::new("company_id", SqlType::Integer))
            .unwrap();
        b.add_foreign_key(
            "users",
            ForeignKeyDef {
                name: "users_company_id_fkey".into(),
                columns: vec!["company_id".into()],
                ref_table: "companies".into(),
                ref_columns: vec!["id".into()],
                on_delete: None,
            },
        )
        .unwrap();

        let diff = SchemaDiff::between(&a, &b);
        let actions: Vec<DiffAction> = diff.entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![DiffAction::AddColumn, DiffAction::AddConstraint]);
        assert_eq!(diff.entries[1].object, "users.users_company_id_fkey");

        let back = SchemaDiff::between(&b, &a);
        let actions: Vec<DiffAction> = back.entries.iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![DiffAction::DropColumn, DiffAction::DropConstraint]);
    }

    #[test]
    fn test_detects_altered_column() {
        let mut a = Catalog::new();
        a.create_table(users()).unwrap();
        let mut b = a.clone();
        b.alter_column("users", "email", Some(true), None, None).unwrap();

        let diff = SchemaDiff::between(&a, &b);
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.entries[0].action, DiffAction::AlterColumn);
        assert!(diff.entries[0].details.contains("VARCHAR NOT NULL -> VARCHAR"));
    }
}
