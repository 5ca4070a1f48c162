use serde::{Deserialize, Serialize};

use super::types::SqlType;

/// Definition of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// SQL type.
    #[serde(rename = "type")]
    pub sql_type: SqlType,

    /// Whether the column accepts NULL.
    #[serde(default = "default_nullable")]
    pub nullable: bool,

    /// Whether the column is (part of) the primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Server-side default expression (SQL).
    #[serde(default)]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    /// Create a nullable column with no default.
    pub fn new(name: &str, sql_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as primary key (implies NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Set a server default expression.
    pub fn with_default(mut self, expr: &str) -> Self {
        self.default = Some(expr.to_string());
        self
    }

    /// Generate the SQL column definition used inside CREATE TABLE / ADD COLUMN.
    ///
    /// Primary keys are declared at table level, so they are not rendered here.
    pub fn to_sql_column(&self) -> String {
        let mut parts = vec![quote_ident(&self.name), self.sql_type.to_sql()];

        if !self.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(ref default) = self.default {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

/// Quote an identifier unless it is a plain lowercase name.
pub fn quote_ident(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false)
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !RESERVED.contains(&name);

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

const RESERVED: &[&str] = &[
    "all", "and", "check", "column", "constraint", "default", "desc", "from", "group", "order",
    "primary", "references", "select", "table", "to", "user", "where",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_def_defaults_nullable() {
        let column = ColumnDef::new("full_name", SqlType::Varchar(None));
        assert!(column.nullable);
        assert!(!column.primary_key);
        assert_eq!(column.to_sql_column(), "full_name VARCHAR");
    }

    #[test]
    fn test_column_to_sql_with_default() {
        let column = ColumnDef::new("created_at", SqlType::Timestamptz)
            .not_null()
            .with_default("now()");
        assert_eq!(
            column.to_sql_column(),
            "created_at TIMESTAMPTZ NOT NULL DEFAULT now()"
        );
    }

    #[test]
    fn test_primary_key_is_not_null() {
        let column = ColumnDef::new("id", SqlType::Serial).primary_key();
        assert!(!column.nullable);
        assert_eq!(column.to_sql_column(), "id SERIAL NOT NULL");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("CamelCase"), "\"CamelCase\"");
        assert_eq!(quote_ident("_requester_recipient_uc"), "_requester_recipient_uc");
    }

    #[test]
    fn test_parse_column_from_toml() {
        let column: ColumnDef = toml::from_str(
            r#"
            name = "email"
            type = "VARCHAR"
            nullable = false
            "#,
        )
        .unwrap();
        assert_eq!(column.sql_type, SqlType::Varchar(None));
        assert!(!column.nullable);
    }
}
