use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// PostgreSQL column types.
///
/// Serialized as the SQL spelling (`"VARCHAR(255)"`, `"TIMESTAMPTZ"`, `"TEXT[]"`)
/// so revision scripts read like DDL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SqlType {
    /// Auto-incrementing 32-bit integer
    Serial,
    /// Auto-incrementing 64-bit integer
    BigSerial,
    /// 16-bit integer
    SmallInt,
    /// 32-bit integer
    Integer,
    /// 64-bit integer
    BigInt,
    /// 32-bit floating point
    Real,
    /// 64-bit floating point
    DoublePrecision,
    /// Boolean
    Boolean,
    /// Unlimited text
    Text,
    /// Blank-padded string with optional fixed length
    Char(Option<u32>),
    /// Variable-length string with optional max length
    Varchar(Option<u32>),
    /// Timestamp without timezone
    Timestamp,
    /// Timestamp with timezone
    Timestamptz,
    /// Date without time
    Date,
    /// Time of day without timezone
    Time,
    /// Time of day with timezone
    Timetz,
    /// Time span
    Interval,
    /// Arbitrary-precision number without a declared precision
    Numeric,
    /// Decimal with precision and scale
    Decimal(u8, u8),
    /// UUID type
    Uuid,
    /// JSON stored as text
    Json,
    /// JSONB for structured data
    Jsonb,
    /// IPv4 or IPv6 host address
    Inet,
    /// IPv4 or IPv6 network
    Cidr,
    /// Byte array
    Bytea,
    /// Array of another type
    Array(Box<SqlType>),
    /// Enum or extension type referenced by name, e.g. `connectionstatus`
    Named(String),
}

impl SqlType {
    /// Generate the SQL type declaration.
    pub fn to_sql(&self) -> String {
        match self {
            SqlType::Serial => "SERIAL".to_string(),
            SqlType::BigSerial => "BIGSERIAL".to_string(),
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::DoublePrecision => "DOUBLE PRECISION".to_string(),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Char(None) => "CHAR".to_string(),
            SqlType::Char(Some(len)) => format!("CHAR({})", len),
            SqlType::Varchar(None) => "VARCHAR".to_string(),
            SqlType::Varchar(Some(len)) => format!("VARCHAR({})", len),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Timestamptz => "TIMESTAMPTZ".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Time => "TIME".to_string(),
            SqlType::Timetz => "TIMETZ".to_string(),
            SqlType::Interval => "INTERVAL".to_string(),
            SqlType::Numeric => "NUMERIC".to_string(),
            SqlType::Decimal(p, s) => format!("DECIMAL({}, {})", p, s),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Jsonb => "JSONB".to_string(),
            SqlType::Inet => "INET".to_string(),
            SqlType::Cidr => "CIDR".to_string(),
            SqlType::Bytea => "BYTEA".to_string(),
            SqlType::Array(inner) => format!("{}[]", inner.to_sql()),
            SqlType::Named(name) => name.clone(),
        }
    }

    /// Name of the user-defined type this column depends on, if any.
    pub fn named_type(&self) -> Option<&str> {
        match self {
            SqlType::Named(name) => Some(name.as_str()),
            SqlType::Array(inner) => inner.named_type(),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

impl From<SqlType> for String {
    fn from(value: SqlType) -> Self {
        value.to_sql()
    }
}

impl TryFrom<String> for SqlType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for SqlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty column type".to_string());
        }

        if let Some(inner) = trimmed.strip_suffix("[]") {
            return Ok(SqlType::Array(Box::new(inner.parse()?)));
        }

        let upper = trimmed.to_ascii_uppercase();
        let (base, args) = split_args(&upper);

        let ty = match (base, args.as_slice()) {
            ("SERIAL" | "SERIAL4", []) => SqlType::Serial,
            ("BIGSERIAL" | "SERIAL8", []) => SqlType::BigSerial,
            ("INTEGER" | "INT" | "INT4", []) => SqlType::Integer,
            ("BIGINT" | "INT8", []) => SqlType::BigInt,
            ("SMALLINT" | "INT2", []) => SqlType::SmallInt,
            ("REAL" | "FLOAT4", []) => SqlType::Real,
            ("DOUBLE PRECISION" | "FLOAT8" | "FLOAT", []) => SqlType::DoublePrecision,
            ("FLOAT", [p]) => match p.parse::<u8>() {
                Ok(1..=24) => SqlType::Real,
                Ok(25..=53) => SqlType::DoublePrecision,
                _ => return Err(format!("FLOAT precision must be 1 to 53 in '{}'", trimmed)),
            },
            ("BOOLEAN" | "BOOL", []) => SqlType::Boolean,
            ("TEXT", []) => SqlType::Text,
            ("CHAR" | "CHARACTER" | "BPCHAR", []) => SqlType::Char(None),
            ("CHAR" | "CHARACTER" | "BPCHAR", [len]) => SqlType::Char(Some(
                len.parse()
                    .map_err(|_| format!("invalid CHAR length in '{}'", trimmed))?,
            )),
            ("VARCHAR" | "CHARACTER VARYING", []) => SqlType::Varchar(None),
            ("VARCHAR" | "CHARACTER VARYING", [len]) => SqlType::Varchar(Some(
                len.parse()
                    .map_err(|_| format!("invalid VARCHAR length in '{}'", trimmed))?,
            )),
            ("TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE", []) => SqlType::Timestamp,
            ("TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE", []) => SqlType::Timestamptz,
            ("DATE", []) => SqlType::Date,
            ("TIME" | "TIME WITHOUT TIME ZONE", []) => SqlType::Time,
            ("TIMETZ" | "TIME WITH TIME ZONE", []) => SqlType::Timetz,
            ("INTERVAL", []) => SqlType::Interval,
            ("DECIMAL" | "NUMERIC", []) => SqlType::Numeric,
            // NUMERIC(p) is NUMERIC(p, 0)
            ("DECIMAL" | "NUMERIC", [p]) => SqlType::Decimal(
                p.parse()
                    .map_err(|_| format!("invalid precision in '{}'", trimmed))?,
                0,
            ),
            ("DECIMAL" | "NUMERIC", [p, s]) => SqlType::Decimal(
                p.parse()
                    .map_err(|_| format!("invalid precision in '{}'", trimmed))?,
                s.parse()
                    .map_err(|_| format!("invalid scale in '{}'", trimmed))?,
            ),
            ("UUID", []) => SqlType::Uuid,
            ("JSON", []) => SqlType::Json,
            ("JSONB", []) => SqlType::Jsonb,
            ("INET", []) => SqlType::Inet,
            ("CIDR", []) => SqlType::Cidr,
            ("BYTEA", []) => SqlType::Bytea,
            _ => SqlType::Named(trimmed.to_string()),
        };

        Ok(ty)
    }
}

/// Split `NAME(a, b)` into `("NAME", ["a", "b"])`.
fn split_args(s: &str) -> (&str, Vec<&str>) {
    match (s.find('('), s.strip_suffix(')')) {
        (Some(open), Some(without_close)) => {
            let args = without_close[open + 1..]
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            (s[..open].trim(), args)
        }
        _ => (s, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_to_sql() {
        assert_eq!(SqlType::Uuid.to_sql(), "UUID");
        assert_eq!(SqlType::Varchar(Some(100)).to_sql(), "VARCHAR(100)");
        assert_eq!(SqlType::Varchar(None).to_sql(), "VARCHAR");
        assert_eq!(SqlType::Decimal(10, 2).to_sql(), "DECIMAL(10, 2)");
        assert_eq!(
            SqlType::Array(Box::new(SqlType::Text)).to_sql(),
            "TEXT[]"
        );
    }

    #[test]
    fn test_parse_builtin_types() {
        assert_eq!("serial".parse::<SqlType>().unwrap(), SqlType::Serial);
        assert_eq!("int".parse::<SqlType>().unwrap(), SqlType::Integer);
        assert_eq!(
            "varchar(32)".parse::<SqlType>().unwrap(),
            SqlType::Varchar(Some(32))
        );
        assert_eq!(
            "timestamp with time zone".parse::<SqlType>().unwrap(),
            SqlType::Timestamptz
        );
        assert_eq!(
            "NUMERIC(12, 4)".parse::<SqlType>().unwrap(),
            SqlType::Decimal(12, 4)
        );
        assert_eq!(
            "varchar[]".parse::<SqlType>().unwrap(),
            SqlType::Array(Box::new(SqlType::Varchar(None)))
        );
    }

    #[test]
    fn test_parse_common_postgres_types() {
        let cases = [
            ("smallint", SqlType::SmallInt),
            ("int2", SqlType::SmallInt),
            ("json", SqlType::Json),
            ("time", SqlType::Time),
            ("time with time zone", SqlType::Timetz),
            ("timetz", SqlType::Timetz),
            ("interval", SqlType::Interval),
            ("float", SqlType::DoublePrecision),
            ("float(24)", SqlType::Real),
            ("float(53)", SqlType::DoublePrecision),
            ("numeric", SqlType::Numeric),
            ("decimal", SqlType::Numeric),
            ("numeric(10)", SqlType::Decimal(10, 0)),
            ("inet", SqlType::Inet),
            ("cidr", SqlType::Cidr),
            ("char(2)", SqlType::Char(Some(2))),
            ("character", SqlType::Char(None)),
        ];
        for (input, expected) in cases {
            let parsed: SqlType = input.parse().unwrap();
            assert_eq!(parsed, expected, "{}", input);
            assert_eq!(parsed.named_type(), None, "{}", input);
        }
        assert!("float(54)".parse::<SqlType>().is_err());
        assert!("float(0)".parse::<SqlType>().is_err());
    }

    #[test]
    fn test_parse_named_type_keeps_spelling() {
        let ty: SqlType = "connectionstatus".parse().unwrap();
        assert_eq!(ty, SqlType::Named("connectionstatus".to_string()));
        assert_eq!(ty.named_type(), Some("connectionstatus"));

        let vector: SqlType = "vector(768)".parse().unwrap();
        assert_eq!(vector.to_sql(), "vector(768)");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("".parse::<SqlType>().is_err());
        assert!("VARCHAR(abc)".parse::<SqlType>().is_err());
    }

    #[test]
    fn test_round_trip_through_sql() {
        for ty in [
            SqlType::BigSerial,
            SqlType::DoublePrecision,
            SqlType::Decimal(8, 2),
            SqlType::Timestamp,
            SqlType::SmallInt,
            SqlType::Char(Some(2)),
            SqlType::Timetz,
            SqlType::Numeric,
        ] {
            assert_eq!(ty.to_sql().parse::<SqlType>().unwrap(), ty);
        }
    }
}
