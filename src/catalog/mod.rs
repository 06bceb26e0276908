//! Catalog metadata for whitelisted tables: column descriptors, the
//! schema introspector and the primary-key resolver.
//! Nothing here is cached; every call asks the database.

pub mod introspect;
pub mod primary_key;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::value::{Row, Value};

pub use introspect::SchemaIntrospector;
pub use primary_key::{PrimaryKeyDescriptor, PrimaryKeyResolver, StorageClass};

/// A catalog type reference usable as a cast target, rendered `"schema"."name"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlType {
    pub schema: String,
    pub name: String,
}

impl SqlType {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self { schema: schema.into(), name: name.into() }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new("pg_catalog", name)
    }
}

impl Display for SqlType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

/// Double-quote an identifier for SQL text, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One column of a table as reported by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    #[serde(rename = "column_name")]
    pub name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
    pub is_nullable: bool,
    #[serde(rename = "column_default")]
    pub default_expression: Option<String>,
    /// `GENERATED ... AS IDENTITY`
    #[serde(default)]
    pub is_identity: bool,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    /// Nullable, no default, not part of the key. `udt_name` is a pg_catalog type name.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, udt_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            udt_schema: "pg_catalog".into(),
            udt_name: udt_name.into(),
            is_nullable: true,
            default_expression: None,
            is_identity: false,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
            is_primary_key: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self { Self::new(name, "text", "text") }
    pub fn integer(name: impl Into<String>) -> Self { Self::new(name, "integer", "int4") }
    pub fn bigint(name: impl Into<String>) -> Self { Self::new(name, "bigint", "int8") }
    pub fn boolean(name: impl Into<String>) -> Self { Self::new(name, "boolean", "bool") }

    /// Integer column fed by a sequence, as `serial` declares it.
    pub fn serial(name: impl Into<String>, table: &str) -> Self {
        let name = name.into();
        let default = format!("nextval('{}_{}_seq'::regclass)", table, name);
        Self::integer(name).not_null().with_default(default)
    }

    /// `bigint GENERATED ALWAYS AS IDENTITY`: auto-increment without a `nextval` default.
    pub fn identity(name: impl Into<String>) -> Self {
        let mut col = Self::bigint(name).not_null();
        col.is_identity = true;
        col
    }

    pub fn not_null(mut self) -> Self { self.is_nullable = false; self }
    pub fn with_default(mut self, expr: impl Into<String>) -> Self { self.default_expression = Some(expr.into()); self }
    pub fn primary_key(mut self) -> Self { self.is_primary_key = true; self.is_nullable = false; self }

    pub fn sql_type(&self) -> SqlType {
        SqlType::new(self.udt_schema.clone(), self.udt_name.clone())
    }

    pub fn has_sequence_default(&self) -> bool {
        self.default_expression.as_deref().map(is_sequence_default).unwrap_or(false)
    }

    /// Values come from a sequence, either a `serial` default or an identity column.
    pub fn is_auto_increment(&self) -> bool {
        self.is_identity || self.has_sequence_default()
    }

    /// Build from one catalog result row (keys as produced by the describe query).
    pub fn from_catalog_row(row: &Row) -> AppResult<Self> {
        Ok(Self {
            name: required_text(row, "column_name")?,
            data_type: required_text(row, "data_type")?,
            udt_schema: optional_text(row, "udt_schema").unwrap_or_else(|| "pg_catalog".into()),
            udt_name: required_text(row, "udt_name")?,
            is_nullable: flag(row, "is_nullable"),
            default_expression: optional_text(row, "column_default"),
            is_identity: flag(row, "is_identity"),
            character_maximum_length: optional_int(row, "character_maximum_length"),
            numeric_precision: optional_int(row, "numeric_precision"),
            numeric_scale: optional_int(row, "numeric_scale"),
            is_primary_key: flag(row, "is_primary_key"),
        })
    }

    /// Inverse of `from_catalog_row`, used by backends that synthesize catalog rows.
    pub fn to_catalog_row(&self, ordinal: usize) -> Row {
        let opt_text = |v: &Option<String>| v.clone().map(Value::Text).unwrap_or(Value::Null);
        let opt_int = |v: &Option<i64>| v.map(Value::Int).unwrap_or(Value::Null);
        let mut row = Row::new();
        row.insert("column_name".into(), Value::Text(self.name.clone()));
        row.insert("data_type".into(), Value::Text(self.data_type.clone()));
        row.insert("udt_schema".into(), Value::Text(self.udt_schema.clone()));
        row.insert("udt_name".into(), Value::Text(self.udt_name.clone()));
        row.insert("is_nullable".into(), Value::Bool(self.is_nullable));
        row.insert("column_default".into(), opt_text(&self.default_expression));
        row.insert("is_identity".into(), Value::Bool(self.is_identity));
        row.insert("character_maximum_length".into(), opt_int(&self.character_maximum_length));
        row.insert("numeric_precision".into(), opt_int(&self.numeric_precision));
        row.insert("numeric_scale".into(), opt_int(&self.numeric_scale));
        row.insert("is_primary_key".into(), Value::Bool(self.is_primary_key));
        row.insert("ordinal_position".into(), Value::Int(ordinal as i64 + 1));
        row
    }
}

/// `nextval(...)` in a default marks an auto-increment column.
pub fn is_sequence_default(expr: &str) -> bool {
    expr.to_ascii_lowercase().contains("nextval(")
}

fn required_text(row: &Row, key: &str) -> AppResult<String> {
    optional_text(row, key)
        .ok_or_else(|| AppError::schema("catalog_shape", format!("catalog row is missing '{}'", key)))
}

fn optional_text(row: &Row, key: &str) -> Option<String> {
    match row.get(key) {
        Some(Value::Null) | None => None,
        Some(v) => v.to_text(),
    }
}

fn optional_int(row: &Row, key: &str) -> Option<i64> {
    row.get(key).and_then(Value::as_i64)
}

fn flag(row: &Row, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        // information_schema spells booleans as YES/NO
        Some(Value::Text(s)) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
