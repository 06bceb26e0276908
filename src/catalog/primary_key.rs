//! Primary-key resolution
//! ----------------------
//! Finds the column that identifies a row for UPDATE/DELETE. The declared
//! primary-key index wins; without one the resolver falls back to the first
//! sequence-fed or identity column, then the first `*_code` column, then the first column.
//! Composite keys contribute only their first column.
//!
//! Resolution runs on every mutating request so it always reflects the live
//! catalog.

use tracing::debug;

use crate::backend::Backend;
use crate::catalog::{is_sequence_default, ColumnDescriptor, SchemaIntrospector, SqlType};
use crate::error::{AppError, AppResult};
use crate::query::{Operation, SqlStatement};
use crate::registry::TableName;
use crate::value::{Row, Value};

const PRIMARY_KEY_SQL: &str = "\
SELECT a.attname AS column_name, t.typname AS type_name, tn.nspname AS type_schema, \
pg_get_expr(d.adbin, d.adrelid) AS column_default \
FROM pg_catalog.pg_index i \
JOIN pg_catalog.pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
JOIN pg_catalog.pg_type t ON t.oid = a.atttypid \
JOIN pg_catalog.pg_namespace tn ON tn.oid = t.typnamespace \
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE i.indrelid = to_regclass(quote_ident($1)) AND i.indisprimary \
ORDER BY array_position(i.indkey::int2[], a.attnum)";

/// Catalog type names bound as integers.
pub const NUMERIC_KEY_TYPES: &[&str] = &["int2", "int4", "int8"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Numeric,
    Textual,
}

/// Integer types, or anything fed by a sequence, are Numeric.
pub fn classify(type_name: &str, default_expression: Option<&str>) -> StorageClass {
    if NUMERIC_KEY_TYPES.contains(&type_name) || default_expression.map(is_sequence_default).unwrap_or(false) {
        StorageClass::Numeric
    } else {
        StorageClass::Textual
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyDescriptor {
    pub column_name: String,
    pub sql_type: SqlType,
    pub storage_class: StorageClass,
}

impl PrimaryKeyDescriptor {
    pub fn from_column(col: &ColumnDescriptor) -> Self {
        Self {
            column_name: col.name.clone(),
            sql_type: col.sql_type(),
            storage_class: classify(&col.udt_name, col.default_expression.as_deref()),
        }
    }

    /// Parameter value for a key supplied as text (query strings are always text).
    pub fn coerce_id(&self, id: &str) -> AppResult<Value> {
        match self.storage_class {
            StorageClass::Textual => Ok(Value::Text(id.to_string())),
            StorageClass::Numeric => id.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                AppError::validation(
                    "invalid_id",
                    format!("Invalid id for numeric primary key {}: {}", self.column_name, id),
                )
            }),
        }
    }

    fn from_catalog_row(row: &Row) -> AppResult<Self> {
        let text = |k: &str| match row.get(k) {
            Some(Value::Null) | None => None,
            Some(v) => v.to_text(),
        };
        let column_name = text("column_name")
            .ok_or_else(|| AppError::schema("catalog_shape", "primary key row is missing 'column_name'"))?;
        let type_name = text("type_name")
            .ok_or_else(|| AppError::schema("catalog_shape", "primary key row is missing 'type_name'"))?;
        let type_schema = text("type_schema").unwrap_or_else(|| "pg_catalog".to_string());
        let storage_class = classify(&type_name, text("column_default").as_deref());
        Ok(Self { column_name, sql_type: SqlType::new(type_schema, type_name), storage_class })
    }
}

/// Heuristic key for a table without a declared primary key.
pub fn choose_fallback(columns: &[ColumnDescriptor]) -> Option<&ColumnDescriptor> {
    columns
        .iter()
        .find(|c| c.is_auto_increment())
        .or_else(|| columns.iter().find(|c| c.name.to_ascii_lowercase().ends_with("_code")))
        .or_else(|| columns.first())
}

pub struct PrimaryKeyResolver<'b> {
    backend: &'b dyn Backend,
}

impl<'b> PrimaryKeyResolver<'b> {
    pub fn new(backend: &'b dyn Backend) -> Self {
        Self { backend }
    }

    pub fn statement(table: TableName<'_>) -> SqlStatement {
        SqlStatement::new(
            PRIMARY_KEY_SQL,
            vec![Value::Text(table.as_str().to_string())],
            Operation::PrimaryKeyIndex { table: table.as_str().to_string() },
        )
    }

    pub async fn resolve(&self, table: TableName<'_>) -> AppResult<PrimaryKeyDescriptor> {
        self.resolve_with_columns(table, None).await
    }

    /// As `resolve`, reusing an already-introspected column list for the fallback path.
    pub async fn resolve_with_columns(
        &self,
        table: TableName<'_>,
        known_columns: Option<&[ColumnDescriptor]>,
    ) -> AppResult<PrimaryKeyDescriptor> {
        let rows = self.backend.query(&Self::statement(table)).await?;
        if let Some(first) = rows.first() {
            let pk = PrimaryKeyDescriptor::from_catalog_row(first)?;
            debug!(target: "catalog", table = %table, column = %pk.column_name, class = ?pk.storage_class, "primary key from catalog");
            return Ok(pk);
        }

        let described;
        let columns = match known_columns {
            Some(c) => c,
            None => {
                described = SchemaIntrospector::new(self.backend).describe(table).await?;
                described.as_slice()
            }
        };
        let col = choose_fallback(columns)
            .ok_or_else(|| AppError::schema("unknown_table", format!("No columns found for table {}", table)))?;
        let pk = PrimaryKeyDescriptor::from_column(col);
        debug!(target: "catalog", table = %table, column = %pk.column_name, class = ?pk.storage_class, "primary key from heuristic");
        Ok(pk)
    }
}

#[cfg(test)]
#[path = "primary_key_tests.rs"]
mod tests;
