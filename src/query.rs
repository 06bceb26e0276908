//!
//! Statement construction
//! ----------------------
//! Builds parameterized SQL for any whitelisted table. Only table and column
//! names are written into SQL text (quoted); every value, including the search
//! pattern, LIMIT/OFFSET and key values, travels as a bound parameter.
//!
//! Each `SqlStatement` also carries an `Operation` describing its shape, so a
//! backend that does not speak SQL can execute the same statement from its
//! parameters alone.

use std::collections::BTreeSet;

use crate::catalog::{quote_ident, ColumnDescriptor, PrimaryKeyDescriptor, StorageClass};
use crate::error::{AppError, AppResult};
use crate::registry::TableName;
use crate::value::{Row, Value};

pub const EMPTY_PAYLOAD_MESSAGE: &str = "No values provided";

/// Shape of a statement, independent of its SQL rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// params: [table name]
    DescribeColumns { table: String },
    /// params: [table name]
    PrimaryKeyIndex { table: String },
    /// params: none; yields one row `{ total }`
    Count { table: String },
    /// params: [pattern if filtered], limit, offset
    Select { table: String, filtered: bool },
    /// params: one per column, in column order
    Insert { table: String, columns: Vec<String> },
    /// params: one per SET column, then the original key value
    Update { table: String, columns: Vec<String>, key_column: String },
    /// params: [key value]
    Delete { table: String, key_column: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
    pub operation: Operation,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>, operation: Operation) -> Self {
        Self { sql: sql.into(), params, operation }
    }
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// `SELECT *` page, optionally filtered by a case-insensitive match on the
    /// whole row's JSON text. LIMIT and OFFSET are always the last two params.
    pub fn build_select(table: TableName<'_>, filter: Option<&str>, limit: i64, offset: i64) -> SqlStatement {
        let t = quote_ident(table.as_str());
        let mut sql = format!("SELECT * FROM {}", t);
        let mut params: Vec<Value> = Vec::with_capacity(3);
        let filter = filter.filter(|f| !f.is_empty());
        if let Some(f) = filter {
            sql.push_str(&format!(" WHERE CAST(row_to_json({}) AS TEXT) ILIKE $1", t));
            params.push(Value::Text(format!("%{}%", f)));
        }
        sql.push_str(&format!(" LIMIT ${} OFFSET ${}", params.len() + 1, params.len() + 2));
        params.push(Value::Int(limit));
        params.push(Value::Int(offset));
        SqlStatement::new(sql, params, Operation::Select { table: table.as_str().to_string(), filtered: filter.is_some() })
    }

    /// Parameterless total row count used for pagination metadata.
    pub fn build_count(table: TableName<'_>) -> SqlStatement {
        let sql = format!("SELECT COUNT(*) AS total FROM {}", quote_ident(table.as_str()));
        SqlStatement::new(sql, Vec::new(), Operation::Count { table: table.as_str().to_string() })
    }

    /// INSERT of every submitted column, returning the stored row.
    pub fn build_insert(table: TableName<'_>, values: &Row, columns: &[ColumnDescriptor]) -> AppResult<SqlStatement> {
        let targets = resolve_columns(table, values, columns)?;
        let names: Vec<String> = targets.iter().map(|c| quote_ident(&c.name)).collect();
        let placeholders: Vec<String> = targets
            .iter()
            .enumerate()
            .map(|(i, c)| typed_placeholder(i + 1, c))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_ident(table.as_str()),
            names.join(", "),
            placeholders.join(", ")
        );
        let params = targets.iter().map(|c| values[&c.name].clone()).collect();
        let operation = Operation::Insert {
            table: table.as_str().to_string(),
            columns: targets.iter().map(|c| c.name.clone()).collect(),
        };
        Ok(SqlStatement::new(sql, params, operation))
    }

    /// UPDATE of every submitted column (the key column included, which allows
    /// renaming a key), located by the key's original value.
    pub fn build_update(
        table: TableName<'_>,
        values: &Row,
        columns: &[ColumnDescriptor],
        pk: &PrimaryKeyDescriptor,
        original_id: &str,
    ) -> AppResult<SqlStatement> {
        let targets = resolve_columns(table, values, columns)?;
        let set_clause: Vec<String> = targets
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", quote_ident(&c.name), typed_placeholder(i + 1, c)))
            .collect();
        let mut params: Vec<Value> = targets.iter().map(|c| values[&c.name].clone()).collect();
        let key_param = pk.coerce_id(original_id)?;
        params.push(key_param);
        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            quote_ident(table.as_str()),
            set_clause.join(", "),
            key_predicate(pk, params.len())
        );
        let operation = Operation::Update {
            table: table.as_str().to_string(),
            columns: targets.iter().map(|c| c.name.clone()).collect(),
            key_column: pk.column_name.clone(),
        };
        Ok(SqlStatement::new(sql, params, operation))
    }

    /// Single-row DELETE keyed on the resolved primary key.
    pub fn build_delete(table: TableName<'_>, pk: &PrimaryKeyDescriptor, id: &str) -> AppResult<SqlStatement> {
        let key_param = pk.coerce_id(id)?;
        let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table.as_str()), key_predicate(pk, 1));
        let operation = Operation::Delete { table: table.as_str().to_string(), key_column: pk.column_name.clone() };
        Ok(SqlStatement::new(sql, vec![key_param], operation))
    }
}

/// Values are sent as text and cast to the column's own type, so any type
/// with a text input form can be written.
fn typed_placeholder(n: usize, col: &ColumnDescriptor) -> String {
    format!("CAST(${}::text AS {})", n, col.sql_type())
}

fn key_predicate(pk: &PrimaryKeyDescriptor, n: usize) -> String {
    let col = quote_ident(&pk.column_name);
    match pk.storage_class {
        StorageClass::Numeric => format!("{} = ${}::int8", col, n),
        StorageClass::Textual => format!("{} = CAST(${}::text AS {})", col, n, pk.sql_type),
    }
}

/// Map submitted keys onto introspected columns, in declaration order.
/// Empty payloads and keys the table does not have are client errors.
fn resolve_columns<'c>(table: TableName<'_>, values: &Row, columns: &'c [ColumnDescriptor]) -> AppResult<Vec<&'c ColumnDescriptor>> {
    if values.is_empty() {
        return Err(AppError::validation("empty_payload", EMPTY_PAYLOAD_MESSAGE));
    }
    let known: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let unknown: Vec<&str> = values.keys().map(String::as_str).filter(|k| !known.contains(k)).collect();
    if !unknown.is_empty() {
        return Err(AppError::validation(
            "unknown_column",
            format!("Unknown column(s) for {}: {}", table, unknown.join(", ")),
        ));
    }
    Ok(columns.iter().filter(|c| values.contains_key(&c.name)).collect())
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
