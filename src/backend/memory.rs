//! In-process backend
//! ------------------
//! Executes `SqlStatement`s against tables held in memory, reading only the
//! statement's `Operation` and bound parameters. It mirrors the Postgres
//! behaviours the engine relies on (catalog rows, key uniqueness, NOT NULL,
//! sequence defaults, integer/bool input coercion) and counts every call, so
//! tests can assert that a request never touched storage.
//!
//! Also backs the server's `--in-memory` demo mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::catalog::primary_key::NUMERIC_KEY_TYPES;
use crate::catalog::ColumnDescriptor;
use crate::error::{AppError, AppResult};
use crate::query::{Operation, SqlStatement};
use crate::value::{Row, Value};

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl MemoryTable {
    fn key_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.is_primary_key)
    }

    fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn next_sequence_value(&self, column: &str) -> i64 {
        self.rows.iter().filter_map(|r| r.get(column).and_then(Value::as_i64)).max().unwrap_or(0) + 1
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, MemoryTable>>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table. Mark key columns with `ColumnDescriptor::primary_key`.
    pub fn with_table(self, name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        self.tables.write().insert(name.to_string(), MemoryTable { columns, rows: Vec::new() });
        self
    }

    /// Seed a row directly, bypassing statement execution and the call counter.
    pub fn seed_row(&self, table: &str, row: Row) {
        if let Some(t) = self.tables.write().get_mut(table) {
            t.rows.push(row);
        }
    }

    /// Number of statements executed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.read().get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// A `mast_status` table with a textual natural key and a few rows.
    pub fn demo() -> Self {
        let backend = Self::new().with_table(
            "mast_status",
            vec![ColumnDescriptor::text("status_code").primary_key(), ColumnDescriptor::text("label")],
        );
        for (code, label) in [("A", "Active"), ("I", "Inactive"), ("P", "Pending")] {
            let mut row = Row::new();
            row.insert("status_code".into(), Value::Text(code.into()));
            row.insert("label".into(), Value::Text(label.into()));
            backend.seed_row("mast_status", row);
        }
        backend
    }

    fn run(&self, stmt: &SqlStatement) -> AppResult<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &stmt.operation {
            Operation::DescribeColumns { table } => {
                let tables = self.tables.read();
                Ok(tables
                    .get(table)
                    .map(|t| t.columns.iter().enumerate().map(|(i, c)| c.to_catalog_row(i)).collect())
                    .unwrap_or_default())
            }
            Operation::PrimaryKeyIndex { table } => {
                let tables = self.tables.read();
                let Some(t) = tables.get(table) else { return Ok(Vec::new()) };
                Ok(t.columns
                    .iter()
                    .filter(|c| c.is_primary_key)
                    .map(|c| {
                        let mut row = Row::new();
                        row.insert("column_name".into(), Value::Text(c.name.clone()));
                        row.insert("type_name".into(), Value::Text(c.udt_name.clone()));
                        row.insert("type_schema".into(), Value::Text(c.udt_schema.clone()));
                        row.insert("column_default".into(), c.default_expression.clone().map(Value::Text).unwrap_or(Value::Null));
                        row
                    })
                    .collect())
            }
            Operation::Count { table } => {
                let tables = self.tables.read();
                let t = lookup(&tables, table)?;
                let mut row = Row::new();
                row.insert("total".into(), Value::Int(t.rows.len() as i64));
                Ok(vec![row])
            }
            Operation::Select { table, filtered } => {
                let tables = self.tables.read();
                let t = lookup(&tables, table)?;
                let (pattern, rest) = if *filtered {
                    (stmt.params.first(), stmt.params.get(1..).unwrap_or(&[]))
                } else {
                    (None, &stmt.params[..])
                };
                let limit = int_param(rest.first(), "LIMIT")?;
                let offset = int_param(rest.get(1), "OFFSET")?;
                let needle = pattern
                    .and_then(Value::to_text)
                    .map(|p| p.trim_matches('%').to_lowercase());
                let matching = t.rows.iter().filter(|r| match &needle {
                    Some(n) => serde_json::to_string(r).map(|s| s.to_lowercase().contains(n)).unwrap_or(false),
                    None => true,
                });
                Ok(matching.skip(offset as usize).take(limit as usize).cloned().collect())
            }
            Operation::Insert { table, columns } => {
                let mut tables = self.tables.write();
                let t = lookup_mut(&mut tables, table)?;
                let mut row = Row::new();
                for col in &t.columns {
                    let value = match columns.iter().position(|c| c == &col.name) {
                        Some(i) => coerce(table, col, stmt.params.get(i).unwrap_or(&Value::Null))?,
                        None if col.is_auto_increment() => Value::Int(t.next_sequence_value(&col.name)),
                        // other defaults are not evaluated; keep the expression text
                        None => col.default_expression.clone().map(Value::Text).unwrap_or(Value::Null),
                    };
                    row.insert(col.name.clone(), value);
                }
                check_row(table, t, &row, None)?;
                t.rows.push(row.clone());
                Ok(vec![row])
            }
            Operation::Update { table, columns, key_column } => {
                let mut tables = self.tables.write();
                let t = lookup_mut(&mut tables, table)?;
                let key = stmt.params.last().cloned().unwrap_or(Value::Null);
                // stage every matching row, validate against the staged table, then commit
                let mut staged = t.clone();
                let mut touched = Vec::new();
                for idx in 0..staged.rows.len() {
                    if !same_key(staged.rows[idx].get(key_column), &key) {
                        continue;
                    }
                    for (i, name) in columns.iter().enumerate() {
                        let col = t.column(name).ok_or_else(|| missing_column(table, name))?;
                        let value = coerce(table, col, stmt.params.get(i).unwrap_or(&Value::Null))?;
                        staged.rows[idx].insert(name.clone(), value);
                    }
                    touched.push(idx);
                }
                for &idx in &touched {
                    check_row(table, &staged, &staged.rows[idx], Some(idx))?;
                }
                let updated = touched.iter().map(|&idx| staged.rows[idx].clone()).collect();
                *t = staged;
                Ok(updated)
            }
            Operation::Delete { table, key_column } => {
                let mut tables = self.tables.write();
                let t = lookup_mut(&mut tables, table)?;
                let key = stmt.params.first().cloned().unwrap_or(Value::Null);
                let (gone, kept): (Vec<Row>, Vec<Row>) =
                    t.rows.drain(..).partition(|r| same_key(r.get(key_column), &key));
                t.rows = kept;
                Ok(gone)
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn query(&self, stmt: &SqlStatement) -> AppResult<Vec<Row>> {
        self.run(stmt)
    }

    async fn execute(&self, stmt: &SqlStatement) -> AppResult<u64> {
        Ok(self.run(stmt)?.len() as u64)
    }

    fn name(&self) -> &'static str { "memory" }
}

fn lookup<'t>(tables: &'t HashMap<String, MemoryTable>, table: &str) -> AppResult<&'t MemoryTable> {
    tables.get(table).ok_or_else(|| undefined_table(table))
}

fn lookup_mut<'t>(tables: &'t mut HashMap<String, MemoryTable>, table: &str) -> AppResult<&'t mut MemoryTable> {
    tables.get_mut(table).ok_or_else(|| undefined_table(table))
}

fn undefined_table(table: &str) -> AppError {
    AppError::database("42P01", format!("relation \"{}\" does not exist", table))
}

fn missing_column(table: &str, column: &str) -> AppError {
    AppError::database("42703", format!("column \"{}\" of relation \"{}\" does not exist", column, table))
}

fn int_param(v: Option<&Value>, clause: &str) -> AppResult<i64> {
    let n = v.and_then(Value::as_i64).unwrap_or(0);
    if n < 0 {
        return Err(AppError::database("2201W", format!("{} must not be negative", clause)));
    }
    Ok(n)
}

fn same_key(stored: Option<&Value>, key: &Value) -> bool {
    match stored {
        Some(v) if !v.is_null() => v.to_text() == key.to_text(),
        _ => false,
    }
}

/// Apply the text-input conversion Postgres would perform for the column type.
fn coerce(table: &str, col: &ColumnDescriptor, v: &Value) -> AppResult<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    let invalid = |ty: &str| {
        AppError::database(
            "22P02",
            format!("invalid input syntax for type {}: \"{}\" (column {}.{})", ty, v.to_text().unwrap_or_default(), table, col.name),
        )
    };
    if NUMERIC_KEY_TYPES.contains(&col.udt_name.as_str()) {
        return v.as_i64().map(Value::Int).ok_or_else(|| invalid(&col.data_type));
    }
    match col.udt_name.as_str() {
        "bool" => match v.to_text().as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("true" | "t" | "yes" | "on" | "1") => Ok(Value::Bool(true)),
            Some("false" | "f" | "no" | "off" | "0") => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean")),
        },
        "text" | "varchar" | "bpchar" | "name" => Ok(Value::Text(v.to_text().unwrap_or_default())),
        _ => Ok(v.clone()),
    }
}

/// NOT NULL and key uniqueness. `skip` is the index of the row being replaced.
fn check_row(table: &str, t: &MemoryTable, row: &Row, skip: Option<usize>) -> AppResult<()> {
    for col in &t.columns {
        if !col.is_nullable && row.get(&col.name).map(Value::is_null).unwrap_or(true) {
            return Err(AppError::database(
                "23502",
                format!("null value in column \"{}\" of relation \"{}\" violates not-null constraint", col.name, table),
            ));
        }
    }
    if let Some(key) = t.key_column() {
        let value = row.get(&key.name).cloned().unwrap_or(Value::Null);
        let clash = t
            .rows
            .iter()
            .enumerate()
            .any(|(i, r)| Some(i) != skip && same_key(r.get(&key.name), &value));
        if clash {
            return Err(AppError::database(
                "23505",
                format!("duplicate key value violates unique constraint \"{}_pkey\"", table),
            ));
        }
    }
    Ok(())
}
