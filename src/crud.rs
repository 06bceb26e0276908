//!
//! CRUD orchestration
//! ------------------
//! One call per HTTP request: validate the table against the registry, consult
//! the catalog where the operation needs it, build the statement and run it on
//! the backend. Nothing is retried and nothing is cached between calls.
//!
//! The list path issues COUNT and SELECT as two independent statements, so the
//! reported total and the page are not guaranteed consistent under concurrent
//! writes. That is accepted for an administrative browser.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::backend::Backend;
use crate::catalog::{ColumnDescriptor, PrimaryKeyResolver, SchemaIntrospector};
use crate::error::{AppError, AppResult};
use crate::query::{QueryBuilder, EMPTY_PAYLOAD_MESSAGE};
use crate::registry::{TableName, TableRegistry};
use crate::value::{Row, Value};

pub const DEFAULT_LIMIT: i64 = 10;
pub const DEFAULT_OFFSET: i64 = 0;
pub const ID_REQUIRED_MESSAGE: &str = "Table name and id are required";

/// Paging request for the list operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self { search: None, limit: DEFAULT_LIMIT, offset: DEFAULT_OFFSET }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<Row>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct CrudService {
    registry: Arc<TableRegistry>,
    backend: Arc<dyn Backend>,
}

impl CrudService {
    pub fn new(registry: Arc<TableRegistry>, backend: Arc<dyn Backend>) -> Self {
        Self { registry, backend }
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// One page of rows plus the table's total row count.
    pub async fn list(&self, table: Option<&str>, params: &ListParams) -> AppResult<Page> {
        let table = self.registry.validate(table)?;
        let result = self.list_validated(table, params).await;
        self.finish("list", table, result)
    }

    async fn list_validated(&self, table: TableName<'_>, params: &ListParams) -> AppResult<Page> {
        let count_rows = self.backend.query(&QueryBuilder::build_count(table)).await?;
        let total = count_rows
            .first()
            .and_then(|r| r.get("total"))
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::database("count_shape", format!("COUNT on {} returned no total", table)))?;
        let select = QueryBuilder::build_select(table, params.search.as_deref(), params.limit, params.offset);
        let data = self.backend.query(&select).await?;
        Ok(Page { data, total, limit: params.limit, offset: params.offset })
    }

    /// Ordered column descriptors for the table.
    pub async fn schema(&self, table: Option<&str>) -> AppResult<Vec<ColumnDescriptor>> {
        let table = self.registry.validate(table)?;
        let result = SchemaIntrospector::new(self.backend.as_ref()).describe(table).await;
        self.finish("schema", table, result)
    }

    /// Insert one row and return it as stored.
    pub async fn create(&self, table: Option<&str>, values: &Row) -> AppResult<Row> {
        let table = self.registry.validate(table)?;
        require_values(values)?;
        let result: AppResult<Row> = async {
            let columns = SchemaIntrospector::new(self.backend.as_ref()).describe(table).await?;
            let stmt = QueryBuilder::build_insert(table, values, &columns)?;
            let mut rows = self.backend.query(&stmt).await?;
            if rows.is_empty() {
                return Err(AppError::database("insert_returned_nothing", format!("INSERT into {} returned no row", table)));
            }
            Ok(rows.swap_remove(0))
        }
        .await;
        self.finish("create", table, result)
    }

    /// Update the row whose key currently equals `id`. The payload may change
    /// the key itself; the row is still located by the original value.
    pub async fn update(&self, table: Option<&str>, id: Option<&str>, values: &Row) -> AppResult<Row> {
        let (table, id) = self.validate_keyed(table, id)?;
        require_values(values)?;
        let result: AppResult<Row> = async {
            let columns = SchemaIntrospector::new(self.backend.as_ref()).describe(table).await?;
            let pk = PrimaryKeyResolver::new(self.backend.as_ref()).resolve_with_columns(table, Some(&columns)).await?;
            let stmt = QueryBuilder::build_update(table, values, &columns, &pk, id)?;
            let mut rows = self.backend.query(&stmt).await?;
            if rows.is_empty() {
                return Err(no_row(table, &pk.column_name, id));
            }
            Ok(rows.swap_remove(0))
        }
        .await;
        self.finish("update", table, result)
    }

    /// Delete the row whose key equals `id`. A second delete of the same id is NotFound.
    pub async fn delete(&self, table: Option<&str>, id: Option<&str>) -> AppResult<()> {
        let (table, id) = self.validate_keyed(table, id)?;
        let result: AppResult<()> = async {
            let pk = PrimaryKeyResolver::new(self.backend.as_ref()).resolve(table).await?;
            let stmt = QueryBuilder::build_delete(table, &pk, id)?;
            let affected = self.backend.execute(&stmt).await?;
            if affected == 0 {
                return Err(no_row(table, &pk.column_name, id));
            }
            Ok(())
        }
        .await;
        self.finish("delete", table, result)
    }

    fn validate_keyed<'a>(&self, table: Option<&'a str>, id: Option<&'a str>) -> AppResult<(TableName<'a>, &'a str)> {
        match (table.filter(|t| self.registry.is_allowed(t)), id) {
            (Some(t), Some(id)) => Ok((self.registry.validate(Some(t))?, id)),
            _ => Err(AppError::validation("missing_table_or_id", ID_REQUIRED_MESSAGE)),
        }
    }

    /// Terminal state of a request: log and pass the result through.
    fn finish<T>(&self, op: &'static str, table: TableName<'_>, result: AppResult<T>) -> AppResult<T> {
        match &result {
            Ok(_) if op == "list" || op == "schema" => debug!(target: "crud", op, table = %table, backend = self.backend.name(), "completed"),
            Ok(_) => info!(target: "crud", op, table = %table, backend = self.backend.name(), "completed"),
            Err(e) if e.is_client_error() => debug!(target: "crud", op, table = %table, code = e.code_str(), "rejected: {}", e.message()),
            Err(e) => error!(target: "crud", op, table = %table, code = e.code_str(), "failed: {}", e.message()),
        }
        result
    }
}

fn require_values(values: &Row) -> AppResult<()> {
    if values.is_empty() {
        return Err(AppError::validation("empty_payload", EMPTY_PAYLOAD_MESSAGE));
    }
    Ok(())
}

fn no_row(table: TableName<'_>, pk: &str, id: &str) -> AppError {
    AppError::not_found("row_not_found", format!("No row in {} where {} = {}", table, pk, id))
}

#[cfg(test)]
#[path = "crud_tests.rs"]
mod tests;
