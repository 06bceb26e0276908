//! Statement execution backends.
//!
//! `Backend` is the single seam between the engine and storage. The engine
//! hands it fully built `SqlStatement`s; a backend checks out whatever
//! connection it needs for the duration of one call and returns it.

pub mod memory;
pub mod postgres;
pub mod tls;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::query::SqlStatement;
use crate::value::Row;

pub use memory::MemoryBackend;
pub use postgres::{PoolSettings, PostgresBackend};
pub use tls::DbTls;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Run a row-returning statement (SELECT, catalog lookups, `RETURNING *`).
    async fn query(&self, stmt: &SqlStatement) -> AppResult<Vec<Row>>;

    /// Run a statement for its affected-row count.
    async fn execute(&self, stmt: &SqlStatement) -> AppResult<u64>;

    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Release pooled resources at shutdown.
    fn close(&self) {}
}
