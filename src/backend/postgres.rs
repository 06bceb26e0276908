//! Postgres backend over a deadpool connection pool.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::{debug, info};

use crate::backend::tls::DbTls;
use crate::backend::Backend;
use crate::error::AppResult;
use crate::query::SqlStatement;
use crate::value::{row_from_json_text, Row};

/// Pool construction settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub database_url: String,
    pub max_size: usize,
    pub connect_timeout: Duration,
    /// How long a request waits for a free connection.
    pub acquire_timeout: Duration,
    pub tls: DbTls,
}

pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    /// Build the process-wide pool. Connections are opened lazily on first checkout.
    pub fn connect(settings: &PoolSettings) -> anyhow::Result<Self> {
        let mut pg: tokio_postgres::Config = settings.database_url.parse().context("invalid postgres url")?;
        pg.connect_timeout(settings.connect_timeout);
        let tls = settings.tls.resolve(&pg);
        info!(
            target: "startup",
            "postgres pool: hosts={:?}, dbname={:?}, user={:?}, max_size={}, tls={}",
            pg.get_hosts(), pg.get_dbname(), pg.get_user(), settings.max_size, tls.label()
        );
        let mut manager_cfg = ManagerConfig::default();
        manager_cfg.recycling_method = RecyclingMethod::Fast;
        let manager = match tls.connector(&mut pg).context("failed to set up postgres tls")? {
            Some(connector) => Manager::from_config(pg, connector, manager_cfg),
            None => Manager::from_config(pg, NoTls, manager_cfg),
        };
        let pool = Pool::builder(manager)
            .max_size(settings.max_size)
            .wait_timeout(Some(settings.acquire_timeout))
            .create_timeout(Some(settings.connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .context("failed to build postgres connection pool")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

fn bind_params(stmt: &SqlStatement) -> Vec<&(dyn ToSql + Sync)> {
    stmt.params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Wrap a row-returning statement so every row comes back as one JSON text
/// column. A CTE is used because INSERT/UPDATE ... RETURNING cannot appear in FROM.
pub(crate) fn json_rows_sql(sql: &str) -> String {
    format!("WITH q AS ({}) SELECT row_to_json(q)::text FROM q", sql)
}

#[async_trait]
impl Backend for PostgresBackend {
    async fn query(&self, stmt: &SqlStatement) -> AppResult<Vec<Row>> {
        let client = self.pool.get().await?;
        let sql = json_rows_sql(&stmt.sql);
        let prepared = client.prepare_cached(&sql).await?;
        let rows = client.query(&prepared, &bind_params(stmt)).await?;
        debug!(target: "crud", op = ?stmt.operation, rows = rows.len(), "query");
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let text: String = r.try_get(0)?;
            out.push(row_from_json_text(&text)?);
        }
        Ok(out)
    }

    async fn execute(&self, stmt: &SqlStatement) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let prepared = client.prepare_cached(&stmt.sql).await?;
        let affected = client.execute(&prepared, &bind_params(stmt)).await?;
        debug!(target: "crud", op = ?stmt.operation, affected, "execute");
        Ok(affected)
    }

    fn name(&self) -> &'static str { "postgres" }

    fn close(&self) {
        self.pool.close();
    }
}
