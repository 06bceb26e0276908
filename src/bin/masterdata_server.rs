//!
//! masterdata server binary
//! ------------------------
//! Command-line entry point. Configuration comes from CLI flags and environment
//! variables; see `--help`.

use anyhow::{Context, Result};
use masterdata::config::{has_flag, ServerConfig, USAGE};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = ServerConfig::from_env_and_args().context("invalid configuration")?;
    tracing::info!(
        target: "startup",
        "masterdata starting: http={}, pool_size={}, in_memory={}",
        config.bind_addr(), config.pool_max_size, config.in_memory
    );
    masterdata::server::run_with_config(config).await
}
