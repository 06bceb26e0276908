//!
//! Server configuration
//! --------------------
//! Resolved once at startup from command-line flags and environment variables.
//! Flags override the environment, which overrides the built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{DbTls, PoolSettings};
use crate::registry::TableRegistry;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_POOL_SIZE: usize = 16;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 5000;

pub const USAGE: &str = "masterdata server\n\nUSAGE:\n  masterdata_server [--host ADDR] [--http-port N] [--database-url URL] [--pool-size N]\n                    [--connect-timeout-ms N] [--acquire-timeout-ms N] [--db-tls MODE] [--db-ca-file PATH]\n                    [--tables a,b,c] [--in-memory]\n\nOPTIONS:\n  --host ADDR               Bind address (env: MASTERDATA_HTTP_HOST, default 0.0.0.0)\n  --http-port N             HTTP port (env: MASTERDATA_HTTP_PORT, default 3000)\n  --database-url URL        Postgres URL (env: MASTERDATA_DATABASE_URL or DATABASE_URL)\n  --pool-size N             Max pooled connections (env: MASTERDATA_POOL_SIZE, default 16)\n  --connect-timeout-ms N    Connect timeout (env: MASTERDATA_CONNECT_TIMEOUT_MS, default 5000)\n  --acquire-timeout-ms N    Pool checkout timeout (env: MASTERDATA_ACQUIRE_TIMEOUT_MS, default 5000)\n  --db-tls MODE             auto|disable|require|verify (env: MASTERDATA_DB_TLS, default auto: follow sslmode in the URL)\n  --db-ca-file PATH         PEM CA bundle for verify mode (env: MASTERDATA_DB_CA_FILE)\n  --tables a,b,c            Override the table whitelist (env: MASTERDATA_TABLES)\n  --in-memory [bool]        Serve a seeded in-process demo table instead of Postgres (env: MASTERDATA_IN_MEMORY)\n  --help                    Print this message\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
    #[error("{flag} expects a value")]
    MissingValue { flag: String },
    #[error("invalid table name in whitelist override: {0:?}")]
    InvalidTableName(String),
    #[error("table whitelist override is empty")]
    EmptyTableList,
    #[error("--db-tls verify needs a CA bundle: pass --db-ca-file or set MASTERDATA_DB_CA_FILE")]
    MissingCaFile,
    #[error("no database URL: pass --database-url, set MASTERDATA_DATABASE_URL or DATABASE_URL, or use --in-memory")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_host: String,
    pub http_port: u16,
    pub database_url: Option<String>,
    pub pool_max_size: usize,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    pub db_tls: DbTls,
    /// `None` means the stock whitelist.
    pub tables: Option<Vec<String>>,
    pub in_memory: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            database_url: None,
            pool_max_size: DEFAULT_POOL_SIZE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
            db_tls: DbTls::Auto,
            tables: None,
            in_memory: false,
        }
    }
}

impl ServerConfig {
    /// Read the process arguments and environment.
    pub fn from_env_and_args() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |name| std::env::var(name).ok())
    }

    /// Resolve against explicit sources; `env` looks up a variable by name.
    pub fn from_sources<F>(args: &[String], env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let http_host = arg_value(args, "--host")?
            .or_else(|| env("MASTERDATA_HTTP_HOST"))
            .unwrap_or(defaults.http_host);
        let http_port = match arg_value(args, "--http-port")? {
            Some(v) => parse_number("--http-port", &v)?,
            None => parse_env_number(&env, "MASTERDATA_HTTP_PORT")?.unwrap_or(defaults.http_port),
        };
        let database_url = arg_value(args, "--database-url")?
            .or_else(|| env("MASTERDATA_DATABASE_URL"))
            .or_else(|| env("DATABASE_URL"))
            .filter(|s| !s.trim().is_empty());
        let pool_max_size = match arg_value(args, "--pool-size")? {
            Some(v) => parse_number("--pool-size", &v)?,
            None => parse_env_number(&env, "MASTERDATA_POOL_SIZE")?.unwrap_or(defaults.pool_max_size),
        };
        if pool_max_size == 0 {
            return Err(ConfigError::InvalidValue { name: "pool size".into(), value: "0".into() });
        }
        let connect_timeout_ms = match arg_value(args, "--connect-timeout-ms")? {
            Some(v) => parse_number("--connect-timeout-ms", &v)?,
            None => parse_env_number(&env, "MASTERDATA_CONNECT_TIMEOUT_MS")?.unwrap_or(defaults.connect_timeout_ms),
        };
        let acquire_timeout_ms = match arg_value(args, "--acquire-timeout-ms")? {
            Some(v) => parse_number("--acquire-timeout-ms", &v)?,
            None => parse_env_number(&env, "MASTERDATA_ACQUIRE_TIMEOUT_MS")?.unwrap_or(defaults.acquire_timeout_ms),
        };
        let tls_mode = arg_value(args, "--db-tls")?.or_else(|| env("MASTERDATA_DB_TLS"));
        let ca_file = arg_value(args, "--db-ca-file")?
            .or_else(|| env("MASTERDATA_DB_CA_FILE"))
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let db_tls = parse_db_tls(tls_mode.as_deref(), ca_file)?;
        let tables = match arg_value(args, "--tables")?.or_else(|| env("MASTERDATA_TABLES")) {
            Some(list) => Some(parse_table_list(&list)?),
            None => None,
        };
        let in_memory = match parse_bool_arg(args, "--in-memory") {
            Some(b) => b,
            None => match env("MASTERDATA_IN_MEMORY") {
                Some(v) => parse_bool(&v).ok_or(ConfigError::InvalidValue { name: "MASTERDATA_IN_MEMORY".into(), value: v })?,
                None => defaults.in_memory,
            },
        };

        if !in_memory && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        Ok(Self { http_host, http_port, database_url, pool_max_size, connect_timeout_ms, acquire_timeout_ms, db_tls, tables, in_memory })
    }

    pub fn registry(&self) -> TableRegistry {
        match &self.tables {
            Some(names) => TableRegistry::from_names(names.iter().cloned()),
            None => TableRegistry::default(),
        }
    }

    pub fn pool_settings(&self) -> Option<PoolSettings> {
        self.database_url.as_ref().map(|url| PoolSettings {
            database_url: url.clone(),
            max_size: self.pool_max_size,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            tls: self.db_tls.clone(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn arg_value(args: &[String], flag: &str) -> Result<Option<String>, ConfigError> {
    match args.iter().position(|a| a == flag) {
        Some(i) => match args.get(i + 1) {
            Some(v) if !v.starts_with("--") => Ok(Some(v.clone())),
            _ => Err(ConfigError::MissingValue { flag: flag.to_string() }),
        },
        None => Ok(None),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue { name: name.to_string(), value: value.to_string() })
}

fn parse_env_number<T, F>(env: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    env(name).map(|v| parse_number(name, &v)).transpose()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Presence enables; an explicit boolean token may follow.
fn parse_bool_arg(args: &[String], flag: &str) -> Option<bool> {
    let i = args.iter().position(|a| a == flag)?;
    match args.get(i + 1) {
        Some(next) if !next.starts_with('-') => Some(parse_bool(next).unwrap_or(true)),
        _ => Some(true),
    }
}

/// A CA bundle without an explicit mode means verify.
fn parse_db_tls(mode: Option<&str>, ca_file: Option<PathBuf>) -> Result<DbTls, ConfigError> {
    let mode = mode.map(|m| m.trim().to_lowercase());
    match (mode.as_deref(), ca_file) {
        (None | Some("auto"), None) => Ok(DbTls::Auto),
        (None | Some("auto") | Some("verify") | Some("verify-full"), Some(ca_file)) => Ok(DbTls::Verify { ca_file }),
        (Some("verify") | Some("verify-full"), None) => Err(ConfigError::MissingCaFile),
        (Some("disable") | Some("off"), _) => Ok(DbTls::Disable),
        (Some("require") | Some("on"), _) => Ok(DbTls::Require),
        (Some(other), _) => Err(ConfigError::InvalidValue { name: "--db-tls".into(), value: other.to_string() }),
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn parse_table_list(list: &str) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if is_plain_identifier(s) { Ok(s.to_string()) } else { Err(ConfigError::InvalidTableName(s.to_string())) })
        .collect::<Result<_, _>>()?;
    if names.is_empty() {
        return Err(ConfigError::EmptyTableList);
    }
    Ok(names)
}
