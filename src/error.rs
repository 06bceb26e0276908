//! Unified application error model and mapping helpers.
//! Every engine operation returns `AppResult`; the HTTP frontend maps the
//! variant to a status code and renders `{ "error": <message> }`.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Bad client input: missing/disallowed table, missing id, empty or malformed payload.
    Validation { code: String, message: String },
    /// A mutating statement matched zero rows.
    NotFound { code: String, message: String },
    /// Catalog lookup found no such table or columns.
    Schema { code: String, message: String },
    /// Anything the driver or pool reported.
    Database { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Schema { code, .. }
            | AppError::Database { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Schema { message, .. }
            | AppError::Database { message, .. } => message.as_str(),
        }
    }

    pub fn validation<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Validation { code: code.into(), message: msg.into() } }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn schema<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Schema { code: code.into(), message: msg.into() } }
    pub fn database<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Database { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Schema { .. } => 500,
            AppError::Database { .. } => 500,
        }
    }

    /// 4xx class: the request was wrong, not the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Validation { .. } | AppError::NotFound { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Prefer the server-reported message; fall back to the driver's rendering
        match err.as_db_error() {
            Some(db) => AppError::Database { code: db.code().code().to_string(), message: db.message().to_string() },
            None => AppError::Database { code: "driver_error".into(), message: err.to_string() },
        }
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => AppError::from(e),
            other => AppError::Database { code: "pool_error".into(), message: other.to_string() },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Database { code: "decode_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
