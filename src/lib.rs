//!
//! masterdata
//! ----------
//! Schema-driven CRUD over a whitelisted set of Postgres master tables, served
//! as one generic HTTP surface. Table columns and primary keys are discovered
//! from the catalog on every request; no per-table code exists.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod crud;
pub mod error;
pub mod query;
pub mod registry;
pub mod server;
pub mod value;
