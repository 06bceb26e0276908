//! Table whitelist
//! ---------------
//! The only tables the engine will ever name in SQL text. Table identifiers
//! cannot be bound as parameters, so membership here is the injection gate
//! and must be checked before any statement is formatted.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::error::{AppError, AppResult};

/// Master tables of the stock deployment.
pub const DEFAULT_TABLES: &[&str] = &[
    "mast_country",
    "mast_region",
    "mast_state",
    "mast_district",
    "mast_task",
    "mast_ability",
    "mast_activity",
    "mast_aptitude",
    "mast_contact",
    "mast_data",
    "mast_industry",
    "mast_knowledge",
    "mast_lang",
    "mast_leadtype",
    "mast_outlook",
    "mast_pathway",
    "mast_pincode",
    "mast_place",
    "mast_preference",
    "mast_sector",
    "mast_skills",
    "mast_status",
    "mast_stem",
    "mast_technology",
    "mast_tools",
    "mast_trait",
    "mast_zone",
    "mast_user",
    "user_template",
];

pub const INVALID_TABLE_MESSAGE: &str = "Invalid or missing table name";

/// A table name that has passed the whitelist. Only `TableRegistry::validate`
/// hands these out, so holding one is proof the name may be formatted into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableName<'a>(&'a str);

impl<'a> TableName<'a> {
    pub fn as_str(&self) -> &'a str { self.0 }
}

impl Display for TableName<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TableRegistry {
    tables: BTreeSet<String>,
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::from_names(DEFAULT_TABLES.iter().copied())
    }
}

impl TableRegistry {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tables: names.into_iter().map(Into::into).collect() }
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.tables.contains(name)
    }

    /// Gate used by every operation: returns the table name when it is whitelisted.
    pub fn validate<'a>(&self, name: Option<&'a str>) -> AppResult<TableName<'a>> {
        match name {
            Some(t) if self.is_allowed(t) => Ok(TableName(t)),
            _ => Err(AppError::validation("invalid_table", INVALID_TABLE_MESSAGE)),
        }
    }

    /// Whitelisted names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize { self.tables.len() }
    pub fn is_empty(&self) -> bool { self.tables.is_empty() }
}
