//! Column discovery for a whitelisted table.

use tracing::debug;

use crate::backend::Backend;
use crate::catalog::ColumnDescriptor;
use crate::error::{AppError, AppResult};
use crate::query::{Operation, SqlStatement};
use crate::registry::TableName;
use crate::value::Value;

// The name is passed through `quote_ident` before `to_regclass`, so it resolves
// exactly like the quoted identifier in the data statements (case kept, then
// search_path). A missing relation yields NULL and so zero rows. Primary-key membership is an EXISTS so a column that sits
// in several constraints is still reported once.
const DESCRIBE_SQL: &str = "\
SELECT c.column_name, c.data_type, c.udt_schema, c.udt_name, \
c.character_maximum_length, c.numeric_precision, c.numeric_scale, \
(c.is_nullable = 'YES') AS is_nullable, c.column_default, \
(c.is_identity = 'YES') AS is_identity, \
EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
JOIN information_schema.key_column_usage k \
ON k.constraint_schema = tc.constraint_schema AND k.constraint_name = tc.constraint_name \
WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = c.table_schema \
AND tc.table_name = c.table_name AND k.column_name = c.column_name) AS is_primary_key, \
c.ordinal_position \
FROM information_schema.columns c \
JOIN pg_catalog.pg_class cl ON cl.oid = to_regclass(quote_ident($1)) \
JOIN pg_catalog.pg_namespace n ON n.oid = cl.relnamespace \
WHERE c.table_schema = n.nspname AND c.table_name = cl.relname \
ORDER BY c.ordinal_position";

pub struct SchemaIntrospector<'b> {
    backend: &'b dyn Backend,
}

impl<'b> SchemaIntrospector<'b> {
    pub fn new(backend: &'b dyn Backend) -> Self {
        Self { backend }
    }

    pub fn statement(table: TableName<'_>) -> SqlStatement {
        SqlStatement::new(
            DESCRIBE_SQL,
            vec![Value::Text(table.as_str().to_string())],
            Operation::DescribeColumns { table: table.as_str().to_string() },
        )
    }

    /// Ordered column list. A table the catalog does not know is a `Schema` error.
    pub async fn describe(&self, table: TableName<'_>) -> AppResult<Vec<ColumnDescriptor>> {
        let rows = self.backend.query(&Self::statement(table)).await?;
        if rows.is_empty() {
            return Err(AppError::schema(
                "unknown_table",
                format!("No columns found for table {}", table),
            ));
        }
        let columns = rows.iter().map(ColumnDescriptor::from_catalog_row).collect::<AppResult<Vec<_>>>()?;
        debug!(target: "catalog", table = %table, columns = columns.len(), "described table");
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TableRegistry;

    #[test]
    fn table_name_is_resolved_as_quoted_identifier() {
        let reg = TableRegistry::from_names(["MastRegion"]);
        let stmt = SchemaIntrospector::statement(reg.validate(Some("MastRegion")).unwrap());
        assert!(stmt.sql.contains("to_regclass(quote_ident($1))"));
        assert!(!stmt.sql.contains("to_regclass($1)"));
        assert_eq!(stmt.params, vec![Value::Text("MastRegion".into())]);
    }
}
