//! SQL Server / Azure SQL dialect.

use crate::core::{quote_bracket, TableRef};
use crate::drivers::{select_list, Dialect};

/// T-SQL syntax: bracket quoting, `TOP` for page limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_bracket(name)
    }

    fn build_batch_query(
        &self,
        table: &TableRef,
        columns: &[String],
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> String {
        let key = self.quote_ident(batch_column);
        let mut sql = format!(
            "SELECT TOP {} {} FROM {}",
            size,
            select_list(self, columns),
            self.qualify(table)
        );
        if let Some(after) = after {
            sql.push_str(&format!(" WHERE {} > {}", key, after));
        }
        sql.push_str(&format!(" ORDER BY {}", key));
        sql
    }
}
