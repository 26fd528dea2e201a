//! PostgreSQL dialect.

use crate::core::{quote_double, TableRef};
use crate::drivers::{select_list, Dialect};

/// PostgreSQL syntax: double-quote quoting, `LIMIT` for page limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_double(name)
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
            "SELECT {} FROM {}",
            select_list(self, columns),
            self.qualify(table)
        );
        if let Some(after) = after {
            sql.push_str(&format!(" WHERE {} > {}", key, after));
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT {}", key, size));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_query() {
        let sql = PostgresDialect.build_batch_query(
            &TableRef::new("public", "orders"),
            &["order_id".into()],
            "order_id",
            500,
            None,
        );
        assert_eq!(
            sql,
            "SELECT \"order_id\" FROM \"public\".\"orders\" ORDER BY \"order_id\" LIMIT 500"
        );
    }
}
