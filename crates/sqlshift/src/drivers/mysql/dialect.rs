//! MySQL dialect.

use crate::core::{quote_backtick, TableRef};
use crate::drivers::{select_list, Dialect};

/// MySQL syntax: backtick quoting, `LIMIT` for page limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_backtick(name)
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
        let sql = MysqlDialect.build_batch_query(
            &TableRef::new("crm", "customers"),
            &["id".into(), "email".into()],
            "id",
            100,
            Some("42"),
        );
        assert_eq!(
            sql,
            "SELECT `id`, `email` FROM `crm`.`customers` WHERE `id` > 42 ORDER BY `id` LIMIT 100"
        );
    }
}
