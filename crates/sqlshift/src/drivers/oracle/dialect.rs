//! Oracle dialect.

use crate::core::{quote_double, TableRef};
use crate::drivers::{select_list, Dialect};

/// Oracle syntax: double-quote quoting, `FETCH FIRST n ROWS ONLY` for page
/// limits (12c+).
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &str {
        "oracle"
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
        sql.push_str(&format!(" ORDER BY {} FETCH FIRST {} ROWS ONLY", key, size));
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_query_uses_fetch_first() {
        let sql = OracleDialect.build_batch_query(
            &TableRef::new("SCOTT", "EMP"),
            &["EMPNO".into()],
            "EMPNO",
            50,
            Some("7900"),
        );
        assert_eq!(
            sql,
            "SELECT \"EMPNO\" FROM \"SCOTT\".\"EMP\" WHERE \"EMPNO\" > 7900 ORDER BY \"EMPNO\" FETCH FIRST 50 ROWS ONLY"
        );
    }
}
