//! Resumable keyset pagination over a source table.
//!
//! Pages are read in ascending batch-column order, strictly greater than
//! the last acknowledged key. A page shorter than the requested size ends
//! the scan. Batch size 0 disables paging: the whole table arrives as one
//! page.
//!
//! The strict `>` advance means duplicate key values sitting exactly on a
//! page boundary can be skipped; the validator warns when the batch column
//! is not unique.

use crate::core::{Row, TableRef, Value};
use crate::drivers::{render_key_literal, SourceReader};
use crate::error::Result;

/// A cursor over one table's pages.
pub struct BatchCursor<'a, S: SourceReader> {
    source: &'a mut S,
    table: TableRef,
    batch_column: String,
    size: usize,
    last_key: Option<String>,
    done: bool,
}

impl<'a, S: SourceReader> BatchCursor<'a, S> {
    /// Create a cursor; `resume_key` seeds the scan past already-acknowledged
    /// rows.
    pub fn new(
        source: &'a mut S,
        table: TableRef,
        batch_column: impl Into<String>,
        size: usize,
        resume_key: Option<String>,
    ) -> Self {
        Self {
            source,
            table,
            batch_column: batch_column.into(),
            size,
            last_key: resume_key,
            done: false,
        }
    }

    /// The greatest batch-column value acknowledged so far.
    #[must_use]
    pub fn last_key(&self) -> Option<&str> {
        self.last_key.as_deref()
    }

    /// Fetch the next page; `None` once the table is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Row>>> {
        if self.done {
            return Ok(None);
        }

        if self.size == 0 {
            // Unpaged: one read covers the table
            self.done = true;
            let rows = self
                .source
                .read_all(&self.table, &self.batch_column)
                .await?;
            self.advance(&rows);
            return Ok(if rows.is_empty() { None } else { Some(rows) });
        }

        let after = self.last_key.as_deref().map(render_key_literal);
        let rows = self
            .source
            .read_batch(&self.table, &self.batch_column, self.size, after.as_deref())
            .await?;

        if rows.len() < self.size {
            self.done = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.advance(&rows);
        Ok(Some(rows))
    }

    /// Record the page's greatest key value. Pages arrive in ascending
    /// order, so the last row carries it.
    fn advance(&mut self, rows: &[Row]) {
        if let Some(last) = rows.last() {
            if let Some(key) = last.get(&self.batch_column).and_then(Value::to_text) {
                self.last_key = Some(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ColumnInfo;
    use async_trait::async_trait;

    /// In-memory source with integer keys, for cursor contract tests.
    struct FakeSource {
        keys: Vec<i64>,
        queries: Vec<String>,
    }

    impl FakeSource {
        fn new(keys: Vec<i64>) -> Self {
            Self {
                keys,
                queries: Vec::new(),
            }
        }

        fn page(&self, size: usize, after: Option<&str>) -> Vec<Row> {
            let floor: Option<i64> = after.and_then(|a| a.parse().ok());
            let limit = if size == 0 { usize::MAX } else { size };
            self.keys
                .iter()
                .filter(|k| floor.map(|f| **k > f).unwrap_or(true))
                .take(limit)
                .map(|k| {
                    let mut row = Row::new();
                    row.set("key", Value::Int(*k));
                    row
                })
                .collect()
        }
    }

    #[async_trait]
    impl SourceReader for FakeSource {
        async fn list_columns(&mut self, _table: &TableRef) -> Result<Vec<ColumnInfo>> {
            Ok(vec![ColumnInfo {
                name: "key".into(),
                data_type: "bigint".into(),
            }])
        }

        async fn identity_column_of(&mut self, _table: &TableRef) -> Result<Option<String>> {
            Ok(None)
        }

        async fn row_count(&mut self, _table: &TableRef) -> Result<i64> {
            Ok(self.keys.len() as i64)
        }

        async fn distinct_count(&mut self, _table: &TableRef, _column: &str) -> Result<i64> {
            Ok(self.keys.len() as i64)
        }

        async fn read_batch(
            &mut self,
            _table: &TableRef,
            _batch_column: &str,
            size: usize,
            after: Option<&str>,
        ) -> Result<Vec<Row>> {
            self.queries.push(format!("size={} after={:?}", size, after));
            Ok(self.page(size, after))
        }

        async fn read_all(&mut self, _table: &TableRef, _order_by: &str) -> Result<Vec<Row>> {
            self.queries.push("all".into());
            Ok(self.page(0, None))
        }

        async fn close(&mut self) {}
    }

    fn table() -> TableRef {
        TableRef::new("dbo", "Events")
    }

    fn keys_of(page: &[Row]) -> Vec<i64> {
        page.iter()
            .map(|r| match r.get("key") {
                Some(Value::Int(i)) => *i,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pages_in_order_until_short_page() {
        let mut source = FakeSource::new(vec![1, 2, 3, 4, 5]);
        let mut cursor = BatchCursor::new(&mut source, table(), "key", 2, None);

        assert_eq!(keys_of(&cursor.next_page().await.unwrap().unwrap()), vec![1, 2]);
        assert_eq!(cursor.last_key(), Some("2"));
        assert_eq!(keys_of(&cursor.next_page().await.unwrap().unwrap()), vec![3, 4]);
        assert_eq!(keys_of(&cursor.next_page().await.unwrap().unwrap()), vec![5]);
        // Short page already ended the scan
        assert!(cursor.next_page().await.unwrap().is_none());
        assert_eq!(cursor.last_key(), Some("5"));
    }

    #[tokio::test]
    async fn test_resume_reads_strictly_after_key() {
        // Scenario F: persisted lastBatchKeyValue = 4
        let mut source = FakeSource::new(vec![1, 2, 3, 4, 5]);
        let mut cursor = BatchCursor::new(&mut source, table(), "key", 2, Some("4".into()));

        assert_eq!(keys_of(&cursor.next_page().await.unwrap().unwrap()), vec![5]);
        assert!(cursor.next_page().await.unwrap().is_none());
        assert_eq!(cursor.last_key(), Some("5"));
        assert_eq!(source.queries[0], "size=2 after=Some(\"4\")");
    }

    #[tokio::test]
    async fn test_exact_page_boundary_requires_extra_read() {
        let mut source = FakeSource::new(vec![1, 2, 3, 4]);
        let mut cursor = BatchCursor::new(&mut source, table(), "key", 2, None);

        assert!(cursor.next_page().await.unwrap().is_some());
        assert!(cursor.next_page().await.unwrap().is_some());
        // Full final page: one more (empty) read detects the end
        assert!(cursor.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_size_zero_reads_everything_at_once() {
        let mut source = FakeSource::new(vec![1, 2, 3]);
        let mut cursor = BatchCursor::new(&mut source, table(), "key", 0, None);

        assert_eq!(keys_of(&cursor.next_page().await.unwrap().unwrap()), vec![1, 2, 3]);
        assert!(cursor.next_page().await.unwrap().is_none());
        assert_eq!(source.queries, vec!["all"]);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let mut source = FakeSource::new(Vec::new());
        let mut cursor = BatchCursor::new(&mut source, table(), "key", 2, None);
        assert!(cursor.next_page().await.unwrap().is_none());
    }
}
