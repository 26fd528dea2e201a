//! SQL Server / Azure SQL source reader.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::core::{Row, TableRef, Value};
use crate::drivers::mssql::{connect, MssqlClient, MssqlDialect};
use crate::drivers::{with_timeout, ColumnInfo, Dialect, SourceReader};
use crate::error::{MigrateError, Result};

/// Reads schema and rows from a SQL Server / Azure SQL source.
pub struct MssqlReader {
    client: Option<MssqlClient>,
    timeout: Duration,
    dialect: MssqlDialect,
    columns: HashMap<String, Vec<ColumnInfo>>,
}

impl MssqlReader {
    /// Connect to the source.
    pub async fn connect(config: &ConnectionConfig, timeout: Duration) -> Result<Self> {
        let client = connect(config, "source connection").await?;
        Ok(Self {
            client: Some(client),
            timeout,
            dialect: MssqlDialect,
            columns: HashMap::new(),
        })
    }

    fn client(&mut self) -> Result<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| MigrateError::connect("connection closed", "source"))
    }

    async fn columns_for(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        if let Some(cols) = self.columns.get(&table.qualified()) {
            return Ok(cols.clone());
        }
        let cols = self.fetch_columns(table).await?;
        self.columns.insert(table.qualified(), cols.clone());
        Ok(cols)
    }

    async fn fetch_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let query = r#"
            SELECT COLUMN_NAME, DATA_TYPE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION"#;

        let client = self.client()?;
        let rows = client
            .query(query, &[&table.schema.as_str(), &table.table.as_str()])
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get::<&str, _>(0).unwrap_or_default().to_string(),
                data_type: row.get::<&str, _>(1).unwrap_or_default().to_lowercase(),
            })
            .collect())
    }

    async fn query_rows(&mut self, sql: String, table: &TableRef) -> Result<Vec<Row>> {
        let cols = self.columns_for(table).await?;
        debug!("source query: {}", sql);
        let client = self.client()?;
        let rows = client
            .simple_query(&sql)
            .await?
            .into_first_result()
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                cols.iter()
                    .enumerate()
                    .map(|(idx, col)| (col.name.clone(), decode_value(row, idx, &col.data_type)))
                    .collect()
            })
            .collect())
    }

    async fn query_count(&mut self, sql: String) -> Result<i64> {
        let client = self.client()?;
        let row = client
            .simple_query(&sql)
            .await?
            .into_row()
            .await?
            .ok_or_else(|| MigrateError::Schema(format!("no result for: {}", sql)))?;
        Ok(row.get::<i64, _>(0).unwrap_or(0))
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source list columns", self.columns_for(table)).await
    }

    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source identity lookup", async {
            let query = r#"
                SELECT c.name
                FROM sys.columns c
                JOIN sys.objects o ON c.object_id = o.object_id
                JOIN sys.schemas s ON o.schema_id = s.schema_id
                WHERE s.name = @P1 AND o.name = @P2 AND c.is_identity = 1"#;
            let client = self.client()?;
            let row = client
                .query(query, &[&table.schema.as_str(), &table.table.as_str()])
                .await?
                .into_row()
                .await?;
            Ok(row.and_then(|r| r.get::<&str, _>(0).map(|s| s.to_string())))
        })
        .await
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<i64> {
        let timeout = self.timeout;
        let sql = format!("SELECT COUNT_BIG(*) FROM {}", self.dialect.qualify(table));
        with_timeout(timeout, "source row count", self.query_count(sql)).await
    }

    async fn distinct_count(&mut self, table: &TableRef, column: &str) -> Result<i64> {
        let timeout = self.timeout;
        let sql = format!(
            "SELECT COUNT_BIG(DISTINCT {}) FROM {}",
            self.dialect.quote_ident(column),
            self.dialect.qualify(table)
        );
        with_timeout(timeout, "source distinct count", self.query_count(sql)).await
    }

    async fn read_batch(
        &mut self,
        table: &TableRef,
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> Result<Vec<Row>> {
        let timeout = self.timeout;
        let columns: Vec<String> = self
            .columns_for(table)
            .await?
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let sql = self
            .dialect
            .build_batch_query(table, &columns, batch_column, size, after);
        with_timeout(timeout, "source batch read", self.query_rows(sql, table)).await
    }

    async fn read_all(&mut self, table: &TableRef, order_by: &str) -> Result<Vec<Row>> {
        let timeout = self.timeout;
        let columns: Vec<String> = self
            .columns_for(table)
            .await?
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let sql = self.dialect.build_full_query(table, &columns, order_by);
        with_timeout(timeout, "source full read", self.query_rows(sql, table)).await
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.close().await;
        }
    }
}

/// Decode one column of a tiberius row into a [`Value`] using the declared
/// column type.
fn decode_value(row: &tiberius::Row, idx: usize, data_type: &str) -> Value {
    match data_type {
        "bit" => row
            .get::<bool, _>(idx)
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "tinyint" => row
            .get::<u8, _>(idx)
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "smallint" => row
            .get::<i16, _>(idx)
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "int" => row
            .get::<i32, _>(idx)
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),
        "bigint" => row
            .get::<i64, _>(idx)
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "real" => row
            .get::<f32, _>(idx)
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),
        "float" => row
            .get::<f64, _>(idx)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "decimal" | "numeric" | "money" | "smallmoney" => row
            .get::<rust_decimal::Decimal, _>(idx)
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "uniqueidentifier" => row
            .get::<Uuid, _>(idx)
            .map(Value::Uuid)
            .unwrap_or(Value::Null),
        "datetime" | "datetime2" | "smalldatetime" => row
            .get::<NaiveDateTime, _>(idx)
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "date" => row
            .get::<NaiveDateTime, _>(idx)
            .map(|dt| Value::Date(dt.date()))
            .unwrap_or(Value::Null),
        "time" => row
            .get::<NaiveDateTime, _>(idx)
            .map(|dt| Value::Text(dt.time().format("%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .get::<&[u8], _>(idx)
            .map(|v| Value::Bytes(v.to_vec()))
            .unwrap_or(Value::Null),
        _ => row
            .get::<&str, _>(idx)
            .map(|s| Value::Text(s.to_string()))
            .unwrap_or(Value::Null),
    }
}
