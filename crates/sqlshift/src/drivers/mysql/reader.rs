//! MySQL source reader.
//!
//! Uses SQLx with a single-connection pool; the engine reads serially.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row as _, TypeInfo};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::{Row, TableRef, Value};
use crate::drivers::auth;
use crate::drivers::mysql::MysqlDialect;
use crate::drivers::{with_timeout, ColumnInfo, Dialect, SourceReader};
use crate::error::{MigrateError, Result};

/// Connection acquire timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads schema and rows from a MySQL source.
pub struct MysqlReader {
    pool: MySqlPool,
    timeout: Duration,
    dialect: MysqlDialect,
}

impl MysqlReader {
    /// Connect to the source.
    pub async fn connect(config: &ConnectionConfig, timeout: Duration) -> Result<Self> {
        let (user, password) = auth::ensure_sql_credentials(config, "source connection")?;

        let options = MySqlConnectOptions::new()
            .host(&config.server)
            .port(config.port())
            .database(&config.database)
            .username(&user)
            .password(&password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connect(e.to_string(), "source connection"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connect(e.to_string(), "source connection"))?;

        info!(
            "Connected to MySql {}:{}/{}",
            config.server,
            config.port(),
            config.database
        );

        Ok(Self {
            pool,
            timeout,
            dialect: MysqlDialect,
        })
    }

    async fn query_rows(&self, sql: String) -> Result<Vec<Row>> {
        debug!("source query: {}", sql);
        let rows = sqlx::query(sql.as_str()).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn query_count(&self, sql: String) -> Result<i64> {
        let row = sqlx::query(sql.as_str()).fetch_one(&self.pool).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source list columns", async {
            let query = r#"
                SELECT CAST(COLUMN_NAME AS CHAR(255)) AS name,
                       CAST(DATA_TYPE AS CHAR(255)) AS data_type
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION"#;
            let rows = sqlx::query(query)
                .bind(&table.schema)
                .bind(&table.table)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .iter()
                .map(|row| ColumnInfo {
                    name: row.try_get::<String, _>(0).unwrap_or_default(),
                    data_type: row
                        .try_get::<String, _>(1)
                        .unwrap_or_default()
                        .to_lowercase(),
                })
                .collect())
        })
        .await
    }

    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source identity lookup", async {
            let query = r#"
                SELECT CAST(COLUMN_NAME AS CHAR(255))
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                  AND EXTRA LIKE '%auto_increment%'
                LIMIT 1"#;
            let rows = sqlx::query(query)
                .bind(&table.schema)
                .bind(&table.table)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .first()
                .and_then(|r| r.try_get::<String, _>(0).ok()))
        })
        .await
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.qualify(table));
        let timeout = self.timeout;
        with_timeout(timeout, "source row count", self.query_count(sql)).await
    }

    async fn distinct_count(&mut self, table: &TableRef, column: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT {}) FROM {}",
            self.dialect.quote_ident(column),
            self.dialect.qualify(table)
        );
        let timeout = self.timeout;
        with_timeout(timeout, "source distinct count", self.query_count(sql)).await
    }

    async fn read_batch(
        &mut self,
        table: &TableRef,
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> Result<Vec<Row>> {
        let sql = self
            .dialect
            .build_batch_query(table, &[], batch_column, size, after);
        let timeout = self.timeout;
        with_timeout(timeout, "source batch read", self.query_rows(sql)).await
    }

    async fn read_all(&mut self, table: &TableRef, order_by: &str) -> Result<Vec<Row>> {
        let sql = self.dialect.build_full_query(table, &[], order_by);
        let timeout = self.timeout;
        with_timeout(timeout, "source full read", self.query_rows(sql)).await
    }

    async fn close(&mut self) {
        self.pool.close().await;
    }
}

fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name().to_uppercase();
            (col.name().to_string(), decode_value(row, idx, &type_name))
        })
        .collect()
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR"
        | "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "INT UNSIGNED" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Decimal(rust_decimal::Decimal::from(v)))
            .unwrap_or(Value::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "DECIMAL" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Decimal)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" | "BINARY" => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}
