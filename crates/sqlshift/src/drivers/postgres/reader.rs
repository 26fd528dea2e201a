//! PostgreSQL source reader.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::{Row, TableRef, Value};
use crate::drivers::auth;
use crate::drivers::postgres::PostgresDialect;
use crate::drivers::{with_timeout, ColumnInfo, Dialect, SourceReader};
use crate::error::{MigrateError, Result};

/// Reads schema and rows from a PostgreSQL source.
pub struct PostgresReader {
    client: Client,
    timeout: Duration,
    dialect: PostgresDialect,
}

impl PostgresReader {
    /// Connect to the source.
    pub async fn connect(config: &ConnectionConfig, timeout: Duration) -> Result<Self> {
        let (user, password) = auth::ensure_sql_credentials(config, "source connection")?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.server);
        pg.port(config.port());
        pg.dbname(&config.database);
        pg.user(&user);
        pg.password(&password);

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| MigrateError::connect(e.to_string(), "source connection"))?;

        // The connection object drives the socket; it lives in its own task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection task ended: {}", e);
            }
        });

        client.simple_query("SELECT 1").await?;
        info!(
            "Connected to PostgreSql {}:{}/{}",
            config.server,
            config.port(),
            config.database
        );

        Ok(Self {
            client,
            timeout,
            dialect: PostgresDialect,
        })
    }

    async fn query_rows(&mut self, sql: String) -> Result<Vec<Row>> {
        debug!("source query: {}", sql);
        let rows = self.client.query(sql.as_str(), &[]).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn query_count(&mut self, sql: String) -> Result<i64> {
        let row = self.client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get::<_, i64>(0))
    }
}

#[async_trait]
impl SourceReader for PostgresReader {
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source list columns", async {
            let query = r#"
                SELECT column_name, data_type
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position"#;
            let rows = self
                .client
                .query(query, &[&table.schema, &table.table])
                .await?;
            Ok(rows
                .iter()
                .map(|row| ColumnInfo {
                    name: row.get::<_, String>(0),
                    data_type: row.get::<_, String>(1).to_lowercase(),
                })
                .collect())
        })
        .await
    }

    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>> {
        let timeout = self.timeout;
        with_timeout(timeout, "source identity lookup", async {
            let query = r#"
                SELECT column_name
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                  AND (is_identity = 'YES' OR column_default LIKE 'nextval(%')
                ORDER BY ordinal_position
                LIMIT 1"#;
            let rows = self
                .client
                .query(query, &[&table.schema, &table.table])
                .await?;
            Ok(rows.first().map(|r| r.get::<_, String>(0)))
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
        // Dropping the client closes the connection task
    }
}

fn decode_row(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.name().to_string(), decode_value(row, idx, col.type_())))
        .collect()
}

fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => opt(row.try_get::<_, Option<bool>>(idx)).map(Value::Bool),
        Type::INT2 => opt(row.try_get::<_, Option<i16>>(idx)).map(|v| Value::Int(v as i64)),
        Type::INT4 => opt(row.try_get::<_, Option<i32>>(idx)).map(|v| Value::Int(v as i64)),
        Type::INT8 => opt(row.try_get::<_, Option<i64>>(idx)).map(Value::Int),
        Type::FLOAT4 => opt(row.try_get::<_, Option<f32>>(idx)).map(|v| Value::Float(v as f64)),
        Type::FLOAT8 => opt(row.try_get::<_, Option<f64>>(idx)).map(Value::Float),
        Type::NUMERIC => {
            opt(row.try_get::<_, Option<rust_decimal::Decimal>>(idx)).map(Value::Decimal)
        }
        Type::UUID => opt(row.try_get::<_, Option<uuid::Uuid>>(idx)).map(Value::Uuid),
        Type::TIMESTAMP => opt(row.try_get::<_, Option<NaiveDateTime>>(idx)).map(Value::DateTime),
        Type::TIMESTAMPTZ => opt(row.try_get::<_, Option<DateTime<Utc>>>(idx))
            .map(|v| Value::DateTime(v.naive_utc())),
        Type::DATE => opt(row.try_get::<_, Option<NaiveDate>>(idx)).map(Value::Date),
        Type::BYTEA => opt(row.try_get::<_, Option<Vec<u8>>>(idx)).map(Value::Bytes),
        _ => opt(row.try_get::<_, Option<String>>(idx)).map(Value::Text),
    }
    .unwrap_or(Value::Null)
}

fn opt<T>(result: std::result::Result<Option<T>, tokio_postgres::Error>) -> Option<T> {
    result.ok().flatten()
}
