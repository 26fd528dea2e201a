//! Oracle source reader over ODBC.
//!
//! Values come back as text buffers and are re-typed from the data
//! dictionary's column types. A fresh connection is taken per operation and
//! never held across an await point (ODBC handles are not `Send`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use odbc_api::{buffers::TextRowSet, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::{escape_literal, Row, TableRef, Value};
use crate::drivers::auth;
use crate::drivers::oracle::OracleDialect;
use crate::drivers::{ColumnInfo, Dialect, SourceReader};
use crate::error::{MigrateError, Result};

/// Rows fetched per ODBC buffer bind.
const FETCH_BUFFER_ROWS: usize = 5000;

/// Maximum bytes buffered per value.
const MAX_VALUE_BYTES: usize = 65536;

/// Reads schema and rows from an Oracle source.
pub struct OracleReader {
    env: Arc<Environment>,
    connection_string: String,
    dialect: OracleDialect,
}

impl OracleReader {
    /// Connect to the source (validates by opening one connection).
    pub async fn connect(config: &ConnectionConfig, _timeout: Duration) -> Result<Self> {
        let (user, password) = auth::ensure_sql_credentials(config, "source connection")?;

        let env = Environment::new().map_err(|e| {
            MigrateError::connect(
                format!(
                    "cannot create ODBC environment: {}. Is the ODBC driver manager installed?",
                    e
                ),
                "source connection",
            )
        })?;

        let connection_string = format!(
            "Driver={{Oracle ODBC Driver}};Dbq=//{}:{}/{};Uid={};Pwd={};",
            config.server,
            config.port(),
            config.database,
            user,
            password
        );

        {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| MigrateError::connect(e.to_string(), "source connection"))?;
            drop(conn);
        }

        info!(
            "Connected to Oracle {}:{}/{}",
            config.server,
            config.port(),
            config.database
        );

        Ok(Self {
            env: Arc::new(env),
            connection_string,
            dialect: OracleDialect,
        })
    }

    fn query_text_rows(&self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        debug!("source query: {}", sql);
        let conn = self
            .env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())?;

        let mut result = Vec::new();
        if let Some(mut cursor) = conn.execute(sql, ())? {
            let num_cols = cursor.num_result_cols()? as usize;
            let mut buffers =
                TextRowSet::for_cursor(FETCH_BUFFER_ROWS, &mut cursor, Some(MAX_VALUE_BYTES))?;
            let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

            while let Some(batch) = row_cursor.fetch()? {
                for row_idx in 0..batch.num_rows() {
                    let mut row = Vec::with_capacity(num_cols);
                    for col_idx in 0..num_cols {
                        row.push(
                            batch
                                .at(col_idx, row_idx)
                                .map(|bytes| String::from_utf8_lossy(bytes).to_string()),
                        );
                    }
                    result.push(row);
                }
            }
        }
        Ok(result)
    }

    fn fetch_columns(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        let sql = format!(
            "SELECT column_name, data_type FROM all_tab_columns \
             WHERE owner = '{}' AND table_name = '{}' ORDER BY column_id",
            escape_literal(&table.schema.to_uppercase()),
            escape_literal(&table.table.to_uppercase())
        );
        Ok(self
            .query_text_rows(&sql)?
            .into_iter()
            .map(|row| ColumnInfo {
                name: row.first().cloned().flatten().unwrap_or_default(),
                data_type: row
                    .get(1)
                    .cloned()
                    .flatten()
                    .unwrap_or_default()
                    .to_lowercase(),
            })
            .collect())
    }

    fn scalar_i64(&self, sql: &str) -> Result<i64> {
        Ok(self
            .query_text_rows(sql)?
            .first()
            .and_then(|r| r.first().cloned().flatten())
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0))
    }

    fn typed_rows(&self, sql: &str, columns: &[ColumnInfo]) -> Result<Vec<Row>> {
        Ok(self
            .query_text_rows(sql)?
            .into_iter()
            .map(|raw| {
                columns
                    .iter()
                    .zip(raw)
                    .map(|(col, text)| (col.name.clone(), decode_text(text, &col.data_type)))
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl SourceReader for OracleReader {
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        self.fetch_columns(table)
    }

    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>> {
        let sql = format!(
            "SELECT column_name FROM all_tab_columns \
             WHERE owner = '{}' AND table_name = '{}' AND identity_column = 'YES'",
            escape_literal(&table.schema.to_uppercase()),
            escape_literal(&table.table.to_uppercase())
        );
        Ok(self
            .query_text_rows(&sql)?
            .first()
            .and_then(|r| r.first().cloned().flatten()))
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.qualify(table));
        self.scalar_i64(&sql)
    }

    async fn distinct_count(&mut self, table: &TableRef, column: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(DISTINCT {}) FROM {}",
            self.dialect.quote_ident(column),
            self.dialect.qualify(table)
        );
        self.scalar_i64(&sql)
    }

    async fn read_batch(
        &mut self,
        table: &TableRef,
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> Result<Vec<Row>> {
        let columns = self.fetch_columns(table)?;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let sql = self
            .dialect
            .build_batch_query(table, &names, batch_column, size, after);
        self.typed_rows(&sql, &columns)
    }

    async fn read_all(&mut self, table: &TableRef, order_by: &str) -> Result<Vec<Row>> {
        let columns = self.fetch_columns(table)?;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let sql = self.dialect.build_full_query(table, &names, order_by);
        self.typed_rows(&sql, &columns)
    }

    async fn close(&mut self) {
        // Connections are per-operation; the environment drops with self
    }
}

/// Re-type a text value from the ODBC buffer using the dictionary type.
fn decode_text(text: Option<String>, data_type: &str) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    match data_type {
        "number" => {
            if let Ok(i) = text.trim().parse::<i64>() {
                Value::Int(i)
            } else if let Ok(d) = text.trim().parse::<rust_decimal::Decimal>() {
                Value::Decimal(d)
            } else {
                Value::Text(text)
            }
        }
        "binary_float" | "binary_double" | "float" => text
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Text(text)),
        t if t.starts_with("timestamp") || t == "date" => {
            crate::transform::convert::parse_datetime(&text, None)
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f").ok()
                })
                .map(Value::DateTime)
                .unwrap_or(Value::Text(text))
        }
        _ => Value::Text(text),
    }
}
