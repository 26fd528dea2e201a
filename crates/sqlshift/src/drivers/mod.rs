//! Database driver implementations.
//!
//! One module per source family, each implementing [`SourceReader`] and a
//! [`Dialect`]:
//!
//! - [`mssql`]: SQL Server / Azure SQL (also the only target, via
//!   [`mssql::TargetWriter`])
//! - [`postgres`]: PostgreSQL sources
//! - [`mysql`]: MySQL sources
//! - [`oracle`]: Oracle sources through ODBC (feature `oracle-odbc`)
//!
//! Readers are dispatched statically through [`SourceReaderImpl`]; the
//! compiler generates a match instead of a vtable.

pub mod auth;
pub mod mssql;
pub mod mysql;
#[cfg(feature = "oracle-odbc")]
pub mod oracle;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{ConnectionConfig, Provider};
use crate::core::{Row, TableRef};
use crate::error::{MigrateError, Result};

pub use mssql::TargetWriter;

/// A column as reported by source introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine-specific type name, lowercased (`int`, `nvarchar`, `number`).
    pub data_type: String,
}

/// SQL syntax strategy for a source engine.
///
/// The engine only ever reads from sources, so the dialect surface is the
/// pagination/ordering SQL plus identifier quoting.
pub trait Dialect: Send + Sync {
    /// Dialect identifier (`mssql`, `postgres`, `mysql`, `oracle`).
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// `schema.table` with both parts quoted.
    fn qualify(&self, table: &TableRef) -> String {
        format!(
            "{}.{}",
            self.quote_ident(&table.schema),
            self.quote_ident(&table.table)
        )
    }

    /// One page of a keyset scan: rows with `batch_column` strictly greater
    /// than `after` (a pre-rendered literal), in ascending order, at most
    /// `size` rows.
    fn build_batch_query(
        &self,
        table: &TableRef,
        columns: &[String],
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> String;

    /// Full-table read in `order_by` order (batch size 0).
    fn build_full_query(&self, table: &TableRef, columns: &[String], order_by: &str) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            select_list(self, columns),
            self.qualify(table),
            self.quote_ident(order_by)
        )
    }
}

/// Comma-joined quoted column list, `*` when empty.
pub(crate) fn select_list(dialect: &(impl Dialect + ?Sized), columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Render a resume-key value as a SQL literal.
///
/// Progress artefacts persist the key as text; numbers go back in bare so
/// numeric batch columns keep numeric ordering, everything else is quoted
/// and escaped.
#[must_use]
pub fn render_key_literal(key: &str) -> String {
    if key.trim().parse::<rust_decimal::Decimal>().is_ok() {
        key.trim().to_string()
    } else {
        format!("'{}'", crate::core::escape_literal(key))
    }
}

/// Read access to a source database.
///
/// One connection, used serially; methods take `&mut self` because the
/// engine is deliberately single-threaded (resumability depends on it).
#[async_trait]
pub trait SourceReader: Send {
    /// Columns of a table in ordinal order.
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>>;

    /// The auto-generated key column, if the table has one.
    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>>;

    /// Total row count.
    async fn row_count(&mut self, table: &TableRef) -> Result<i64>;

    /// Distinct values in a column; used to warn on non-unique batch columns.
    async fn distinct_count(&mut self, table: &TableRef, column: &str) -> Result<i64>;

    /// One keyset page: up to `size` rows above `after` in `batch_column`
    /// order. `after` is a pre-rendered SQL literal.
    async fn read_batch(
        &mut self,
        table: &TableRef,
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> Result<Vec<Row>>;

    /// The whole table in `order_by` order (no paging).
    async fn read_all(&mut self, table: &TableRef, order_by: &str) -> Result<Vec<Row>>;

    /// Close the connection; errors are logged, not returned.
    async fn close(&mut self);
}

/// Static dispatch over the source driver families.
pub enum SourceReaderImpl {
    Mssql(mssql::MssqlReader),
    Postgres(postgres::PostgresReader),
    MySql(mysql::MysqlReader),
    #[cfg(feature = "oracle-odbc")]
    Oracle(oracle::OracleReader),
}

#[async_trait]
impl SourceReader for SourceReaderImpl {
    async fn list_columns(&mut self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        match self {
            Self::Mssql(r) => r.list_columns(table).await,
            Self::Postgres(r) => r.list_columns(table).await,
            Self::MySql(r) => r.list_columns(table).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.list_columns(table).await,
        }
    }

    async fn identity_column_of(&mut self, table: &TableRef) -> Result<Option<String>> {
        match self {
            Self::Mssql(r) => r.identity_column_of(table).await,
            Self::Postgres(r) => r.identity_column_of(table).await,
            Self::MySql(r) => r.identity_column_of(table).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.identity_column_of(table).await,
        }
    }

    async fn row_count(&mut self, table: &TableRef) -> Result<i64> {
        match self {
            Self::Mssql(r) => r.row_count(table).await,
            Self::Postgres(r) => r.row_count(table).await,
            Self::MySql(r) => r.row_count(table).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.row_count(table).await,
        }
    }

    async fn distinct_count(&mut self, table: &TableRef, column: &str) -> Result<i64> {
        match self {
            Self::Mssql(r) => r.distinct_count(table, column).await,
            Self::Postgres(r) => r.distinct_count(table, column).await,
            Self::MySql(r) => r.distinct_count(table, column).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.distinct_count(table, column).await,
        }
    }

    async fn read_batch(
        &mut self,
        table: &TableRef,
        batch_column: &str,
        size: usize,
        after: Option<&str>,
    ) -> Result<Vec<Row>> {
        match self {
            Self::Mssql(r) => r.read_batch(table, batch_column, size, after).await,
            Self::Postgres(r) => r.read_batch(table, batch_column, size, after).await,
            Self::MySql(r) => r.read_batch(table, batch_column, size, after).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.read_batch(table, batch_column, size, after).await,
        }
    }

    async fn read_all(&mut self, table: &TableRef, order_by: &str) -> Result<Vec<Row>> {
        match self {
            Self::Mssql(r) => r.read_all(table, order_by).await,
            Self::Postgres(r) => r.read_all(table, order_by).await,
            Self::MySql(r) => r.read_all(table, order_by).await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.read_all(table, order_by).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Mssql(r) => r.close().await,
            Self::Postgres(r) => r.close().await,
            Self::MySql(r) => r.close().await,
            #[cfg(feature = "oracle-odbc")]
            Self::Oracle(r) => r.close().await,
        }
    }
}

/// Open a source connection for the configured provider.
pub async fn open_source(
    config: &ConnectionConfig,
    query_timeout: Duration,
) -> Result<SourceReaderImpl> {
    match config.provider {
        Provider::SqlServer | Provider::AzureSql => Ok(SourceReaderImpl::Mssql(
            mssql::MssqlReader::connect(config, query_timeout).await?,
        )),
        Provider::PostgreSql => Ok(SourceReaderImpl::Postgres(
            postgres::PostgresReader::connect(config, query_timeout).await?,
        )),
        Provider::MySql => Ok(SourceReaderImpl::MySql(
            mysql::MysqlReader::connect(config, query_timeout).await?,
        )),
        #[cfg(feature = "oracle-odbc")]
        Provider::Oracle => Ok(SourceReaderImpl::Oracle(
            oracle::OracleReader::connect(config, query_timeout).await?,
        )),
        #[cfg(not(feature = "oracle-odbc"))]
        Provider::Oracle => Err(MigrateError::Config(
            "Oracle sources require the 'oracle-odbc' feature (built without it)".into(),
        )),
    }
}

/// Open the target connection (SQL Server / Azure SQL only).
pub async fn open_target(
    config: &ConnectionConfig,
    query_timeout: Duration,
) -> Result<TargetWriter> {
    if !config.provider.is_mssql_family() {
        return Err(MigrateError::Config(format!(
            "target provider must be SqlServer or AzureSql, got {}",
            config.provider
        )));
    }
    TargetWriter::connect(config, query_timeout).await
}

/// Run a database operation under the configured query timeout.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, context: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MigrateError::Timeout {
            seconds: timeout.as_secs(),
            context: context.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_key_literal() {
        assert_eq!(render_key_literal("4"), "4");
        assert_eq!(render_key_literal("4.5"), "4.5");
        assert_eq!(render_key_literal(" 42 "), "42");
        assert_eq!(render_key_literal("US"), "'US'");
        assert_eq!(render_key_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_dialect_batch_sql_per_family() {
        let table = TableRef::new("dbo", "Events");
        let cols = vec!["Id".to_string(), "Name".to_string()];

        let sql = mssql::MssqlDialect.build_batch_query(&table, &cols, "Id", 100, Some("4"));
        assert_eq!(
            sql,
            "SELECT TOP 100 [Id], [Name] FROM [dbo].[Events] WHERE [Id] > 4 ORDER BY [Id]"
        );

        let sql = postgres::PostgresDialect.build_batch_query(&table, &cols, "Id", 100, Some("4"));
        assert_eq!(
            sql,
            "SELECT \"Id\", \"Name\" FROM \"dbo\".\"Events\" WHERE \"Id\" > 4 ORDER BY \"Id\" LIMIT 100"
        );

        let sql = mysql::MysqlDialect.build_batch_query(&table, &cols, "Id", 100, Some("4"));
        assert_eq!(
            sql,
            "SELECT `Id`, `Name` FROM `dbo`.`Events` WHERE `Id` > 4 ORDER BY `Id` LIMIT 100"
        );
    }

    #[test]
    fn test_dialect_unbounded_first_page() {
        let table = TableRef::new("dbo", "Events");
        let sql = mssql::MssqlDialect.build_batch_query(&table, &[], "Id", 2, None);
        assert_eq!(sql, "SELECT TOP 2 * FROM [dbo].[Events] ORDER BY [Id]");
    }

    #[test]
    fn test_resume_page_sql_matches_contract() {
        // Scenario F: after key 4, page size 2
        let table = TableRef::new("public", "items");
        let cols = vec!["key".to_string()];
        let sql = postgres::PostgresDialect.build_batch_query(&table, &cols, "key", 2, Some("4"));
        assert_eq!(
            sql,
            "SELECT \"key\" FROM \"public\".\"items\" WHERE \"key\" > 4 ORDER BY \"key\" LIMIT 2"
        );
    }
}
