//! Error types for the migration engine.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Row-level failures (bad transform input, single-row insert rejection) are
/// *not* errors — they are captured in the RowErrors artefact and the table
/// continues. Everything here is fatal for at least the current table.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (malformed XML, missing fields, invalid enums).
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQL Server / Azure SQL error (source or target side).
    #[error("SQL Server error: {0}")]
    Mssql(#[from] tiberius::error::Error),

    /// PostgreSQL source error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MySQL source error.
    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    /// Oracle (ODBC) source error.
    #[cfg(feature = "oracle-odbc")]
    #[error("Oracle ODBC error: {0}")]
    Odbc(#[from] odbc_api::Error),

    /// Connection could not be established.
    #[error("Connection failed ({context}): {message}")]
    Connect { context: String, message: String },

    /// Authentication setup failed (credential solicitation, token fetch).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// A referenced table or column is absent at runtime.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Fatal failure scoped to one table (bulk insert, truncate, DDL).
    #[error("Table {table} failed: {message}")]
    Table { table: String, message: String },

    /// A database operation exceeded the configured query timeout.
    #[error("Query timed out after {seconds}s ({context})")]
    Timeout { seconds: u64, context: String },

    /// Status artefact could not be read or written.
    #[error("Status file error: {0}")]
    State(String),

    /// Resume was requested but no prior progress artefact exists.
    #[error("Cannot resume: {0}")]
    Resume(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML configuration parse error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connect error with context about where it occurred.
    pub fn connect(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Connect {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Table error.
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Table {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// 2 = resume impossible, 1 = everything else fatal. Success (0) never
    /// reaches this function.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Resume(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Resume("no artefact".into()).exit_code(), 2);
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 1);
        assert_eq!(MigrateError::Cancelled.exit_code(), 1);
    }

    #[test]
    fn test_table_error_display() {
        let err = MigrateError::table("dbo.Orders", "bulk insert rejected");
        assert_eq!(err.to_string(), "Table dbo.Orders failed: bulk insert rejected");
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.json");
        let err = MigrateError::Io(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error"));
        assert!(detailed.contains("missing.json"));
    }
}
