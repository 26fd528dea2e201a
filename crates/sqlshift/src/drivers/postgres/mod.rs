//! PostgreSQL source driver (tokio-postgres).

pub mod dialect;
pub mod reader;

pub use dialect::PostgresDialect;
pub use reader::PostgresReader;
