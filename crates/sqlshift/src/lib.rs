//! # sqlshift
//!
//! Heterogeneous-source database migration engine targeting SQL Server /
//! Azure SQL. Streams rows out of SQL Server, Azure SQL, Oracle, MySQL, or
//! PostgreSQL, runs each row through a declarative column-mapping program,
//! and writes the result to the target with:
//!
//! - **Batch-granular resumability** via keyset pagination and persisted
//!   progress artefacts
//! - **Identity remapping** across parent→child tables through persistent
//!   key maps
//! - **Row-level error isolation** — a bad row is captured, never fatal
//! - **Dry-run validation** with before/after sample rows
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlshift::{config, Orchestrator, RunOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sqlshift::Result<()> {
//!     let plan = config::load(std::path::Path::new("master.xml"), None)?;
//!     let orchestrator = Orchestrator::new(plan, RunOptions::default());
//!     let summary = orchestrator.run(CancellationToken::new()).await?;
//!     println!("migrated {} rows", summary.rows_processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod cursor;
pub mod drivers;
pub mod error;
pub mod keymap;
pub mod migrator;
pub mod orchestrator;
pub mod status;
pub mod transform;
pub mod validate;

// Re-exports for convenient access
pub use config::{
    AuthMode, ConnectionConfig, ExistingDataAction, IdentityMode, LogLevel, MigrationPlan,
    Provider, TableJob, Transformation,
};
pub use crate::core::{Row, TableRef, Value};
pub use cursor::BatchCursor;
pub use error::{MigrateError, Result};
pub use migrator::{TableMigrator, TableOutcome};
pub use orchestrator::{MigrationSummary, Orchestrator, RunOptions};
pub use status::{ProgressReport, RunStatus, StatusWriter, TableStatus};
pub use transform::{FixedPorts, KeyMaps, SystemPorts, ValuePorts};
pub use validate::ValidationReport;
