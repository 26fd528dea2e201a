//! Run coordinator: sequences tables, owns target-side suppression state,
//! and guarantees teardown.
//!
//! Tables run strictly serially in declared order, so a child always sees
//! its parent's complete key map. Teardown (drop key maps, re-enable
//! constraints, close connections) runs on every exit; each step is
//! individually fault-tolerant.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::MigrationPlan;
use crate::drivers::{self, SourceReader, SourceReaderImpl, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::keymap;
use crate::migrator::TableMigrator;
use crate::status::{RunStatus, StatusWriter, TableStatus};
use crate::transform::{KeyMaps, SystemPorts, ValuePorts};

/// Coordinator options from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Continue the most recent run for this migration name.
    pub resume: bool,
    /// Restrict to tables whose inclusion flag is set.
    pub table_filter: bool,
    /// Directory for the progress/row-error/error-log artefacts.
    pub status_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            resume: false,
            table_filter: false,
            status_dir: PathBuf::from("status"),
        }
    }
}

/// Result of a run, printed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub tables_total: usize,
    pub tables_completed: usize,
    pub tables_skipped: usize,
    pub rows_processed: i64,
    pub row_errors: u64,
}

/// The migration run coordinator.
pub struct Orchestrator {
    plan: MigrationPlan,
    options: RunOptions,
    ports: Box<dyn ValuePorts>,
}

impl Orchestrator {
    pub fn new(plan: MigrationPlan, options: RunOptions) -> Self {
        Self {
            plan,
            options,
            ports: Box::new(SystemPorts),
        }
    }

    /// Override the ambient value ports (tests).
    pub fn with_ports(mut self, ports: Box<dyn ValuePorts>) -> Self {
        self.ports = ports;
        self
    }

    /// Execute the migration; honors `cancel` at batch boundaries.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationSummary> {
        let started_at = Utc::now();

        let jobs: Vec<_> = self
            .plan
            .tables
            .iter()
            .filter(|t| !self.options.table_filter || t.include)
            .collect();
        if jobs.is_empty() {
            return Err(MigrateError::Config(
                "no tables selected (inclusion filter removed them all)".into(),
            ));
        }

        let mut status = if self.options.resume {
            StatusWriter::resume(&self.options.status_dir, &self.plan.name)?.ok_or_else(|| {
                MigrateError::Resume(format!(
                    "no progress artefact for migration '{}' in {}",
                    self.plan.name,
                    self.options.status_dir.display()
                ))
            })?
        } else {
            StatusWriter::new(&self.options.status_dir, &self.plan, &jobs)
        };
        status.progress.status = RunStatus::InProgress;
        status.write_progress()?;
        info!(
            "run {} for migration '{}' ({} table(s))",
            status.run_id(),
            self.plan.name,
            jobs.len()
        );

        let mut source = drivers::open_source(&self.plan.source, self.plan.query_timeout()).await?;
        let mut target = match drivers::open_target(&self.plan.target, self.plan.query_timeout()).await {
            Ok(target) => target,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        let result = self
            .run_tables(&jobs, &mut source, &mut target, &mut status, &cancel)
            .await;

        let (run_status, outcome) = match result {
            Ok(counts) => (RunStatus::Completed, Ok(counts)),
            Err(e) => {
                error!("run failed: {}", e);
                status.log_entry("Error", None, e.format_detailed());
                (RunStatus::Failed, Err(e))
            }
        };

        status.progress.status = run_status;
        if let Err(e) = status.write_progress() {
            warn!("could not persist final progress: {}", e);
        }

        self.teardown(&mut source, &mut target, &mut status).await;

        let (tables_completed, tables_skipped) = match &outcome {
            Ok(counts) => *counts,
            Err(_) => (0, 0),
        };
        let summary = MigrationSummary {
            run_id: status.run_id().to_string(),
            status: run_status,
            started_at,
            completed_at: Utc::now(),
            tables_total: jobs.len(),
            tables_completed,
            tables_skipped,
            rows_processed: status.progress.tables.iter().map(|t| t.processed_rows).sum(),
            row_errors: status.row_errors.total_row_errors,
        };

        match outcome {
            Ok(_) => Ok(summary),
            Err(e) => Err(e),
        }
    }

    async fn run_tables(
        &self,
        jobs: &[&crate::config::TableJob],
        source: &mut SourceReaderImpl,
        target: &mut TargetWriter,
        status: &mut StatusWriter,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize)> {
        // Fresh ground: constraints off, stale key maps gone
        target.disable_all_constraints().await?;
        if !self.options.resume {
            keymap::drop_all(target).await?;
        }

        let mut keymaps = KeyMaps::new();
        let mut completed = 0usize;
        let mut skipped = 0usize;

        for job in jobs {
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }

            let already_done =
                status.table_entry(job).status == TableStatus::Completed;
            if already_done {
                info!("table {} already completed, skipping", job.source.qualified());
                skipped += 1;
                if job.generates_keys() {
                    // A prior run's teardown normally dropped this map; load
                    // opportunistically, else descendants fall back to their
                    // null defaults
                    match keymap::load_all(target, &job.source).await {
                        Ok(map) => {
                            keymaps.insert(job.source.qualified(), map);
                        }
                        Err(e) => {
                            warn!(
                                "key map for completed parent {} is gone ({}); descendants see an empty map",
                                job.source.qualified(),
                                e
                            );
                            status.log_entry(
                                "Warning",
                                Some(job.source.qualified()),
                                "key map unavailable after resume; keyLookup falls back to null defaults".into(),
                            );
                            keymaps.insert(job.source.qualified(), Default::default());
                        }
                    }
                }
                continue;
            }

            let migrator = TableMigrator::new(&self.plan, job, self.ports.as_ref());
            let outcome = migrator
                .run(source, target, status, &keymaps, cancel)
                .await?;
            if let Some(map) = outcome.keymap {
                keymaps.insert(job.source.qualified(), map);
            }
            completed += 1;
        }

        Ok((completed, skipped))
    }

    /// Teardown block: always runs, and a failing step never suppresses the
    /// rest.
    async fn teardown(
        &self,
        source: &mut SourceReaderImpl,
        target: &mut TargetWriter,
        status: &mut StatusWriter,
    ) {
        if let Err(e) = keymap::drop_all(target).await {
            warn!("teardown: dropping key-map tables failed: {}", e);
            status.log_entry("Warning", None, format!("teardown: drop key maps: {}", e));
        }
        if let Err(e) = target.enable_all_constraints().await {
            warn!("teardown: re-enabling constraints failed: {}", e);
            status.log_entry("Warning", None, format!("teardown: enable constraints: {}", e));
        }
        target.close().await;
        source.close().await;
        if let Err(e) = status.write_error_log() {
            warn!("teardown: writing error log failed: {}", e);
        }
        if let Err(e) = status.write_row_errors() {
            warn!("teardown: writing row errors failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMode, ConnectionConfig, Provider, TableJob, TableSettings};
    use crate::core::TableRef;
    use tempfile::TempDir;

    fn plan() -> MigrationPlan {
        MigrationPlan {
            name: "m".into(),
            batch_size: 10,
            query_timeout_seconds: 5,
            source: conn(Provider::MySql),
            target: conn(Provider::SqlServer),
            tables: vec![job(1, true), job(2, false)],
            environment: None,
            default_log_level: None,
        }
    }

    fn conn(provider: Provider) -> ConnectionConfig {
        ConnectionConfig {
            provider,
            server: "127.0.0.1".into(),
            port: None,
            database: "db".into(),
            user: Some("u".into()),
            password: Some("p".into()),
            auth: AuthMode::SqlAuth,
        }
    }

    fn job(order: u32, include: bool) -> TableJob {
        TableJob {
            order,
            include,
            source: TableRef::new("db", format!("t{}", order)),
            target: TableRef::new("dbo", format!("T{}", order)),
            batch_column: "id".into(),
            mappings: Vec::new(),
            transformations: Vec::new(),
            settings: TableSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_resume_without_artefact_exits_with_resume_error() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            plan(),
            RunOptions {
                resume: true,
                table_filter: false,
                status_dir: dir.path().to_path_buf(),
            },
        );
        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Resume(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_filter_removing_every_table_is_config_error() {
        let dir = TempDir::new().unwrap();
        let mut p = plan();
        for t in &mut p.tables {
            t.include = false;
        }
        let orchestrator = Orchestrator::new(
            p,
            RunOptions {
                resume: false,
                table_filter: true,
                status_dir: dir.path().to_path_buf(),
            },
        );
        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }
}
