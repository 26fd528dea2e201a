//! Status artefacts: Progress, RowErrors, ErrorLog.
//!
//! Three JSON files per run, rewritten wholesale (temp file + rename) after
//! every meaningful state change so external observers — the dashboard
//! watches these — always see a consistent snapshot. Filenames follow
//! `sqlshift_<migrationName>_<yyyyMMdd_HHmmss>_<kind>.json`; the timestamp
//! doubles as the run id, and a resumed run keeps writing the same files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{MigrationPlan, TableJob};
use crate::error::{MigrateError, Result};

/// Tool name used in artefact filenames.
pub const TOOL_NAME: &str = "sqlshift";

/// ISO-8601 with seconds precision; spec'd for every artefact timestamp.
pub(crate) mod iso_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&text, FORMAT)
            .map(|n| n.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

/// Per-table status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// The Progress artefact; also the engine's persisted run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub migration_name: String,
    #[serde(with = "iso_seconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "iso_seconds")]
    pub last_updated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub tables: Vec<TableProgress>,
}

/// Per-table progress row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableProgress {
    pub source_table: String,
    pub target_table: String,
    pub status: TableStatus,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub last_batch_key_value: Option<String>,
}

impl TableProgress {
    /// Advance progress; both fields are monotonic, a stale update never
    /// moves them backwards.
    pub fn advance(&mut self, processed_rows: i64, last_batch_key_value: Option<String>) {
        self.processed_rows = self.processed_rows.max(processed_rows);
        if last_batch_key_value.is_some() {
            self.last_batch_key_value = last_batch_key_value;
        }
    }
}

/// The RowErrors artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowErrorReport {
    pub migration_name: String,
    pub migration_run_id: String,
    #[serde(with = "iso_seconds")]
    pub generated_at: DateTime<Utc>,
    pub total_row_errors: u64,
    pub tables: Vec<TableRowErrors>,
}

/// Row errors grouped by table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRowErrors {
    pub source_table: String,
    pub target_table: String,
    pub error_count: u64,
    pub rows: Vec<RowErrorEntry>,
}

/// One captured row failure, with the full source snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowErrorEntry {
    pub source_key_value: Option<String>,
    #[serde(with = "iso_seconds")]
    pub error_timestamp: DateTime<Utc>,
    pub error_message: String,
    pub source_data: serde_json::Value,
}

/// The ErrorLog artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogReport {
    pub migration_name: String,
    pub migration_run_id: String,
    #[serde(with = "iso_seconds")]
    pub generated_at: DateTime<Utc>,
    pub total_entries: u64,
    pub entries: Vec<ErrorLogEntry>,
}

/// One log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    #[serde(with = "iso_seconds")]
    pub timestamp: DateTime<Utc>,
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub message: String,
}

/// Owns the three artefacts for one run and rewrites them on demand.
pub struct StatusWriter {
    dir: PathBuf,
    run_id: String,
    pub progress: ProgressReport,
    pub row_errors: RowErrorReport,
    pub error_log: ErrorLogReport,
}

impl StatusWriter {
    /// Start artefacts for a fresh run over the selected tables.
    pub fn new(dir: &Path, plan: &MigrationPlan, tables: &[&TableJob]) -> Self {
        let now = Utc::now();
        let run_id = now.format("%Y%m%d_%H%M%S").to_string();
        let progress = ProgressReport {
            migration_name: plan.name.clone(),
            started_at: now,
            last_updated_at: now,
            status: RunStatus::InProgress,
            tables: tables
                .iter()
                .map(|job| TableProgress {
                    source_table: job.source.qualified(),
                    target_table: job.target.qualified(),
                    status: TableStatus::Pending,
                    total_rows: 0,
                    processed_rows: 0,
                    last_batch_key_value: None,
                })
                .collect(),
        };
        let row_errors = RowErrorReport {
            migration_name: plan.name.clone(),
            migration_run_id: run_id.clone(),
            generated_at: now,
            total_row_errors: 0,
            tables: Vec::new(),
        };
        let error_log = ErrorLogReport {
            migration_name: plan.name.clone(),
            migration_run_id: run_id.clone(),
            generated_at: now,
            total_entries: 0,
            entries: Vec::new(),
        };
        Self {
            dir: dir.to_path_buf(),
            run_id,
            progress,
            row_errors,
            error_log,
        }
    }

    /// Reattach to the most recent run for a migration name; `Ok(None)` when
    /// no progress artefact exists.
    pub fn resume(dir: &Path, migration_name: &str) -> Result<Option<Self>> {
        let Some(run_id) = latest_run_id(dir, migration_name)? else {
            return Ok(None);
        };

        let progress_path = artefact_path(dir, migration_name, &run_id, "progress");
        let progress: ProgressReport = read_json(&progress_path)?;

        let row_errors_path = artefact_path(dir, migration_name, &run_id, "rowerrors");
        let row_errors = if row_errors_path.exists() {
            read_json(&row_errors_path)?
        } else {
            RowErrorReport {
                migration_name: migration_name.to_string(),
                migration_run_id: run_id.clone(),
                generated_at: Utc::now(),
                total_row_errors: 0,
                tables: Vec::new(),
            }
        };

        let error_log_path = artefact_path(dir, migration_name, &run_id, "errorlog");
        let error_log = if error_log_path.exists() {
            read_json(&error_log_path)?
        } else {
            ErrorLogReport {
                migration_name: migration_name.to_string(),
                migration_run_id: run_id.clone(),
                generated_at: Utc::now(),
                total_entries: 0,
                entries: Vec::new(),
            }
        };

        Ok(Some(Self {
            dir: dir.to_path_buf(),
            run_id,
            progress,
            row_errors,
            error_log,
        }))
    }

    /// The run identifier (filename timestamp).
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Progress entry for a table, creating it when a resumed plan gained
    /// tables the original run never saw.
    pub fn table_entry(&mut self, job: &TableJob) -> &mut TableProgress {
        let source = job.source.qualified();
        let idx = match self
            .progress
            .tables
            .iter()
            .position(|t| t.source_table == source)
        {
            Some(idx) => idx,
            None => {
                self.progress.tables.push(TableProgress {
                    source_table: source,
                    target_table: job.target.qualified(),
                    status: TableStatus::Pending,
                    total_rows: 0,
                    processed_rows: 0,
                    last_batch_key_value: None,
                });
                self.progress.tables.len() - 1
            }
        };
        &mut self.progress.tables[idx]
    }

    /// Capture a row failure with its source snapshot.
    pub fn record_row_error(
        &mut self,
        job: &TableJob,
        source_key_value: Option<String>,
        error_message: String,
        source_data: serde_json::Value,
    ) {
        let source = job.source.qualified();
        let table = match self
            .row_errors
            .tables
            .iter()
            .position(|t| t.source_table == source)
        {
            Some(idx) => &mut self.row_errors.tables[idx],
            None => {
                self.row_errors.tables.push(TableRowErrors {
                    source_table: source,
                    target_table: job.target.qualified(),
                    error_count: 0,
                    rows: Vec::new(),
                });
                self.row_errors.tables.last_mut().expect("just pushed")
            }
        };
        table.error_count += 1;
        table.rows.push(RowErrorEntry {
            source_key_value,
            error_timestamp: Utc::now(),
            error_message,
            source_data,
        });
        self.row_errors.total_row_errors += 1;
    }

    /// Append an error-log entry.
    pub fn log_entry(&mut self, level: &str, table: Option<String>, message: String) {
        self.error_log.entries.push(ErrorLogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            table,
            message,
        });
        self.error_log.total_entries += 1;
    }

    /// Rewrite the Progress artefact.
    pub fn write_progress(&mut self) -> Result<()> {
        self.progress.last_updated_at = Utc::now();
        let path = self.path("progress");
        write_json(&path, &self.progress)
    }

    /// Rewrite the RowErrors artefact.
    pub fn write_row_errors(&mut self) -> Result<()> {
        self.row_errors.generated_at = Utc::now();
        let path = self.path("rowerrors");
        write_json(&path, &self.row_errors)
    }

    /// Rewrite the ErrorLog artefact.
    pub fn write_error_log(&mut self) -> Result<()> {
        self.error_log.generated_at = Utc::now();
        let path = self.path("errorlog");
        write_json(&path, &self.error_log)
    }

    fn path(&self, kind: &str) -> PathBuf {
        artefact_path(&self.dir, &self.progress.migration_name, &self.run_id, kind)
    }
}

fn artefact_path(dir: &Path, migration_name: &str, run_id: &str, kind: &str) -> PathBuf {
    dir.join(format!(
        "{}_{}_{}_{}.json",
        TOOL_NAME, migration_name, run_id, kind
    ))
}

/// Newest run id for a migration, by scanning progress artefact filenames.
/// Run ids are timestamps, so lexicographic max is newest.
fn latest_run_id(dir: &Path, migration_name: &str) -> Result<Option<String>> {
    let prefix = format!("{}_{}_", TOOL_NAME, migration_name);
    let suffix = "_progress.json";

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut newest: Option<String> = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(run_id) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        {
            if newest.as_deref().map(|n| run_id > n).unwrap_or(true) {
                newest = Some(run_id.to_string());
            }
        }
    }
    Ok(newest)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    // Atomic replace: write to temp file, then rename
    let temp = path.with_extension("tmp");
    std::fs::write(&temp, content.as_bytes())?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| MigrateError::State(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| MigrateError::State(format!("cannot parse {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthMode, ConnectionConfig, Provider, TableSettings,
    };
    use crate::core::TableRef;
    use tempfile::TempDir;

    fn plan() -> MigrationPlan {
        MigrationPlan {
            name: "Orders".into(),
            batch_size: 2,
            query_timeout_seconds: 30,
            source: conn(),
            target: conn(),
            tables: vec![job()],
            environment: None,
            default_log_level: None,
        }
    }

    fn conn() -> ConnectionConfig {
        ConnectionConfig {
            provider: Provider::SqlServer,
            server: "x".into(),
            port: None,
            database: "db".into(),
            user: Some("u".into()),
            password: Some("p".into()),
            auth: AuthMode::SqlAuth,
        }
    }

    fn job() -> TableJob {
        TableJob {
            order: 1,
            include: true,
            source: TableRef::new("dbo", "Orders"),
            target: TableRef::new("dbo", "Orders"),
            batch_column: "Id".into(),
            mappings: Vec::new(),
            transformations: Vec::new(),
            settings: TableSettings::default(),
        }
    }

    #[test]
    fn test_filenames_follow_convention() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);
        writer.write_progress().unwrap();

        let files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].starts_with("sqlshift_Orders_"));
        assert!(files[0].ends_with("_progress.json"));
    }

    #[test]
    fn test_progress_json_schema() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);
        writer.table_entry(&job).status = TableStatus::Completed;
        writer.table_entry(&job).advance(2, Some("US".into()));
        writer.write_progress().unwrap();

        let content = std::fs::read_to_string(writer.path("progress")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["migrationName"], "Orders");
        assert_eq!(json["status"], "InProgress");
        let table = &json["tables"][0];
        assert_eq!(table["sourceTable"], "dbo.Orders");
        assert_eq!(table["processedRows"], 2);
        assert_eq!(table["lastBatchKeyValue"], "US");
        // Seconds-precision ISO timestamps
        let started = json["startedAt"].as_str().unwrap();
        assert_eq!(started.len(), 19);
        assert!(started.contains('T'));
    }

    #[test]
    fn test_progress_monotonicity() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);

        let entry = writer.table_entry(&job);
        entry.advance(4, Some("4".into()));
        entry.advance(2, None); // stale update must not regress
        assert_eq!(entry.processed_rows, 4);
        assert_eq!(entry.last_batch_key_value.as_deref(), Some("4"));
    }

    #[test]
    fn test_resume_picks_newest_run() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();

        // Fake two runs on disk with distinct run ids
        for (run_id, processed) in [("20240101_000000", 2i64), ("20240102_000000", 4)] {
            let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);
            writer.run_id = run_id.to_string();
            writer.table_entry(&job).advance(processed, Some(processed.to_string()));
            writer.write_progress().unwrap();
        }

        let resumed = StatusWriter::resume(dir.path(), "Orders").unwrap().unwrap();
        assert_eq!(resumed.run_id(), "20240102_000000");
        assert_eq!(resumed.progress.tables[0].processed_rows, 4);
        assert_eq!(
            resumed.progress.tables[0].last_batch_key_value.as_deref(),
            Some("4")
        );
    }

    #[test]
    fn test_resume_without_artefact_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(StatusWriter::resume(dir.path(), "Orders").unwrap().is_none());
    }

    #[test]
    fn test_row_errors_accumulate() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);

        writer.record_row_error(
            &job,
            Some("7".into()),
            "insert rejected".into(),
            serde_json::json!({"Id": 7}),
        );
        writer.record_row_error(&job, Some("9".into()), "bad date".into(), serde_json::json!({}));
        writer.write_row_errors().unwrap();

        assert_eq!(writer.row_errors.total_row_errors, 2);
        assert_eq!(writer.row_errors.tables[0].error_count, 2);

        let content = std::fs::read_to_string(writer.path("rowerrors")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["totalRowErrors"], 2);
        assert_eq!(json["tables"][0]["rows"][0]["sourceKeyValue"], "7");
        assert_eq!(json["tables"][0]["rows"][0]["sourceData"]["Id"], 7);
    }

    #[test]
    fn test_error_log_entries() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);

        writer.log_entry("Error", Some("dbo.Orders".into()), "bulk insert failed".into());
        writer.log_entry("Warning", None, "teardown step failed".into());
        writer.write_error_log().unwrap();

        let content = std::fs::read_to_string(writer.path("errorlog")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["totalEntries"], 2);
        assert_eq!(json["entries"][0]["level"], "Error");
        assert_eq!(json["entries"][0]["table"], "dbo.Orders");
        // table field omitted when absent
        assert!(json["entries"][1].get("table").is_none());
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let plan = plan();
        let job = job();
        let mut writer = StatusWriter::new(dir.path(), &plan, &[&job]);
        writer.write_progress().unwrap();
        writer.write_progress().unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
