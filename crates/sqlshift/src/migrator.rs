//! Per-table migration: fetch → transform → insert → record progress.
//!
//! State machine: `Pending → InProgress → {Completed | Failed}`. Row-level
//! failures (transform or single-row insert) land in RowErrors and the
//! table keeps going; batch-level failures (bulk insert, DDL, timeouts)
//! fail the table. Triggers and explicit identity insert are restored on
//! every exit path.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{IdentityMode, MigrationPlan, TableJob};
use crate::core::{Row, Value};
use crate::cursor::BatchCursor;
use crate::drivers::{ColumnInfo, SourceReader, SourceReaderImpl, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::keymap;
use crate::status::{StatusWriter, TableStatus};
use crate::transform::{self, KeyMaps, ValuePorts};

/// What a finished table hands back to the coordinator.
pub struct TableOutcome {
    /// Rows read from the source (including ones that became row errors).
    pub processed_rows: i64,
    /// The freshly loaded key map when identity mode = generate.
    pub keymap: Option<HashMap<String, String>>,
}

/// Runs one table job.
pub struct TableMigrator<'a> {
    plan: &'a MigrationPlan,
    job: &'a TableJob,
    ports: &'a dyn ValuePorts,
}

impl<'a> TableMigrator<'a> {
    pub fn new(plan: &'a MigrationPlan, job: &'a TableJob, ports: &'a dyn ValuePorts) -> Self {
        Self { plan, job, ports }
    }

    /// Migrate the table. The caller resumes from persisted progress on the
    /// next run if this returns an error.
    pub async fn run(
        &self,
        source: &mut SourceReaderImpl,
        target: &mut TargetWriter,
        status: &mut StatusWriter,
        keymaps: &KeyMaps,
        cancel: &CancellationToken,
    ) -> Result<TableOutcome> {
        let label = self.job.source.qualified();
        info!("table {} starting", label);

        status.table_entry(self.job).status = TableStatus::InProgress;
        status.write_progress()?;

        let result = match target.disable_triggers(&self.job.target).await {
            Ok(()) => self.execute(source, target, status, keymaps, cancel).await,
            Err(e) => Err(e),
        };

        // Trigger state is restored whatever happened above
        if let Err(e) = target.enable_triggers(&self.job.target).await {
            warn!("could not re-enable triggers on {}: {}", label, e);
            status.log_entry(
                "Warning",
                Some(label.clone()),
                format!("could not re-enable triggers: {}", e),
            );
            let _ = status.write_error_log();
        }

        match result {
            Ok(outcome) => {
                status.table_entry(self.job).status = TableStatus::Completed;
                status.write_progress()?;
                info!("table {} completed ({} rows)", label, outcome.processed_rows);
                Ok(outcome)
            }
            Err(e) => {
                status.table_entry(self.job).status = TableStatus::Failed;
                status.log_entry("Error", Some(label.clone()), e.to_string());
                let _ = status.write_error_log();
                status.write_progress()?;
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        source: &mut SourceReaderImpl,
        target: &mut TargetWriter,
        status: &mut StatusWriter,
        keymaps: &KeyMaps,
        cancel: &CancellationToken,
    ) -> Result<TableOutcome> {
        let job = self.job;
        let label = job.source.qualified();

        // Row count is for progress display only; a failure is not fatal
        match source.row_count(&job.source).await {
            Ok(total) => status.table_entry(job).total_rows = total,
            Err(e) => warn!("row count unavailable for {}: {}", label, e),
        }

        // A persisted key means this table is mid-flight from an earlier run:
        // emptying the target or the key map would lose acknowledged batches
        let resume_key = status.table_entry(job).last_batch_key_value.clone();
        let resuming = resume_key.is_some();

        if !resuming && job.settings.existing_data == crate::config::ExistingDataAction::Truncate {
            target.truncate_table(&job.target).await?;
        }

        let generate = job.settings.identity_mode == IdentityMode::Generate;
        if generate {
            let map_table = keymap::table_for(&job.source);
            if !resuming || !target.table_exists(&map_table).await? {
                keymap::create(target, &job.source).await?;
            }
        }

        let target_columns = target.list_columns(&job.target).await?;
        if target_columns.is_empty() {
            return Err(MigrateError::Schema(format!(
                "target table {} does not exist or has no columns",
                job.target.qualified()
            )));
        }

        let identity_column = match &job.settings.identity_column {
            Some(column) => Some(column.clone()),
            None => target.identity_column_of(&job.target).await?,
        };

        let produced = produced_columns(job);
        let dropped_identity = if generate { identity_column.as_deref() } else { None };
        let insert_columns = derive_insert_columns(&target_columns, &produced, dropped_identity)?;

        // Old keys for the key map come from the source side of the identity
        // column when it exists there, else from the batch column
        let source_columns = source.list_columns(&job.source).await?;
        let old_key_column = identity_column
            .as_deref()
            .filter(|c| source_columns.iter().any(|s| s.name == *c))
            .unwrap_or(&job.batch_column)
            .to_string();

        let identity_preserved = !generate
            && identity_column
                .as_deref()
                .map(|c| insert_columns.iter().any(|i| i == c))
                .unwrap_or(false);

        // Resume: seed the cursor with the persisted key
        let mut processed = status.table_entry(job).processed_rows;
        if let Some(ref key) = resume_key {
            info!("table {} resuming after key {}", label, key);
        }

        let mut cursor = BatchCursor::new(
            source,
            job.source.clone(),
            job.batch_column.clone(),
            self.plan.batch_size,
            resume_key,
        );

        let row_by_row = generate && identity_column.is_some();

        while let Some(page) = cursor.next_page().await? {
            let page_len = page.len();
            let mut pending_keys: Vec<(String, String)> = Vec::new();
            let mut evaluated: Vec<(Vec<Value>, Option<String>, Option<String>)> = Vec::new();
            let errors_before = status.row_errors.total_row_errors;

            for source_row in &page {
                let tracking_key = source_row.get(&job.batch_column).and_then(Value::to_text);
                let old_key = source_row.get(&old_key_column).and_then(Value::to_text);

                match transform::evaluate(
                    source_row,
                    &job.transformations,
                    &job.mappings,
                    keymaps,
                    self.ports,
                ) {
                    Ok(outcome) => {
                        for warning in outcome.warnings {
                            status.log_entry("Warning", Some(label.clone()), warning);
                        }
                        let values = align_values(&outcome.row, &insert_columns);
                        evaluated.push((values, tracking_key, old_key));
                    }
                    Err(e) => {
                        debug!("row error in {}: {}", label, e);
                        status.record_row_error(
                            job,
                            tracking_key,
                            e.to_string(),
                            source_row.to_json(),
                        );
                    }
                }
            }

            if row_by_row {
                let identity = identity_column.as_deref().expect("checked by row_by_row");
                for (values, tracking_key, old_key) in &evaluated {
                    match target
                        .insert_one(&job.target, &insert_columns, values, Some(identity))
                        .await
                    {
                        Ok(Some(new_key)) => {
                            if let Some(old_key) = old_key {
                                pending_keys.push((old_key.clone(), new_key));
                            }
                        }
                        Ok(None) => warn!("insert into {} returned no identity", label),
                        Err(e @ MigrateError::Timeout { .. }) => return Err(e),
                        Err(e) => {
                            status.record_row_error(
                                job,
                                tracking_key.clone(),
                                e.to_string(),
                                source_snapshot(&page, tracking_key, &job.batch_column),
                            );
                        }
                    }
                }
            } else if identity_preserved {
                // Explicit identity insert, scoped to this page
                target.set_identity_insert(&job.target, true).await?;
                let rows: Vec<Vec<Value>> =
                    evaluated.iter().map(|(values, _, _)| values.clone()).collect();
                let inserted = target.bulk_insert(&job.target, &insert_columns, &rows).await;
                let restored = target.set_identity_insert(&job.target, false).await;
                inserted?;
                restored?;
            } else {
                let rows: Vec<Vec<Value>> =
                    evaluated.iter().map(|(values, _, _)| values.clone()).collect();
                target.bulk_insert(&job.target, &insert_columns, &rows).await?;
            }

            keymap::append(target, &job.source, &pending_keys).await?;

            processed += page_len as i64;
            let last_key = cursor.last_key().map(|k| k.to_string());
            let entry = status.table_entry(job);
            entry.advance(processed, last_key);
            status.write_progress()?;
            if status.row_errors.total_row_errors > errors_before {
                status.write_row_errors()?;
            }

            // Cooperative cancel lands on batch boundaries so the persisted
            // key is always truthful
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
        }

        let loaded = if generate {
            Some(keymap::load_all(target, &job.source).await?)
        } else {
            None
        };

        Ok(TableOutcome {
            processed_rows: processed,
            keymap: loaded,
        })
    }
}

/// Target columns every row of this table writes.
fn produced_columns(job: &TableJob) -> HashSet<String> {
    let claimed: HashSet<&str> = job
        .transformations
        .iter()
        .flat_map(|t| t.target_columns())
        .collect();
    job.mappings
        .iter()
        .filter(|m| !claimed.contains(m.target.as_str()))
        .map(|m| m.target.clone())
        .chain(claimed.iter().map(|c| c.to_string()))
        .collect()
}

/// The insert column set, in target ordinal order. The identity column is
/// dropped when the target generates it; produced columns missing from the
/// target are a schema error.
fn derive_insert_columns(
    target_columns: &[ColumnInfo],
    produced: &HashSet<String>,
    dropped_identity: Option<&str>,
) -> Result<Vec<String>> {
    let known: HashSet<&str> = target_columns.iter().map(|c| c.name.as_str()).collect();
    let missing: Vec<&String> = produced
        .iter()
        .filter(|c| !known.contains(c.as_str()))
        .collect();
    if !missing.is_empty() {
        let mut names: Vec<String> = missing.iter().map(|s| s.to_string()).collect();
        names.sort();
        return Err(MigrateError::Schema(format!(
            "mapped target column(s) not present on target table: {}",
            names.join(", ")
        )));
    }

    Ok(target_columns
        .iter()
        .map(|c| c.name.clone())
        .filter(|name| produced.contains(name))
        .filter(|name| dropped_identity.map(|id| id != name).unwrap_or(true))
        .collect())
}

/// Values aligned to the insert column set; columns the program never wrote
/// insert NULL.
fn align_values(row: &Row, insert_columns: &[String]) -> Vec<Value> {
    insert_columns
        .iter()
        .map(|col| row.get(col).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Find the source snapshot for a row-error after the page has been
/// consumed, by its tracking key.
fn source_snapshot(
    page: &[Row],
    tracking_key: &Option<String>,
    batch_column: &str,
) -> serde_json::Value {
    page.iter()
        .find(|r| &r.get(batch_column).and_then(Value::to_text) == tracking_key)
        .map(|r| r.to_json())
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimpleMapping, StaticSource, TableSettings, Transformation};
    use crate::core::TableRef;

    fn col(name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.into(),
            data_type: "nvarchar".into(),
        }
    }

    fn job_with(mappings: Vec<SimpleMapping>, transformations: Vec<Transformation>) -> TableJob {
        TableJob {
            order: 1,
            include: true,
            source: TableRef::new("dbo", "Customers"),
            target: TableRef::new("dbo", "Customers"),
            batch_column: "Id".into(),
            mappings,
            transformations,
            settings: TableSettings::default(),
        }
    }

    #[test]
    fn test_identity_dropped_from_insert_set_when_generated() {
        let target = vec![col("CustomerId"), col("Name"), col("Email")];
        let produced: HashSet<String> =
            ["CustomerId", "Name", "Email"].iter().map(|s| s.to_string()).collect();

        let with_identity = derive_insert_columns(&target, &produced, Some("CustomerId")).unwrap();
        assert_eq!(with_identity, vec!["Name", "Email"]);

        let preserved = derive_insert_columns(&target, &produced, None).unwrap();
        assert_eq!(preserved, vec!["CustomerId", "Name", "Email"]);
    }

    #[test]
    fn test_unknown_produced_column_is_schema_error() {
        let target = vec![col("Name")];
        let produced: HashSet<String> = ["Name", "Ghost"].iter().map(|s| s.to_string()).collect();
        let err = derive_insert_columns(&target, &produced, None).unwrap_err();
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_produced_columns_prefer_transformation_claims() {
        let job = job_with(
            vec![
                SimpleMapping { source: "a".into(), target: "A".into(), source_date_format: None },
                SimpleMapping { source: "b".into(), target: "B".into(), source_date_format: None },
            ],
            vec![Transformation::Static {
                target: "B".into(),
                value: StaticSource::Literal("x".into()),
            }],
        );
        let produced = produced_columns(&job);
        assert!(produced.contains("A"));
        assert!(produced.contains("B"));
        assert_eq!(produced.len(), 2);
    }

    #[test]
    fn test_align_values_fills_null_for_unwritten_columns() {
        let mut row = Row::new();
        row.set("Name", Value::Text("Ada".into()));
        let cols = vec!["Name".to_string(), "Email".to_string()];
        let values = align_values(&row, &cols);
        assert_eq!(values, vec![Value::Text("Ada".into()), Value::Null]);
    }

    #[test]
    fn test_insert_order_follows_target_ordinals() {
        let target = vec![col("Z"), col("A"), col("M")];
        let produced: HashSet<String> = ["A", "M", "Z"].iter().map(|s| s.to_string()).collect();
        let cols = derive_insert_columns(&target, &produced, None).unwrap();
        assert_eq!(cols, vec!["Z", "A", "M"]);
    }
}
