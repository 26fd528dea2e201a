//! Dry-run validation.
//!
//! Checks the configuration, connectivity, schema presence, and mapping
//! consistency, then transforms a handful of sample rows — all without
//! writing a single target row. The outcome is the Validation artefact.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{MigrationPlan, StructuralReport, TableJob};
use crate::drivers::{self, SourceReader, SourceReaderImpl, TargetWriter};
use crate::error::Result;
use crate::status::iso_seconds;
use crate::status::TOOL_NAME;
use crate::transform::{self, KeyMaps, ValuePorts};

/// Sample rows transformed per table.
const SAMPLE_ROWS: usize = 3;

/// The Validation artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub migration_name: String,
    #[serde(with = "iso_seconds")]
    pub validated_at: chrono::DateTime<Utc>,
    pub is_valid: bool,
    pub summary: ValidationSummary,
    pub configuration: ConfigValidation,
    pub connections: ConnectionsValidation,
    pub tables: Vec<TableValidation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub tables_validated: usize,
    pub errors_found: usize,
    pub warnings_found: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsValidation {
    pub source: ConnectionValidation,
    pub target: ConnectionValidation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionValidation {
    pub is_valid: bool,
    pub provider: String,
    pub server: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableValidation {
    pub source_table: String,
    pub target_table: String,
    pub is_valid: bool,
    pub source_row_count: i64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub sample_data: Vec<SampleRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRow {
    pub source: serde_json::Value,
    pub transformed: serde_json::Value,
}

/// Validate the plan end to end and assemble the artefact.
pub async fn run(
    plan: &MigrationPlan,
    structural: &StructuralReport,
    ports: &dyn ValuePorts,
) -> ValidationReport {
    let configuration = ConfigValidation {
        is_valid: structural.is_valid(),
        errors: structural.errors.clone(),
        warnings: structural.warnings.clone(),
    };

    // Connectivity: open and close both sides
    let timeout = plan.query_timeout();
    let mut source = match drivers::open_source(&plan.source, timeout).await {
        Ok(reader) => {
            info!("source connection validated");
            Some(reader)
        }
        Err(e) => {
            tracing::warn!("source connection failed: {}", e);
            None
        }
    };
    let source_conn = ConnectionValidation {
        is_valid: source.is_some(),
        provider: plan.source.provider.to_string(),
        server: plan.source.server.clone(),
        message: match &source {
            Some(_) => "connected".into(),
            None => "connection failed".into(),
        },
    };

    let mut target = match drivers::open_target(&plan.target, timeout).await {
        Ok(writer) => {
            info!("target connection validated");
            Some(writer)
        }
        Err(e) => {
            tracing::warn!("target connection failed: {}", e);
            None
        }
    };
    let target_conn = ConnectionValidation {
        is_valid: target.is_some(),
        provider: plan.target.provider.to_string(),
        server: plan.target.server.clone(),
        message: match &target {
            Some(_) => "connected".into(),
            None => "connection failed".into(),
        },
    };

    let mut tables = Vec::with_capacity(plan.tables.len());
    if let (Some(source), Some(target)) = (source.as_mut(), target.as_mut()) {
        for job in &plan.tables {
            tables.push(validate_table(job, source, target, ports).await);
        }
    }

    if let Some(mut reader) = source {
        reader.close().await;
    }
    if let Some(mut writer) = target {
        writer.close().await;
    }

    let errors_found = configuration.errors.len()
        + usize::from(!source_conn.is_valid)
        + usize::from(!target_conn.is_valid)
        + tables.iter().map(|t| t.errors.len()).sum::<usize>();
    let warnings_found = configuration.warnings.len()
        + tables.iter().map(|t| t.warnings.len()).sum::<usize>();

    let is_valid = configuration.is_valid
        && source_conn.is_valid
        && target_conn.is_valid
        && tables.iter().all(|t| t.is_valid);

    ValidationReport {
        migration_name: plan.name.clone(),
        validated_at: Utc::now(),
        is_valid,
        summary: ValidationSummary {
            tables_validated: tables.len(),
            errors_found,
            warnings_found,
        },
        configuration,
        connections: ConnectionsValidation {
            source: source_conn,
            target: target_conn,
        },
        tables,
    }
}

async fn validate_table(
    job: &TableJob,
    source: &mut SourceReaderImpl,
    target: &mut TargetWriter,
    ports: &dyn ValuePorts,
) -> TableValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut sample_data = Vec::new();
    let mut source_row_count = 0;

    let source_columns = match source.list_columns(&job.source).await {
        Ok(cols) if cols.is_empty() => {
            errors.push(format!("source table {} not found", job.source.qualified()));
            Vec::new()
        }
        Ok(cols) => cols,
        Err(e) => {
            errors.push(format!("cannot read source schema: {}", e));
            Vec::new()
        }
    };
    let target_columns = match target.list_columns(&job.target).await {
        Ok(cols) if cols.is_empty() => {
            errors.push(format!("target table {} not found", job.target.qualified()));
            Vec::new()
        }
        Ok(cols) => cols,
        Err(e) => {
            errors.push(format!("cannot read target schema: {}", e));
            Vec::new()
        }
    };

    if !source_columns.is_empty() && !target_columns.is_empty() {
        let source_names: HashSet<&str> =
            source_columns.iter().map(|c| c.name.as_str()).collect();
        let target_names: HashSet<&str> =
            target_columns.iter().map(|c| c.name.as_str()).collect();

        if !source_names.contains(job.batch_column.as_str()) {
            errors.push(format!(
                "batch column '{}' not present in source",
                job.batch_column
            ));
        }

        for mapping in &job.mappings {
            if !source_names.contains(mapping.source.as_str()) {
                errors.push(format!("mapped source column '{}' not present", mapping.source));
            }
            if !target_names.contains(mapping.target.as_str()) {
                errors.push(format!("mapped target column '{}' not present", mapping.target));
            }
        }

        for t in &job.transformations {
            for col in t.source_columns() {
                if !source_names.contains(col.as_str()) {
                    errors.push(format!(
                        "{} transformation references missing source column '{}'",
                        t.kind(),
                        col
                    ));
                }
            }
            for col in t.target_columns() {
                if !target_names.contains(col) {
                    errors.push(format!(
                        "{} transformation writes missing target column '{}'",
                        t.kind(),
                        col
                    ));
                }
            }
        }

        // Unmapped columns are informational
        let produced: HashSet<String> = job
            .mappings
            .iter()
            .map(|m| m.target.clone())
            .chain(
                job.transformations
                    .iter()
                    .flat_map(|t| t.target_columns().into_iter().map(|s| s.to_string())),
            )
            .collect();
        let consumed: HashSet<String> = job
            .mappings
            .iter()
            .map(|m| m.source.clone())
            .chain(
                job.transformations
                    .iter()
                    .flat_map(|t| t.source_columns()),
            )
            .collect();
        for col in &target_columns {
            if !produced.contains(&col.name) {
                warnings.push(format!(
                    "target column '{}' is unmapped and will take its default",
                    col.name
                ));
            }
        }
        for col in &source_columns {
            if !consumed.contains(&col.name) && col.name != job.batch_column {
                warnings.push(format!("source column '{}' is ignored", col.name));
            }
        }

        match source.row_count(&job.source).await {
            Ok(count) => source_row_count = count,
            Err(e) => warnings.push(format!("row count unavailable: {}", e)),
        }

        // Non-unique batch columns can skip boundary duplicates
        if source_row_count > 0 {
            match source.distinct_count(&job.source, &job.batch_column).await {
                Ok(distinct) if distinct < source_row_count => warnings.push(format!(
                    "batch column '{}' is not unique ({} distinct of {} rows); duplicates at page boundaries may be skipped",
                    job.batch_column, distinct, source_row_count
                )),
                Ok(_) => {}
                Err(e) => warnings.push(format!("uniqueness check unavailable: {}", e)),
            }
        }

        // Before/after samples through the real evaluator; key maps are not
        // populated in a dry run, so keyLookups show their null defaults
        match source
            .read_batch(&job.source, &job.batch_column, SAMPLE_ROWS, None)
            .await
        {
            Ok(rows) => {
                let keymaps = KeyMaps::new();
                for row in rows.iter().take(SAMPLE_ROWS) {
                    let transformed = match transform::evaluate(
                        row,
                        &job.transformations,
                        &job.mappings,
                        &keymaps,
                        ports,
                    ) {
                        Ok(outcome) => outcome.row.to_json(),
                        Err(e) => {
                            warnings.push(format!("sample row failed to transform: {}", e));
                            serde_json::Value::Null
                        }
                    };
                    sample_data.push(SampleRow {
                        source: row.to_json(),
                        transformed,
                    });
                }
            }
            Err(e) => warnings.push(format!("sample read failed: {}", e)),
        }
    }

    TableValidation {
        source_table: job.source.qualified(),
        target_table: job.target.qualified(),
        is_valid: errors.is_empty(),
        source_row_count,
        errors,
        warnings,
        sample_data,
    }
}

/// Write the artefact under the validation directory.
pub fn write(report: &ValidationReport, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let filename = format!(
        "{}_{}_{}_validation.json",
        TOOL_NAME,
        report.migration_name,
        report.validated_at.format("%Y%m%d_%H%M%S")
    );
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(report)?;
    let temp = path.with_extension("tmp");
    std::fs::write(&temp, content.as_bytes())?;
    std::fs::rename(&temp, &path)?;
    Ok(path)
}
