//! Configuration loading and validation.
//!
//! The plan arrives as XML documents (master config, optional global config,
//! per-table map files). `load` parses them, resolves table-map references
//! relative to the master file, and runs structural validation.

pub mod types;
pub mod validation;
pub mod xml;

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

pub use types::{
    AuthMode, ConcatPart, ConnectionConfig, ExistingDataAction, IdentityMode, LogLevel,
    MigrationPlan, Provider, SimpleMapping, SplitTarget, StaticFunction, StaticSource, TableJob,
    TableSettings, TargetType, Transformation, ValueSpec, WhenClause,
};
pub use validation::StructuralReport;

use crate::error::{MigrateError, Result};

/// Load and validate the migration plan.
///
/// Structural errors abort with a `Config` error listing every problem;
/// warnings are logged and kept in stride.
pub fn load(master_path: &Path, global_path: Option<&Path>) -> Result<MigrationPlan> {
    let (plan, report) = load_lenient(master_path, global_path)?;
    for warning in &report.warnings {
        warn!("config: {}", warning);
    }
    if !report.is_valid() {
        return Err(MigrateError::Config(report.errors.join("; ")));
    }
    Ok(plan)
}

/// Load the plan and report structural problems without failing on them.
///
/// The validator uses this so a structurally broken configuration still
/// produces a validation artefact. Parse failures and unreadable files are
/// still hard errors — there is no plan to report on without them.
pub fn load_lenient(
    master_path: &Path,
    global_path: Option<&Path>,
) -> Result<(MigrationPlan, StructuralReport)> {
    let master_text = std::fs::read_to_string(master_path).map_err(|e| {
        MigrateError::Config(format!("cannot read {}: {}", master_path.display(), e))
    })?;
    let master = xml::parse_master(&master_text)?;

    let global = match global_path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                MigrateError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            Some(xml::parse_global(&text)?)
        }
        None => None,
    };

    let base_dir = master_path.parent().unwrap_or_else(|| Path::new("."));
    let mut errors = Vec::new();
    let mut maps = HashMap::new();
    for table in &master.tables.tables {
        if let Some(ref map_file) = table.map_file {
            let path = base_dir.join(map_file);
            match std::fs::read_to_string(&path) {
                Ok(text) => match xml::parse_table_map(&text) {
                    Ok(map) => {
                        maps.insert(table.order, map);
                    }
                    Err(e) => errors.push(format!("table map {}: {}", path.display(), e)),
                },
                Err(e) => errors.push(format!("table map {} does not exist: {}", path.display(), e)),
            }
        }
    }

    let plan = xml::build_plan(master, maps, global, &mut errors);
    match plan {
        Some(plan) => {
            let mut report = validation::validate(&plan);
            report.errors.splice(0..0, errors);
            Ok((plan, report))
        }
        None => Err(MigrateError::Config(errors.join("; "))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    const MASTER: &str = r#"
        <Migration name="CountriesMigration">
          <BatchSize>2</BatchSize>
          <QueryTimeoutSeconds>30</QueryTimeoutSeconds>
          <SourceConnection provider="MySql" server="src" database="geo"
                            user="reader" password="pw"/>
          <TargetConnection provider="SqlServer" server="tgt" database="geo_new"
                            user="sa" password="pw"/>
          <Tables>
            <Table order="1" sourceTable="geo.Countries" targetTable="dbo.Countries"
                   batchColumn="Code" mapFile="maps/countries.xml">
              <Mappings>
                <Mapping source="Code" target="CountryCode"/>
                <Mapping source="Name" target="CountryName"/>
              </Mappings>
            </Table>
          </Tables>
        </Migration>"#;

    const COUNTRIES_MAP: &str = r#"
        <TableMap>
          <Settings identityMode="preserve" existingDataAction="append"/>
        </TableMap>"#;

    #[test]
    fn test_load_resolves_map_files() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "maps/countries.xml", COUNTRIES_MAP);
        let master = write_file(&dir, "master.xml", MASTER);

        let plan = load(&master, None).unwrap();
        assert_eq!(plan.name, "CountriesMigration");
        assert_eq!(plan.batch_size, 2);
        let job = &plan.tables[0];
        assert_eq!(job.mappings.len(), 2);
        assert_eq!(job.settings.identity_mode, IdentityMode::Preserve);
    }

    #[test]
    fn test_missing_map_file_is_structural_error() {
        let dir = TempDir::new().unwrap();
        let master = write_file(&dir, "master.xml", MASTER);

        let err = load(&master, None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("does not exist"), "got: {}", msg);
    }

    #[test]
    fn test_global_config_level() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "maps/countries.xml", COUNTRIES_MAP);
        let master = write_file(&dir, "master.xml", MASTER);
        let global = write_file(
            &dir,
            "global.xml",
            "<GlobalConfig><Environment>qa</Environment><DefaultLogLevel>Verbose</DefaultLogLevel></GlobalConfig>",
        );

        let plan = load(&master, Some(&global)).unwrap();
        assert_eq!(plan.environment.as_deref(), Some("qa"));
        assert_eq!(plan.default_log_level, Some(LogLevel::Verbose));
    }

    #[test]
    fn test_lenient_surfaces_structural_errors() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "maps/countries.xml", COUNTRIES_MAP);
        let bad = MASTER.replace("provider=\"SqlServer\"", "provider=\"MySql\"");
        let master = write_file(&dir, "master.xml", &bad);

        let (_, report) = load_lenient(&master, None).unwrap();
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("target provider")));
    }
}
