//! CLI integration tests for sqlshift.
//!
//! These verify argument parsing, help output, and exit codes for error
//! conditions that do not need a live database.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the sqlshift binary.
fn cmd() -> Command {
    Command::cargo_bin("sqlshift").unwrap()
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
    path
}

const MASTER: &str = r#"
    <Migration name="Smoke">
      <BatchSize>100</BatchSize>
      <QueryTimeoutSeconds>5</QueryTimeoutSeconds>
      <SourceConnection provider="MySql" server="127.0.0.1" database="src"
                        user="u" password="p"/>
      <TargetConnection provider="SqlServer" server="127.0.0.1" database="tgt"
                        user="sa" password="p"/>
      <Tables>
        <Table order="1" sourceTable="src.items" targetTable="dbo.Items"
               batchColumn="id"/>
      </Tables>
    </Migration>"#;

// =============================================================================
// Help and Version
// =============================================================================

#[test]
fn test_help_shows_all_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--validate-only"))
        .stdout(predicate::str::contains("--resume"))
        .stdout(predicate::str::contains("--table-filter"))
        .stdout(predicate::str::contains("--log-level"))
        .stdout(predicate::str::contains("--status-dir"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sqlshift"));
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn test_missing_config_file_fails() {
    cmd()
        .args(["--config", "/nonexistent/master.xml"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_invalid_log_level_fails() {
    let dir = TempDir::new().unwrap();
    let master = write_file(&dir, "master.xml", MASTER);
    cmd()
        .args(["--config", master.to_str().unwrap(), "--log-level", "Chatty"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown log level"));
}

#[test]
fn test_structurally_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    // Postgres is not a valid target
    let bad = MASTER.replace("provider=\"SqlServer\"", "provider=\"PostgreSql\"");
    let master = write_file(&dir, "master.xml", &bad);
    cmd()
        .args(["--config", master.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("target provider"));
}

// =============================================================================
// Resume
// =============================================================================

#[test]
fn test_resume_without_prior_run_exits_2() {
    let dir = TempDir::new().unwrap();
    let master = write_file(&dir, "master.xml", MASTER);
    let status_dir = dir.path().join("status");
    cmd()
        .args([
            "--config",
            master.to_str().unwrap(),
            "--resume",
            "--status-dir",
            status_dir.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Cannot resume"));
}
