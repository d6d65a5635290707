//! Integration tests for the harvest CLI commands.
//!
//! None of these reach the network. They run in serial because each one spawns the binary with a
//! scrubbed environment.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::tempdir;

/// Every variable the configuration layer reads.
const CONFIG_VARS: [&str; 13] = [
  "OCR_API_KEY",
  "OCR_BASE_URL",
  "OCR_MODEL",
  "SUMMARY_API_KEY",
  "SUMMARY_BASE_URL",
  "SUMMARY_MODEL",
  "DATABASE_PATH",
  "MARKDOWN_OUTPUT_DIR",
  "DEFAULT_MAX_PAGES",
  "DEFAULT_OCR_DPI",
  "DEFAULT_MAX_RESULTS",
  "FILTER_QUANTUM_ONLY",
  "REQUEST_TIMEOUT_SECS",
];

// Helper function to create a command isolated inside `dir`
fn harvest(dir: &Path) -> Command {
  let mut cmd = Command::cargo_bin("harvest").unwrap();
  cmd.current_dir(dir).env_remove("RUST_LOG").arg("--config").arg(dir.join("config.toml"));
  for var in CONFIG_VARS {
    cmd.env_remove(var);
  }
  cmd.env("MARKDOWN_OUTPUT_DIR", dir.join("out"));
  cmd
}

// Helper to get a temporary database path
fn temp_db() -> (tempfile::TempDir, PathBuf) {
  let dir = tempdir().unwrap();
  let db_path = dir.path().join("data").join("test.db");
  (dir, db_path)
}

#[test]
#[serial]
fn test_stats_on_empty_store() {
  let (dir, db_path) = temp_db();

  harvest(dir.path())
    .arg("stats")
    .arg("--path")
    .arg(&db_path)
    .arg("--recent")
    .arg("5")
    .assert()
    .success()
    .stdout(predicate::str::contains("Total papers: 0"))
    .stdout(predicate::str::contains("Recent papers"));

  assert!(db_path.exists());
}

#[test]
#[serial]
fn test_export_with_nothing_stored() {
  let (dir, db_path) = temp_db();

  harvest(dir.path())
    .arg("export")
    .arg("--processed-only")
    .arg("--path")
    .arg(&db_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("No papers found to export"));
}

#[test]
#[serial]
fn test_config_reports_missing_settings() {
  let dir = tempdir().unwrap();

  harvest(dir.path())
    .arg("config")
    .assert()
    .success()
    .stdout(predicate::str::contains("NOT SET"))
    .stdout(predicate::str::contains("OCR_API_KEY not set"))
    .stdout(predicate::str::contains("nanonets/nanonets-ocr2-3b"));
}

#[test]
#[serial]
fn test_config_save_round_trips() {
  let dir = tempdir().unwrap();

  harvest(dir.path())
    .env("SUMMARY_MODEL", "local/test-model")
    .env("SUMMARY_API_KEY", "sk-from-environment")
    .arg("config")
    .arg("--save")
    .assert()
    .success()
    .stdout(predicate::str::contains("Saved configuration"));

  let saved = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
  assert!(saved.contains("local/test-model"));
  assert!(!saved.contains("sk-from-environment"));

  // The saved file is picked up without the environment variable.
  harvest(dir.path())
    .arg("config")
    .assert()
    .success()
    .stdout(predicate::str::contains("local/test-model"));
}

#[test]
#[serial]
fn test_process_requires_services() {
  let (dir, db_path) = temp_db();

  harvest(dir.path())
    .arg("process")
    .arg("--path")
    .arg(&db_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("must be configured to process papers"));
}

#[test]
#[serial]
fn test_ocr_requires_service_and_input() {
  let dir = tempdir().unwrap();

  harvest(dir.path())
    .arg("ocr")
    .arg("paper.pdf")
    .assert()
    .failure()
    .stderr(predicate::str::contains("OCR_API_KEY"));

  harvest(dir.path())
    .env("OCR_API_KEY", "test-key")
    .env("OCR_BASE_URL", "http://127.0.0.1:9/v1")
    .arg("ocr")
    .arg("missing.pdf")
    .assert()
    .failure()
    .stderr(predicate::str::contains("File not found"));
}

#[test]
#[serial]
fn test_research_requires_service_and_papers() {
  let (dir, db_path) = temp_db();

  harvest(dir.path())
    .args(["research", "Which decoders scale?", "--category", "quant-ph", "--max-papers", "5"])
    .arg("--path")
    .arg(&db_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("must be set to use research features"));

  harvest(dir.path())
    .env("SUMMARY_API_KEY", "test-key")
    .env("SUMMARY_BASE_URL", "http://127.0.0.1:9/v1")
    .args(["research", "Which decoders scale?", "--filter", "decoder", "--output", "answer.txt"])
    .arg("--path")
    .arg(&db_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("No processed papers found matching criteria"));
  assert!(!dir.path().join("answer.txt").exists());

  harvest(dir.path()).args(["compare", "decoders"]).assert().failure();
}

#[test]
#[serial]
fn test_crawl_rejects_bad_interval() {
  let (dir, db_path) = temp_db();

  harvest(dir.path())
    .arg("crawl")
    .arg("--interval")
    .arg("0")
    .arg("--path")
    .arg(&db_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid argument"));
}

#[test]
#[serial]
fn test_unknown_command() {
  let dir = tempdir().unwrap();
  harvest(dir.path()).arg("frobnicate").assert().failure();
}
