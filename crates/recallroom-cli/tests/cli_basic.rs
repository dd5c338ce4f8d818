//! Basic CLI E2E tests.
//!
//! Tests run the built binary against a temporary data directory and
//! verify its JSON output.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_recallroom"))
        .env("RECALLROOM_DATA_DIR", data_dir)
        .env_remove("RECALLROOM_LOG")
        .args(args)
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("output is not JSON")
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "storage.backend"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "sqlite");

    let (code, _, _) = run_cli(dir.path(), &["config", "set", "cards.min_ease", "1.5"]);
    assert_eq!(code, 0);
    let (_, stdout, _) = run_cli(dir.path(), &["config", "get", "cards.min_ease"]);
    assert_eq!(stdout.trim(), "1.5");
    assert!(dir.path().join("config.toml").exists());

    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_concept_record_due_and_path() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    let memory = run_json(
        d,
        &[
            "--user", "ana", "concept", "record", "loops", "--name", "Loops",
            "--confidence", "0.8", "--response-time", "3", "--at", "2025-01-01T09:00:00Z",
        ],
    );
    assert_eq!(memory["concept_id"], "loops");
    assert_eq!(memory["total_attempts"], 1);

    run_json(d, &["--user", "ana", "concept", "link", "iterators", "loops"]);

    let due = run_json(
        d,
        &["--user", "ana", "concept", "due", "--at", "2026-01-01T00:00:00Z"],
    );
    let ids: Vec<&str> = due
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["concept_id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"loops"));

    let path = run_json(d, &["--user", "ana", "concept", "path", "iterators", "loops"]);
    let first = &path["sessions"][0]["concepts"][0]["concept_id"];
    assert_eq!(first, "loops");
    assert_eq!(path["dropped_edges"], Value::Array(vec![]));

    // another learner sees nothing
    let due = run_json(d, &["--user", "bob", "concept", "due"]);
    assert_eq!(due, Value::Array(vec![]));
}

#[test]
fn test_invalid_confidence_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(
        dir.path(),
        &["concept", "record", "loops", "--confidence", "1.5"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_session_and_analytics() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    let none = run_json(d, &["--user", "cy", "analytics"]);
    assert_eq!(none["error"], "no data");

    let started = run_json(d, &["--user", "cy", "session", "start", "--type", "review"]);
    assert_eq!(started["closed"], Value::Null);
    run_json(d, &["--user", "cy", "concept", "record", "sets"]);
    run_json(d, &["--user", "cy", "concept", "record", "maps", "--wrong"]);
    let session = run_json(d, &["--user", "cy", "session", "end"]);
    assert_eq!(session["concepts_studied"].as_array().unwrap().len(), 2);

    let report = run_json(d, &["--user", "cy", "analytics"]);
    assert_eq!(report["summary"]["total_concepts"], 2);
    assert_eq!(report["performance"]["total_attempts"], 2);
}

#[test]
fn test_card_add_review_due() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();

    let card = run_json(
        d,
        &["card", "add", "2 + 2?", "4", "--theme", "Math"],
    );
    let id = card["id"].as_str().unwrap().to_string();

    let reviewed = run_json(d, &["card", "review", &id, "5", "--date", "2025-01-01"]);
    assert_eq!(reviewed["interval"], 1);
    assert_eq!(reviewed["due_date"], "2025-01-02");

    let due = run_json(d, &["card", "due", "--date", "2025-01-02", "--interleave"]);
    assert_eq!(due.as_array().unwrap().len(), 1);

    let (code, _, _) = run_cli(d, &["card", "review", &id, "7"]);
    assert_ne!(code, 0);
    let (code, _, _) = run_cli(d, &["card", "review", "missing", "3"]);
    assert_ne!(code, 0);
}

#[test]
fn test_json_backend_and_profile_preferences() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path();
    let (code, _, _) = run_cli(d, &["config", "set", "storage.backend", "json"]);
    assert_eq!(code, 0);

    let profile = run_json(
        d,
        &["--user", "dee", "profile", "set", "--goals", "rust, sql", "--load", "0.4"],
    );
    assert_eq!(profile["learning_goals"], serde_json::json!(["rust", "sql"]));
    assert!(d.join("profiles").join("dee.json").exists());

    let users = run_json(d, &["profile", "list"]);
    assert_eq!(users, serde_json::json!(["dee"]));
}
