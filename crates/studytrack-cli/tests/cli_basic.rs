//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with an isolated HOME and verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_studytrack-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("STUDYTRACK_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn parse_json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_grade_thresholds() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["metrics", "grade", "500"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "excellent");

    let (stdout, _, code) = run_cli(home.path(), &["metrics", "grade", "4000"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "poor");
}

#[test]
fn test_malformed_config_warns_and_uses_defaults() {
    let home = tempfile::tempdir().unwrap();
    let config_dir = home.path().join(".config/studytrack");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), "[telemetry\n").unwrap();

    let (stdout, stderr, code) = run_cli(home.path(), &["metrics", "grade", "500"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "excellent");
    assert!(
        stderr.contains("falling back to default configuration"),
        "stderr was: {stderr}"
    );
}

#[test]
fn test_grade_rejects_negative() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["metrics", "grade", "--", "-5"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("invalid load time"));
}

#[test]
fn test_demo_then_summary() {
    let home = tempfile::tempdir().unwrap();
    let export_path = home.path().join("export.json");
    let export_arg = export_path.to_str().unwrap();

    let (stdout, _, code) = run_cli(
        home.path(),
        &["metrics", "demo", "--calls", "8", "--fail-every", "4", "--out", export_arg],
    );
    assert_eq!(code, 0, "demo failed");
    assert!(stdout.contains("exported"));

    let export = parse_json(&std::fs::read_to_string(&export_path).unwrap());
    assert!(export["performance"].is_array());
    assert!(export["userExperience"].is_array());

    let (stdout, _, code) = run_cli(home.path(), &["metrics", "summary", export_arg]);
    assert_eq!(code, 0, "summary failed");
    let summary = parse_json(&stdout);
    // 6 api calls, 2 errors, 1 measure, 1 navigation
    assert_eq!(summary["totalMetrics"], 10);
    assert_eq!(summary["errorRate"], 20.0);
    assert_eq!(summary["topErrors"][0]["errorName"], "DemoError");
    assert_eq!(summary["topErrors"][0]["count"], 2);
    assert_eq!(summary["performanceGrades"]["excellent"], 1);
}

#[test]
fn test_summary_window_excludes_old_records() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("export.json");
    std::fs::write(
        &path,
        r#"{
  "performance": [
    {"id": "1", "type": "api_call", "value": 100.0, "timestamp": "2026-01-01T10:00:00Z", "sessionId": "s", "metadata": {}},
    {"id": "2", "type": "api_call", "value": 300.0, "timestamp": "2026-01-01T10:30:00Z", "sessionId": "s", "metadata": {}},
    {"id": "3", "type": "error", "value": 1.0, "timestamp": "2026-01-01T10:31:00Z", "sessionId": "s", "metadata": {"errorName": "TimeoutError"}}
  ],
  "userExperience": []
}"#,
    )
    .unwrap();
    let file = path.to_str().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["metrics", "summary", file]);
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["totalMetrics"], 3);

    let (stdout, _, code) =
        run_cli(home.path(), &["metrics", "summary", file, "--last-minutes", "5"]);
    assert_eq!(code, 0);
    let summary = parse_json(&stdout);
    assert_eq!(summary["totalMetrics"], 2);
    assert_eq!(summary["averageResponseTime"], 300.0);
    assert_eq!(summary["errorRate"], 50.0);

    let (stdout, _, code) = run_cli(
        home.path(),
        &["metrics", "summary", file, "--until", "2026-01-01T10:15:00Z"],
    );
    assert_eq!(code, 0);
    assert_eq!(parse_json(&stdout)["totalMetrics"], 1);
}

#[test]
fn test_summary_missing_file_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["metrics", "summary", "/nonexistent/export.json"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_set_get_reset() {
    let home = tempfile::tempdir().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "telemetry.max_performance_metrics"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1000");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "telemetry.max_performance_metrics", "250"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "telemetry.max_performance_metrics"]);
    assert_eq!(stdout.trim(), "250");
    assert!(home.path().join(".config/studytrack/config.toml").exists());

    let (_, _, code) = run_cli(home.path(), &["config", "set", "telemetry.bogus", "1"]);
    assert_ne!(code, 0);

    let (_, _, code) = run_cli(home.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "list"]);
    assert_eq!(parse_json(&stdout)["telemetry"]["max_performance_metrics"], 1000);
}
