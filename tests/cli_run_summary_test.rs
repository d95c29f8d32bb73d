//! Integration tests for `bl run-summary`.

mod common;

use common::{TestEnv, stdout_json};
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;

fn seed_login_run(env: &TestEnv) {
    env.write_envelope(
        "run-7",
        "task-001.json",
        json!({
            "task_id": "T-1",
            "status": "completed",
            "run_id": "run-7",
            "tests": {"passed": true},
            "costs": {"model": "gpt", "usd_estimate": 0.01, "input_tokens": 100, "output_tokens": 20, "tool_calls": 3},
            "files": [{"op": "create", "path": "src/a.rs"}],
            "metadata": {"created_at": "2025-08-29T10:00:00Z", "plan_ref": "plan.json"},
            "commit": {"branch": "feat/login", "message": "feat: login form"}
        }),
    );
    env.write_envelope(
        "run-7",
        "task-002.json",
        json!({
            "task_id": "T-2",
            "status": "failed",
            "tests": {"passed": false},
            "costs": {"model": "gpt", "usd_estimate": 0.02},
            "files": [{"op": "create", "path": "src/a.rs"}, {"op": "rename", "path": "src/b.rs", "prev_path": "src/old.rs"}],
            "metadata": {"created_at": "2025-08-29T10:00:02.500Z"}
        }),
    );
    env.write_envelope(
        "run-7",
        "task-003.json",
        json!({"task_id": "T-3", "status": "completed", "tests": {"passed": true}}),
    );
    fs::write(env.run_dir("run-7").join("task-004.json"), "{ corrupt").unwrap();
    fs::write(
        env.run_dir("run-7").join("plan.json"),
        r#"{"prd_ref": "PRD-2025-08-login"}"#,
    )
    .unwrap();
}

#[test]
fn test_stdout_prints_summary_only() {
    let env = TestEnv::new();
    seed_login_run(&env);

    let output = env
        .bl()
        .args(["run-summary", "--run-id", "run-7", "--stdout"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let s = stdout_json(&output);

    assert_eq!(s["schema_version"], "1.0.0");
    assert_eq!(s["run_id"], "run-7");
    assert_eq!(s["branch"], "feat/login");
    assert_eq!(s["plan_ref"], "plan.json");
    assert_eq!(s["prd_ref"], "PRD-2025-08-login");

    assert_eq!(s["tasks"]["total"], 3);
    assert_eq!(s["tasks"]["completed"], 2);
    assert_eq!(s["tasks"]["failed"], 1);
    assert_eq!(s["tasks"]["index"][0]["message"], "feat: login form");

    assert_eq!(s["tests"], json!({"runs": 3, "passed": 2, "failed": 1, "pass_rate": 0.667}));

    assert_eq!(s["costs"]["usd_estimate"], 0.03);
    assert_eq!(s["costs"]["by_model"]["gpt"]["usd_estimate"], 0.03);
    assert_eq!(s["costs"]["by_model"]["gpt"]["count"], 2);
    assert_eq!(s["costs"]["input_tokens"], 100);

    assert_eq!(s["files"]["created"], 1);
    assert_eq!(s["files"]["created_paths"], json!(["src/a.rs"]));
    assert_eq!(
        s["files"]["renamed_paths"],
        json!([{"from": "src/old.rs", "to": "src/b.rs"}])
    );

    assert_eq!(s["started_at"], "2025-08-29T10:00:00.000Z");
    assert_eq!(s["finished_at"], "2025-08-29T10:00:02.500Z");
    assert_eq!(s["duration_ms"], 2500);

    assert!(!env.run_dir("run-7").join("summary.json").exists());
}

#[test]
fn test_dry_run_is_default() {
    let env = TestEnv::new();
    seed_login_run(&env);

    let output = env
        .bl()
        .args(["run-summary", "--run-id", "run-7"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["mode"], "dry_run");
    assert_eq!(report["runs"][0]["written"], false);
    assert!(
        report["runs"][0]["path"]
            .as_str()
            .unwrap()
            .ends_with("summary.json")
    );
    assert!(!env.run_dir("run-7").join("summary.json").exists());

    env.bl()
        .args(["run-summary", "--run-id", "run-7", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry-run. Would write:"));
}

#[test]
fn test_confirm_writes_summary() {
    let env = TestEnv::new();
    seed_login_run(&env);

    env.bl()
        .args(["run-summary", "--run-id", "run-7", "--confirm", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote "));

    let path = env.run_dir("run-7").join("summary.json");
    let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["tasks"]["total"], 3);

    // the summary is never read back as an envelope
    env.bl()
        .args(["run-summary", "--run-id", "run-7", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\":3"));
}

#[test]
fn test_out_overrides_filename() {
    let env = TestEnv::new();
    seed_login_run(&env);

    env.bl()
        .args(["run-summary", "--run-id", "run-7", "--confirm", "--out", "report.json"])
        .assert()
        .success();
    assert!(env.run_dir("run-7").join("report.json").exists());
    assert!(!env.run_dir("run-7").join("summary.json").exists());
}

#[test]
fn test_all_skips_empty_runs() {
    let env = TestEnv::new();
    seed_login_run(&env);
    env.run_dir("run-empty");
    env.write_envelope("run-8", "task-1.json", json!({"status": "skipped"}));

    let output = env
        .bl()
        .args(["run-summary", "--all", "--confirm"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["runs"].as_array().unwrap().len(), 2);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 1);
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("no task envelopes"),
        "expected a warning on stderr"
    );

    assert!(env.run_dir("run-7").join("summary.json").exists());
    assert!(env.run_dir("run-8").join("summary.json").exists());
    assert!(!env.run_dir("run-empty").join("summary.json").exists());
}

#[test]
fn test_all_stdout_prints_array() {
    let env = TestEnv::new();
    env.write_envelope("a", "task-1.json", json!({"status": "completed"}));
    env.write_envelope("b", "task-1.json", json!({"status": "failed"}));

    let output = env
        .bl()
        .args(["run-summary", "--all", "--stdout"])
        .output()
        .unwrap();
    let summaries = stdout_json(&output);
    assert_eq!(summaries[0]["run_id"], "a");
    assert_eq!(summaries[1]["run_id"], "b");
}

#[test]
fn test_named_run_without_envelopes_is_fatal() {
    let env = TestEnv::new();
    env.run_dir("run-empty");

    env.bl()
        .args(["run-summary", "--run-id", "run-empty"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No task-*.json envelopes found"));
}

#[test]
fn test_missing_run_is_fatal() {
    let env = TestEnv::new();
    env.run_dir("run-1");

    env.bl()
        .args(["run-summary", "--run-id", "run-404"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Run not found"));
}

#[test]
fn test_missing_runs_dir_is_fatal() {
    let env = TestEnv::new();

    env.bl()
        .args(["run-summary", "--all"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Run not found"));
}

#[test]
fn test_requires_run_id_or_all() {
    let env = TestEnv::new();

    env.bl().arg("run-summary").assert().failure();
}

#[test]
fn test_sample_limit_from_config_file() {
    let env = TestEnv::new();
    fs::write(
        env.state_path().join("backlog.toml"),
        "[runs]\npath_sample_limit = 2\n",
    )
    .unwrap();
    env.write_envelope(
        "r",
        "task-1.json",
        json!({"files": [
            {"op": "update", "path": "a"},
            {"op": "update", "path": "b"},
            {"op": "update", "path": "c"}
        ]}),
    );

    let output = env
        .bl()
        .args(["run-summary", "--run-id", "r", "--stdout"])
        .output()
        .unwrap();
    let s = stdout_json(&output);
    assert_eq!(s["files"]["updated"], 3);
    assert_eq!(s["files"]["updated_paths"], json!(["a", "b"]));
}

#[test]
fn test_path_like_run_id_and_out_are_rejected() {
    let env = TestEnv::new();
    seed_login_run(&env);

    env.bl()
        .args(["run-summary", "--run-id", ".."])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--run-id must be a plain name"));

    env.bl()
        .args(["run-summary", "--run-id", "run-7", "--out", "../escape.json", "--confirm"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--out must be a plain name"));
    assert!(!env.state_path().join("runs/escape.json").exists());
}
