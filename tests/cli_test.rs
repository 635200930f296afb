//! Integration tests for the `cato` binary.

mod common;

use common::{TestEnv, parse_json};
use predicates::prelude::*;
use serde_json::json;

fn seed(env: &TestEnv) {
    env.write_projects(&json!({
        "alpha": {"id": "alpha", "name": "Alpha", "last_used": "2025-03-09T00:00:00Z",
                  "provider_config": {"board_id": "1741600000000"}},
        "beta": {"id": "beta", "name": "Beta", "last_used": "2025-03-10T00:00:00Z",
                 "provider_config": {"board_id": "1900000000000"}},
        "empty": {"id": "empty", "name": "Empty",
                  "provider_config": {"board_id": "2200000000000"}}
    }));
    env.write_subtasks(&json!({"subtasks": {
        "1741600005_sub_1": {"id": "1741600005_sub_1", "name": "Alpha child", "status": "done",
                             "is_subtask": true, "assigned_agent_id": "agent-1",
                             "created_at": "2025-03-10T09:00:00Z",
                             "updated_at": "2025-03-10T10:00:00Z"},
        "1900000001_sub_1": {"id": "1900000001_sub_1", "name": "Beta child", "status": "in_progress",
                             "is_subtask": true,
                             "created_at": "2025-03-10T09:30:00Z",
                             "updated_at": "2025-03-10T10:30:00Z"}
    }}));
}

#[test]
fn test_snapshot_prints_json() {
    let env = TestEnv::new();
    seed(&env);

    let output = env.cato().arg("snapshot").output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["snapshot_version"], 1);
    assert_eq!(json["view_mode"], "subtasks");
    assert_eq!(json["timezone"], "UTC");
    assert_eq!(json["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(json["project_filter_applied"], false);
}

#[test]
fn test_snapshot_with_project_filter() {
    let env = TestEnv::new();
    seed(&env);

    let output = env
        .cato()
        .args(["snapshot", "--project", "alpha", "--view", "all"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert_eq!(json["project_name"], "Alpha");
    let tasks = json["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], "1741600005_sub_1");
    assert_eq!(tasks[0]["progress_percent"], 100);
}

#[test]
fn test_unassigned_in_progress_task_is_a_zombie() {
    let env = TestEnv::new();
    seed(&env);

    let output = env.cato().args(["snapshot", "--view", "all"]).output().unwrap();
    let json = parse_json(&output.stdout);
    let zombies: Vec<_> = json["timeline_events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["event_type"] == "diagnostic:zombie_task")
        .collect();
    assert_eq!(zombies.len(), 1);
    assert_eq!(zombies[0]["task_id"], "1900000001_sub_1");
    assert_eq!(zombies[0]["data"]["severity"], "high");
}

#[test]
fn test_snapshot_human_summary() {
    let env = TestEnv::new();
    seed(&env);

    env.cato()
        .args(["snapshot", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Snapshot v1 (all projects, subtasks view)"))
        .stdout(predicate::str::contains("Tasks: 2 total, 1 done, 1 in progress"))
        .stdout(predicate::str::contains("[high]"));
}

#[test]
fn test_pretty_output_is_indented() {
    let env = TestEnv::new();
    env.cato()
        .args(["snapshot", "--pretty"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\n  \""));
}

#[test]
fn test_invalid_exponent_fails() {
    let env = TestEnv::new();
    env.cato()
        .args(["snapshot", "--exponent", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("exponent"));
}

#[test]
fn test_invalid_exponent_human_error() {
    let env = TestEnv::new();
    env.cato()
        .args(["snapshot", "--exponent=-1", "-H"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_unknown_view_rejected() {
    let env = TestEnv::new();
    env.cato()
        .args(["snapshot", "--view", "parents-only"])
        .assert()
        .failure();
}

#[test]
fn test_projects_sorted_by_last_used() {
    let env = TestEnv::new();
    seed(&env);

    let output = env.cato().arg("projects").output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    let ids: Vec<&str> = json["projects"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["beta", "alpha"]);
    assert_eq!(json["projects"][0]["task_count"], 1);
}

#[test]
fn test_projects_human() {
    let env = TestEnv::new();
    seed(&env);
    env.cato()
        .args(["projects", "--human"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 project(s):"))
        .stdout(predicate::str::contains("beta Beta (1 tasks)"));
}

#[test]
fn test_empty_data_root_is_not_an_error() {
    let env = TestEnv::new();
    let output = env.cato().args(["snapshot", "--view", "parents"]).output().unwrap();
    assert!(output.status.success());
    let json = parse_json(&output.stdout);
    assert!(json["tasks"].as_array().unwrap().is_empty());
    assert_eq!(json["metrics"]["total_tasks"], 0);
}

#[test]
fn test_data_root_flag_beats_env() {
    let env = TestEnv::new();
    let other = TestEnv::new();
    seed(&other);

    let output = env
        .cato()
        .args(["--data-root"])
        .arg(other.path())
        .arg("snapshot")
        .output()
        .unwrap();
    let json = parse_json(&output.stdout);
    assert_eq!(json["tasks"].as_array().unwrap().len(), 2);
}

#[test]
fn test_data_root_config_sets_defaults() {
    let env = TestEnv::new();
    seed(&env);
    env.write_config("timeline-exponent 1.0\nbottleneck-threshold 1");

    let output = env.cato().args(["snapshot", "--view", "all"]).output().unwrap();
    let json = parse_json(&output.stdout);
    for task in json["tasks"].as_array().unwrap() {
        assert_eq!(task["timeline_scale_exponent"], 1.0);
        assert_eq!(task["timeline_linear_position"], task["timeline_scaled_position"]);
    }
}

#[test]
fn test_invalid_config_fails() {
    let env = TestEnv::new();
    env.write_config("timeline-exponent -3.0");
    env.cato()
        .arg("snapshot")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_logs_go_to_stderr() {
    let env = TestEnv::new();
    seed(&env);

    let output = env
        .cato()
        .args(["snapshot", "--log-level", "info", "--log-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    parse_json(&output.stdout);
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("snapshot created"));
}

#[test]
fn test_version_flag() {
    let env = TestEnv::new();
    env.cato()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("cato "));
}
