use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const CASE: &str = r#"{
    "buses": [{"id": 1, "type": 3}, {"id": 2}, {"id": 3}],
    "generators": [
        {"id": "g1", "bus": 1, "pmin": 0, "pmax": 200, "cost": [0, 10, 0]},
        {"id": "g3", "bus": 3, "pmin": 0, "pmax": 200, "cost": [0, 30, 0]}
    ],
    "lines": [
        {"from_bus": 1, "to_bus": 2, "x": 0.1, "rate_a": 250},
        {"from_bus": 2, "to_bus": 3, "x": 0.1, "rate_a": 250},
        {"from_bus": 1, "to_bus": 3, "x": 0.1, "rate_a": 50}
    ],
    "loads": [{"bus": 3, "pd": 100}]
}"#;

fn write_case(dir: &Path, name: &str, json: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, json).unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn solve_prints_tables() {
    let dir = tempdir().unwrap();
    let case = write_case(dir.path(), "case3.json", CASE);

    Command::cargo_bin("merit")
        .unwrap()
        .args(["--log-level", "warn", "solve", &case])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: optimal"))
        .stdout(predicate::str::contains("LMP ($/MWh)"))
        .stdout(predicate::str::contains("Line 1-3"));
}

#[test]
fn solve_writes_json() {
    let dir = tempdir().unwrap();
    let case = write_case(dir.path(), "case3.json", CASE);
    let out = dir.path().join("result.json");

    Command::cargo_bin("merit")
        .unwrap()
        .args([
            "--log-level",
            "warn",
            "solve",
            &case,
            "--no-line-limits",
            "--format",
            "json",
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"solve_path\": \"lp-uncongested\""));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["status"], "optimal");
    let cost = written["total_cost"].as_f64().unwrap();
    assert!((cost - 1000.0).abs() < 1e-2, "total cost {}", cost);
}

#[test]
fn config_file_sets_voll() {
    let dir = tempdir().unwrap();
    let case = write_case(
        dir.path(),
        "short.json",
        r#"{
            "buses": [{"id": 1, "type": 3}, {"id": 2}],
            "generators": [{"bus": 1, "pmin": 0, "pmax": 40, "cost": [0, 20, 0]}],
            "lines": [{"from_bus": 1, "to_bus": 2, "x": 0.1}],
            "loads": [{"bus": 2, "pd": 100}]
        }"#,
    );
    let config = dir.path().join("dispatch.toml");
    fs::write(&config, "voll = 1000.0\n").unwrap();

    let output = Command::cargo_bin("merit")
        .unwrap()
        .args([
            "--log-level",
            "error",
            "solve",
            &case,
            "--config",
            config.to_str().unwrap(),
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let cost = result["total_cost"].as_f64().unwrap();
    assert!((cost - (800.0 + 60_000.0)).abs() < 1e-1, "total cost {}", cost);
}

#[test]
fn missing_lines_fail() {
    let dir = tempdir().unwrap();
    let case = write_case(
        dir.path(),
        "broken.json",
        r#"{"buses": [{"id": 1, "type": 3}], "generators": [{"bus": 1}], "lines": []}"#,
    );

    Command::cargo_bin("merit")
        .unwrap()
        .args(["solve", &case])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no lines"));
}

#[test]
fn validate_reports_diagnostics() {
    let dir = tempdir().unwrap();
    let case = write_case(dir.path(), "case3.json", CASE);

    Command::cargo_bin("merit")
        .unwrap()
        .args(["validate", &case])
        .assert()
        .success()
        .stdout(predicate::str::contains("Buses"))
        .stdout(predicate::str::contains("Diagnostics: No issues"));
}

#[test]
fn islands_lists_components() {
    let dir = tempdir().unwrap();
    let case = write_case(
        dir.path(),
        "split.json",
        r#"{
            "buses": [{"id": 1, "type": 3}, {"id": 2}, {"id": 8}, {"id": 9}],
            "lines": [
                {"from_bus": 1, "to_bus": 2, "x": 0.1},
                {"from_bus": 8, "to_bus": 9, "x": 0.1}
            ]
        }"#,
    );

    Command::cargo_bin("merit")
        .unwrap()
        .args(["islands", &case])
        .assert()
        .success()
        .stdout(predicate::str::contains("1,2"))
        .stdout(predicate::str::contains("8,9"));
}
