//! End-to-end tests running the `smalldb` binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn smalldb(args: &[&str], dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_smalldb"))
        .args(args)
        .current_dir(dir)
        .env("SMALLDB_LOG_LEVEL", "off")
        .env_remove("SMALLDB_BASE_DIR")
        .env_remove("SMALLDB_STRICT_TRANSITIONS")
        .env_remove("SMALLDB_DIAGRAM_FORMAT")
        .output()
        .expect("failed to run smalldb")
}

fn write_machine(dir: &Path) {
    fs::write(
        dir.join("order.mmd"),
        "stateDiagram-v2\n\
         [*] --> new : create\n\
         new --> active : activate\n\
         active --> closed : close\n",
    )
    .unwrap();
    fs::write(
        dir.join("order.json"),
        r##"{
            "class": "App\\StateMachine\\Order",
            "directives": [
                {"type": "include_diagram", "file": "order.mmd"},
                {"type": "sql_table", "table": "orders"},
                {"type": "state", "name": "closed", "color": "#888"}
            ]
        }"##,
    )
    .unwrap();
}

#[test]
fn build_prints_json_definition() {
    let dir = tempfile::tempdir().unwrap();
    write_machine(dir.path());

    let output = smalldb(&["build", "-i", "order.json"], dir.path());
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["machine_type"], "order");
    assert_eq!(json["transitions"].as_array().unwrap().len(), 3);
}

#[test]
fn build_prints_mermaid() {
    let dir = tempfile::tempdir().unwrap();
    write_machine(dir.path());

    let output = smalldb(&["build", "-i", "order.json", "--format", "mermaid"], dir.path());
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("stateDiagram-v2"));
    assert!(stdout.contains("[*] --> new : create"));
    assert!(stdout.contains("active --> closed : close"));
}

#[test]
fn validate_reports_undeclared_state() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("broken.json"),
        r#"{
            "class": "Order",
            "directives": [
                {"type": "state", "name": "new"},
                {"type": "transition", "source": "new", "targets": ["ghost"], "name": "haunt"}
            ]
        }"#,
    )
    .unwrap();

    let output = smalldb(&["validate", "-i", "broken.json"], dir.path());
    assert!(!output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("Invalid machine source"));
    assert!(stderr.contains("ghost"));
}

#[test]
fn validate_accepts_good_source() {
    let dir = tempfile::tempdir().unwrap();
    write_machine(dir.path());

    let output = smalldb(&["validate", "-i", "order.json"], dir.path());
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Valid machine 'order'"));
}

#[test]
fn preprocessors_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let output = smalldb(&["preprocessors", "--json"], dir.path());
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = json["preprocessors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(names, vec!["diagram_include", "doctrine_entity", "dto"]);
}
