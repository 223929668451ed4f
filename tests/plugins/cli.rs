use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::tempdir;

fn run_cmd(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pincer"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("PINCER_AGENT_ID", "cli-test")
        .env("NO_COLOR", "1")
        .output()
        .unwrap_or_else(|e| panic!("failed to run pincer {:?}: {}", args, e))
}

fn run_json(root: &Path, args: &[&str]) -> Value {
    let out = run_cmd(root, args);
    assert!(
        out.status.success(),
        "pincer {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
        panic!(
            "pincer {:?} did not print JSON ({}): {}",
            args,
            e,
            String::from_utf8_lossy(&out.stdout)
        )
    })
}

fn write_definition(dir: &Path) -> String {
    let path = dir.join("w1.json");
    fs::write(
        &path,
        r#"{
  "id": "W1",
  "domain": "web",
  "priority": "high",
  "tasks": [
    { "id": "A", "name": "schema", "capability": "backend" },
    { "id": "B", "name": "api", "capability": "backend", "depends_on": ["A"] },
    { "id": "C", "name": "ui", "capability": "frontend", "depends_on": ["A"] }
  ]
}"#,
    )
    .unwrap();
    path.to_string_lossy().to_string()
}

#[test]
fn test_init_writes_config_once() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    assert!(run_cmd(&root, &["init"]).status.success());
    assert!(root.join("config.toml").exists());
    assert!(root.join("data").is_dir());
    assert!(root.join("evidence").is_dir());

    fs::write(root.join("config.toml"), "[pool]\nmax_concurrency = 1\n").unwrap();
    assert!(run_cmd(&root, &["init"]).status.success());
    assert_eq!(
        fs::read_to_string(root.join("config.toml")).unwrap(),
        "[pool]\nmax_concurrency = 1\n"
    );
}

#[test]
fn test_workflow_lifecycle_over_cli() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    let def = write_definition(tmp.path());

    let started = run_json(&root, &["workflow", "--format", "json", "start", "--file", &def]);
    assert_eq!(started["status"], "ok");
    assert_eq!(started["workflow"]["tasks"][0]["status"], "PENDING");

    let check = run_json(
        &root,
        &["task", "--format", "json", "check", "--workflow", "W1", "--task", "B"],
    );
    assert_eq!(check["ready"], false);

    let adv = run_json(
        &root,
        &["task", "--format", "json", "advance", "--workflow", "W1", "--task", "A"],
    );
    assert_eq!(adv["result"]["outcome"], "dispatched");
    let agent = adv["result"]["agent_id"].as_str().unwrap().to_string();
    assert!(agent.starts_with("backend-"));

    let done = run_json(
        &root,
        &[
            "task", "--format", "json", "complete", "--workflow", "W1", "--task", "A",
            "--deliverable", "schema.sql",
        ],
    );
    assert_eq!(done["task"]["status"], "COMPLETED");

    let ready = run_json(&root, &["workflow", "--format", "json", "ready", "W1"]);
    assert_eq!(ready["ready"], serde_json::json!(["B", "C"]));

    let status = run_json(&root, &["workflow", "--format", "json", "status", "W1"]);
    assert_eq!(status["snapshot"]["counts"]["completed"], 1);

    let journal = run_json(&root, &["workflow", "--format", "json", "journal"]);
    let events = journal["events"].as_array().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1]["actor"], "cli-test");
}

#[test]
fn test_advance_outcomes_are_not_errors() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    let def = write_definition(tmp.path());
    run_json(&root, &["workflow", "--format", "json", "start", "--file", &def]);

    let adv = run_json(
        &root,
        &["task", "--format", "json", "advance", "--workflow", "W1", "--task", "B"],
    );
    assert_eq!(adv["result"]["outcome"], "not_ready");
    assert_eq!(adv["result"]["reason"], "dependency 'A' is PENDING");
}

#[test]
fn test_concurrent_advance_processes_dispatch_one_agent_once() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    fs::create_dir_all(&root).unwrap();
    fs::write(
        root.join("config.toml"),
        r#"[pool]
max_concurrency = 1

[[pool.agents]]
id = "be-1"
name = "Backend 1"
capability = "backend"
"#,
    )
    .unwrap();
    let def = tmp.path().join("pair.json");
    fs::write(
        &def,
        r#"{
  "id": "P",
  "domain": "web",
  "priority": "medium",
  "tasks": [
    { "id": "X", "name": "x", "capability": "backend" },
    { "id": "Y", "name": "y", "capability": "backend" },
    { "id": "Z", "name": "z", "capability": "backend" },
    { "id": "W", "name": "w", "capability": "backend" }
  ]
}"#,
    )
    .unwrap();
    run_json(
        &root,
        &["workflow", "--format", "json", "start", "--file", &def.to_string_lossy()],
    );

    let children: Vec<_> = ["X", "Y", "Z", "W"]
        .into_iter()
        .map(|task| {
            Command::new(env!("CARGO_BIN_EXE_pincer"))
                .arg("--root")
                .arg(&root)
                .args(["task", "--format", "json", "advance", "--workflow", "P", "--task", task])
                .env("PINCER_AGENT_ID", "cli-test")
                .env("NO_COLOR", "1")
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .unwrap()
        })
        .collect();
    let outcomes: Vec<String> = children
        .into_iter()
        .map(|child| {
            let out = child.wait_with_output().unwrap();
            assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
            let v: Value = serde_json::from_slice(&out.stdout).unwrap();
            v["result"]["outcome"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(outcomes.iter().filter(|o| *o == "dispatched").count(), 1, "{:?}", outcomes);
    assert_eq!(
        outcomes.iter().filter(|o| *o == "no_agent_available").count(),
        3,
        "{:?}",
        outcomes
    );

    let status = run_json(&root, &["workflow", "--format", "json", "status", "P"]);
    assert_eq!(status["snapshot"]["counts"]["running"], 1);
}

#[test]
fn test_errors_exit_nonzero_with_code() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    let def = write_definition(tmp.path());
    run_json(&root, &["workflow", "--format", "json", "start", "--file", &def]);

    let dup = run_cmd(&root, &["workflow", "start", "--file", &def]);
    assert!(!dup.status.success());
    assert!(String::from_utf8_lossy(&dup.stderr).contains("DUPLICATE_WORKFLOW"));

    let missing = run_cmd(&root, &["workflow", "status", "nope"]);
    assert!(!missing.status.success());
    assert!(String::from_utf8_lossy(&missing.stderr).contains("UNKNOWN_WORKFLOW"));

    let early = run_cmd(&root, &["task", "complete", "--workflow", "W1", "--task", "A"]);
    assert!(!early.status.success());
    assert!(String::from_utf8_lossy(&early.stderr).contains("INVALID_TRANSITION"));
}

#[test]
fn test_evidence_generate_and_verify() {
    let tmp = tempdir().unwrap();
    let root = tmp.path().join(".pincer");
    let def = write_definition(tmp.path());
    run_json(&root, &["workflow", "--format", "json", "start", "--file", &def]);
    run_json(&root, &["task", "--format", "json", "advance", "--workflow", "W1", "--task", "A"]);
    run_json(&root, &["task", "--format", "json", "complete", "--workflow", "W1", "--task", "A"]);

    let generated = run_json(
        &root,
        &["evidence", "--format", "json", "generate", "--workflow", "W1", "--task", "A"],
    );
    let path = generated["path"].as_str().unwrap().to_string();
    assert!(Path::new(&path).starts_with(root.join("evidence")));
    assert_eq!(generated["record"]["tasks"][0]["status"], "COMPLETED");

    let ok = run_json(&root, &["evidence", "--format", "json", "verify", &path]);
    assert_eq!(ok["valid"], true);

    let tampered = fs::read_to_string(&path).unwrap().replace("COMPLETED", "FAILED");
    fs::write(&path, tampered).unwrap();
    let bad = run_cmd(&root, &["evidence", "verify", &path]);
    assert!(!bad.status.success());
}

#[test]
fn test_schema_lists_command_groups() {
    let tmp = tempdir().unwrap();
    let out = run_json(tmp.path(), &["schema"]);
    for group in ["workflow", "task", "agent", "evidence"] {
        assert_eq!(out["groups"][group]["name"], group);
    }
}
