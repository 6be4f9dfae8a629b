use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const CREATE_USERS: &str = r#"{
    "up": [
        { "op": "create_collection", "collection": { "id": "_pb_users_auth_", "name": "users", "type": "auth" } }
    ],
    "down": [
        { "op": "delete_collection", "collection": "_pb_users_auth_" }
    ]
}"#;

const ADD_ROLE: &str = r#"{
    "name": "add role to users",
    "up": [
        {
            "op": "add_field",
            "collection": "_pb_users_auth_",
            "field": { "id": "select1466534506", "name": "role", "type": "select", "values": ["admin", "member"] }
        }
    ],
    "down": [
        { "op": "remove_field", "collection": "_pb_users_auth_", "field_id": "select1466534506" }
    ]
}"#;

const CREATE_QUERIES: &str = r#"{
    "up": [
        { "op": "create_collection", "collection": { "id": "pbc_464205976", "name": "queries" } }
    ],
    "down": [
        { "op": "delete_collection", "collection": "queries" }
    ]
}"#;

const BROKEN: &str = r#"{
    "up": [
        { "op": "remove_field", "collection": "queries", "field_id": "does_not_exist" }
    ],
    "down": []
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("migrations")).unwrap();
        let ws = Self { dir };
        ws.write("1749253307_created_users.json", CREATE_USERS);
        ws.write("1749511259_updated_users.json", ADD_ROLE);
        ws.write("1750341003_created_queries.json", CREATE_QUERIES);
        ws
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, name: &str, content: &str) {
        fs::write(self.path().join("migrations").join(name), content).unwrap();
    }

    fn remove(&self, name: &str) {
        fs::remove_file(self.path().join("migrations").join(name)).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tidemark").unwrap();
        for var in [
            "TIDEMARK_CONFIG",
            "TIDEMARK_MIGRATIONS",
            "TIDEMARK_DATA_DIR",
            "TIDEMARK_BACKEND",
            "TIDEMARK_STEP_TIMEOUT",
            "TIDEMARK_VERIFY_REVERSIBLE",
            "TIDEMARK_FORMAT",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.arg("--config")
            .arg(self.path().join("config.toml"))
            .arg("--migrations")
            .arg(self.path().join("migrations"))
            .arg("--data-dir")
            .arg(self.path().join("data"));
        cmd
    }
}

#[test]
fn test_status_reports_pending_work() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["migrate", "status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Pending (3)"));
}

#[test]
fn test_up_then_status_in_sync() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied  1749253307_created_users"))
        .stdout(predicate::str::contains("Current version: 1750341003_created_queries"));

    ws.cmd()
        .args(["migrate", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied (3)"));

    ws.cmd()
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do"));

    ws.cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("select1466534506"));
}

#[test]
fn test_plan_is_a_dry_run() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["migrate", "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan (3 step(s))"))
        .stdout(predicate::str::contains("add field role to _pb_users_auth_"));

    ws.cmd().args(["migrate", "status"]).assert().code(1);
}

#[test]
fn test_down_to_and_round_trip() {
    let ws = Workspace::new();
    ws.cmd().args(["migrate", "up"]).assert().success();

    ws.cmd()
        .args(["migrate", "plan", "down", "--to", "1749253307"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?s)1750341003_created_queries.*1749511259_updated_users").unwrap());

    ws.cmd()
        .args(["migrate", "down", "--to", "1749253307_created_users"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version: 1749253307_created_users"));

    ws.cmd().args(["migrate", "down", "--all"]).assert().success();

    ws.cmd()
        .args(["-f", "json", "migrate", "status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(r#""applied": []"#))
        .stdout(predicate::str::contains(r#""in_sync": false"#));
}

#[test]
fn test_goto_moves_both_ways() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["migrate", "goto", "1749511259"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version: 1749511259_updated_users"));

    ws.cmd()
        .args(["migrate", "goto", "1749253307"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted  1749511259_updated_users"));
}

#[test]
fn test_failed_step_exits_2_and_stops() {
    let ws = Workspace::new();
    ws.write("1750400000_broken.json", BROKEN);
    ws.write("1750500000_after.json", r#"{ "up": [], "down": [] }"#);

    ws.cmd()
        .args(["migrate", "up"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed at 1750400000_broken"))
        .stderr(predicate::str::contains("Not attempted: 1 migration(s)"));

    ws.cmd()
        .args(["-f", "json", "migrate", "status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1750341003_created_queries"))
        .stdout(predicate::str::contains(r#""drift": null"#));
}

#[test]
fn test_missing_manifest_is_drift() {
    let ws = Workspace::new();
    ws.cmd().args(["migrate", "up"]).assert().success();
    ws.remove("1750341003_created_queries.json");

    ws.cmd()
        .args(["migrate", "status"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Drift:"));

    ws.cmd()
        .args(["migrate", "up"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("State drift detected"));
}

#[test]
fn test_malformed_manifest_fails_at_load() {
    let ws = Workspace::new();
    ws.write("1750600000_no_down.json", r#"{ "up": [] }"#);

    ws.cmd()
        .args(["migrate", "up"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing required `down` operation"));

    ws.cmd().args(["migrate", "status"]).assert().code(2);
}

#[test]
fn test_resolve_refuses_without_committed_step() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["migrate", "resolve", "1749253307", "--direction", "up"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no committed step"));
}

#[test]
fn test_config_set_and_get() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["config", "set", "step_timeout_secs", "30"])
        .assert()
        .success();

    ws.cmd()
        .args(["config", "get", "step_timeout_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("30"));

    ws.cmd()
        .args(["config", "set", "backend", "postgres"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown backend"));
}

#[test]
fn test_completions() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tidemark"));
}
