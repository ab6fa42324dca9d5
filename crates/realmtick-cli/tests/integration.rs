#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn realmtick(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("realmtick").unwrap();
    cmd.current_dir(dir.path())
        .env("REALMTICK_ROOT", dir.path())
        .env_remove("RUST_LOG");
    for name in [
        "REALMTICK_QUEUE_CONCURRENCY",
        "REALMTICK_COMBAT_INTERVAL_MS",
        "REALMTICK_IDLE_INTERVAL_MS",
        "REALMTICK_FATIGUE_DECAY_RATE",
        "REALMTICK_FATIGUE_STRENGTH",
        "REALMTICK_FATIGUE_WINDOW",
        "REALMTICK_STALL_WINDOW_SECS",
        "REALMTICK_ARRIVAL_WINDOW_SECS",
        "REALMTICK_BEHAVIOR_TREE",
    ] {
        cmd.env_remove(name);
    }
    cmd
}

fn init_project(dir: &TempDir) {
    realmtick(dir).args(["config", "init"]).assert().success();
}

fn json_of(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_init_writes_default_config() {
    let dir = TempDir::new().unwrap();
    realmtick(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));
    assert!(dir.path().join(".realmtick/config.yaml").exists());
}

#[test]
fn config_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let path = dir.path().join(".realmtick/config.yaml");
    std::fs::write(&path, "queue:\n  concurrency: 3\n").unwrap();

    realmtick(&dir)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already initialized"));
    let kept = std::fs::read_to_string(&path).unwrap();
    assert!(kept.contains("concurrency: 3"));
}

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_requires_init() {
    let dir = TempDir::new().unwrap();
    realmtick(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".realmtick/config.yaml"),
        "queue:\n  concurrency: 0\n",
    )
    .unwrap();
    realmtick(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] queue.concurrency is zero"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn config_show_applies_environment_overrides() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let value = json_of(
        realmtick(&dir)
            .args(["config", "show", "--json"])
            .env("REALMTICK_QUEUE_CONCURRENCY", "7"),
    );
    assert_eq!(value["queue"]["concurrency"], 7);
}

#[test]
fn config_show_rejects_malformed_override() {
    let dir = TempDir::new().unwrap();
    realmtick(&dir)
        .args(["config", "show"])
        .env("REALMTICK_BEHAVIOR_TREE", "maybe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("REALMTICK_BEHAVIOR_TREE"));
}

// ---------------------------------------------------------------------------
// entity
// ---------------------------------------------------------------------------

#[test]
fn entity_add_then_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu", "--name", "Aria"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added hero"));

    realmtick(&dir)
        .args(["entity", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hero").and(predicate::str::contains("Aria")));

    let list = json_of(realmtick(&dir).args(["entity", "list", "--json"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["realm_id"], "eu");
    assert_eq!(list[0]["status"], "idle");
}

#[test]
fn entity_add_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu"])
        .assert()
        .success();
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn entity_add_checks_location_and_profile() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu", "--location", "atlantis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("location not found: atlantis"));
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu", "--profile", "bard"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile 'bard'"));
}

#[test]
fn entity_add_rejects_invalid_id() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "a/b", "--realm", "eu"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid entity id"));
}

#[test]
fn entity_show_unknown_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("entity not found: ghost"));
}

#[test]
fn entity_show_json_includes_activity() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu", "--profile", "warrior"])
        .assert()
        .success();
    let value = json_of(realmtick(&dir).args(["entity", "show", "hero", "--json"]));
    assert_eq!(value["entity"]["profile"], "warrior");
    assert!(value["logs"].as_array().unwrap().is_empty());
    assert!(value["chronicle"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// decide
// ---------------------------------------------------------------------------

#[test]
fn decide_previews_without_mutating() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["entity", "add", "hero", "--realm", "eu"])
        .assert()
        .success();
    let before = json_of(realmtick(&dir).args(["entity", "show", "hero", "--json"]));

    let value = json_of(realmtick(&dir).args(["decide", "hero", "--json"]));
    assert_eq!(value["entity_id"], "hero");
    assert!(value.get("decision").is_some());
    if !value["decision"].is_null() {
        assert!(value["decision"]["action_id"].is_string());
        assert!(!value["decision"]["ranked"].as_array().unwrap().is_empty());
    }

    let after = json_of(realmtick(&dir).args(["entity", "show", "hero", "--json"]));
    assert_eq!(before["entity"], after["entity"]);
}

#[test]
fn decide_unknown_entity_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["decide", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("entity not found: ghost"));
}

// ---------------------------------------------------------------------------
// enqueue / queue
// ---------------------------------------------------------------------------

#[test]
fn enqueue_shows_up_in_stats() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let job = json_of(realmtick(&dir).args(["enqueue", "eu", "hero", "--json"]));
    assert!(job["job_id"].as_str().unwrap().starts_with("eu:hero:"));
    assert_eq!(job["enqueued"], true);

    realmtick(&dir)
        .args(["enqueue", "eu", "hero", "--delay-ms", "600000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enqueued eu:hero:"));

    let stats = json_of(realmtick(&dir).args(["queue", "stats", "--json"]));
    assert_eq!(stats["tick"]["waiting"], 1);
    assert_eq!(stats["tick"]["delayed"], 1);
    assert_eq!(stats["digest"]["waiting"], 0);
}

#[test]
fn queue_stats_prints_table() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["queue", "stats"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("QUEUE")
                .and(predicate::str::contains("tick"))
                .and(predicate::str::contains("digest")),
        );
}

#[test]
fn queue_failed_and_recover_on_empty_queue() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    realmtick(&dir)
        .args(["queue", "failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No failed jobs."));
    realmtick(&dir)
        .args(["queue", "recover"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No stalled jobs."));
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn run_rejects_unknown_mode() {
    let dir = TempDir::new().unwrap();
    realmtick(&dir)
        .args(["run", "--mode", "turbo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode 'turbo'"));
}
