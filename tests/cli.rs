//! End-to-end tests of the `run` binary

mod common;

use assert_cmd::Command;
use common::{create_package, create_test_config, file_uri};
use predicates::prelude::*;
use std::fs;

fn run_in(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("run").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_runs_default_action() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  default:
    cmds: echo "from default"
"#,
    );

    run_in(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("from default"))
        .stderr(predicate::str::contains("default"));
}

#[test]
fn test_finds_config_in_parent_dir() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  hello:
    cmds: echo hello
"#,
    );
    let sub_dir = temp_dir.path().join("subdir");
    fs::create_dir(&sub_dir).unwrap();

    run_in(&sub_dir)
        .arg("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));
}

#[test]
fn test_passes_args() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  greet:
    cmds: echo "hi {{.args.name | upper}}"
"#,
    );

    run_in(temp_dir.path())
        .args(["greet", "-a", "name=bob"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hi BOB"));
}

#[test]
fn test_failure_exits_non_zero() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  broken:
    cmds:
      - exit 4
      - echo unreachable
"#,
    );

    run_in(temp_dir.path())
        .arg("broken")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("unreachable").not())
        .stderr(predicate::str::contains("action 'broken' failed"));
}

#[test]
fn test_unknown_action() {
    let (temp_dir, _) = create_test_config("actions: {}\n");

    run_in(temp_dir.path())
        .arg("nope")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no action with the name 'nope'"));
}

#[test]
fn test_error_cause_reported_once() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  default:
    deps: [nope]
"#,
    );

    run_in(temp_dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "action 'default' failed: resolution error: no action with the name 'nope'",
        ))
        .stderr(predicate::function(|err: &str| {
            err.matches("no action with the name 'nope'").count() == 1
        }));
}

#[test]
fn test_missing_config() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.yaml");

    run_in(temp_dir.path())
        .arg("-f")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.yaml"));
}

#[test]
fn test_list_actions() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let lib = create_package(
        temp_dir.path(),
        "lib",
        "actions:\n  fmt:\n    desc: Format sources\n",
    );
    let project = create_package(
        temp_dir.path(),
        "project",
        &format!(
            "imports:\n  lib: {}\nactions:\n  build:\n    desc: Build it\n",
            file_uri(&lib)
        ),
    );

    run_in(&project)
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("Build it"))
        .stdout(predicate::str::contains("lib.fmt"))
        .stdout(predicate::str::contains("Format sources"));
}

#[test]
fn test_dump_declaration() {
    let (temp_dir, _) = create_test_config(
        r#"
imports:
  lib: github.com/acme/not-fetched
actions:
  build:
    cmds: echo build
"#,
    );

    // Dumping does not fetch imports
    run_in(temp_dir.path())
        .arg("--dump")
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com/acme/not-fetched"))
        .stdout(predicate::str::contains("echo build"));
    assert!(!temp_dir.path().join(".run").exists());
}

#[test]
fn test_silent_mode() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  default:
    cmds: echo "should not appear"
"#,
    );

    run_in(temp_dir.path())
        .arg("-s")
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_live_mode() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  dep:
    cmds: echo inner
  top:
    deps: [dep]
    cmds: echo outer
"#,
    );

    run_in(temp_dir.path())
        .args(["top", "--live"])
        .assert()
        .success()
        .stdout(predicate::str::contains("▶ top"))
        .stdout(predicate::str::contains("    inner"))
        .stdout(predicate::str::contains("  outer"));
}

#[test]
fn test_dotenv_loaded() {
    let (temp_dir, _) = create_test_config(
        r#"
actions:
  show:
    cmds: echo "token={{.env.RUNFILE_TEST_TOKEN}}"
"#,
    );
    fs::write(temp_dir.path().join(".env"), "RUNFILE_TEST_TOKEN=abc123\n").unwrap();

    run_in(temp_dir.path())
        .arg("show")
        .env_remove("RUNFILE_TEST_TOKEN")
        .assert()
        .success()
        .stdout(predicate::str::contains("token=abc123"));
}
