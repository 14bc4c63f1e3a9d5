use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn docmirror(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docmirror"));
    cmd.arg("--root").arg(root).env_remove("RUST_LOG");
    cmd
}

fn project() -> TempDir {
    let root = TempDir::new().expect("root");
    fs::create_dir_all(root.path().join("src/pkg")).expect("mkdir src");
    fs::create_dir_all(root.path().join("docs")).expect("mkdir docs");
    fs::write(root.path().join("src/a.py"), "def main():\n    pass\n").expect("write a");
    fs::write(root.path().join("src/pkg/b.rs"), "pub fn b() {}\n").expect("write b");
    root
}

fn git(dir: &Path, args: &[&str]) -> bool {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// A project whose root is a git repository with one commit. `None` when git
/// is not installed.
fn git_project() -> Option<TempDir> {
    let root = project();
    let ok = git(root.path(), &["init", "--quiet"])
        && git(root.path(), &["config", "user.email", "docs@example.com"])
        && git(root.path(), &["config", "user.name", "Docs Bot"])
        && git(root.path(), &["commit", "--quiet", "--allow-empty", "-m", "init"]);
    ok.then_some(root)
}

#[test]
fn status_reports_new_sources_as_json() {
    let root = project();
    let assert = docmirror(root.path())
        .args(["status", "--json"])
        .assert()
        .success();
    let json: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("status json");

    assert_eq!(json["summary"]["new"], 2);
    assert_eq!(json["summary"]["tracked"], 0);
    let paths: Vec<&str> = json["files"]
        .as_array()
        .expect("files")
        .iter()
        .map(|f| f["path"].as_str().expect("path"))
        .collect();
    assert_eq!(paths, vec!["src/a.py", "src/pkg/b.rs"]);
}

#[test]
fn dry_run_lists_candidates_and_writes_nothing() {
    let root = project();
    docmirror(root.path())
        .args(["sync", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("would process 2 file(s)"))
        .stdout(contains("src/pkg/b.rs"));

    assert!(!root.path().join("docs/a.py.md").exists());
    assert!(!root.path().join(".docmirror/cache.json").exists());
}

#[test]
fn diff_shows_new_targets_as_additions() {
    let root = project();
    docmirror(root.path())
        .args(["diff"])
        .arg(root.path().join("src/a.py"))
        .assert()
        .success()
        .stdout(contains("+++ docs/a.py.md"))
        .stdout(contains("+# a.py"));
    assert!(!root.path().join("docs/a.py.md").exists());
}

#[test]
fn diff_requires_a_path() {
    let root = project();
    docmirror(root.path()).arg("diff").assert().failure();
}

#[test]
fn unknown_strategy_is_rejected() {
    let root = project();
    docmirror(root.path())
        .args(["sync", "--strategy", "overwrite"])
        .assert()
        .failure()
        .stderr(contains("unknown strategy"));
}

#[test]
fn cache_commands_work_on_an_empty_cache() {
    let root = project();
    docmirror(root.path())
        .args(["cache", "validate"])
        .assert()
        .success()
        .stdout(contains("no problems"));
    docmirror(root.path())
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(contains("cleared 0 entries"));
    assert!(root.path().join(".docmirror/cache.json").exists());
}

#[test]
fn corrupt_cache_entry_fails_validation() {
    let root = project();
    fs::create_dir_all(root.path().join(".docmirror")).expect("mkdir");
    fs::write(
        root.path().join(".docmirror/cache.json"),
        r#"{"version":1,"entries":{"src/a.py":{"size":3,"mtime":1000.0,"fast_digest":"short","strong_digest":"","last_processed":"2026-01-01T00:00:00Z","metadata":{}}}}"#,
    )
    .expect("write cache");

    docmirror(root.path())
        .args(["cache", "validate"])
        .assert()
        .failure()
        .stdout(contains("src/a.py"));
}

#[test]
fn malformed_config_is_reported() {
    let root = project();
    fs::create_dir_all(root.path().join(".docmirror")).expect("mkdir");
    fs::write(root.path().join(".docmirror/config.yaml"), "workers: [nope\n").expect("write config");
    docmirror(root.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("config.yaml"));
}

#[test]
fn sync_commits_docs_then_has_nothing_to_do() {
    let Some(root) = git_project() else {
        return;
    };

    docmirror(root.path()).arg("sync").assert().success();
    assert!(root.path().join("docs/a.py.md").exists());
    assert!(root.path().join("docs/pkg/b.rs.history.md").exists());
    assert!(root.path().join(".docmirror/cache.json").exists());

    let log = Command::new("git")
        .args(["log", "--format=%s"])
        .current_dir(root.path())
        .output()
        .expect("git log");
    let subjects = String::from_utf8_lossy(&log.stdout);
    assert!(subjects.lines().any(|l| l == "docs: sync: 2 file(s)"), "{subjects}");

    docmirror(root.path())
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("nothing to do"));
}
