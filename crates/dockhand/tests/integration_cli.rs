use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

/// Project directory with a name the runtime accepts as an image name
fn project_dir(temp_dir: &TempDir) -> PathBuf {
    let project = temp_dir.path().join("proj");
    std::fs::create_dir(&project).unwrap();
    project
}

#[test]
fn test_help_output() {
    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Per-project development container launcher",
        ))
        .stdout(predicate::str::contains("--force"))
        .stdout(predicate::str::contains("--rebuild"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--project-dir"))
        .stdout(predicate::str::contains("--runtime"));
}

#[test]
fn test_version_output() {
    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "dockhand {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_invalid_runtime_is_usage_error() {
    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.args(["--runtime", "lxc"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid value 'lxc'"));
}

#[test]
fn test_missing_project_dir_fails_resolution() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("does-not-exist");

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.arg("--project-dir")
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to resolve project directory"));
}

#[test]
fn test_uppercase_project_dir_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("MyProj");
    std::fs::create_dir(&project).unwrap();

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.arg("--project-dir")
        .arg(&project)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("'MyProj' is not a valid image name"));
}

#[test]
fn test_invalid_config_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let project = project_dir(&temp_dir);
    std::fs::write(project.join("dockhand.toml"), "shell = [not toml").unwrap();

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.arg("--project-dir")
        .arg(&project)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[cfg(unix)]
#[test]
fn test_missing_runtime_exits_127() {
    let temp_dir = TempDir::new().unwrap();
    let project = project_dir(&temp_dir);

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.env("PATH", "")
        .env_remove("DOCKHAND_RUNTIME")
        .arg("--project-dir")
        .arg(&project)
        .args(["--runtime", "podman"])
        .assert()
        .failure()
        .code(127)
        .stderr(predicate::str::contains("podman is not installed"))
        .stderr(predicate::str::contains("podman.io"));

    // Nothing is provisioned before the runtime check
    assert!(!project.join(".dockhand").exists());
    assert!(!project.join("Containerfile").exists());
}

#[cfg(unix)]
#[test]
fn test_build_failure_prints_last_twenty_lines() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let project = project_dir(&temp_dir);
    let bin = temp_dir.path().join("bin");
    std::fs::create_dir(&bin).unwrap();
    let call_log = temp_dir.path().join("calls.log");

    // Runtime with nothing provisioned whose build emits 50 lines and fails
    let podman = bin.join("podman");
    std::fs::write(
        &podman,
        r#"#!/bin/sh
echo "$*" >> "$FAKE_RUNTIME_LOG"
case "$1" in
    --version) echo "podman version 5.0.0" ;;
    container|image) exit 1 ;;
    build)
        i=1
        while [ "$i" -le 50 ]; do
            echo "line $i"
            i=$((i + 1))
        done
        exit 1
        ;;
    *) exit 0 ;;
esac
"#,
    )
    .unwrap();
    std::fs::set_permissions(&podman, std::fs::Permissions::from_mode(0o755)).unwrap();

    let path = std::env::var_os("PATH").unwrap_or_default();
    let mut search_path = vec![bin.clone()];
    search_path.extend(std::env::split_paths(&path));

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.env("PATH", std::env::join_paths(search_path).unwrap())
        .env("FAKE_RUNTIME_LOG", &call_log)
        .env_remove("DOCKHAND_RUNTIME")
        .env_remove("DOCKHAND_STATE_DIR")
        .arg("--project-dir")
        .arg(&project)
        .args(["--runtime", "podman"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::is_match(r"(?m)^  line 31$").unwrap())
        .stderr(predicate::str::is_match(r"(?m)^  line 50$").unwrap())
        .stderr(predicate::str::is_match(r"(?m)^  line 30$").unwrap().not());

    let calls = std::fs::read_to_string(&call_log).unwrap();
    assert!(calls.lines().any(|line| line.starts_with("build ")));
    assert!(
        !calls
            .lines()
            .any(|line| line.starts_with("create ") || line.starts_with("container create")),
        "create must not run after a failed build:\n{calls}"
    );
}
