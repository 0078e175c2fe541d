//! Ctrl-C handling while waiting on the runtime
//!
//! Kept in its own test binary: the SIGINT sent here is process-wide and
//! would race with unrelated tests running in parallel.

#![cfg(unix)]

use dockhand_core::cli_runtime::CliRuntime;
use dockhand_core::errors::DockhandError;
use dockhand_core::executor::CommandExecutor;
use dockhand_core::runtime::{RuntimeGateway, RuntimeKind};
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use tempfile::TempDir;
use tokio::signal::unix::{signal, SignalKind};

/// Runtime CLI whose container exists but never reaches the running state
fn never_running_cli(dir: &std::path::Path) -> String {
    let path = dir.join("fake-runtime");
    let script = r#"#!/bin/sh
case "$1 $2" in
    "container inspect") echo false ;;
    *) exit 0 ;;
esac
"#;
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_ctrl_c_interrupts_wait_running() {
    // Installing a listener first keeps the default SIGINT action from killing the test
    let _sigint = signal(SignalKind::interrupt()).expect("Should install SIGINT listener");

    let dir = TempDir::new().unwrap();
    let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new())
        .with_program(never_running_cli(dir.path()));

    let pid = std::process::id();
    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::process::Command::new("sh")
            .args(["-c", &format!("kill -INT {}", pid)])
            .status()
            .await
            .expect("Should send SIGINT");
    });

    let result = tokio::time::timeout(Duration::from_secs(10), runtime.wait_running("proj"))
        .await
        .expect("wait_running should stop on SIGINT instead of polling forever");
    sender.await.unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, DockhandError::Interrupted), "unexpected error: {err:?}");
    assert_eq!(err.exit_code(), 130);
}
