//! CLI-backed runtime gateway
//!
//! Podman and docker share a compatible CLI, so one implementation serves
//! both; the few subcommands that differ are chosen by [`RuntimeKind`].

use crate::container_spec::ContainerSpec;
use crate::errors::{DockhandError, Result};
use crate::executor::{until_interrupted, CommandExecutor, ExecOptions, ExecOutcome, TAIL_LINES};
use crate::runtime::{BuildSpec, RuntimeGateway, RuntimeKind};
use std::io::IsTerminal;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Interval between running-state polls while waiting for a container
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runtime gateway that invokes the podman or docker CLI
#[derive(Debug, Clone)]
pub struct CliRuntime {
    kind: RuntimeKind,
    program: String,
    executor: CommandExecutor,
}

impl CliRuntime {
    pub fn new(kind: RuntimeKind, executor: CommandExecutor) -> Self {
        Self {
            kind,
            program: kind.as_str().to_string(),
            executor,
        }
    }

    /// Use a custom binary path for the runtime CLI
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn poll_until_running(&self, name: &str) -> Result<()> {
        loop {
            if self.is_running(name).await? {
                return Ok(());
            }
            if !self.container_exists(name).await? {
                return Err(DockhandError::Runtime(format!(
                    "Container {} disappeared while waiting for it to run",
                    name
                )));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn argv<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        std::iter::once(self.program.clone())
            .chain(args.into_iter().map(Into::into))
            .collect()
    }

    async fn query<I, S>(&self, args: I) -> Result<ExecOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv = self.argv(args);
        self.executor
            .execute_quiet(&argv)
            .await
            .map_err(|e| self.with_install_guidance(e))
    }

    /// Run a quiet command and turn a nonzero exit into `CommandFailed`
    async fn run_checked(&self, label: &str, args: Vec<String>) -> Result<()> {
        let outcome = self.query(args).await?;
        if outcome.success() {
            Ok(())
        } else {
            Err(command_failed(label, &outcome))
        }
    }

    /// Remove something, treating absence as success
    async fn remove(&self, label: &str, args: Vec<String>) -> Result<()> {
        let outcome = self.query(args).await?;
        if outcome.success() || is_absence_error(&outcome.combined_output) {
            debug!("{}: done (exit {})", label, outcome.exit_code);
            Ok(())
        } else {
            Err(command_failed(label, &outcome))
        }
    }

    fn with_install_guidance(&self, err: DockhandError) -> DockhandError {
        match err {
            DockhandError::MissingPrerequisite { program, .. } if program == self.program => {
                DockhandError::MissingPrerequisite {
                    program,
                    guidance: self.kind.install_guidance().to_string(),
                }
            }
            other => other,
        }
    }
}

fn command_failed(label: &str, outcome: &ExecOutcome) -> DockhandError {
    DockhandError::CommandFailed {
        label: label.to_string(),
        exit_code: outcome.exit_code,
        tail_output: crate::executor::tail_lines(&outcome.combined_output, TAIL_LINES),
    }
}

/// Whether runtime output says the target of a removal does not exist
pub fn is_absence_error(output: &str) -> bool {
    let lower = output.to_lowercase();
    [
        "no such container",
        "no such image",
        "no such object",
        "no container with name or id",
        "image not known",
    ]
    .iter()
    .any(|pattern| lower.contains(pattern))
}

impl RuntimeGateway for CliRuntime {
    fn runtime_name(&self) -> &'static str {
        self.kind.as_str()
    }

    #[instrument(skip(self))]
    async fn check_installed(&self) -> Result<()> {
        let outcome = self.query(["--version"]).await?;
        if outcome.success() {
            debug!("{}", outcome.combined_output.trim());
            Ok(())
        } else {
            Err(DockhandError::MissingPrerequisite {
                program: self.program.clone(),
                guidance: self.kind.install_guidance().to_string(),
            })
        }
    }

    #[instrument(skip(self))]
    async fn image_exists(&self, image: &str) -> Result<bool> {
        let outcome = match self.kind {
            RuntimeKind::Podman => self.query(["image", "exists", image]).await?,
            RuntimeKind::Docker => {
                self.query(["image", "inspect", "--format", "{{.Id}}", image])
                    .await?
            }
        };
        Ok(outcome.success())
    }

    #[instrument(skip(self))]
    async fn container_exists(&self, name: &str) -> Result<bool> {
        let outcome = match self.kind {
            RuntimeKind::Podman => self.query(["container", "exists", name]).await?,
            RuntimeKind::Docker => {
                self.query(["container", "inspect", "--format", "{{.Id}}", name])
                    .await?
            }
        };
        Ok(outcome.success())
    }

    #[instrument(skip(self))]
    async fn is_running(&self, name: &str) -> Result<bool> {
        let outcome = self
            .query(["container", "inspect", "--format", "{{.State.Running}}", name])
            .await?;
        Ok(outcome.success() && outcome.combined_output.trim() == "true")
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, name: &str) -> Result<()> {
        self.remove(
            &format!("Removing container {}", name),
            vec!["rm".into(), "-f".into(), name.into()],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn remove_image(&self, image: &str) -> Result<()> {
        self.remove(
            &format!("Removing image {}", image),
            vec!["rmi".into(), "-f".into(), image.into()],
        )
        .await
    }

    #[instrument(skip(self, spec), fields(tag = %spec.tag))]
    async fn build(&self, spec: &BuildSpec, verbose: bool) -> Result<()> {
        let argv = self.argv(spec.to_args());
        let options = ExecOptions::new(format!("Building image {}", spec.tag), verbose);
        self.executor
            .execute(&argv, &options)
            .await
            .map_err(|e| self.with_install_guidance(e))?;
        Ok(())
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create(&self, spec: &ContainerSpec, verbose: bool) -> Result<()> {
        let argv = self.argv(spec.to_create_args());
        let options = ExecOptions::new(format!("Creating container {}", spec.name), verbose);
        self.executor
            .execute(&argv, &options)
            .await
            .map_err(|e| self.with_install_guidance(e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<()> {
        self.run_checked(
            &format!("Starting container {}", name),
            vec!["start".into(), name.into()],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn wait_running(&self, name: &str) -> Result<()> {
        until_interrupted(self.poll_until_running(name)).await
    }

    #[instrument(skip(self))]
    async fn ensure_socket(&self) -> Result<()> {
        if self.kind != RuntimeKind::Podman || !cfg!(target_os = "linux") {
            return Ok(());
        }
        let active = self
            .executor
            .execute_quiet(&[
                "systemctl".to_string(),
                "--user".to_string(),
                "is-active".to_string(),
                "--quiet".to_string(),
                "podman.socket".to_string(),
            ])
            .await?;
        if active.success() {
            debug!("podman.socket already active");
            return Ok(());
        }

        info!("Starting podman.socket");
        let argv: Vec<String> = ["systemctl", "--user", "start", "podman.socket"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcome = self.executor.execute_quiet(&argv).await?;
        if outcome.success() {
            Ok(())
        } else {
            Err(command_failed("Starting podman.socket", &outcome))
        }
    }

    #[instrument(skip(self))]
    async fn exec_interactive(
        &self,
        name: &str,
        workdir: &str,
        command: &[String],
    ) -> Result<i32> {
        // Without a terminal there is no `-t`; SIGINT then reaches only this
        // foreground child and its exit code is returned as the session's
        let tty_flag = if std::io::stdin().is_terminal() {
            "-it"
        } else {
            "-i"
        };
        let mut args = vec![
            "exec".to_string(),
            tty_flag.to_string(),
            "-w".to_string(),
            workdir.to_string(),
            name.to_string(),
        ];
        args.extend(command.iter().cloned());
        let argv = self.argv(args);
        self.executor
            .execute_interactive(&argv)
            .await
            .map_err(|e| self.with_install_guidance(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absence_errors() {
        assert!(is_absence_error(
            "Error: no container with name or ID \"proj\" found: no such container"
        ));
        assert!(is_absence_error("Error response from daemon: No such container: proj"));
        assert!(is_absence_error("Error: proj-dev: image not known"));
        assert!(is_absence_error("Error response from daemon: No such image: proj-dev:latest"));
        assert!(!is_absence_error("Error: cannot remove container: container is paused"));
    }

    #[test]
    fn test_argv_prefixes_program() {
        let runtime = CliRuntime::new(RuntimeKind::Docker, CommandExecutor::new())
            .with_program("/usr/local/bin/docker");
        assert_eq!(
            runtime.argv(["start", "proj"]),
            vec!["/usr/local/bin/docker", "start", "proj"]
        );
        assert_eq!(runtime.runtime_name(), "docker");
    }

    #[tokio::test]
    async fn test_missing_binary_carries_install_guidance() {
        let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new())
            .with_program("dockhand-no-such-podman");
        let err = runtime.check_installed().await.unwrap_err();
        match err {
            DockhandError::MissingPrerequisite { program, guidance } => {
                assert_eq!(program, "dockhand-no-such-podman");
                assert!(guidance.contains("podman.io"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// A fake runtime CLI written as a shell script so the gateway's argument
    /// mapping and exit-code handling can be exercised without a daemon
    #[cfg(unix)]
    fn fake_cli(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-runtime");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remove_missing_container_is_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_cli(
            dir.path(),
            "echo 'Error: no container with name or ID \"proj\" found: no such container' >&2; exit 1",
        );
        let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new()).with_program(program);
        runtime.remove_container("proj").await.unwrap();
        runtime.remove_image("proj-dev").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remove_other_failure_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_cli(dir.path(), "echo 'permission denied' >&2; exit 125");
        let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new()).with_program(program);
        let err = runtime.remove_container("proj").await.unwrap_err();
        assert!(matches!(err, DockhandError::CommandFailed { exit_code: 125, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_is_running_parses_inspect_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_cli(
            dir.path(),
            "case \"$5\" in running) echo true ;; stopped) echo false ;; *) exit 1 ;; esac",
        );
        let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new()).with_program(program);
        assert!(runtime.is_running("running").await.unwrap());
        assert!(!runtime.is_running("stopped").await.unwrap());
        assert!(!runtime.is_running("missing").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existence_checks_use_exit_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_cli(dir.path(), "[ \"$3\" = present ]");
        let runtime = CliRuntime::new(RuntimeKind::Podman, CommandExecutor::new()).with_program(program);
        assert!(runtime.image_exists("present").await.unwrap());
        assert!(!runtime.image_exists("absent").await.unwrap());
        assert!(runtime.container_exists("present").await.unwrap());
        assert!(!runtime.container_exists("absent").await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_start_is_command_failed() {
        let dir = tempfile::TempDir::new().unwrap();
        let program = fake_cli(dir.path(), "echo 'cannot start' >&2; exit 2");
        let runtime = CliRuntime::new(RuntimeKind::Docker, CommandExecutor::new()).with_program(program);
        let err = runtime.start("proj").await.unwrap_err();
        match err {
            DockhandError::CommandFailed { tail_output, .. } => {
                assert_eq!(tail_output, vec!["cannot start"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
