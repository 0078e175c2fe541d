//! Container runtime abstraction
//!
//! The orchestrator never shells out directly; it talks to a
//! [`RuntimeGateway`], a narrow capability set mapped 1:1 onto runtime
//! subcommands. [`crate::cli_runtime::CliRuntime`] drives the real podman or
//! docker CLI, and [`crate::mock::MockRuntime`] keeps everything in memory for
//! testing the lifecycle decisions.

use crate::container_spec::ContainerSpec;
use crate::errors::{DockhandError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Capability set the orchestrator needs from a container runtime
///
/// Removal operations treat "does not exist" as success. Every other
/// operation reports failure through `DockhandError::CommandFailed` and is
/// attempted exactly once.
#[allow(async_fn_in_trait)]
pub trait RuntimeGateway {
    /// Name of this runtime (e.g. "podman", "docker")
    fn runtime_name(&self) -> &'static str;

    /// Fail with `MissingPrerequisite` if the runtime CLI is unavailable
    async fn check_installed(&self) -> Result<()>;

    async fn image_exists(&self, image: &str) -> Result<bool>;

    async fn container_exists(&self, name: &str) -> Result<bool>;

    async fn is_running(&self, name: &str) -> Result<bool>;

    /// Remove a container, succeeding if it does not exist
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Remove an image, succeeding if it does not exist
    async fn remove_image(&self, image: &str) -> Result<()>;

    async fn build(&self, spec: &BuildSpec, verbose: bool) -> Result<()>;

    async fn create(&self, spec: &ContainerSpec, verbose: bool) -> Result<()>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Block until the container reports running; no timeout
    async fn wait_running(&self, name: &str) -> Result<()>;

    /// Make sure the runtime's API socket is being served
    async fn ensure_socket(&self) -> Result<()>;

    /// Run an interactive command in the container and return its exit code
    async fn exec_interactive(&self, name: &str, workdir: &str, command: &[String])
        -> Result<i32>;
}

impl<T: RuntimeGateway> RuntimeGateway for &T {
    fn runtime_name(&self) -> &'static str {
        (*self).runtime_name()
    }

    async fn check_installed(&self) -> Result<()> {
        (*self).check_installed().await
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        (*self).image_exists(image).await
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        (*self).container_exists(name).await
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        (*self).is_running(name).await
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        (*self).remove_container(name).await
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        (*self).remove_image(image).await
    }

    async fn build(&self, spec: &BuildSpec, verbose: bool) -> Result<()> {
        (*self).build(spec, verbose).await
    }

    async fn create(&self, spec: &ContainerSpec, verbose: bool) -> Result<()> {
        (*self).create(spec, verbose).await
    }

    async fn start(&self, name: &str) -> Result<()> {
        (*self).start(name).await
    }

    async fn wait_running(&self, name: &str) -> Result<()> {
        (*self).wait_running(name).await
    }

    async fn ensure_socket(&self) -> Result<()> {
        (*self).ensure_socket().await
    }

    async fn exec_interactive(
        &self,
        name: &str,
        workdir: &str,
        command: &[String],
    ) -> Result<i32> {
        (*self).exec_interactive(name, workdir, command).await
    }
}

/// Inputs to an image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Build definition file
    pub build_file: PathBuf,
    /// Build context directory
    pub context: PathBuf,
    /// Image tag to produce
    pub tag: String,
    /// `--build-arg` values, including the host user and group ids
    pub build_args: BTreeMap<String, String>,
}

impl BuildSpec {
    /// Runtime arguments after the program name
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            "-f".to_string(),
            self.build_file.display().to_string(),
            "-t".to_string(),
            self.tag.clone(),
        ];
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.context.display().to_string());
        args
    }
}

/// Supported runtimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Podman (default)
    Podman,
    /// Docker
    Docker,
}

impl RuntimeKind {
    /// CLI binary name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// Installation hint shown when the CLI is missing
    pub fn install_guidance(&self) -> &'static str {
        match self {
            Self::Podman => "Install podman: https://podman.io/docs/installation",
            Self::Docker => "Install docker: https://docs.docker.com/get-docker/",
        }
    }

    /// Host path of the runtime API socket
    pub fn host_socket_path(&self, runtime_dir: Option<&Path>, uid: u32) -> PathBuf {
        match self {
            Self::Podman => runtime_dir
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", uid)))
                .join("podman")
                .join("podman.sock"),
            Self::Docker => PathBuf::from("/var/run/docker.sock"),
        }
    }

    /// Environment variable clients inside the container read the socket from
    pub fn socket_env_var(&self) -> &'static str {
        match self {
            Self::Podman => "CONTAINER_HOST",
            Self::Docker => "DOCKER_HOST",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = DockhandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            _ => Err(DockhandError::Runtime(format!(
                "Unknown runtime: {}. Supported runtimes: podman, docker",
                s
            ))),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime selection
pub struct RuntimeFactory;

impl RuntimeFactory {
    /// Pick the runtime
    ///
    /// Precedence: CLI flag > `DOCKHAND_RUNTIME` > config file > podman.
    /// Unparseable environment or config values are ignored.
    pub fn detect_runtime(
        cli_runtime: Option<RuntimeKind>,
        env_runtime: Option<&str>,
        config_runtime: Option<&str>,
    ) -> RuntimeKind {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }
        for candidate in [env_runtime, config_runtime].into_iter().flatten() {
            match candidate.parse() {
                Ok(runtime) => return runtime,
                Err(e) => tracing::warn!("{}", e),
            }
        }
        RuntimeKind::Podman
    }
}
