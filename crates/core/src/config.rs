//! Launcher configuration
//!
//! An optional `dockhand.toml` at the project root tunes how the container is
//! built and created. Every field has a default, so a project without the file
//! behaves exactly like one with an empty file.
//!
//! ```toml
//! runtime = "podman"
//! containerfile = "Containerfile"
//! shell = "/bin/zsh -l"
//! workdir = "/workspace/app"
//! mounts = ["~/.gitconfig:/home/dev/.gitconfig:ro"]
//! mount_runtime_socket = true
//! create_args = ["--network=host"]
//!
//! [env]
//! EDITOR = "vim"
//!
//! [build_args]
//! RUST_VERSION = "1.80"
//! ```

use crate::errors::{DockhandError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Name of the per-project configuration file
pub const CONFIG_FILE_NAME: &str = "dockhand.toml";

/// Default build definition file name
pub const DEFAULT_CONTAINERFILE: &str = "Containerfile";

/// Default interactive shell started on attach
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Parsed contents of `dockhand.toml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Preferred runtime (`podman` or `docker`)
    pub runtime: Option<String>,
    /// Build definition path, relative to the project directory
    pub containerfile: String,
    /// Shell command line executed on attach
    pub shell: String,
    /// Working directory inside the container; defaults to the project mount
    pub workdir: Option<String>,
    /// Extra volume specs passed as `-v` to create
    pub mounts: Vec<String>,
    /// Extra environment passed as `-e` to create
    pub env: BTreeMap<String, String>,
    /// Bind the host runtime socket into the container
    pub mount_runtime_socket: bool,
    /// Raw arguments appended to create before the image name
    pub create_args: Vec<String>,
    /// Extra `--build-arg` values
    pub build_args: BTreeMap<String, String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            containerfile: DEFAULT_CONTAINERFILE.to_string(),
            shell: DEFAULT_SHELL.to_string(),
            workdir: None,
            mounts: Vec::new(),
            env: BTreeMap::new(),
            mount_runtime_socket: false,
            create_args: Vec::new(),
            build_args: BTreeMap::new(),
        }
    }
}

impl LauncherConfig {
    /// Path of the configuration file for a project directory
    pub fn path_for(project_dir: &Path) -> PathBuf {
        project_dir.join(CONFIG_FILE_NAME)
    }

    /// Load the configuration for a project, falling back to defaults when the
    /// file does not exist
    #[instrument]
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = Self::path_for(project_dir);
        if !path.exists() {
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|message| DockhandError::Config {
            path: path.display().to_string(),
            message,
        })
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.containerfile.trim().is_empty() {
            return Err("containerfile must not be empty".to_string());
        }
        if config.shell_command()?.is_empty() {
            return Err("shell must not be empty".to_string());
        }
        Ok(config)
    }

    /// Shell command line split into argv
    pub fn shell_command(&self) -> std::result::Result<Vec<String>, String> {
        shell_words::split(&self.shell).map_err(|e| format!("invalid shell '{}': {}", self.shell, e))
    }

    /// Working directory inside the container for the given project
    pub fn workdir_for(&self, project_name: &str) -> String {
        self.workdir
            .clone()
            .unwrap_or_else(|| format!("/workspace/{}", project_name))
    }
}
