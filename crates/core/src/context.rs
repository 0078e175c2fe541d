//! Per-invocation context
//!
//! Everything the orchestrator needs to know about "this run" lives in an
//! [`InvocationContext`] that is built once at startup and passed explicitly.
//! Nothing below this layer reads the current directory or process arguments.

use crate::config::LauncherConfig;
use crate::drift::DriftDetector;
use crate::identity::ProjectIdentity;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory under the project root holding durable launcher state
pub const STATE_DIR_NAME: &str = ".dockhand";

/// User-supplied flags for one invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationFlags {
    /// Recreate the container
    pub force: bool,
    /// Rebuild the image and recreate the container
    pub rebuild: bool,
    /// Stream runtime output instead of showing a spinner
    pub verbose: bool,
}

impl InvocationFlags {
    /// Build flags, applying `rebuild => force`
    pub fn new(force: bool, rebuild: bool, verbose: bool) -> Self {
        Self {
            force: force || rebuild,
            rebuild,
            verbose,
        }
    }
}

/// Location of the durable per-project store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Layout rooted at an explicit directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default layout: `<project>/.dockhand`
    pub fn in_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(STATE_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checksum record written on every provisioning
    pub fn checksum_path(&self) -> PathBuf {
        self.root.join("checksums")
    }

    /// Cache directory mounted into the container
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Create the cache and state directories if missing
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.cache_dir(), self.state_dir()] {
            std::fs::create_dir_all(&dir)?;
            debug!("Ensured directory {}", dir.display());
        }
        Ok(())
    }
}

/// Explicit context passed through every orchestrator call
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub identity: ProjectIdentity,
    pub flags: InvocationFlags,
    pub config: LauncherConfig,
    pub layout: ProjectLayout,
    /// Files whose combined digest forms the launcher definition checksum
    pub launcher_inputs: Vec<PathBuf>,
}

impl InvocationContext {
    /// Context with the default layout and the project's config file as the
    /// only launcher input
    pub fn new(identity: ProjectIdentity, flags: InvocationFlags, config: LauncherConfig) -> Self {
        let layout = ProjectLayout::in_project(&identity.directory);
        let launcher_inputs = vec![LauncherConfig::path_for(&identity.directory)];
        Self {
            identity,
            flags,
            config,
            layout,
            launcher_inputs,
        }
    }

    pub fn with_layout(mut self, layout: ProjectLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Prepend an extra launcher input (typically the launcher executable)
    pub fn with_launcher_input(mut self, path: PathBuf) -> Self {
        self.launcher_inputs.insert(0, path);
        self
    }

    /// Absolute path of the build definition
    pub fn build_file(&self) -> PathBuf {
        self.identity.directory.join(&self.config.containerfile)
    }

    /// Drift detector bound to this project's inputs and record
    pub fn drift_detector(&self) -> DriftDetector {
        DriftDetector::new(
            self.build_file(),
            self.launcher_inputs.clone(),
            self.layout.checksum_path(),
        )
    }
}
