//! Project identity resolution
//!
//! Every name the launcher hands to the runtime is derived from the project
//! directory alone, so repeated invocations from the same directory always
//! address the same image and container.

use crate::errors::{DockhandError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Suffix appended to the project name to form the image name
pub const IMAGE_SUFFIX: &str = "-dev";

/// A single image repository path component
static IMAGE_COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("static regex")
});

/// Names derived from the project directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    /// Absolute, symlink-resolved project directory
    pub directory: PathBuf,
    /// Final path component of `directory`
    pub project_name: String,
    /// Image tag used for builds
    pub image_name: String,
    /// Container name used for create/start/exec
    pub container_name: String,
}

impl ProjectIdentity {
    /// Resolve the identity of the project rooted at `path`
    ///
    /// The path is canonicalized first; failure to do so is a
    /// `PathResolution` error and happens before any side effect.
    #[instrument]
    pub fn resolve(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .map_err(|e| DockhandError::PathResolution {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let identity = Self::from_canonical(&canonical)?;
        debug!(
            project = %identity.project_name,
            image = %identity.image_name,
            container = %identity.container_name,
            "Resolved project identity"
        );
        Ok(identity)
    }

    /// Derive names from an already-absolute path without touching the filesystem
    pub fn from_canonical(path: &Path) -> Result<Self> {
        let project_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DockhandError::PathResolution {
                path: path.display().to_string(),
                reason: "path has no final component".to_string(),
            })?;

        // Runtimes reject image names with uppercase or other characters
        if !IMAGE_COMPONENT.is_match(&project_name) {
            return Err(DockhandError::PathResolution {
                path: path.display().to_string(),
                reason: format!(
                    "project name '{}' is not a valid image name \
                     (use lowercase letters, digits, '.', '_' or '-')",
                    project_name
                ),
            });
        }

        Ok(Self {
            directory: path.to_path_buf(),
            image_name: format!("{}{}", project_name, IMAGE_SUFFIX),
            container_name: project_name.clone(),
            project_name,
        })
    }
}
