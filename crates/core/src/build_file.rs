//! Default build definition
//!
//! Projects without a Containerfile get a generated one: a Fedora base with a
//! non-root `dev` user whose uid and gid come from the `USER_UID` and
//! `USER_GID` build arguments, so files written in the bind-mounted project
//! stay owned by the host user.

use crate::errors::Result;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Base image of the generated build definition
pub const DEFAULT_BASE_IMAGE: &str = "registry.fedoraproject.org/fedora:latest";

/// Contents written when the project has no build definition
pub const DEFAULT_CONTAINERFILE_CONTENT: &str = r#"FROM registry.fedoraproject.org/fedora:latest

ARG USER_UID=1000
ARG USER_GID=1000
ARG USERNAME=dev

RUN dnf install -y --setopt=install_weak_deps=False \
        bash-completion git less procps-ng sudo which \
    && dnf clean all

RUN groupadd --gid "${USER_GID}" "${USERNAME}" \
    && useradd --uid "${USER_UID}" --gid "${USER_GID}" -m -s /bin/bash "${USERNAME}" \
    && echo "${USERNAME} ALL=(ALL) NOPASSWD:ALL" > "/etc/sudoers.d/${USERNAME}" \
    && chmod 0440 "/etc/sudoers.d/${USERNAME}"

USER ${USERNAME}
"#;

/// Write the default build definition to `path` unless a file is already there
///
/// Returns `true` when a file was generated. An existing file is never
/// touched.
#[instrument]
pub fn ensure_build_definition(path: &Path) -> Result<bool> {
    if path.exists() {
        debug!("Build definition present at {}", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, DEFAULT_CONTAINERFILE_CONTENT)?;
    std::fs::rename(&temp_path, path)?;

    info!("Generated default build definition at {}", path.display());
    Ok(true)
}
