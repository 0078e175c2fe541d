//! Host platform detection and OS-specific runtime flags
//!
//! The container definition differs slightly per host: rootless podman on
//! Linux needs `--userns=keep-id` so files in the bind-mounted project keep the
//! host user's ownership, SELinux hosts need a relabel suffix on volumes, and
//! Windows paths must be rewritten before they can be used as mount sources.

use crate::runtime::RuntimeKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument};

/// Fallback user and group id when `id` cannot be queried
pub const FALLBACK_ID: u32 = 1000;

/// Host platforms with distinct container flag requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Native Linux
    Linux,
    /// macOS (runtime runs inside a VM)
    MacOS,
    /// Native Windows
    Windows,
    /// Windows Subsystem for Linux
    WSL,
}

impl Platform {
    /// Detect the current platform
    #[instrument]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if Self::is_wsl() {
            Platform::WSL
        } else {
            Platform::Linux
        }
    }

    /// WSL kernels mention Microsoft in /proc/version
    fn is_wsl() -> bool {
        match fs::read_to_string("/proc/version") {
            Ok(version) => {
                let is_wsl = version.to_lowercase().contains("microsoft");
                debug!("WSL detection: {}", is_wsl);
                is_wsl
            }
            Err(_) => false,
        }
    }

    /// The runtime shares the host kernel (no VM in between)
    pub fn is_native_linux(self) -> bool {
        matches!(self, Platform::Linux | Platform::WSL)
    }

    /// Flags that map the container user onto the host user
    pub fn user_namespace_args(self, runtime: RuntimeKind) -> Vec<String> {
        match (runtime, self.is_native_linux()) {
            (RuntimeKind::Podman, true) => vec!["--userns=keep-id".to_string()],
            _ => Vec::new(),
        }
    }

    /// Suffix appended to bind-mount specs for SELinux relabeling
    pub fn volume_suffix(self, runtime: RuntimeKind) -> &'static str {
        match (runtime, self) {
            (RuntimeKind::Podman, Platform::Linux) => ":z",
            _ => "",
        }
    }

    /// Render a host path as a mount source for this platform
    pub fn mount_source(self, path: &Path) -> String {
        match self {
            Platform::Windows => windows_to_mount_path(&path.to_string_lossy()),
            _ => path.display().to_string(),
        }
    }
}

/// Rewrite `C:\dir\sub` as `/c/dir/sub`, leaving Unix paths alone
fn windows_to_mount_path(raw: &str) -> String {
    let raw = raw.strip_prefix(r"\\?\").unwrap_or(raw);
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = raw[2..].replace('\\', "/");
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            format!("/{}", drive)
        } else if rest.starts_with('/') {
            format!("/{}{}", drive, rest)
        } else {
            format!("/{}/{}", drive, rest)
        }
    } else {
        raw.replace('\\', "/")
    }
}

/// Host facts the container definition depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnv {
    pub platform: Platform,
    pub uid: u32,
    pub gid: u32,
    pub home: Option<PathBuf>,
    /// `$XDG_RUNTIME_DIR`, where rootless podman keeps its socket
    pub runtime_dir: Option<PathBuf>,
}

impl HostEnv {
    /// Capture the current host environment
    pub fn detect() -> Self {
        let (uid, gid) = host_user_ids();
        Self {
            platform: Platform::detect(),
            uid,
            gid,
            home: std::env::var_os("HOME").map(PathBuf::from),
            runtime_dir: std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from),
        }
    }

    /// Expand a leading `~/` against the host home directory
    pub fn expand_home(&self, spec: &str) -> String {
        match (spec.strip_prefix("~/"), &self.home) {
            (Some(rest), Some(home)) => format!("{}/{}", home.display(), rest),
            _ => spec.to_string(),
        }
    }
}

/// Host user and group ids, as passed to the image build
pub fn host_user_ids() -> (u32, u32) {
    (query_id("-u"), query_id("-g"))
}

fn query_id(flag: &str) -> u32 {
    Command::new("id")
        .arg(flag)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8_lossy(&output.stdout).trim().parse().ok())
        .unwrap_or_else(|| {
            debug!("Could not query id {}, using {}", flag, FALLBACK_ID);
            FALLBACK_ID
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection_is_stable() {
        assert_eq!(Platform::detect(), Platform::detect());
    }

    #[test]
    fn test_user_namespace_args() {
        assert_eq!(
            Platform::Linux.user_namespace_args(RuntimeKind::Podman),
            vec!["--userns=keep-id"]
        );
        assert_eq!(
            Platform::WSL.user_namespace_args(RuntimeKind::Podman),
            vec!["--userns=keep-id"]
        );
        assert!(Platform::MacOS.user_namespace_args(RuntimeKind::Podman).is_empty());
        assert!(Platform::Linux.user_namespace_args(RuntimeKind::Docker).is_empty());
    }

    #[test]
    fn test_volume_suffix() {
        assert_eq!(Platform::Linux.volume_suffix(RuntimeKind::Podman), ":z");
        assert_eq!(Platform::Linux.volume_suffix(RuntimeKind::Docker), "");
        assert_eq!(Platform::MacOS.volume_suffix(RuntimeKind::Podman), "");
    }

    #[test]
    fn test_windows_mount_paths() {
        assert_eq!(windows_to_mount_path(r"C:\Users\test\project"), "/c/Users/test/project");
        assert_eq!(windows_to_mount_path(r"\\?\D:\very\long\path"), "/d/very/long/path");
        assert_eq!(windows_to_mount_path(r"C:\"), "/c");
        assert_eq!(windows_to_mount_path("/home/user/project"), "/home/user/project");
        assert_eq!(windows_to_mount_path(r"relative\path"), "relative/path");
    }

    #[test]
    fn test_mount_source_unix_is_verbatim() {
        assert_eq!(
            Platform::Linux.mount_source(Path::new("/home/u/proj")),
            "/home/u/proj"
        );
    }

    #[test]
    fn test_expand_home() {
        let host = HostEnv {
            platform: Platform::Linux,
            uid: 1000,
            gid: 1000,
            home: Some(PathBuf::from("/home/u")),
            runtime_dir: None,
        };
        assert_eq!(host.expand_home("~/.gitconfig:/g:ro"), "/home/u/.gitconfig:/g:ro");
        assert_eq!(host.expand_home("/etc/hosts:/h"), "/etc/hosts:/h");
    }

    #[cfg(unix)]
    #[test]
    fn test_host_user_ids_are_numeric() {
        let (uid, gid) = host_user_ids();
        // Both come from `id`, or the fallback when it is unavailable
        assert!(uid < u32::MAX);
        assert!(gid < u32::MAX);
    }
}
