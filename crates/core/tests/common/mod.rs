//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use dockhand_core::config::LauncherConfig;
use dockhand_core::context::{InvocationContext, InvocationFlags};
use dockhand_core::identity::ProjectIdentity;
use dockhand_core::platform::{HostEnv, Platform};
use std::path::PathBuf;
use tempfile::TempDir;

/// A throwaway project directory named `name` inside a temp dir
pub struct TestProject {
    pub temp_dir: TempDir,
    pub dir: PathBuf,
}

impl TestProject {
    pub fn new(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let dir = temp_dir.path().join(name);
        std::fs::create_dir_all(&dir).expect("Should create project dir");
        Self { temp_dir, dir }
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.join(relative);
        std::fs::write(&path, content).expect("Should write project file");
        path
    }

    /// Context with config loaded from the project, as the binary builds it
    pub fn context(&self, flags: InvocationFlags) -> InvocationContext {
        let identity = ProjectIdentity::resolve(&self.dir).expect("Should resolve project");
        let config = LauncherConfig::load(&identity.directory).expect("Should load config");
        InvocationContext::new(identity, flags, config)
    }
}

/// Fixed host facts so assertions do not depend on the machine
pub fn linux_host() -> HostEnv {
    HostEnv {
        platform: Platform::Linux,
        uid: 1000,
        gid: 1000,
        home: Some(PathBuf::from("/home/dev")),
        runtime_dir: Some(PathBuf::from("/run/user/1000")),
    }
}
