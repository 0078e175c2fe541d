//! Container creation parameters
//!
//! Assembles the mounts, environment and platform flags for the project
//! container from the invocation context and host facts.

use crate::context::InvocationContext;
use crate::platform::HostEnv;
use crate::runtime::RuntimeKind;
use std::collections::BTreeMap;

/// Mount point of the project cache directory inside the container
pub const CACHE_MOUNT_TARGET: &str = "/cache";

/// Mount point of the runtime socket inside the container
pub const SOCKET_MOUNT_TARGET: &str = "/run/dockhand/runtime.sock";

/// Command that keeps the container alive between sessions
pub const KEEPALIVE_ENTRY: [&str; 2] = ["sleep", "infinity"];

/// Everything needed to create the project container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub workdir: String,
    /// `-v` specs
    pub mounts: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Platform flags and configured raw arguments
    pub extra_args: Vec<String>,
    /// Container entry command
    pub entry: Vec<String>,
}

impl ContainerSpec {
    /// Build the spec for the project described by `ctx`
    pub fn assemble(ctx: &InvocationContext, runtime: RuntimeKind, host: &HostEnv) -> Self {
        let identity = &ctx.identity;
        let suffix = host.platform.volume_suffix(runtime);
        let project_target = format!("/workspace/{}", identity.project_name);

        let mut mounts = vec![
            format!(
                "{}:{}{}",
                host.platform.mount_source(&identity.directory),
                project_target,
                suffix
            ),
            format!(
                "{}:{}{}",
                host.platform.mount_source(&ctx.layout.cache_dir()),
                CACHE_MOUNT_TARGET,
                suffix
            ),
        ];
        mounts.extend(ctx.config.mounts.iter().map(|m| host.expand_home(m)));

        let mut env = BTreeMap::new();
        env.insert("DOCKHAND_PROJECT".to_string(), identity.project_name.clone());
        env.insert("XDG_CACHE_HOME".to_string(), CACHE_MOUNT_TARGET.to_string());

        if ctx.config.mount_runtime_socket {
            let socket = runtime.host_socket_path(host.runtime_dir.as_deref(), host.uid);
            mounts.push(format!("{}:{}", socket.display(), SOCKET_MOUNT_TARGET));
            env.insert(
                runtime.socket_env_var().to_string(),
                format!("unix://{}", SOCKET_MOUNT_TARGET),
            );
        }

        // Configured values win over the defaults above
        for (key, value) in &ctx.config.env {
            env.insert(key.clone(), value.clone());
        }

        let mut extra_args = host.platform.user_namespace_args(runtime);
        extra_args.extend(ctx.config.create_args.iter().cloned());

        Self {
            name: identity.container_name.clone(),
            image: identity.image_name.clone(),
            hostname: identity.project_name.clone(),
            workdir: ctx.config.workdir_for(&identity.project_name),
            mounts,
            env,
            extra_args,
            entry: KEEPALIVE_ENTRY.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Runtime arguments after the program name
    pub fn to_create_args(&self) -> Vec<String> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--hostname".to_string(),
            self.hostname.clone(),
            "--init".to_string(),
            "-w".to_string(),
            self.workdir.clone(),
        ];
        for mount in &self.mounts {
            args.push("-v".to_string());
            args.push(mount.clone());
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(self.image.clone());
        args.extend(self.entry.iter().cloned());
        args
    }
}
