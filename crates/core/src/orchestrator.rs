//! Lifecycle orchestrator
//!
//! Decides, for one invocation, whether to tear down, provision or simply
//! attach, and drives the runtime gateway through those steps:
//!
//! 1. Teardown: `force` removes the container, `rebuild` also removes the image.
//! 2. If the container exists, attach: warn about drift, start it if stopped,
//!    then open the interactive shell.
//! 3. Otherwise provision: generate the build definition if absent, build the
//!    image if absent, prepare the state directories and socket, record
//!    checksums, create, start, wait and attach.
//!
//! Every step is attempted once. The first failure aborts the run.

use crate::build_file::ensure_build_definition;
use crate::config::LauncherConfig;
use crate::container_spec::ContainerSpec;
use crate::context::InvocationContext;
use crate::drift::DriftReport;
use crate::errors::{DockhandError, Result};
use crate::platform::HostEnv;
use crate::runtime::{BuildSpec, RuntimeGateway, RuntimeKind};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Container state observed after teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedState {
    NoContainer,
    ContainerStoppedExists,
    ContainerRunning,
}

impl fmt::Display for ObservedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoContainer => "no container",
            Self::ContainerStoppedExists => "stopped",
            Self::ContainerRunning => "running",
        };
        write!(f, "{}", s)
    }
}

/// Side-effecting steps, in the order they were taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RemoveContainer,
    RemoveImage,
    GenerateBuildDefinition,
    BuildImage,
    EnsureDirectories,
    EnsureSocket,
    PersistChecksums,
    CreateContainer,
    StartContainer,
    WaitRunning,
    Attach,
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub observed: ObservedState,
    pub actions: Vec<Action>,
    /// Only computed on the attach path
    pub drift: Option<DriftReport>,
    /// Exit code of the interactive session
    pub exit_code: i32,
}

impl LaunchReport {
    pub fn performed(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// Drives one invocation against a runtime gateway
#[derive(Debug)]
pub struct Orchestrator<R: RuntimeGateway> {
    runtime: R,
    kind: RuntimeKind,
    host: HostEnv,
}

impl<R: RuntimeGateway> Orchestrator<R> {
    /// `kind` selects the platform flags used when creating the container
    pub fn new(runtime: R, kind: RuntimeKind, host: HostEnv) -> Self {
        Self {
            runtime,
            kind,
            host,
        }
    }

    /// Run the full lifecycle and attach
    #[instrument(skip(self, ctx), fields(project = %ctx.identity.project_name, runtime = self.runtime.runtime_name()))]
    pub async fn run(&self, ctx: &InvocationContext) -> Result<LaunchReport> {
        self.runtime.check_installed().await?;

        let mut actions = Vec::new();
        self.teardown(ctx, &mut actions).await?;

        let container = &ctx.identity.container_name;
        if self.runtime.container_exists(container).await? {
            self.attach_existing(ctx, actions).await
        } else {
            self.provision(ctx, actions).await
        }
    }

    async fn teardown(&self, ctx: &InvocationContext, actions: &mut Vec<Action>) -> Result<()> {
        if ctx.flags.force {
            info!("Removing container {}", ctx.identity.container_name);
            self.runtime
                .remove_container(&ctx.identity.container_name)
                .await?;
            actions.push(Action::RemoveContainer);
        }
        if ctx.flags.rebuild {
            info!("Removing image {}", ctx.identity.image_name);
            self.runtime.remove_image(&ctx.identity.image_name).await?;
            actions.push(Action::RemoveImage);
        }
        Ok(())
    }

    async fn attach_existing(
        &self,
        ctx: &InvocationContext,
        mut actions: Vec<Action>,
    ) -> Result<LaunchReport> {
        let container = &ctx.identity.container_name;

        let drift = ctx.drift_detector().detect_drift();
        if let Some(recommendation) = drift.recommendation() {
            warn!(
                "Changed since container {} was created: {}; {}",
                container,
                drift.changed_inputs().join(", "),
                recommendation
            );
        }

        let observed = if self.runtime.is_running(container).await? {
            ObservedState::ContainerRunning
        } else {
            ObservedState::ContainerStoppedExists
        };
        debug!("Container {} is {}", container, observed);

        if observed == ObservedState::ContainerStoppedExists {
            self.start_and_wait(container, &mut actions).await?;
        }

        let exit_code = self.attach(ctx, &mut actions).await?;
        Ok(LaunchReport {
            observed,
            actions,
            drift: Some(drift),
            exit_code,
        })
    }

    async fn provision(
        &self,
        ctx: &InvocationContext,
        mut actions: Vec<Action>,
    ) -> Result<LaunchReport> {
        let identity = &ctx.identity;
        let build_file = ctx.build_file();

        if ensure_build_definition(&build_file)? {
            actions.push(Action::GenerateBuildDefinition);
        }

        if !self.runtime.image_exists(&identity.image_name).await? {
            let spec = self.build_spec(ctx);
            info!("Building image {}", spec.tag);
            self.runtime.build(&spec, ctx.flags.verbose).await?;
            actions.push(Action::BuildImage);
        }

        ctx.layout.ensure_dirs()?;
        actions.push(Action::EnsureDirectories);

        if ctx.config.mount_runtime_socket {
            self.runtime.ensure_socket().await?;
            actions.push(Action::EnsureSocket);
        }

        let detector = ctx.drift_detector();
        let record = detector.snapshot()?;
        detector.persist(&record)?;
        actions.push(Action::PersistChecksums);

        let spec = ContainerSpec::assemble(ctx, self.kind, &self.host);
        info!("Creating container {}", spec.name);
        self.runtime.create(&spec, ctx.flags.verbose).await?;
        actions.push(Action::CreateContainer);

        self.start_and_wait(&identity.container_name, &mut actions)
            .await?;

        let exit_code = self.attach(ctx, &mut actions).await?;
        Ok(LaunchReport {
            observed: ObservedState::NoContainer,
            actions,
            drift: None,
            exit_code,
        })
    }

    fn build_spec(&self, ctx: &InvocationContext) -> BuildSpec {
        let mut build_args = BTreeMap::new();
        build_args.insert("USER_UID".to_string(), self.host.uid.to_string());
        build_args.insert("USER_GID".to_string(), self.host.gid.to_string());
        for (key, value) in &ctx.config.build_args {
            build_args.insert(key.clone(), value.clone());
        }
        BuildSpec {
            build_file: ctx.build_file(),
            context: ctx.identity.directory.clone(),
            tag: ctx.identity.image_name.clone(),
            build_args,
        }
    }

    async fn start_and_wait(&self, container: &str, actions: &mut Vec<Action>) -> Result<()> {
        info!("Starting container {}", container);
        self.runtime.start(container).await?;
        actions.push(Action::StartContainer);
        self.runtime.wait_running(container).await?;
        actions.push(Action::WaitRunning);
        Ok(())
    }

    async fn attach(&self, ctx: &InvocationContext, actions: &mut Vec<Action>) -> Result<i32> {
        let shell = ctx
            .config
            .shell_command()
            .map_err(|message| DockhandError::Config {
                path: LauncherConfig::path_for(&ctx.identity.directory)
                    .display()
                    .to_string(),
                message,
            })?;
        let workdir = ctx.config.workdir_for(&ctx.identity.project_name);

        debug!("Attaching to {} in {}", ctx.identity.container_name, workdir);
        let exit_code = self
            .runtime
            .exec_interactive(&ctx.identity.container_name, &workdir, &shell)
            .await?;
        actions.push(Action::Attach);
        debug!("Session ended with exit code {}", exit_code);
        Ok(exit_code)
    }
}
