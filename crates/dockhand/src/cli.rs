use crate::ui::spinner::StepSpinner;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use dockhand_core::cli_runtime::CliRuntime;
use dockhand_core::config::LauncherConfig;
use dockhand_core::context::{InvocationContext, InvocationFlags, ProjectLayout};
use dockhand_core::errors::DockhandError;
use dockhand_core::executor::CommandExecutor;
use dockhand_core::identity::ProjectIdentity;
use dockhand_core::orchestrator::Orchestrator;
use dockhand_core::platform::HostEnv;
use dockhand_core::runtime::{RuntimeFactory, RuntimeKind};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Podman runtime
    Podman,
    /// Docker runtime
    Docker,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Podman => RuntimeKind::Podman,
            RuntimeOption::Docker => RuntimeKind::Docker,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "dockhand",
    version,
    about = "Per-project development container launcher",
    long_about = "Per-project development container launcher\n\n\
        Builds an image from the project's Containerfile, keeps one long-lived container per \
        project directory and attaches an interactive shell to it. Running it again reattaches \
        to the same container.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Remove the existing container and create a fresh one
    #[arg(long)]
    pub force: bool,

    /// Remove the container and image, rebuild the image, then create a fresh container (implies --force)
    #[arg(long)]
    pub rebuild: bool,

    /// Stream runtime output instead of showing a spinner
    #[arg(long, short)]
    pub verbose: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    pub project_dir: Option<PathBuf>,

    /// Container runtime to use (podman or docker, can be set via DOCKHAND_RUNTIME env var)
    #[arg(long, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Log format (text or json, defaults to text, can be set via DOCKHAND_LOG_FORMAT env var)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

impl Cli {
    /// Run one invocation and return the interactive session's exit code
    pub async fn dispatch(self) -> Result<i32> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        // Spinner session: captured output, stderr is a TTY, non-JSON logs
        let stderr_is_tty = std::io::stderr().is_terminal();
        let json_format = matches!(log_format, Some("json"));
        let spinner_eligible = !self.verbose && stderr_is_tty && !json_format;

        let mut log_level = self.log_level.as_str();
        if std::env::var_os("DOCKHAND_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            // Keep info logs from tearing through spinner lines
            if spinner_eligible && matches!(self.log_level, LogLevel::Info) {
                log_level = "warn";
            }
            std::env::set_var(
                "RUST_LOG",
                format!("dockhand={},dockhand_core={}", log_level, log_level),
            );
        }
        dockhand_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let ctx = self.build_context()?;
        let kind = RuntimeFactory::detect_runtime(
            self.runtime.map(Into::into),
            std::env::var("DOCKHAND_RUNTIME").ok().as_deref(),
            ctx.config.runtime.as_deref(),
        );
        tracing::debug!("Using runtime {}", kind);

        let executor = if spinner_eligible {
            CommandExecutor::with_reporter(Arc::new(StepSpinner::new()))
        } else {
            CommandExecutor::new()
        };
        let orchestrator = Orchestrator::new(CliRuntime::new(kind, executor), kind, HostEnv::detect());

        let report = orchestrator.run(&ctx).await?;
        tracing::debug!(
            "Finished from state {} with actions {:?}",
            report.observed,
            report.actions
        );
        Ok(report.exit_code)
    }

    /// Resolve the project and assemble the invocation context
    fn build_context(&self) -> Result<InvocationContext> {
        let project_dir = match &self.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|e| DockhandError::PathResolution {
                path: ".".to_string(),
                reason: e.to_string(),
            })?,
        };

        let identity = ProjectIdentity::resolve(&project_dir)?;
        let config = LauncherConfig::load(&identity.directory)?;
        let flags = InvocationFlags::new(self.force, self.rebuild, self.verbose);

        let mut ctx = InvocationContext::new(identity, flags, config);
        match std::env::current_exe() {
            Ok(exe) => ctx = ctx.with_launcher_input(exe),
            Err(e) => tracing::debug!("Launcher executable unavailable for checksums: {}", e),
        }
        if let Some(state_root) = std::env::var_os("DOCKHAND_STATE_DIR") {
            let root = PathBuf::from(state_root).join(&ctx.identity.project_name);
            ctx = ctx.with_layout(ProjectLayout::new(root));
        }
        tracing::debug!("State directory: {}", ctx.layout.root().display());
        Ok(ctx)
    }
}
