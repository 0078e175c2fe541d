//! External command execution with optional live progress
//!
//! All runtime access goes through [`CommandExecutor`]. It runs a command in
//! one of three modes:
//!
//! - **captured** ([`CommandExecutor::execute`] without `verbose`): stdout and
//!   stderr go to a temporary capture file while a separate render task polls
//!   that file for the latest progress marker and hands it to a
//!   [`ProgressReporter`]. The render task is cancelled the moment the child
//!   exits. On failure the last [`TAIL_LINES`] lines are returned in the error.
//! - **verbose** ([`CommandExecutor::execute`] with `verbose`): stdio is
//!   inherited and nothing is captured.
//! - **quiet** ([`CommandExecutor::execute_quiet`]): output is collected in
//!   memory and the exit status is returned uninterpreted, for state queries.
//!
//! Interactive sessions use [`CommandExecutor::execute_interactive`].

use crate::errors::{DockhandError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Interval between progress polls
pub const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Maximum width, in characters, of a rendered progress marker
pub const MARKER_WIDTH: usize = 60;

/// Number of trailing output lines surfaced when a command fails
pub const TAIL_LINES: usize = 20;

static STEP_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:STEP|Step) (\d+)/(\d+) ?: (.*)$").expect("static regex")
});

static BUILDKIT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#\d+ \[([^\]]+)\] (.*)$").expect("static regex"));

/// Receives progress updates for a captured command
///
/// Implementations render the label next to a spinner; `progress` replaces the
/// text shown while the command runs.
pub trait ProgressReporter: Send + Sync {
    /// Command is about to start
    fn start(&self, label: &str);
    /// Latest progress marker observed in the command output
    fn progress(&self, marker: &str);
    /// Command exited with status 0
    fn succeed(&self, label: &str);
    /// Command exited with a nonzero status
    fn fail(&self, label: &str);
}

/// Options for a single command execution
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Human-readable label shown while the command runs
    pub label: String,
    /// Stream output to the terminal instead of capturing it
    pub verbose: bool,
}

impl ExecOptions {
    pub fn new(label: impl Into<String>, verbose: bool) -> Self {
        Self {
            label: label.into(),
            verbose,
        }
    }
}

/// Result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit_code: i32,
    /// Interleaved stdout and stderr; empty in verbose mode
    pub combined_output: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external commands, optionally reporting progress
#[derive(Clone, Default)]
pub struct CommandExecutor {
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

impl CommandExecutor {
    /// Executor without progress rendering
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor that reports captured commands to `reporter`
    pub fn with_reporter(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter: Some(reporter),
        }
    }

    /// Run `argv`, failing with `CommandFailed` on a nonzero exit
    #[instrument(skip(self, options), fields(label = %options.label))]
    pub async fn execute(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutcome> {
        debug!("Executing: {}", argv.join(" "));
        if options.verbose {
            self.execute_streaming(argv, options).await
        } else {
            self.execute_captured(argv, options).await
        }
    }

    /// Run `argv` with output collected in memory and no status interpretation
    #[instrument(skip(self))]
    pub async fn execute_quiet(&self, argv: &[String]) -> Result<ExecOutcome> {
        let mut command = command_for(argv)?;
        command.stdin(Stdio::null()).kill_on_drop(true);
        // Dropping the output future on interrupt kills the child
        let output =
            until_interrupted(async { command.output().await.map_err(|e| spawn_error(argv, e)) })
                .await?;

        let mut combined_output = String::from_utf8_lossy(&output.stdout).into_owned();
        combined_output.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ExecOutcome {
            exit_code: exit_code_of(output.status),
            combined_output,
        })
    }

    /// Run `argv` attached to the terminal and return its exit code
    #[instrument(skip(self))]
    pub async fn execute_interactive(&self, argv: &[String]) -> Result<i32> {
        let status = command_for(argv)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| spawn_error(argv, e))?;
        Ok(exit_code_of(status))
    }

    async fn execute_streaming(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutcome> {
        info!("{}", options.label);
        let mut child = command_for(argv)?
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(argv, e))?;

        let status = wait_or_interrupt(&mut child).await?;
        let exit_code = exit_code_of(status);
        if exit_code != 0 {
            return Err(DockhandError::CommandFailed {
                label: options.label.clone(),
                exit_code,
                tail_output: Vec::new(),
            });
        }
        Ok(ExecOutcome {
            exit_code,
            combined_output: String::new(),
        })
    }

    async fn execute_captured(&self, argv: &[String], options: &ExecOptions) -> Result<ExecOutcome> {
        // Removed when dropped, on every return path below
        let sink = tempfile::NamedTempFile::new()?;
        let stdout = sink.reopen()?;
        let stderr = stdout.try_clone()?;

        if let Some(ref reporter) = self.reporter {
            reporter.start(&options.label);
        }

        let mut child = command_for(argv)?
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if let Some(ref reporter) = self.reporter {
                    reporter.fail(&options.label);
                }
                spawn_error(argv, e)
            })?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let render = self.reporter.clone().map(|reporter| {
            tokio::spawn(render_progress(
                sink.path().to_path_buf(),
                reporter,
                stop_rx,
            ))
        });

        let waited = wait_or_interrupt(&mut child).await;
        let _ = stop_tx.send(true);
        if let Some(handle) = render {
            if let Err(e) = handle.await {
                debug!("Progress render task ended abnormally: {}", e);
            }
        }

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                if let Some(ref reporter) = self.reporter {
                    reporter.fail(&options.label);
                }
                return Err(e);
            }
        };

        let combined_output = read_capture(sink.path()).await?;
        let exit_code = exit_code_of(status);

        if exit_code == 0 {
            if let Some(ref reporter) = self.reporter {
                reporter.succeed(&options.label);
            }
            Ok(ExecOutcome {
                exit_code,
                combined_output,
            })
        } else {
            if let Some(ref reporter) = self.reporter {
                reporter.fail(&options.label);
            }
            Err(DockhandError::CommandFailed {
                label: options.label.clone(),
                exit_code,
                tail_output: tail_lines(&combined_output, TAIL_LINES),
            })
        }
    }
}

/// Build a tokio command from argv
fn command_for(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| DockhandError::Runtime("empty command line".to_string()))?;
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

fn spawn_error(argv: &[String], e: std::io::Error) -> DockhandError {
    let program = argv.first().cloned().unwrap_or_default();
    if e.kind() == std::io::ErrorKind::NotFound {
        DockhandError::MissingPrerequisite {
            program,
            guidance: "Install it and make sure it is on PATH.".to_string(),
        }
    } else {
        DockhandError::Runtime(format!("Failed to execute {}: {}", program, e))
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Wait for the child, killing it if the user interrupts
async fn wait_or_interrupt(child: &mut Child) -> Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => Ok(status?),
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, terminating running command");
            if let Err(e) = child.kill().await {
                debug!("Failed to kill child: {}", e);
            }
            Err(DockhandError::Interrupted)
        }
    }
}

/// Run `future` to completion unless the user interrupts first
///
/// Once any interrupt listener exists, SIGINT no longer terminates the
/// process, so every await that can block on the runtime goes through here
/// or through [`wait_or_interrupt`].
pub async fn until_interrupted<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = future => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            Err(DockhandError::Interrupted)
        }
    }
}

async fn read_capture(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Poll the capture file and publish new progress markers until stopped
async fn render_progress(
    path: PathBuf,
    reporter: Arc<dyn ProgressReporter>,
    mut stop: watch::Receiver<bool>,
) {
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot open capture file for progress: {}", e);
            return;
        }
    };
    let mut ticker = tokio::time::interval(PROGRESS_TICK);
    let mut pending = String::new();
    let mut last_marker: Option<String> = None;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let mut chunk = Vec::new();
                if file.read_to_end(&mut chunk).await.is_err() {
                    continue;
                }
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // Only complete lines are scanned; the remainder waits for more output
                let Some(split_at) = pending.rfind('\n') else {
                    continue;
                };
                let complete: String = pending.drain(..=split_at).collect();
                if let Some(marker) = latest_progress_marker(&complete) {
                    if last_marker.as_deref() != Some(marker.as_str()) {
                        reporter.progress(&marker);
                        last_marker = Some(marker);
                    }
                }
            }
        }
    }
}

/// Most recent progress marker in `text`, normalized and truncated
///
/// Recognizes `STEP n/m: text` (podman/buildah), `Step n/m : text` (legacy
/// docker) and `#n [stage] text` (BuildKit).
pub fn latest_progress_marker(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(|line| line.rsplit('\r').next().unwrap_or(line).trim())
        .find_map(|line| {
            if let Some(caps) = STEP_MARKER.captures(line) {
                return Some(format!("STEP {}/{}: {}", &caps[1], &caps[2], &caps[3]));
            }
            BUILDKIT_MARKER
                .captures(line)
                .map(|caps| format!("[{}] {}", &caps[1], &caps[2]))
        })
        .map(|marker| truncate_chars(&marker, MARKER_WIDTH))
}

/// Truncate to at most `width` characters, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(width.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

/// Last `n` lines of `text`, ignoring a trailing newline
pub fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}
