use console::style;
use dockhand_core::executor::{ProgressReporter, PROGRESS_TICK};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

fn default_style() -> ProgressStyle {
    // Green spinner; message coloring is left to message composition
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

struct ActiveStep {
    pb: ProgressBar,
    label: String,
}

/// One spinner line per captured step on stderr
///
/// While a step runs the line shows its label and the latest build progress
/// marker. It is replaced by a check mark or a cross when the step ends.
pub struct StepSpinner {
    active: Mutex<Option<ActiveStep>>,
}

impl StepSpinner {
    pub fn new() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }

    fn finish(&self, message: String) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(step) = active.take() {
                step.pb.set_style(finished_style());
                step.pb.finish_with_message(message);
            }
        }
    }
}

impl Default for StepSpinner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for StepSpinner {
    fn start(&self, label: &str) {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(PROGRESS_TICK);
        pb.set_style(default_style());
        pb.set_message(style(format!("{}…", label)).yellow().to_string());

        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(ActiveStep {
                pb,
                label: label.to_string(),
            }) {
                previous.pb.finish_and_clear();
            }
        }
    }

    fn progress(&self, marker: &str) {
        if let Ok(active) = self.active.lock() {
            if let Some(step) = active.as_ref() {
                step.pb.set_message(format!(
                    "{} {}",
                    style(format!("{}…", step.label)).yellow(),
                    style(marker).dim()
                ));
            }
        }
    }

    fn succeed(&self, label: &str) {
        self.finish(format!("{} {}", style("✔").green(), label));
    }

    fn fail(&self, label: &str) {
        self.finish(format!("{} {}", style("✖").red(), style(label).red()));
    }
}

impl Drop for StepSpinner {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(step) = active.take() {
                step.pb.finish_and_clear();
            }
        }
    }
}
