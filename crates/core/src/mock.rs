//! In-memory runtime for testing lifecycle flows
//!
//! [`MockRuntime`] keeps images and containers in shared maps, records every
//! gateway call in order, and can be configured to fail builds, creates or
//! interactive sessions. It never spawns a process.

use crate::container_spec::ContainerSpec;
use crate::errors::{DockhandError, Result};
use crate::runtime::{BuildSpec, RuntimeGateway};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

/// A simulated failure of a captured command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFailure {
    pub exit_code: i32,
    /// Output lines reported as the failure tail
    pub tail_output: Vec<String>,
}

impl MockFailure {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            tail_output: Vec::new(),
        }
    }

    pub fn with_tail(mut self, tail_output: Vec<String>) -> Self {
        self.tail_output = tail_output;
        self
    }
}

/// Behavior knobs for [`MockRuntime`]
#[derive(Debug, Clone, Default)]
pub struct MockRuntimeConfig {
    /// Simulate the runtime CLI not being installed
    pub not_installed: bool,
    pub build_failure: Option<MockFailure>,
    pub create_failure: Option<MockFailure>,
    /// Exit code returned by interactive sessions
    pub exec_exit_code: i32,
    /// Containers that refuse to start
    pub start_failure: Option<MockFailure>,
}

/// Simulated container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockContainer {
    pub image: String,
    pub running: bool,
    /// Spec the container was created from, if created through the gateway
    pub spec: Option<ContainerSpec>,
}

/// Record of a gateway call, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    CheckInstalled,
    ImageExists(String),
    ContainerExists(String),
    IsRunning(String),
    RemoveContainer(String),
    RemoveImage(String),
    Build { tag: String, verbose: bool },
    Create { name: String, verbose: bool },
    Start(String),
    WaitRunning(String),
    EnsureSocket,
    ExecInteractive {
        name: String,
        workdir: String,
        command: Vec<String>,
    },
}

/// In-memory [`RuntimeGateway`]
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    config: Arc<Mutex<MockRuntimeConfig>>,
    images: Arc<Mutex<Vec<String>>>,
    containers: Arc<Mutex<HashMap<String, MockContainer>>>,
    history: Arc<Mutex<Vec<RuntimeCall>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockRuntimeConfig) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            ..Self::default()
        }
    }

    /// Update mock configuration
    pub fn update_config<F>(&self, f: F)
    where
        F: FnOnce(&mut MockRuntimeConfig),
    {
        let mut config = self.config.lock().unwrap();
        f(&mut config);
    }

    /// Seed an existing image
    pub fn add_image(&self, image: &str) {
        let mut images = self.images.lock().unwrap();
        if !images.iter().any(|i| i == image) {
            images.push(image.to_string());
        }
    }

    /// Seed an existing container
    pub fn add_container(&self, name: &str, image: &str, running: bool) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            MockContainer {
                image: image.to_string(),
                running,
                spec: None,
            },
        );
    }

    /// Mark a container stopped, as if it had exited
    pub fn stop_container(&self, name: &str) {
        if let Some(container) = self.containers.lock().unwrap().get_mut(name) {
            container.running = false;
        }
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.images.lock().unwrap().iter().any(|i| i == image)
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.containers.lock().unwrap().get(name).cloned()
    }

    pub fn history(&self) -> Vec<RuntimeCall> {
        self.history.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&RuntimeCall) -> bool,
    {
        self.history.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: RuntimeCall) {
        debug!("MockRuntime call: {:?}", call);
        self.history.lock().unwrap().push(call);
    }

    fn config(&self) -> MockRuntimeConfig {
        self.config.lock().unwrap().clone()
    }
}

fn failed(label: String, failure: MockFailure) -> DockhandError {
    DockhandError::CommandFailed {
        label,
        exit_code: failure.exit_code,
        tail_output: failure.tail_output,
    }
}

impl RuntimeGateway for MockRuntime {
    fn runtime_name(&self) -> &'static str {
        "mock"
    }

    #[instrument(skip(self))]
    async fn check_installed(&self) -> Result<()> {
        self.record(RuntimeCall::CheckInstalled);
        if self.config().not_installed {
            return Err(DockhandError::MissingPrerequisite {
                program: "mock".to_string(),
                guidance: "Install the mock runtime".to_string(),
            });
        }
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        self.record(RuntimeCall::ImageExists(image.to_string()));
        Ok(self.has_image(image))
    }

    async fn container_exists(&self, name: &str) -> Result<bool> {
        self.record(RuntimeCall::ContainerExists(name.to_string()));
        Ok(self.containers.lock().unwrap().contains_key(name))
    }

    async fn is_running(&self, name: &str) -> Result<bool> {
        self.record(RuntimeCall::IsRunning(name.to_string()));
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.running)
            .unwrap_or(false))
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::RemoveContainer(name.to_string()));
        self.containers.lock().unwrap().remove(name);
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.record(RuntimeCall::RemoveImage(image.to_string()));
        self.images.lock().unwrap().retain(|i| i != image);
        Ok(())
    }

    #[instrument(skip(self, spec), fields(tag = %spec.tag))]
    async fn build(&self, spec: &BuildSpec, verbose: bool) -> Result<()> {
        self.record(RuntimeCall::Build {
            tag: spec.tag.clone(),
            verbose,
        });
        if let Some(failure) = self.config().build_failure {
            return Err(failed(format!("Building image {}", spec.tag), failure));
        }
        self.add_image(&spec.tag);
        Ok(())
    }

    #[instrument(skip(self, spec), fields(name = %spec.name))]
    async fn create(&self, spec: &ContainerSpec, verbose: bool) -> Result<()> {
        self.record(RuntimeCall::Create {
            name: spec.name.clone(),
            verbose,
        });
        if let Some(failure) = self.config().create_failure {
            return Err(failed(format!("Creating container {}", spec.name), failure));
        }
        if !self.has_image(&spec.image) {
            return Err(DockhandError::CommandFailed {
                label: format!("Creating container {}", spec.name),
                exit_code: 125,
                tail_output: vec![format!("Error: {}: image not known", spec.image)],
            });
        }
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(&spec.name) {
            return Err(DockhandError::CommandFailed {
                label: format!("Creating container {}", spec.name),
                exit_code: 125,
                tail_output: vec![format!("Error: the container name \"{}\" is already in use", spec.name)],
            });
        }
        containers.insert(
            spec.name.clone(),
            MockContainer {
                image: spec.image.clone(),
                running: false,
                spec: Some(spec.clone()),
            },
        );
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::Start(name.to_string()));
        if let Some(failure) = self.config().start_failure {
            return Err(failed(format!("Starting container {}", name), failure));
        }
        match self.containers.lock().unwrap().get_mut(name) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(DockhandError::CommandFailed {
                label: format!("Starting container {}", name),
                exit_code: 125,
                tail_output: vec![format!("Error: no container with name or ID \"{}\" found", name)],
            }),
        }
    }

    async fn wait_running(&self, name: &str) -> Result<()> {
        self.record(RuntimeCall::WaitRunning(name.to_string()));
        match self.containers.lock().unwrap().get(name) {
            Some(container) if container.running => Ok(()),
            // A real wait would block forever on a stopped container
            Some(_) => Err(DockhandError::Runtime(format!(
                "Container {} is not running",
                name
            ))),
            None => Err(DockhandError::Runtime(format!(
                "Container {} disappeared while waiting for it to run",
                name
            ))),
        }
    }

    async fn ensure_socket(&self) -> Result<()> {
        self.record(RuntimeCall::EnsureSocket);
        Ok(())
    }

    async fn exec_interactive(
        &self,
        name: &str,
        workdir: &str,
        command: &[String],
    ) -> Result<i32> {
        self.record(RuntimeCall::ExecInteractive {
            name: name.to_string(),
            workdir: workdir.to_string(),
            command: command.to_vec(),
        });
        Ok(self.config().exec_exit_code)
    }
}
