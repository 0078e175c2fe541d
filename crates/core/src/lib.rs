//! Core library for the dockhand dev-container launcher
//!
//! This crate contains project identity resolution, the captured command
//! executor, checksum-based drift detection, the runtime gateway and the
//! lifecycle orchestrator that ties them together.

pub mod build_file;
pub mod cli_runtime;
pub mod config;
pub mod container_spec;
pub mod context;
pub mod drift;
pub mod errors;
pub mod executor;
pub mod identity;
pub mod logging;
/// In-memory runtime gateway for tests and dry runs
pub mod mock;
pub mod orchestrator;
pub mod platform;
pub mod runtime;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
