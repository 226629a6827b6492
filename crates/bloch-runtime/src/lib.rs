//! Engine process supervision and environment management for bloch.
//!
//! This crate implements the execution layer: resolved engine settings
//! (`EngineSettings`), per-calculator artifact paths (`ArtifactPaths`), the
//! subprocess runner with thread/MPI/sysimage knobs (`ProcessRunner`), the
//! dependency-environment gate (`EnvironmentGate`), and the pluggable
//! `CalcBackend` trait with subprocess and mock implementations.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod environment;
pub mod mock;
pub mod runner;
pub mod subprocess;

pub use artifacts::ArtifactPaths;
pub use backend::{select_backend, CalcBackend, RunRequest};
pub use config::EngineSettings;
pub use environment::EnvironmentGate;
pub use mock::MockBackend;
pub use runner::{ProcessRunner, ResourceConfig};
pub use subprocess::SubprocessBackend;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Model(#[from] bloch_model::ModelError),
    #[error("engine executable '{0}' was not found; install it or set BLOCH_JULIA")]
    EngineNotFound(String),
    #[error("engine runtime {found} is older than the minimum supported {minimum}")]
    VersionIncompatible { found: String, minimum: String },
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    #[error("environment update failed, see {log}")]
    UpdateFailed { log: PathBuf },
    #[error("calculation failed, see {log}{detail}")]
    CalculationFailed { log: PathBuf, detail: String },
    #[error("backend '{0}' is not available")]
    BackendUnavailable(String),
}
