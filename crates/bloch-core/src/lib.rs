//! Calculator orchestration for bloch.
//!
//! This crate ties the data model and the runtime layer together into the
//! `Calculator` — the state machine that caches results, decides when a
//! recomputation is needed, and drives a `CalcBackend` to perform it — plus
//! the explicit name-to-constructor `Registry`.

pub mod calculator;
pub mod lifecycle;
pub mod registry;

pub use calculator::Calculator;
pub use lifecycle::{validate_transition, CalcState};
pub use registry::{CalculatorSpec, Factory, Registry};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Model(#[from] bloch_model::ModelError),
    #[error(transparent)]
    Runtime(#[from] bloch_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("no structure set; provide one before requesting properties")]
    NoStructure,
    #[error("property '{0}' is not implemented by this calculator")]
    PropertyNotImplemented(String),
    #[error("engine response did not include requested property '{0}'")]
    IncompleteResults(String),
    #[error("engine returned {found} entries of '{property}' for {expected} atoms")]
    ShapeMismatch {
        property: String,
        expected: usize,
        found: usize,
    },
    #[error("no calculator registered under '{0}'")]
    CalculatorNotFound(String),
}
