//! Data model and interchange codec for bloch calculations.
//!
//! This crate defines the calculation parameters (`Parameters`), the atomic
//! structure (`Structure`), computed results (`Results`), and the on-disk
//! JSON payload (`Payload`) that crosses the process boundary between the
//! host and the external engine.

pub mod parameters;
pub mod payload;
pub mod properties;
pub mod structure;

pub use parameters::{ParamValue, Parameters};
pub use payload::Payload;
pub use properties::{is_implemented, PropertyValue, Results, IMPLEMENTED_PROPERTIES};
pub use structure::Structure;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("structure has {symbols} symbols but {positions} positions")]
    AtomCountMismatch { symbols: usize, positions: usize },
    #[error("failed to access payload {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("payload {path} is missing required key '{key}'")]
    MissingKey { path: PathBuf, key: String },
    #[error("malformed payload {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },
}
