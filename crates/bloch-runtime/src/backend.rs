use crate::{ArtifactPaths, EngineSettings, RuntimeError};
use bloch_model::Payload;
use std::collections::BTreeSet;

/// One recomputation: the request payload, the properties the caller wants
/// computed, and the artifact paths the run may use.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub payload: Payload,
    pub properties: BTreeSet<String>,
    pub paths: ArtifactPaths,
}

/// A computation backend: takes a request, returns the response payload.
///
/// The calculator state machine only ever talks to this trait, so the
/// subprocess engine can be swapped for an in-process library or a remote
/// service without touching the caching logic.
pub trait CalcBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn run(&self, request: &RunRequest) -> Result<Payload, RuntimeError>;
}

pub fn select_backend(
    name: &str,
    settings: &EngineSettings,
) -> Result<Box<dyn CalcBackend>, RuntimeError> {
    match name {
        "subprocess" => Ok(Box::new(crate::subprocess::SubprocessBackend::new(
            settings.clone(),
        ))),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
