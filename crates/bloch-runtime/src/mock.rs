use crate::backend::{CalcBackend, RunRequest};
use crate::RuntimeError;
use bloch_model::{Payload, Results};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct MockState {
    results: Results,
    failing: bool,
    calls: usize,
    requests: Vec<BTreeSet<String>>,
    request_checkpoints: Vec<Option<std::path::PathBuf>>,
}

/// A backend stand-in for tests: counts invocations, records which
/// properties each request asked for, and answers with canned results
/// instead of launching a subprocess.
///
/// Clones share state, so a test can hand one handle to a calculator and
/// keep another for assertions.
#[derive(Clone, Debug)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_results(Results::new())
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Results) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                results,
                failing: false,
                calls: 0,
                requests: Vec::new(),
                request_checkpoints: Vec::new(),
            })),
        }
    }

    /// Replace the canned results returned by subsequent runs.
    pub fn set_results(&self, results: Results) {
        self.lock().results = results;
    }

    /// Make subsequent runs fail with `CalculationFailed`, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    /// Properties requested by the most recent run.
    pub fn last_request(&self) -> Option<BTreeSet<String>> {
        self.lock().requests.last().cloned()
    }

    /// Checkpoint handle the most recent request carried for a warm start.
    pub fn last_request_checkpoint(&self) -> Option<Option<std::path::PathBuf>> {
        self.lock().request_checkpoints.last().cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl CalcBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn run(&self, request: &RunRequest) -> Result<Payload, RuntimeError> {
        let mut state = self.lock();
        state.calls += 1;
        state.requests.push(request.properties.clone());
        state
            .request_checkpoints
            .push(request.payload.checkpoint.clone());

        if state.failing {
            return Err(RuntimeError::CalculationFailed {
                log: request.paths.log(),
                detail: " (exit status: 1)".to_owned(),
            });
        }

        // Scalar energies come with every run; per-atom properties only
        // when requested, like the real engine.
        let results: Results = state
            .results
            .iter()
            .filter(|(name, _)| {
                request.properties.contains(name.as_str())
                    || matches!(name.as_str(), "energy" | "free_energy")
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        // Leave a real checkpoint artifact so invalidation tests can watch
        // it disappear.
        let checkpoint = request.paths.checkpoint();
        std::fs::write(&checkpoint, b"mock checkpoint")?;

        Ok(Payload {
            parameters: request.payload.parameters.clone(),
            atoms: request.payload.atoms.clone(),
            results,
            checkpoint: Some(checkpoint),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactPaths;
    use bloch_model::{Parameters, PropertyValue, Structure};
    use nalgebra::{Matrix3, Vector3};

    fn request(paths: ArtifactPaths) -> RunRequest {
        RunRequest {
            payload: Payload {
                parameters: Parameters::default(),
                atoms: Structure::new(
                    vec!["H".to_owned()],
                    vec![Vector3::zeros()],
                    Matrix3::identity(),
                    [true; 3],
                )
                .unwrap(),
                results: Results::new(),
                checkpoint: None,
            },
            properties: ["energy".to_owned()].into(),
            paths,
        }
    }

    #[test]
    fn counts_calls_and_records_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::with_results(
            [("energy".to_owned(), PropertyValue::Scalar(-1.5))].into(),
        );
        assert_eq!(mock.calls(), 0);

        let out = mock.run(&request(ArtifactPaths::new(dir.path(), "t"))).unwrap();
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.last_request(), Some(["energy".to_owned()].into()));
        assert_eq!(out.results.get("energy"), Some(&PropertyValue::Scalar(-1.5)));
        assert!(out.checkpoint.unwrap().exists());
    }

    #[test]
    fn failing_mode_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.set_failing(true);

        let err = mock.run(&request(ArtifactPaths::new(dir.path(), "t"))).unwrap_err();
        assert!(matches!(err, RuntimeError::CalculationFailed { .. }));
        assert_eq!(mock.calls(), 1);

        mock.set_failing(false);
        mock.run(&request(ArtifactPaths::new(dir.path(), "t"))).unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[test]
    fn clones_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        let handle = mock.clone();

        mock.run(&request(ArtifactPaths::new(dir.path(), "t"))).unwrap();
        assert_eq!(handle.calls(), 1);
    }
}
