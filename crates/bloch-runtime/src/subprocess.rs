use crate::backend::{CalcBackend, RunRequest};
use crate::{EngineSettings, EnvironmentGate, ProcessRunner, ResourceConfig, RuntimeError};
use bloch_model::Payload;
use tracing::debug;

/// The real backend: drives the external engine as a supervised subprocess.
///
/// The request payload is written to the calculator's payload file, the
/// engine's driver script is invoked on it, and the engine overwrites the
/// same file in place with the response.
#[derive(Debug)]
pub struct SubprocessBackend {
    settings: EngineSettings,
    gate: EnvironmentGate,
    runner: ProcessRunner,
}

impl SubprocessBackend {
    pub fn new(settings: EngineSettings) -> Self {
        let gate = EnvironmentGate::new(settings.clone());
        let runner = ProcessRunner::new(settings.clone());
        Self {
            settings,
            gate,
            runner,
        }
    }
}

impl CalcBackend for SubprocessBackend {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn run(&self, request: &RunRequest) -> Result<Payload, RuntimeError> {
        self.gate.ensure_ready(false)?;

        let payload_path = request.paths.payload();
        request.payload.write(&payload_path)?;
        debug!(payload = %payload_path.display(), "request payload written");

        let resources = ResourceConfig {
            threads: request.payload.parameters.threads(),
            processes: request.payload.parameters.processes(),
            sysimage: Some(self.settings.sysimage.clone()),
        };

        let mut args = vec![
            self.settings.driver.display().to_string(),
            payload_path.display().to_string(),
        ];
        args.extend(request.properties.iter().cloned());

        self.runner.run(&args, &resources, &request.paths.log())?;

        Ok(Payload::read(&payload_path)?)
    }
}
