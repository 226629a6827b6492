use crate::{EngineSettings, RuntimeError};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Name of the distributed-launch helper inside the launcher directory.
const MPI_LAUNCHER: &str = "mpiexecjl";

/// Lines of log inlined into failure messages in CI contexts.
const CI_TAIL_LINES: usize = 50;

/// Resource knobs for one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct ResourceConfig {
    /// Engine thread count; `None` defers to the settings default.
    pub threads: Option<usize>,
    /// Distributed process count; values above 1 wrap the run with the MPI
    /// launch helper.
    pub processes: usize,
    /// Precompiled sysimage to load, when the file exists.
    pub sysimage: Option<PathBuf>,
}

impl ResourceConfig {
    pub fn effective_threads(&self, settings: &EngineSettings) -> usize {
        self.threads.unwrap_or(settings.default_threads).max(1)
    }

    pub fn effective_processes(&self) -> usize {
        self.processes.max(1)
    }
}

/// Builds and supervises external engine invocations.
///
/// Stdout and stderr of every run are appended verbatim to the calculation
/// log, after a banner line, so repeated runs accumulate a readable history.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    settings: EngineSettings,
}

impl ProcessRunner {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Run the engine with `args` appended after the standard engine flags.
    /// Blocks until the subprocess exits.
    pub fn run(
        &self,
        args: &[String],
        resources: &ResourceConfig,
        log_path: &Path,
    ) -> Result<(), RuntimeError> {
        let (program, argv) = self.build_invocation(args, resources)?;
        debug!(program = %program.display(), "launching engine");

        let log = open_run_log(log_path, &self.settings.host)?;
        let status = Command::new(&program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .status()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::EngineNotFound(program.display().to_string())
                } else {
                    RuntimeError::Io(e)
                }
            })?;

        if status.success() {
            info!(log = %log_path.display(), "engine run finished");
            Ok(())
        } else {
            let mut detail = format!(" ({status})");
            if self.settings.ci {
                detail.push('\n');
                detail.push_str(&log_tail(log_path, CI_TAIL_LINES));
            }
            Err(RuntimeError::CalculationFailed {
                log: log_path.to_path_buf(),
                detail,
            })
        }
    }

    /// Resolve the program and argument vector for one invocation.
    ///
    /// Fails fast when distributed launch is requested but the helper is not
    /// installed; a degraded single-process run would silently change the
    /// result's meaning.
    fn build_invocation(
        &self,
        args: &[String],
        resources: &ResourceConfig,
    ) -> Result<(PathBuf, Vec<String>), RuntimeError> {
        let mut engine_args = vec![
            format!("--project={}", self.settings.env_dir.display()),
            "--startup-file=no".to_owned(),
            format!("--threads={}", resources.effective_threads(&self.settings)),
        ];
        if let Some(image) = &resources.sysimage {
            if image.exists() {
                engine_args.push(format!("--sysimage={}", image.display()));
            } else {
                debug!(image = %image.display(), "sysimage absent, normal startup");
            }
        }
        engine_args.extend(args.iter().cloned());

        let processes = resources.effective_processes();
        if processes > 1 {
            let launcher = self.settings.launcher_dir.join(MPI_LAUNCHER);
            if !launcher.exists() {
                return Err(RuntimeError::MissingDependency(format!(
                    "distributed launch helper {} (install the engine's MPI support)",
                    launcher.display()
                )));
            }
            let mut argv = vec![
                "-np".to_owned(),
                processes.to_string(),
                self.settings.executable.display().to_string(),
            ];
            argv.extend(engine_args);
            Ok((launcher, argv))
        } else {
            Ok((self.settings.executable.clone(), engine_args))
        }
    }
}

/// Open `path` for appending and write the run banner.
pub(crate) fn open_run_log(path: &Path, host: &str) -> Result<File, RuntimeError> {
    let mut log = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        log,
        "=== bloch run {} on {} ===",
        chrono::Utc::now().to_rfc3339(),
        host
    )?;
    Ok(log)
}

/// Last `lines` lines of the log, for inlining into failure messages.
pub(crate) fn log_tail(path: &Path, lines: usize) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
