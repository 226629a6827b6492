use crate::runner::open_run_log;
use crate::{EngineSettings, RuntimeError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Oldest engine runtime the payload contract has been validated against.
const MIN_ENGINE_VERSION: (u32, u32, u32) = (1, 6, 0);

/// Marker rewritten after every successful environment update.
const UPDATE_MARKER: &str = ".updated";
/// The engine environment's dependency manifest.
const MANIFEST: &str = "Manifest.toml";
/// Log receiving update and precompilation output.
const UPDATE_LOG: &str = "update.log";

const UPDATE_EXPR: &str =
    "using Pkg; Pkg.resolve(); Pkg.instantiate(); Pkg.precompile()";

/// Keeps the engine's dependency environment current before calculations.
///
/// Staleness is judged by modification time only: the environment needs an
/// update when the manifest is newer than the update marker, or the marker
/// does not exist yet.
#[derive(Debug, Clone)]
pub struct EnvironmentGate {
    settings: EngineSettings,
}

impl EnvironmentGate {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    /// Verify the runtime version, then update the environment if it is
    /// stale or `force` is set. Blocks for the duration of the update.
    pub fn ensure_ready(&self, force: bool) -> Result<(), RuntimeError> {
        self.check_version()?;
        if force || self.is_stale() {
            self.update()?;
        }
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        let marker = mtime(&self.marker_path());
        let manifest = mtime(&self.settings.env_dir.join(MANIFEST));
        needs_update(marker, manifest)
    }

    /// Check that the engine runtime meets the version floor.
    pub fn check_version(&self) -> Result<(), RuntimeError> {
        let output = Command::new(&self.settings.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::EngineNotFound(
                        self.settings.executable.display().to_string(),
                    )
                } else {
                    RuntimeError::Io(e)
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let found = parse_version(&stdout);
        match found {
            Some(version) if output.status.success() && version >= MIN_ENGINE_VERSION => {
                debug!(?version, "engine runtime version accepted");
                Ok(())
            }
            Some((major, minor, patch)) => Err(RuntimeError::VersionIncompatible {
                found: format!("{major}.{minor}.{patch}"),
                minimum: format_min_version(),
            }),
            None => Err(RuntimeError::VersionIncompatible {
                found: format!("unrecognized ({})", stdout.trim()),
                minimum: format_min_version(),
            }),
        }
    }

    /// Blocking update: dependency resolution and instantiation, then
    /// precompilation, with output appended to the environment's update log.
    /// On success the marker is rewritten and, when a sysimage already
    /// exists, the image is rebuilt.
    fn update(&self) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&self.settings.env_dir)?;
        let log_path = self.update_log_path();
        info!(log = %log_path.display(), "updating engine environment");

        self.run_engine_expr(UPDATE_EXPR, &log_path)
            .map_err(|e| match e {
                RuntimeError::CalculationFailed { log, .. } => {
                    RuntimeError::UpdateFailed { log }
                }
                other => other,
            })?;

        std::fs::write(self.marker_path(), b"")?;

        if self.settings.sysimage.exists() {
            if let Err(e) = self.rebuild_sysimage(&log_path) {
                warn!(
                    image = %self.settings.sysimage.display(),
                    "sysimage rebuild failed, stale image kept: {e}"
                );
            }
        }
        Ok(())
    }

    /// Rebuild the precompiled sysimage after an environment update. The
    /// stale image stays usable on failure, so callers only warn.
    fn rebuild_sysimage(&self, log_path: &Path) -> Result<(), RuntimeError> {
        info!(image = %self.settings.sysimage.display(), "rebuilding sysimage");
        let expr = format!(
            "using PackageCompiler; create_sysimage([:DFTK]; sysimage_path=raw\"{}\")",
            self.settings.sysimage.display()
        );
        self.run_engine_expr(&expr, log_path)
    }

    fn run_engine_expr(&self, expr: &str, log_path: &Path) -> Result<(), RuntimeError> {
        let log = open_run_log(log_path, &self.settings.host)?;
        let status = Command::new(&self.settings.executable)
            .arg(format!("--project={}", self.settings.env_dir.display()))
            .arg("--startup-file=no")
            .arg("-e")
            .arg(expr)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .status()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::EngineNotFound(
                        self.settings.executable.display().to_string(),
                    )
                } else {
                    RuntimeError::Io(e)
                }
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CalculationFailed {
                log: log_path.to_path_buf(),
                detail: format!(" ({status})"),
            })
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.settings.env_dir.join(UPDATE_MARKER)
    }

    fn update_log_path(&self) -> PathBuf {
        self.settings.env_dir.join(UPDATE_LOG)
    }
}

/// Staleness rule: no marker means never updated; a manifest strictly newer
/// than the marker means dependencies changed since the last update. A
/// missing manifest with a present marker is fresh.
fn needs_update(marker: Option<SystemTime>, manifest: Option<SystemTime>) -> bool {
    match (marker, manifest) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(marker), Some(manifest)) => manifest > marker,
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Parse `julia version 1.10.4`-style output. Only the line naming the
/// version is considered; engines may print more after it.
fn parse_version(output: &str) -> Option<(u32, u32, u32)> {
    let line = output.lines().find(|l| l.contains("version"))?;
    let token = line.split_whitespace().last()?;
    let mut parts = token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts
        .next()
        .map_or(Some(0), |p| p.parse().ok())?;
    Some((major, minor, patch))
}

fn format_min_version() -> String {
    let (major, minor, patch) = MIN_ENGINE_VERSION;
    format!("{major}.{minor}.{patch}")
}
