use std::path::PathBuf;

/// Engine executable override.
pub const ENV_EXECUTABLE: &str = "BLOCH_JULIA";
/// Engine dependency-environment directory override.
pub const ENV_DIR: &str = "BLOCH_ENV_DIR";
/// Default engine thread count override.
pub const ENV_THREADS: &str = "BLOCH_NUM_THREADS";
/// Continuous-integration marker; failures inline the log tail when set.
pub const ENV_CI: &str = "CI";

/// Resolved engine configuration.
///
/// All environment-variable lookups happen once, here; everything downstream
/// receives the settings through constructors instead of reading the process
/// environment at call sites.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Engine runtime binary, usually `julia`.
    pub executable: PathBuf,
    /// Directory holding the engine's dependency environment (its manifest,
    /// driver script, and update marker).
    pub env_dir: PathBuf,
    /// Engine-side driver script run for each calculation.
    pub driver: PathBuf,
    /// Per-user directory holding the distributed-launch helper `mpiexecjl`.
    pub launcher_dir: PathBuf,
    /// Precompiled sysimage; passed to the engine only when the file exists.
    pub sysimage: PathBuf,
    /// Thread count used when a calculation does not specify one.
    pub default_threads: usize,
    /// Whether we are running in a CI context.
    pub ci: bool,
    /// Host name written into log run banners.
    pub host: String,
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let executable = lookup(ENV_EXECUTABLE)
            .map_or_else(|| PathBuf::from("julia"), PathBuf::from);
        let home = lookup("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
        let env_dir = lookup(ENV_DIR).map_or_else(
            || home.join(".julia").join("environments").join("bloch"),
            PathBuf::from,
        );
        let default_threads = lookup(ENV_THREADS)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        let ci = lookup(ENV_CI).is_some_and(|v| !v.is_empty());
        let host = lookup("HOSTNAME")
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "localhost".to_owned());

        Self {
            driver: env_dir.join("driver.jl"),
            sysimage: env_dir.join("sysimage.so"),
            launcher_dir: home.join(".julia").join("bin"),
            executable,
            env_dir,
            default_threads,
            ci,
            host,
        }
    }
}
