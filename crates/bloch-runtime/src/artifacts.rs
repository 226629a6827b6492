use crate::RuntimeError;
use std::path::{Path, PathBuf};

/// On-disk artifacts belonging to one calculator instance, keyed by its
/// label inside its working directory.
///
/// Artifacts are owned exclusively by that instance; concurrent calculators
/// must use distinct labels or directories, which is a caller obligation.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    directory: PathBuf,
    label: String,
}

impl ArtifactPaths {
    pub fn new(directory: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            label: label.into(),
        }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The request/response payload file.
    #[inline]
    pub fn payload(&self) -> PathBuf {
        self.directory.join(format!("{}.json", self.label))
    }

    /// The append-only calculation log.
    #[inline]
    pub fn log(&self) -> PathBuf {
        self.directory.join(format!("{}.log", self.label))
    }

    /// The engine's intermediate-state checkpoint artifact.
    #[inline]
    pub fn checkpoint(&self) -> PathBuf {
        self.directory.join(format!("{}.scfres.jld2", self.label))
    }

    /// Delete the checkpoint artifact. Already-absent files are fine.
    pub fn remove_checkpoint(&self) -> Result<(), RuntimeError> {
        remove_if_present(&self.checkpoint())
    }
}

/// Idempotent file removal: an absent file counts as removed.
pub fn remove_if_present(path: &Path) -> Result<(), RuntimeError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RuntimeError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_label() {
        let paths = ArtifactPaths::new("/work/si", "dftk");
        assert_eq!(paths.payload(), PathBuf::from("/work/si/dftk.json"));
        assert_eq!(paths.log(), PathBuf::from("/work/si/dftk.log"));
        assert_eq!(paths.checkpoint(), PathBuf::from("/work/si/dftk.scfres.jld2"));
    }

    #[test]
    fn remove_checkpoint_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path(), "dftk");

        paths.remove_checkpoint().unwrap();

        std::fs::write(paths.checkpoint(), b"state").unwrap();
        paths.remove_checkpoint().unwrap();
        assert!(!paths.checkpoint().exists());

        paths.remove_checkpoint().unwrap();
    }
}
