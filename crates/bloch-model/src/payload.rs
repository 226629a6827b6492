use crate::{ModelError, Parameters, Results, Structure};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Keys every payload file must carry. A response missing one of these is a
/// backend/protocol mismatch, never something to paper over with defaults.
const REQUIRED_KEYS: &[&str] = &["parameters", "atoms", "results", "checkpoint"];

/// The on-disk interchange payload: the sole contract between the host and
/// the external engine.
///
/// A request carries the resolved parameters, the structure, any previous
/// results, and the previous checkpoint handle for a warm start. The engine
/// overwrites the same file in place, with `results` populated and
/// `checkpoint` pointing at its intermediate-state artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub parameters: Parameters,
    pub atoms: Structure,
    pub results: Results,
    pub checkpoint: Option<PathBuf>,
}

impl Payload {
    /// Serialize to `path` atomically: written to a temp file in the same
    /// directory, then persisted over the destination.
    pub fn write(&self, path: &Path) -> Result<(), ModelError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ModelError::Malformed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Parse the payload at `path`, failing on missing required keys or
    /// ill-shaped values.
    pub fn read(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let malformed = |detail: String| ModelError::Malformed {
            path: path.to_path_buf(),
            detail,
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| malformed(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| malformed("top level is not an object".to_owned()))?;
        for key in REQUIRED_KEYS {
            if !object.contains_key(*key) {
                return Err(ModelError::MissingKey {
                    path: path.to_path_buf(),
                    key: (*key).to_owned(),
                });
            }
        }

        let payload: Self =
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

        // Per-atom arrays must line up with the structure they came with.
        for (name, value) in &payload.results {
            if let Some(vectors) = value.as_per_atom() {
                if vectors.len() != payload.atoms.len() {
                    return Err(malformed(format!(
                        "'{name}' has {} entries for {} atoms",
                        vectors.len(),
                        payload.atoms.len()
                    )));
                }
            }
        }

        Ok(payload)
    }
}
