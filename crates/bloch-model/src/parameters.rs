use crate::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single parameter value as it appears in the interchange payload.
///
/// Untagged so the JSON reads naturally: `"pbe"`, `3`, `1e-6`, `[3, 3, 3]`.
/// `Int` is tried before `Float`, so whole numbers stay integers across a
/// round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<[i64; 3]> for ParamValue {
    fn from(value: [i64; 3]) -> Self {
        Self::IntList(value.to_vec())
    }
}

/// Every option the engine recognizes. Overrides for anything else are
/// rejected up front rather than silently forwarded.
const KNOWN_KEYS: &[&str] = &[
    "xc",
    "kpts",
    "smearing",
    "nbands",
    "charge",
    "pps",
    "scftol",
    "ecut",
    "mixing",
    "n_threads",
    "n_mpi",
];

/// Calculation parameters: a fully resolved option map.
///
/// Construction always starts from the documented defaults, so a payload
/// encoded from `Parameters` carries every known key. A missing override
/// means "use the default", never "undefined".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Default for Parameters {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert("xc".to_owned(), ParamValue::from("lda"));
        map.insert("kpts".to_owned(), ParamValue::from([1, 1, 1]));
        map.insert("smearing".to_owned(), ParamValue::Null);
        map.insert("nbands".to_owned(), ParamValue::Null);
        map.insert("charge".to_owned(), ParamValue::Float(0.0));
        map.insert("pps".to_owned(), ParamValue::from("hgh"));
        map.insert("scftol".to_owned(), ParamValue::Float(1e-6));
        map.insert("ecut".to_owned(), ParamValue::Float(400.0));
        map.insert("mixing".to_owned(), ParamValue::Null);
        map.insert("n_threads".to_owned(), ParamValue::Null);
        map.insert("n_mpi".to_owned(), ParamValue::Int(1));
        Self(map)
    }
}

impl Parameters {
    /// Defaults with the given overrides applied.
    pub fn with_overrides(
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ModelError> {
        let mut params = Self::default();
        params.merge(overrides)?;
        Ok(params)
    }

    /// Apply overrides and report which keys actually changed.
    ///
    /// Setting a key to its current value is a no-op and does not appear in
    /// the returned set; callers rely on this to avoid spurious cache
    /// invalidation.
    pub fn merge(
        &mut self,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<BTreeSet<String>, ModelError> {
        for key in overrides.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                return Err(ModelError::UnknownParameter(key.clone()));
            }
        }

        let mut changed = BTreeSet::new();
        for (key, value) in overrides {
            if self.0.get(key) != Some(value) {
                self.0.insert(key.clone(), value.clone());
                changed.insert(key.clone());
            }
        }
        Ok(changed)
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Engine thread count override, when one was set.
    pub fn threads(&self) -> Option<usize> {
        match self.0.get("n_threads") {
            Some(ParamValue::Int(n)) if *n > 0 => Some(*n as usize),
            _ => None,
        }
    }

    /// Distributed process count, defaulting to a single process.
    pub fn processes(&self) -> usize {
        match self.0.get("n_mpi") {
            Some(ParamValue::Int(n)) if *n > 1 => *n as usize,
            _ => 1,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
