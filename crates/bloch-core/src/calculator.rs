use crate::lifecycle::{validate_transition, CalcState};
use crate::CoreError;
use bloch_model::{is_implemented, ParamValue, Parameters, Payload, PropertyValue, Results, Structure};
use bloch_runtime::artifacts::remove_if_present;
use bloch_runtime::{ArtifactPaths, CalcBackend, RunRequest};
use nalgebra::Vector3;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

/// The calculator: owns the current parameters, structure, and results, and
/// decides on every request whether the cache still answers it or a
/// recomputation must be dispatched to the backend.
///
/// One instance, one calling thread: a recomputation blocks until the
/// backend returns. Instances sharing a directory must use distinct labels.
pub struct Calculator {
    label: String,
    paths: ArtifactPaths,
    parameters: Parameters,
    structure: Option<Structure>,
    results: Results,
    checkpoint: Option<PathBuf>,
    requested: BTreeSet<String>,
    backend: Box<dyn CalcBackend>,
}

impl std::fmt::Debug for Calculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calculator")
            .field("label", &self.label)
            .field("paths", &self.paths)
            .field("parameters", &self.parameters)
            .field("structure", &self.structure)
            .field("results", &self.results)
            .field("checkpoint", &self.checkpoint)
            .field("requested", &self.requested)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Calculator {
    pub fn new(
        label: impl Into<String>,
        directory: impl Into<PathBuf>,
        backend: Box<dyn CalcBackend>,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, CoreError> {
        let label = label.into();
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        let parameters = Parameters::with_overrides(overrides)?;
        let paths = ArtifactPaths::new(directory, label.clone());
        debug!(%label, backend = backend.name(), "calculator created");
        Ok(Self {
            label,
            paths,
            parameters,
            structure: None,
            results: Results::new(),
            checkpoint: None,
            requested: BTreeSet::new(),
            backend,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn checkpoint(&self) -> Option<&PathBuf> {
        self.checkpoint.as_ref()
    }

    /// Current lifecycle state, derived from what the calculator holds.
    pub fn state(&self) -> CalcState {
        if self.structure.is_none() {
            CalcState::Empty
        } else if self.results.is_empty() {
            CalcState::Ready
        } else {
            CalcState::Valid
        }
    }

    /// Apply parameter overrides, returning the keys that actually changed.
    /// Any real change discards cached results and the checkpoint; setting a
    /// key to its current value leaves the cache intact.
    pub fn set(
        &mut self,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<BTreeSet<String>, CoreError> {
        let changed = self.parameters.merge(overrides)?;
        if !changed.is_empty() {
            debug!(label = %self.label, ?changed, "parameters changed");
            self.invalidate()?;
        }
        Ok(changed)
    }

    /// Adopt a structure. A geometry change (species, positions, or cell)
    /// invalidates the cache; a change confined to periodic-boundary flags
    /// does not, since the engine treats the system as fully periodic.
    pub fn set_structure(&mut self, structure: Structure) -> Result<(), CoreError> {
        match &self.structure {
            Some(current) if current.same_geometry(&structure) => {
                self.structure = Some(structure);
            }
            Some(_) => {
                debug!(label = %self.label, "geometry changed");
                self.invalidate()?;
                self.structure = Some(structure);
            }
            None => {
                validate_transition(CalcState::Empty, CalcState::Ready)?;
                self.structure = Some(structure);
            }
        }
        Ok(())
    }

    /// Set the structure, then get the property; the staleness check on the
    /// structure happens first.
    pub fn get_property_for(
        &mut self,
        name: &str,
        structure: Structure,
    ) -> Result<PropertyValue, CoreError> {
        self.set_structure(structure)?;
        self.get_property(name)
    }

    /// Return the named property, recomputing only when the cache cannot
    /// answer. Repeated queries for an already-computed property never
    /// touch the backend.
    pub fn get_property(&mut self, name: &str) -> Result<PropertyValue, CoreError> {
        if !is_implemented(name) {
            return Err(CoreError::PropertyNotImplemented(name.to_owned()));
        }
        if self.structure.is_none() {
            return Err(CoreError::NoStructure);
        }

        self.requested.insert(name.to_owned());
        if self.state() == CalcState::Valid {
            if let Some(value) = self.results.get(name) {
                debug!(label = %self.label, property = name, "cache hit");
                return Ok(value.clone());
            }
        }

        let properties = self.requested.clone();
        self.calculate(&properties)?;
        self.results
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::IncompleteResults(name.to_owned()))
    }

    /// The potential energy: the free energy when the engine reported one
    /// (smeared calculations), otherwise the total energy.
    pub fn potential_energy(&mut self) -> Result<f64, CoreError> {
        let energy = self.get_property("energy")?;
        if let Some(free) = self
            .results
            .get("free_energy")
            .and_then(PropertyValue::as_scalar)
        {
            return Ok(free);
        }
        energy
            .as_scalar()
            .ok_or_else(|| CoreError::IncompleteResults("energy".to_owned()))
    }

    /// Forces on every atom, in the structure's atom order.
    pub fn forces(&mut self) -> Result<Vec<Vector3<f64>>, CoreError> {
        let value = self.get_property("forces")?;
        value
            .as_per_atom()
            .map(<[Vector3<f64>]>::to_vec)
            .ok_or_else(|| CoreError::IncompleteResults("forces".to_owned()))
    }

    /// Run the backend for `properties` and adopt the response.
    ///
    /// On failure nothing is adopted: the cache stays in `Ready` so a
    /// corrected parameter set can retry cleanly.
    pub fn calculate(&mut self, properties: &BTreeSet<String>) -> Result<(), CoreError> {
        let structure = self.structure.clone().ok_or(CoreError::NoStructure)?;
        let from = self.state();
        info!(label = %self.label, ?properties, "recomputing");

        let request = RunRequest {
            payload: Payload {
                parameters: self.parameters.clone(),
                atoms: structure.clone(),
                results: self.results.clone(),
                checkpoint: self.checkpoint.clone(),
            },
            properties: properties.clone(),
            paths: self.paths.clone(),
        };

        let response = self.backend.run(&request)?;

        for name in properties {
            if !response.results.contains_key(name) {
                return Err(CoreError::IncompleteResults(name.clone()));
            }
        }
        for (name, value) in &response.results {
            if let Some(vectors) = value.as_per_atom() {
                if vectors.len() != structure.len() {
                    return Err(CoreError::ShapeMismatch {
                        property: name.clone(),
                        expected: structure.len(),
                        found: vectors.len(),
                    });
                }
            }
        }

        validate_transition(from, CalcState::Valid)?;

        // Persist the adopted state so the payload on disk always reflects
        // what the calculator holds, regardless of backend.
        let adopted = Payload {
            parameters: self.parameters.clone(),
            atoms: structure,
            results: response.results,
            checkpoint: response.checkpoint,
        };
        adopted.write(&self.paths.payload())?;

        self.results = adopted.results;
        self.checkpoint = adopted.checkpoint;
        Ok(())
    }

    /// Unconditionally discard results and the checkpoint. The structure is
    /// kept; the state becomes `Ready` (or `Empty` when none was ever set).
    pub fn reset(&mut self) -> Result<(), CoreError> {
        debug!(label = %self.label, "reset");
        self.results.clear();
        self.requested.clear();
        if let Some(handle) = self.checkpoint.take() {
            remove_if_present(&handle).map_err(CoreError::Runtime)?;
        }
        self.paths.remove_checkpoint().map_err(CoreError::Runtime)?;
        Ok(())
    }

    fn invalidate(&mut self) -> Result<(), CoreError> {
        let from = self.state();
        self.results.clear();
        if let Some(handle) = self.checkpoint.take() {
            remove_if_present(&handle).map_err(CoreError::Runtime)?;
        }
        validate_transition(from, self.state())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloch_runtime::MockBackend;
    use nalgebra::Matrix3;

    fn hydrogen() -> Structure {
        Structure::new(
            vec!["H".to_owned()],
            vec![Vector3::zeros()],
            Matrix3::identity() * 10.0,
            [true; 3],
        )
        .unwrap()
    }

    fn energy_results(value: f64) -> Results {
        [("energy".to_owned(), PropertyValue::Scalar(value))].into()
    }

    #[test]
    fn starts_empty_and_rejects_property_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut calc = Calculator::new(
            "t",
            dir.path(),
            Box::new(MockBackend::new()),
            &BTreeMap::new(),
        )
        .unwrap();

        assert_eq!(calc.state(), CalcState::Empty);
        assert!(matches!(
            calc.get_property("energy").unwrap_err(),
            CoreError::NoStructure
        ));
    }

    #[test]
    fn unknown_property_is_rejected_without_structure_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut calc = Calculator::new(
            "t",
            dir.path(),
            Box::new(MockBackend::new()),
            &BTreeMap::new(),
        )
        .unwrap();

        assert!(matches!(
            calc.get_property("stress").unwrap_err(),
            CoreError::PropertyNotImplemented(p) if p == "stress"
        ));
    }

    #[test]
    fn unknown_override_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = [("basis".to_owned(), ParamValue::from("dzp"))].into();
        let err = Calculator::new("t", dir.path(), Box::new(MockBackend::new()), &overrides)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Model(bloch_model::ModelError::UnknownParameter(_))
        ));
    }

    #[test]
    fn incomplete_engine_response_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // Mock answers with an empty result set no matter what was asked.
        let mut calc = Calculator::new(
            "t",
            dir.path(),
            Box::new(MockBackend::new()),
            &BTreeMap::new(),
        )
        .unwrap();
        calc.set_structure(hydrogen()).unwrap();

        assert!(matches!(
            calc.get_property("energy").unwrap_err(),
            CoreError::IncompleteResults(p) if p == "energy"
        ));
        assert_eq!(calc.state(), CalcState::Ready);
    }

    #[test]
    fn misshapen_forces_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::with_results(
            [
                ("energy".to_owned(), PropertyValue::Scalar(-1.0)),
                (
                    "forces".to_owned(),
                    PropertyValue::PerAtom(vec![Vector3::zeros(), Vector3::zeros()]),
                ),
            ]
            .into(),
        );
        let mut calc =
            Calculator::new("t", dir.path(), Box::new(mock), &BTreeMap::new()).unwrap();
        calc.set_structure(hydrogen()).unwrap();

        let err = calc.get_property("forces").unwrap_err();
        assert!(matches!(
            err,
            CoreError::ShapeMismatch {
                expected: 1,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn potential_energy_prefers_free_energy() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::with_results(
            [
                ("energy".to_owned(), PropertyValue::Scalar(-10.0)),
                ("free_energy".to_owned(), PropertyValue::Scalar(-10.5)),
            ]
            .into(),
        );
        let mut calc =
            Calculator::new("t", dir.path(), Box::new(mock), &BTreeMap::new()).unwrap();
        calc.set_structure(hydrogen()).unwrap();

        assert_eq!(calc.potential_energy().unwrap(), -10.5);
    }

    #[test]
    fn persisted_payload_reflects_adopted_state() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBackend::with_results(energy_results(-2.5));
        let mut calc = Calculator::new("t", dir.path(), Box::new(mock), &BTreeMap::new()).unwrap();
        calc.set_structure(hydrogen()).unwrap();
        calc.get_property("energy").unwrap();

        let persisted = Payload::read(&calc.paths.payload()).unwrap();
        assert_eq!(
            persisted.results.get("energy"),
            Some(&PropertyValue::Scalar(-2.5))
        );
        assert_eq!(persisted.checkpoint.as_deref(), calc.checkpoint().map(PathBuf::as_path));
    }
}
