use crate::{Calculator, CoreError};
use bloch_model::ParamValue;
use bloch_runtime::{select_backend, EngineSettings};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything a factory needs to build a calculator.
#[derive(Debug, Clone, Default)]
pub struct CalculatorSpec {
    pub label: String,
    pub directory: PathBuf,
    pub overrides: BTreeMap<String, ParamValue>,
}

pub type Factory = fn(&CalculatorSpec) -> Result<Calculator, CoreError>;

/// Explicit mapping from calculator name to constructor.
///
/// Hosts look calculators up by name; keeping the mapping an ordinary value
/// (instead of ambient registration at import time) makes it inspectable
/// and lets tests register stand-ins.
#[derive(Default)]
pub struct Registry {
    map: BTreeMap<String, Factory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in mapping: the subprocess-backed engine under `dftk`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("dftk", dftk_factory);
        registry
    }

    pub fn register(&mut self, name: &str, factory: Factory) {
        self.map.insert(name.to_owned(), factory);
    }

    pub fn create(&self, name: &str, spec: &CalculatorSpec) -> Result<Calculator, CoreError> {
        let factory = self
            .map
            .get(name)
            .ok_or_else(|| CoreError::CalculatorNotFound(name.to_owned()))?;
        factory(spec)
    }

    pub fn names(&self) -> Vec<&str> {
        self.map.keys().map(String::as_str).collect()
    }
}

fn dftk_factory(spec: &CalculatorSpec) -> Result<Calculator, CoreError> {
    let settings = EngineSettings::from_env();
    let backend = select_backend("subprocess", &settings)?;
    Calculator::new(spec.label.clone(), spec.directory.clone(), backend, &spec.overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloch_runtime::MockBackend;

    fn mock_factory(spec: &CalculatorSpec) -> Result<Calculator, CoreError> {
        Calculator::new(
            spec.label.clone(),
            spec.directory.clone(),
            Box::new(MockBackend::new()),
            &spec.overrides,
        )
    }

    #[test]
    fn builtin_registers_the_engine() {
        let registry = Registry::builtin();
        assert_eq!(registry.names(), vec!["dftk"]);
    }

    #[test]
    fn unknown_name_fails() {
        let registry = Registry::builtin();
        let err = registry
            .create("espresso", &CalculatorSpec::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::CalculatorNotFound(name) if name == "espresso"));
    }

    #[test]
    fn registered_factory_builds_calculators() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        registry.register("mock", mock_factory);

        let spec = CalculatorSpec {
            label: "si".to_owned(),
            directory: dir.path().to_path_buf(),
            overrides: [("xc".to_owned(), ParamValue::from("pbe"))].into(),
        };
        let calc = registry.create("mock", &spec).unwrap();
        assert_eq!(calc.label(), "si");
        assert_eq!(
            calc.parameters().get("xc"),
            Some(&ParamValue::from("pbe"))
        );
    }
}
