use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Properties the engine contract covers. Requests for anything else are
/// rejected before a subprocess is ever launched.
pub const IMPLEMENTED_PROPERTIES: &[&str] = &["energy", "free_energy", "forces"];

pub fn is_implemented(name: &str) -> bool {
    IMPLEMENTED_PROPERTIES.contains(&name)
}

/// A computed property: either a scalar (energies) or one 3-vector per
/// atom (forces), ordered identically to the structure's atoms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(f64),
    PerAtom(Vec<Vector3<f64>>),
}

impl PropertyValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::PerAtom(_) => None,
        }
    }

    pub fn as_per_atom(&self) -> Option<&[Vector3<f64>]> {
        match self {
            Self::Scalar(_) => None,
            Self::PerAtom(v) => Some(v),
        }
    }
}

pub type Results = BTreeMap<String, PropertyValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implemented_property_names() {
        assert!(is_implemented("energy"));
        assert!(is_implemented("free_energy"));
        assert!(is_implemented("forces"));
        assert!(!is_implemented("stress"));
    }

    #[test]
    fn scalar_round_trip_keeps_full_precision() {
        let v = PropertyValue::Scalar(-213.126_882_683_746_83);
        let json = serde_json::to_string(&v).unwrap();
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn per_atom_decodes_as_vectors() {
        let json = "[[25.3, 9.7, -3.3e-7], [-25.3, -9.7, -3.6e-7]]";
        let v: PropertyValue = serde_json::from_str(json).unwrap();
        let forces = v.as_per_atom().unwrap();
        assert_eq!(forces.len(), 2);
        assert_eq!(forces[0], Vector3::new(25.3, 9.7, -3.3e-7));
        assert!(v.as_scalar().is_none());
    }
}
