use crate::ModelError;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An atomic configuration: species, Cartesian positions (Å), periodic
/// cell (rows are lattice vectors, Å), and periodic-boundary flags.
///
/// Atom ordering is significant: forces returned by the engine are matched
/// to atoms by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub symbols: Vec<String>,
    pub positions: Vec<Vector3<f64>>,
    pub cell: Matrix3<f64>,
    pub pbc: [bool; 3],
}

impl Structure {
    pub fn new(
        symbols: Vec<String>,
        positions: Vec<Vector3<f64>>,
        cell: Matrix3<f64>,
        pbc: [bool; 3],
    ) -> Result<Self, ModelError> {
        if symbols.len() != positions.len() {
            return Err(ModelError::AtomCountMismatch {
                symbols: symbols.len(),
                positions: positions.len(),
            });
        }
        Ok(Self {
            symbols,
            positions,
            cell,
            pbc,
        })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Whether two structures describe the same geometry for caching
    /// purposes. Species, positions, and cell are compared exactly;
    /// periodic-boundary flags are deliberately ignored because the engine
    /// always treats the system as fully periodic.
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.symbols == other.symbols
            && self.positions == other.positions
            && self.cell == other.cell
    }

    /// Chemical formula with element counts in alphabetical order,
    /// e.g. `Cl4Na4`.
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for symbol in &self.symbols {
            *counts.entry(symbol.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(el, n)| {
                if n == 1 {
                    el.to_owned()
                } else {
                    format!("{el}{n}")
                }
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
