//! Particle rest-mass lookup
//!
//! The table is passed explicitly to the aggregator. Antiparticles share
//! the mass of their particle, so lookups use the absolute PDG id.

use crate::infra::error::StageError;
use rustc_hash::FxHashMap;

/// Read-only rest-mass lookup service
pub trait ParticleTable {
    /// Rest mass in GeV
    fn mass_of(&self, pdg_id: i32) -> Result<f64, StageError>;
}

/// Built-in masses [GeV] for particles commonly seen at the HCAL face
const DEFAULT_MASSES: &[(i32, f64)] = &[
    (11, 0.000_510_999),
    (12, 0.0),
    (13, 0.105_658_4),
    (14, 0.0),
    (15, 1.776_86),
    (16, 0.0),
    (22, 0.0),
    (111, 0.134_976_8),
    (130, 0.497_611),
    (211, 0.139_570_39),
    (221, 0.547_862),
    (310, 0.497_611),
    (311, 0.497_611),
    (321, 0.493_677),
    (2112, 0.939_565_42),
    (2212, 0.938_272_09),
    (3112, 1.197_449),
    (3122, 1.115_683),
    (3212, 1.192_642),
    (3222, 1.189_37),
    (3312, 1.321_71),
    (3322, 1.314_86),
    (3334, 1.672_45),
    (1_000_010_020, 1.875_613),
    (1_000_010_030, 2.808_921),
    (1_000_020_030, 2.808_391),
    (1_000_020_040, 3.727_379),
];

/// PDG mass table with optional overrides
#[derive(Debug, Clone)]
pub struct PdgTable {
    masses: FxHashMap<i32, f64>,
}

impl PdgTable {
    /// Table populated with the built-in masses
    pub fn new() -> Self {
        Self { masses: DEFAULT_MASSES.iter().copied().collect() }
    }

    /// Empty table (every lookup fails until masses are inserted)
    pub fn empty() -> Self {
        Self { masses: FxHashMap::default() }
    }

    /// Add or replace masses, keyed by PDG id
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (i32, f64)>,
    {
        for (pdg_id, mass) in overrides {
            self.masses.insert(pdg_id.abs(), mass);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.masses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }
}

impl Default for PdgTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleTable for PdgTable {
    fn mass_of(&self, pdg_id: i32) -> Result<f64, StageError> {
        self.masses
            .get(&pdg_id.saturating_abs())
            .copied()
            .ok_or(StageError::UnknownParticle(pdg_id))
    }
}

/// Total and kinetic energy [GeV] for a momentum magnitude and rest mass
#[inline]
pub fn energies(momentum: f64, mass: f64) -> (f64, f64) {
    let total = momentum.hypot(mass);
    (total, total - mass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_masses() {
        let table = PdgTable::new();
        assert!((table.mass_of(13).unwrap() - 0.1056584).abs() < 1e-9);
        assert_eq!(table.mass_of(22).unwrap(), 0.0);
        assert!((table.mass_of(2112).unwrap() - 0.93956542).abs() < 1e-9);
    }

    #[test]
    fn test_antiparticle_uses_particle_mass() {
        let table = PdgTable::new();
        assert_eq!(table.mass_of(-211).unwrap(), table.mass_of(211).unwrap());
        assert_eq!(table.mass_of(-11).unwrap(), table.mass_of(11).unwrap());
    }

    #[test]
    fn test_unknown_particle() {
        let table = PdgTable::new();
        assert!(matches!(table.mass_of(9_999_999), Err(StageError::UnknownParticle(9_999_999))));
        assert!(PdgTable::empty().mass_of(11).is_err());
    }

    #[test]
    fn test_overrides() {
        let table = PdgTable::empty().with_overrides([(-13, 0.1), (2212, 0.9)]);
        assert_eq!(table.mass_of(13).unwrap(), 0.1);
        assert_eq!(table.mass_of(2212).unwrap(), 0.9);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_energies() {
        let (total, kinetic) = energies(0.0, 0.938);
        assert_eq!(total, 0.938);
        assert_eq!(kinetic, 0.0);

        let (total, kinetic) = energies(3.0, 4.0);
        assert!((total - 5.0).abs() < 1e-12);
        assert!((kinetic - 1.0).abs() < 1e-12);

        // Massless: all energy is kinetic
        let (total, kinetic) = energies(2.0, 0.0);
        assert_eq!(total, kinetic);
    }
}
