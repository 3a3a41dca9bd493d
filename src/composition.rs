use serde::{Deserialize, Serialize};

use crate::component::{ComponentId, NUM_COMPONENTS, NUM_PHASES};
use crate::constants::NEGATIVE_MASS_WARNING;

/// Provenance bits recorded on a column's composition. Bits are only ever
/// OR'd in, and cleared once per distribution pass.
pub mod state {
    pub const INITIAL: u32 = 1;
    pub const LEAKED: u32 = 2;
    pub const WASTED: u32 = 4;
    pub const SPILLED_IN: u32 = 8;
    pub const MERGED: u32 = 16;
}

/// Mass (kg) per hydrocarbon species, plus the bulk fluid properties the
/// last flash assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    masses: [f64; NUM_COMPONENTS],
    density: f64,
    viscosity: f64,
}

/// Flash output, indexed by `PhaseId`.
pub type PhaseCompositions = [Composition; NUM_PHASES];

impl Default for Composition {
    fn default() -> Self {
        Self::new()
    }
}

impl Composition {
    pub fn new() -> Self {
        Composition {
            masses: [0.0; NUM_COMPONENTS],
            density: 0.0,
            viscosity: 0.0,
        }
    }

    pub fn from_masses(masses: &[(ComponentId, f64)]) -> Self {
        let mut composition = Composition::new();
        for &(id, mass) in masses {
            composition.add_component(id, mass);
        }
        composition
    }

    pub fn empty_phases() -> PhaseCompositions {
        [Composition::new(), Composition::new()]
    }

    pub fn get(&self, id: ComponentId) -> f64 {
        self.masses[id.index()]
    }

    pub fn set(&mut self, id: ComponentId, mass: f64) {
        self.masses[id.index()] = mass;
        self.floor_component(id);
    }

    pub fn add_component(&mut self, id: ComponentId, mass: f64) {
        self.masses[id.index()] += mass;
        self.floor_component(id);
    }

    pub fn subtract_component(&mut self, id: ComponentId, mass: f64) {
        self.masses[id.index()] -= mass;
        self.floor_component(id);
    }

    pub fn add(&mut self, other: &Composition) {
        for id in ComponentId::ALL {
            self.masses[id.index()] += other.masses[id.index()];
        }
        if self.density == 0.0 {
            self.density = other.density;
            self.viscosity = other.viscosity;
        }
    }

    pub fn subtract(&mut self, other: &Composition) {
        for id in ComponentId::ALL {
            self.masses[id.index()] -= other.masses[id.index()];
            self.floor_component(id);
        }
    }

    /// Adds `fraction` times `other`.
    pub fn add_fraction(&mut self, other: &Composition, fraction: f64) {
        for id in ComponentId::ALL {
            self.masses[id.index()] += fraction * other.masses[id.index()];
        }
        if self.density == 0.0 {
            self.density = other.density;
            self.viscosity = other.viscosity;
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for mass in self.masses.iter_mut() {
            *mass *= factor;
        }
    }

    pub fn scaled(&self, factor: f64) -> Composition {
        let mut composition = self.clone();
        composition.scale(factor);
        composition
    }

    pub fn reset(&mut self) {
        self.masses = [0.0; NUM_COMPONENTS];
        self.density = 0.0;
        self.viscosity = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.masses.iter().all(|&m| m <= 0.0)
    }

    pub fn is_component_empty(&self, id: ComponentId) -> bool {
        self.masses[id.index()] <= 0.0
    }

    /// Total mass (kg).
    pub fn weight(&self) -> f64 {
        self.masses.iter().sum()
    }

    pub fn component_weight(&self, id: ComponentId) -> f64 {
        self.get(id)
    }

    /// Density (kg/m3) set by the last flash; 0 when unknown.
    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn set_density(&mut self, density: f64) {
        self.density = density;
    }

    pub fn viscosity(&self) -> f64 {
        self.viscosity
    }

    pub fn set_viscosity(&mut self, viscosity: f64) {
        self.viscosity = viscosity;
    }

    /// Volume at the current density, 0 when the density is unknown.
    pub fn volume(&self) -> f64 {
        if self.density > 0.0 {
            self.weight() / self.density
        } else {
            0.0
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, f64)> + '_ {
        ComponentId::ALL.iter().map(move |&id| (id, self.masses[id.index()]))
    }

    fn floor_component(&mut self, id: ComponentId) {
        let mass = self.masses[id.index()];
        if mass < 0.0 {
            if mass < -NEGATIVE_MASS_WARNING {
                log::warn!(
                    "negative mass {:.6e} kg for component {} floored to zero",
                    mass,
                    id.as_str()
                );
            }
            self.masses[id.index()] = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_add_and_weight() {
        let mut composition = Composition::new();
        assert!(composition.is_empty());

        composition.add_component(ComponentId::C1, 10.0);
        composition.add_component(ComponentId::C15PlusSat, 5.5);
        assert!(!composition.is_empty());
        assert_abs_diff_eq!(composition.weight(), 15.5, epsilon = 1e-12);
        assert_abs_diff_eq!(composition.component_weight(ComponentId::C1), 10.0, epsilon = 1e-12);
        assert!(composition.is_component_empty(ComponentId::C2));
    }

    #[test]
    fn test_subtract_floors_per_component() {
        let mut composition = Composition::from_masses(&[(ComponentId::C1, 4.0), (ComponentId::C2, 6.0)]);
        let other = Composition::from_masses(&[(ComponentId::C1, 5.0), (ComponentId::C2, 1.0)]);
        composition.subtract(&other);

        assert_eq!(composition.get(ComponentId::C1), 0.0);
        assert_abs_diff_eq!(composition.get(ComponentId::C2), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(composition.weight(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_conservation_over_a_sequence_of_operations() {
        let mut composition = Composition::new();
        let mut expected = [0.0_f64; NUM_COMPONENTS];

        let steps: [(ComponentId, f64); 8] = [
            (ComponentId::C1, 12.0),
            (ComponentId::C3, 4.0),
            (ComponentId::C1, -5.0),
            (ComponentId::Resin, 9.5),
            (ComponentId::C3, -10.0),
            (ComponentId::Resin, -0.5),
            (ComponentId::N2, 1.25),
            (ComponentId::C1, 3.0),
        ];

        for (id, delta) in steps {
            if delta >= 0.0 {
                composition.add_component(id, delta);
            } else {
                composition.subtract_component(id, -delta);
            }
            let slot = &mut expected[id.index()];
            *slot = (*slot + delta).max(0.0);
        }

        let expected_total: f64 = expected.iter().sum();
        assert_abs_diff_eq!(composition.weight(), expected_total, epsilon = 1e-12);
        assert_eq!(composition.get(ComponentId::C3), 0.0);
    }

    #[test]
    fn test_scale_and_fraction() {
        let base = Composition::from_masses(&[(ComponentId::C5, 8.0)]);
        let mut accumulated = Composition::new();
        accumulated.add_fraction(&base, 0.25);
        assert_abs_diff_eq!(accumulated.weight(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(base.scaled(0.5).weight(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_volume_uses_density() {
        let mut oil = Composition::from_masses(&[(ComponentId::C15PlusSat, 800.0)]);
        assert_eq!(oil.volume(), 0.0);
        oil.set_density(800.0);
        assert_abs_diff_eq!(oil.volume(), 1.0, epsilon = 1e-12);
    }
}
