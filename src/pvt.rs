// Phase splitting of hydrocarbon charge

use crate::component::{ComponentId, PhaseId};
use crate::composition::{Composition, PhaseCompositions};
use crate::constants::{C2K, GAS_CONSTANT_J_PER_MOL_K, PVT_BALANCE_TOLERANCE};

/// Gas viscosity (Pa s) assigned by the volatility split.
pub const GAS_VISCOSITY: f64 = 1.5e-5;
/// Oil viscosity (Pa s) assigned by the volatility split.
pub const OIL_VISCOSITY: f64 = 1.0e-3;

/// Compositional flash. The sum of the phase masses should equal the input
/// mass; [`compute_pvt`] checks that and books any residual.
pub trait PvtFlash {
    fn name(&self) -> &str;

    /// Splits `composition` at `temperature_c` (C) and `pressure_mpa` (MPa).
    fn flash(&self, composition: &Composition, temperature_c: f64, pressure_mpa: f64) -> PhaseCompositions;
}

/// Runs `flash` and checks its mass balance. A relative imbalance over one
/// percent is logged. The residual `input - output` is folded into
/// `pvt_error` with the sign flipped, so mass lost by the flash counts
/// negative.
pub fn compute_pvt(
    flash: &dyn PvtFlash,
    composition: &Composition,
    temperature_c: f64,
    pressure_mpa: f64,
    pvt_error: &mut f64,
) -> PhaseCompositions {
    let phases = flash.flash(composition, temperature_c, pressure_mpa);

    let weight_in = composition.weight();
    let weight_out: f64 = phases.iter().map(Composition::weight).sum();
    let residual = weight_in - weight_out;

    if weight_in > 0.0 && (residual / weight_in).abs() > PVT_BALANCE_TOLERANCE {
        log::warn!(
            "{} flash out of balance: in {:.6e} kg, out {:.6e} kg at {:.2} C, {:.3} MPa",
            flash.name(),
            weight_in,
            weight_out,
            temperature_c,
            pressure_mpa
        );
    }
    *pvt_error -= residual;

    phases
}

/// Reference flash: volatile species report to vapour, everything else to
/// liquid. Vapour density follows the ideal gas law, liquid density a
/// volume-additive mixing rule over the standard liquid densities.
#[derive(Debug, Clone, Default)]
pub struct ComponentSplitFlash;

impl ComponentSplitFlash {
    pub fn new() -> Self {
        ComponentSplitFlash
    }

    fn gas_density(gas: &Composition, temperature_c: f64, pressure_mpa: f64) -> f64 {
        let moles: f64 = gas
            .iter()
            .map(|(id, mass)| mass / id.profile().molar_mass_kg_mol)
            .sum();
        if moles <= 0.0 {
            return 0.0;
        }
        let molar_mass = gas.weight() / moles;
        let temperature_k = (temperature_c + C2K).max(1.0);
        (pressure_mpa * 1.0e6).max(1.0e5) * molar_mass / (GAS_CONSTANT_J_PER_MOL_K * temperature_k)
    }

    fn oil_density(oil: &Composition) -> f64 {
        let volume: f64 = oil
            .iter()
            .map(|(id, mass)| mass / id.profile().liquid_density_kg_m3)
            .sum();
        if volume > 0.0 { oil.weight() / volume } else { 0.0 }
    }
}

impl PvtFlash for ComponentSplitFlash {
    fn name(&self) -> &str {
        "ComponentSplitFlash"
    }

    fn flash(&self, composition: &Composition, temperature_c: f64, pressure_mpa: f64) -> PhaseCompositions {
        let mut phases = Composition::empty_phases();

        for id in ComponentId::ALL {
            let mass = composition.get(id);
            if mass <= 0.0 {
                continue;
            }
            let phase = if id.profile().volatile { PhaseId::Gas } else { PhaseId::Oil };
            phases[phase.index()].add_component(id, mass);
        }

        let gas_density = Self::gas_density(&phases[PhaseId::Gas.index()], temperature_c, pressure_mpa);
        let oil_density = Self::oil_density(&phases[PhaseId::Oil.index()]);

        let gas = &mut phases[PhaseId::Gas.index()];
        gas.set_density(gas_density);
        gas.set_viscosity(GAS_VISCOSITY);

        let oil = &mut phases[PhaseId::Oil.index()];
        oil.set_density(oil_density);
        oil.set_viscosity(OIL_VISCOSITY);

        phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_deviation;
    use approx::assert_abs_diff_eq;

    struct LossyFlash {
        keep: f64,
    }

    impl PvtFlash for LossyFlash {
        fn name(&self) -> &str {
            "LossyFlash"
        }

        fn flash(&self, composition: &Composition, _t: f64, _p: f64) -> PhaseCompositions {
            [composition.scaled(self.keep), Composition::new()]
        }
    }

    fn mixed_charge() -> Composition {
        Composition::from_masses(&[
            (ComponentId::C1, 120.0),
            (ComponentId::C3, 30.0),
            (ComponentId::C6To14Sat, 250.0),
            (ComponentId::C15PlusAro, 75.0),
            (ComponentId::Asphaltene, 5.0),
        ])
    }

    #[test]
    fn test_split_conserves_weight() {
        let charge = mixed_charge();
        let mut pvt_error = 0.0;
        let phases = compute_pvt(&ComponentSplitFlash::new(), &charge, 80.0, 25.0, &mut pvt_error);

        let total: f64 = phases.iter().map(Composition::weight).sum();
        assert_deviation!(total, charge.weight(), 1.0);
        assert_abs_diff_eq!(pvt_error, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(phases[PhaseId::Gas.index()].weight(), 150.0, epsilon = 1e-9);
        assert_abs_diff_eq!(phases[PhaseId::Oil.index()].weight(), 330.0, epsilon = 1e-9);
    }

    #[test]
    fn test_split_assigns_densities() {
        let phases = ComponentSplitFlash::new().flash(&mixed_charge(), 80.0, 25.0);
        let gas = &phases[PhaseId::Gas.index()];
        let oil = &phases[PhaseId::Oil.index()];

        assert!(gas.density() > 50.0 && gas.density() < 400.0, "gas density {}", gas.density());
        assert!(oil.density() > 700.0 && oil.density() < 1000.0, "oil density {}", oil.density());
        assert!(oil.density() > gas.density());
    }

    #[test]
    fn test_imbalance_is_accumulated_with_flipped_sign() {
        let charge = mixed_charge();
        let mut pvt_error = 0.0;
        let phases = compute_pvt(&LossyFlash { keep: 0.9 }, &charge, 60.0, 20.0, &mut pvt_error);

        let out: f64 = phases.iter().map(Composition::weight).sum();
        assert_abs_diff_eq!(pvt_error, out - charge.weight(), epsilon = 1e-9);
        assert!(pvt_error < 0.0);
    }

    #[test]
    fn test_empty_charge_flashes_to_empty_phases() {
        let mut pvt_error = 0.0;
        let phases = compute_pvt(&ComponentSplitFlash::new(), &Composition::new(), 50.0, 10.0, &mut pvt_error);
        assert!(phases.iter().all(Composition::is_empty));
        assert_eq!(pvt_error, 0.0);
    }
}
