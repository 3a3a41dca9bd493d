// Placement of trap charge over the trap's level-to-volume function

use crate::component::{NUM_PHASES, PhaseId};
use crate::composition::{Composition, PhaseCompositions};
use crate::interpolator::Interpolator;

/// What a trap hands to a distributor.
#[derive(Debug, Clone)]
pub struct DistributionInput<'a> {
    /// Flashed charge, with phase densities set.
    pub charges: &'a PhaseCompositions,
    /// Pore volume (m3) above a level (m below the crest top).
    pub level_to_volume: &'a Interpolator,
    /// Deepest level that holds charge.
    pub max_level: f64,
    /// Level below which gas is wasted, when it lies inside the trap.
    pub gas_waste_level: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DistributionOutput {
    pub distributed: PhaseCompositions,
    pub leaked: Composition,
    pub gas_wasted: Composition,
    pub gas_spilled: Composition,
    /// The trap decides whether this oil spills or wastes.
    pub oil_spilled_or_wasted: Composition,
    /// Fill levels (m below the crest top), gas then oil.
    pub final_levels: [f64; NUM_PHASES],
}

impl DistributionOutput {
    /// Everything that left the trap.
    pub fn expelled_weight(&self) -> f64 {
        self.leaked.weight() + self.gas_wasted.weight() + self.gas_spilled.weight() + self.oil_spilled_or_wasted.weight()
    }
}

pub trait Distributor {
    fn name(&self) -> &str;

    fn distribute(&self, input: &DistributionInput) -> DistributionOutput;
}

/// Fill-and-spill without seal failure: gas fills from the crest down,
/// oil fills below the gas, and what does not fit leaves the trap.
#[derive(Debug, Clone, Default)]
pub struct SpillDistributor;

impl SpillDistributor {
    pub fn new() -> Self {
        SpillDistributor
    }

    fn phase_volume(composition: &Composition) -> f64 {
        if composition.is_empty() {
            return 0.0;
        }
        if composition.density() <= 0.0 {
            log::warn!(
                "distributing {:.4e} kg without a density, treating it as volumeless",
                composition.weight()
            );
            return 0.0;
        }
        composition.volume()
    }

    /// Splits `composition` so that `capacity` (m3) of it is kept.
    fn split(composition: &Composition, volume: f64, capacity: f64) -> (Composition, Composition) {
        if volume <= capacity || volume <= 0.0 {
            return (composition.clone(), Composition::new());
        }
        let kept = (capacity / volume).clamp(0.0, 1.0);
        let mut excess = composition.scaled(1.0 - kept);
        excess.set_density(composition.density());
        (composition.scaled(kept), excess)
    }
}

impl Distributor for SpillDistributor {
    fn name(&self) -> &str {
        "SpillDistributor"
    }

    fn distribute(&self, input: &DistributionInput) -> DistributionOutput {
        let volume_at = |level: f64| input.level_to_volume.compute(level).max(0.0);

        let total_capacity = volume_at(input.max_level);
        let gas_limit = match input.gas_waste_level {
            Some(level) if level < input.max_level => level,
            _ => input.max_level,
        };
        let gas_capacity = volume_at(gas_limit).min(total_capacity);

        let gas = &input.charges[PhaseId::Gas.index()];
        let gas_volume = Self::phase_volume(gas);
        let (stored_gas, gas_excess) = Self::split(gas, gas_volume, gas_capacity);
        let stored_gas_volume = gas_volume.min(gas_capacity);

        let oil = &input.charges[PhaseId::Oil.index()];
        let oil_volume = Self::phase_volume(oil);
        let oil_capacity = (total_capacity - stored_gas_volume).max(0.0);
        let (stored_oil, oil_excess) = Self::split(oil, oil_volume, oil_capacity);
        let stored_oil_volume = oil_volume.min(oil_capacity);

        let gas_level = input.level_to_volume.inverse(stored_gas_volume).min(input.max_level);
        let oil_level = input
            .level_to_volume
            .inverse(stored_gas_volume + stored_oil_volume)
            .min(input.max_level)
            .max(gas_level);

        let mut output = DistributionOutput {
            distributed: [stored_gas, stored_oil],
            final_levels: [gas_level, oil_level],
            oil_spilled_or_wasted: oil_excess,
            ..Default::default()
        };
        if input.gas_waste_level.is_some_and(|level| level < input.max_level) {
            output.gas_wasted = gas_excess;
        } else {
            output.gas_spilled = gas_excess;
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentId;
    use crate::interpolator::Extrapolation;
    use approx::assert_abs_diff_eq;

    fn charges(gas_kg: f64, oil_kg: f64) -> PhaseCompositions {
        let mut gas = Composition::from_masses(&[(ComponentId::C1, gas_kg)]);
        gas.set_density(100.0);
        let mut oil = Composition::from_masses(&[(ComponentId::C15PlusSat, oil_kg)]);
        oil.set_density(800.0);
        [gas, oil]
    }

    /// 10 m3 of pore volume per metre down to 20 m.
    fn table() -> Interpolator {
        Interpolator::from_points(&[(0.0, 0.0), (20.0, 200.0)], Extrapolation::Constant)
    }

    #[test]
    fn test_everything_fits() {
        let charges = charges(1000.0, 8000.0); // 10 m3 + 10 m3
        let table = table();
        let output = SpillDistributor::new().distribute(&DistributionInput {
            charges: &charges,
            level_to_volume: &table,
            max_level: 20.0,
            gas_waste_level: None,
        });

        assert_abs_diff_eq!(output.expelled_weight(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(output.final_levels[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(output.final_levels[1], 2.0, epsilon = 1e-9);
        assert!(output.leaked.is_empty());
    }

    #[test]
    fn test_oil_spills_below_the_gas() {
        let charges = charges(15000.0, 80000.0); // 150 m3 gas, 100 m3 oil
        let table = table();
        let output = SpillDistributor::new().distribute(&DistributionInput {
            charges: &charges,
            level_to_volume: &table,
            max_level: 20.0,
            gas_waste_level: None,
        });

        assert_abs_diff_eq!(output.distributed[0].weight(), 15000.0, epsilon = 1e-6);
        // 50 m3 left for oil
        assert_abs_diff_eq!(output.distributed[1].weight(), 40000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(output.oil_spilled_or_wasted.weight(), 40000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(output.final_levels[1], 20.0, epsilon = 1e-9);

        let total: f64 = output.distributed.iter().map(Composition::weight).sum::<f64>() + output.expelled_weight();
        assert_abs_diff_eq!(total, 95000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gas_below_waste_level_is_wasted() {
        let charges = charges(10000.0, 0.0); // 100 m3 gas
        let table = table();
        let output = SpillDistributor::new().distribute(&DistributionInput {
            charges: &charges,
            level_to_volume: &table,
            max_level: 20.0,
            gas_waste_level: Some(5.0),
        });

        assert_abs_diff_eq!(output.distributed[0].weight(), 5000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(output.gas_wasted.weight(), 5000.0, epsilon = 1e-6);
        assert!(output.gas_spilled.is_empty());
        assert_abs_diff_eq!(output.final_levels[0], 5.0, epsilon = 1e-9);
    }
}
