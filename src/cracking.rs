// Oil-to-gas cracking collaborator

use crate::component::ComponentId;
use crate::composition::Composition;

/// One cracking step over a snapshot interval.
#[derive(Debug, Clone)]
pub struct CrackingInput<'a> {
    pub composition: &'a Composition,
    /// Immobile residue (kg) already in the column.
    pub immobiles: f64,
    pub start_age_ma: f64,
    pub end_age_ma: f64,
    pub start_pressure_mpa: f64,
    pub end_pressure_mpa: f64,
    pub start_temperature_c: f64,
    pub end_temperature_c: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CrackingOutput {
    pub composition: Composition,
    pub immobiles: f64,
}

pub trait OilToGasCracker {
    fn name(&self) -> &str;

    fn compute(&self, input: &CrackingInput) -> CrackingOutput;
}

/// Cracks a fixed fraction of the heavy species per Ma into methane and
/// immobile residue. Mass conserving.
#[derive(Debug, Clone)]
pub struct LinearCracker {
    /// Fraction of each heavy species cracked per Ma.
    pub rate_per_ma: f64,
    /// Share of the cracked mass that becomes immobile residue.
    pub residue_fraction: f64,
}

impl LinearCracker {
    pub fn new(rate_per_ma: f64, residue_fraction: f64) -> Self {
        LinearCracker {
            rate_per_ma,
            residue_fraction,
        }
    }
}

impl OilToGasCracker for LinearCracker {
    fn name(&self) -> &str {
        "LinearCracker"
    }

    fn compute(&self, input: &CrackingInput) -> CrackingOutput {
        let duration = (input.start_age_ma - input.end_age_ma).max(0.0);
        let fraction = (self.rate_per_ma * duration).clamp(0.0, 1.0);

        let mut composition = input.composition.clone();
        let mut cracked = 0.0;
        for id in ComponentId::ALL {
            if id.profile().volatile {
                continue;
            }
            let lost = composition.get(id) * fraction;
            composition.subtract_component(id, lost);
            cracked += lost;
        }

        let residue = cracked * self.residue_fraction;
        composition.add_component(ComponentId::C1, cracked - residue);

        CrackingOutput {
            composition,
            immobiles: input.immobiles + residue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_cracker_conserves_mass() {
        let charge = Composition::from_masses(&[(ComponentId::C15PlusSat, 100.0), (ComponentId::C2, 10.0)]);
        let cracker = LinearCracker::new(0.1, 0.2);
        let output = cracker.compute(&CrackingInput {
            composition: &charge,
            immobiles: 3.0,
            start_age_ma: 20.0,
            end_age_ma: 15.0,
            start_pressure_mpa: 20.0,
            end_pressure_mpa: 25.0,
            start_temperature_c: 120.0,
            end_temperature_c: 140.0,
        });

        assert_abs_diff_eq!(output.composition.get(ComponentId::C15PlusSat), 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(output.composition.get(ComponentId::C1), 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(output.immobiles, 13.0, epsilon = 1e-9);
        assert_abs_diff_eq!(
            output.composition.weight() + output.immobiles,
            charge.weight() + 3.0,
            epsilon = 1e-9
        );
    }
}
