// Diffusive leakage of dissolved gas through the overburden of a trap

use crate::column::ColumnId;
use crate::constants::{
    C2K, GAS_CONSTANT_J_PER_MOL_K, METHANE_HENRY_CONSTANT_298, METHANE_HENRY_TEMPERATURE_COEFFICIENT,
    METHANE_MOLAR_MASS, METHANE_SETSCHENOW_COEFFICIENT, MPA_TO_BAR, NACL_MOLAR_MASS, REFERENCE_WATER_VISCOSITY,
    SECONDS_PER_MA,
};

/// sqrt(2 / pi): mass per unit area that enters a semi-infinite medium
/// while the front `sqrt(2 D t)` advances, per unit concentration.
const TRANSIENT_STORAGE_FACTOR: f64 = 0.797_884_560_802_865_4;

/// Smallest step (Ma) the step-doubling control will try.
const MIN_TIME_STEP: f64 = 1.0e-7;

/// Arrhenius diffusion coefficient of one species in pore water.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffusionCoefficient {
    /// m2/s
    pub prefactor: f64,
    /// J/mol
    pub activation_energy: f64,
}

impl DiffusionCoefficient {
    pub fn new(prefactor: f64, activation_energy: f64) -> Self {
        DiffusionCoefficient {
            prefactor,
            activation_energy,
        }
    }

    /// Effective coefficient (m2/s) in rock of `porosity` at
    /// `temperature_c`, scaled by the pore water viscosity (Pa s) relative
    /// to the reference water viscosity.
    pub fn at(&self, temperature_c: f64, porosity: f64, viscosity: f64) -> f64 {
        let temperature_k = (temperature_c + C2K).max(1.0);
        let arrhenius = (-self.activation_energy / (GAS_CONSTANT_J_PER_MOL_K * temperature_k)).exp();
        let viscosity_ratio = if viscosity > 0.0 {
            REFERENCE_WATER_VISCOSITY / viscosity
        } else {
            1.0
        };
        self.prefactor * arrhenius * porosity.max(0.0).powi(2) * viscosity_ratio
    }
}

/// One overburden layer above a trap crest, listed from the seal base up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverburdenProp {
    /// m
    pub thickness: f64,
    pub porosity: f64,
    /// C
    pub temperature: f64,
    /// Pore water viscosity (Pa s).
    pub viscosity: f64,
}

impl OverburdenProp {
    pub fn new(thickness: f64, porosity: f64, temperature: f64, viscosity: f64) -> Self {
        OverburdenProp {
            thickness,
            porosity,
            temperature,
            viscosity,
        }
    }
}

/// The overburden a trap leaks through.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionOverburden {
    pub layers: Vec<OverburdenProp>,
    /// kg/m3
    pub seal_fluid_density: f64,
}

impl DiffusionOverburden {
    pub fn new(layers: Vec<OverburdenProp>, seal_fluid_density: f64) -> Self {
        DiffusionOverburden {
            layers,
            seal_fluid_density,
        }
    }

    pub fn total_thickness(&self) -> f64 {
        self.layers.iter().map(|layer| layer.thickness.max(0.0)).sum()
    }

    /// The lowest `max_thickness` metres of the stack; the last layer kept
    /// is cut to fit.
    pub fn limited(&self, max_thickness: f64) -> DiffusionOverburden {
        let mut layers = Vec::with_capacity(self.layers.len());
        let mut remaining = max_thickness.max(0.0);
        for layer in &self.layers {
            if remaining <= 0.0 {
                break;
            }
            let thickness = layer.thickness.max(0.0).min(remaining);
            if thickness > 0.0 {
                layers.push(OverburdenProp { thickness, ..*layer });
            }
            remaining -= thickness;
        }
        DiffusionOverburden {
            layers,
            seal_fluid_density: self.seal_fluid_density,
        }
    }
}

/// Supplies the overburden above a crest column.
pub trait OverburdenProvider {
    /// `None` where the crest has no seal above it; such traps do not
    /// leak by diffusion.
    fn overburden(&self, reservoir: &str, crest: ColumnId, age_ma: f64) -> Option<DiffusionOverburden>;
}

/// The same overburden above every crest.
#[derive(Debug, Clone)]
pub struct UniformOverburden {
    overburden: DiffusionOverburden,
}

impl UniformOverburden {
    pub fn new(overburden: DiffusionOverburden) -> Self {
        UniformOverburden { overburden }
    }
}

impl OverburdenProvider for UniformOverburden {
    fn overburden(&self, _reservoir: &str, _crest: ColumnId, _age_ma: f64) -> Option<DiffusionOverburden> {
        if self.overburden.layers.is_empty() {
            None
        } else {
            Some(self.overburden.clone())
        }
    }
}

/// Methane solubility in brine (kg CH4 per kg H2O). Henry's law with a
/// van 't Hoff temperature correction, salted out with the Setschenow
/// relation. `salinity` is the NaCl weight fraction.
pub fn methane_solubility(salinity: f64, temperature_c: f64, pressure_mpa: f64) -> f64 {
    if pressure_mpa <= 0.0 {
        return 0.0;
    }
    let temperature_k = (temperature_c + C2K).max(1.0);
    let henry = METHANE_HENRY_CONSTANT_298
        * (METHANE_HENRY_TEMPERATURE_COEFFICIENT * (1.0 / temperature_k - 1.0 / 298.15)).exp();
    let molality = henry * pressure_mpa * MPA_TO_BAR;

    let salinity = salinity.clamp(0.0, 0.99);
    let salt_molality = salinity / (NACL_MOLAR_MASS * (1.0 - salinity));
    let salted = molality * 10f64.powf(-METHANE_SETSCHENOW_COEFFICIENT * salt_molality);

    salted * METHANE_MOLAR_MASS
}

/// Series coefficient of the layers below a depth, reusable while the
/// front stays inside the same layer.
#[derive(Debug, Clone, Copy)]
struct CachedCoefficient {
    layer_top: f64,
    layer_base: f64,
    /// Sum of thickness / D over the layers below `layer_base`.
    resistance_below: f64,
    layer_coefficient: f64,
}

/// Transient diffusion state of one species above one trap crest.
///
/// The front advances as `delta^2 += 2 D dt` until it reaches the top of
/// the seal; after that the leak runs at the steady rate `C D / L`.
#[derive(Debug, Clone)]
pub struct DiffusionLeak {
    layers: Vec<OverburdenProp>,
    layer_coefficients: Vec<f64>,
    seal_fluid_density: f64,
    seal_thickness: f64,
    penetration_distance: f64,
    max_time_step: f64,
    max_flux_error: f64,
    cached: Option<CachedCoefficient>,
}

impl DiffusionLeak {
    pub fn new(
        overburden: &DiffusionOverburden,
        penetration_distance: f64,
        max_seal_thickness: f64,
        coefficient: DiffusionCoefficient,
        max_time_step: f64,
        max_flux_error: f64,
    ) -> Self {
        let limited = overburden.limited(max_seal_thickness);
        let seal_thickness = limited.total_thickness();
        let layer_coefficients = limited
            .layers
            .iter()
            .map(|layer| coefficient.at(layer.temperature, layer.porosity, layer.viscosity))
            .collect();

        let penetration = penetration_distance.max(0.0);
        if penetration > seal_thickness {
            log::debug!(
                "limiting penetration distance {:.3} m to the seal thickness {:.3} m",
                penetration,
                seal_thickness
            );
        }

        DiffusionLeak {
            layers: limited.layers,
            layer_coefficients,
            seal_fluid_density: limited.seal_fluid_density,
            seal_thickness,
            penetration_distance: penetration.min(seal_thickness),
            max_time_step: max_time_step.max(MIN_TIME_STEP),
            max_flux_error,
            cached: None,
        }
    }

    pub fn penetration_distance(&self) -> f64 {
        self.penetration_distance
    }

    pub fn seal_thickness(&self) -> f64 {
        self.seal_thickness
    }

    pub fn seal_fluid_density(&self) -> f64 {
        self.seal_fluid_density
    }

    fn locate(&self, depth: f64) -> CachedCoefficient {
        let mut layer_top = 0.0;
        let mut resistance_below = 0.0;
        let last = self.layers.len().saturating_sub(1);
        for (index, layer) in self.layers.iter().enumerate() {
            let coefficient = self.layer_coefficients[index];
            let base = layer_top + layer.thickness;
            if depth <= base || index == last {
                return CachedCoefficient {
                    layer_top,
                    layer_base: base,
                    resistance_below,
                    layer_coefficient: coefficient,
                };
            }
            resistance_below += if coefficient > 0.0 { layer.thickness / coefficient } else { f64::INFINITY };
            layer_top = base;
        }
        CachedCoefficient {
            layer_top: 0.0,
            layer_base: 0.0,
            resistance_below: 0.0,
            layer_coefficient: 0.0,
        }
    }

    /// Series coefficient (m2/s) of the stack between the crest and
    /// `depth` metres above it. The first layer's coefficient at zero.
    pub fn effective_coefficient(&mut self, depth: f64) -> f64 {
        let depth = depth.clamp(0.0, self.seal_thickness);
        let cached = match self.cached {
            Some(cached) if depth >= cached.layer_top && depth <= cached.layer_base => cached,
            _ => {
                let located = self.locate(depth);
                self.cached = Some(located);
                located
            }
        };

        if cached.layer_coefficient <= 0.0 {
            return 0.0;
        }
        if depth <= 0.0 {
            return cached.layer_coefficient;
        }
        let resistance = cached.resistance_below + (depth - cached.layer_top) / cached.layer_coefficient;
        if resistance.is_finite() && resistance > 0.0 { depth / resistance } else { 0.0 }
    }

    /// Mass per unit area leaked over `dt_ma` starting from `front`, and
    /// the front after it.
    fn step(&mut self, front: f64, dt_ma: f64, concentration: f64) -> (f64, f64) {
        let dt = dt_ma * SECONDS_PER_MA;
        let seal = self.seal_thickness;

        if front >= seal {
            let steady = self.effective_coefficient(seal);
            return (concentration * steady / seal * dt, seal);
        }

        let coefficient = self.effective_coefficient(front);
        if coefficient <= 0.0 {
            return (0.0, front);
        }
        let advanced = (front * front + 2.0 * coefficient * dt).sqrt();
        if advanced <= seal {
            return (TRANSIENT_STORAGE_FACTOR * concentration * (advanced - front), advanced);
        }

        let time_to_top = (seal * seal - front * front) / (2.0 * coefficient);
        let steady = self.effective_coefficient(seal);
        let transient = TRANSIENT_STORAGE_FACTOR * concentration * (seal - front);
        (transient + concentration * steady / seal * (dt - time_to_top).max(0.0), seal)
    }

    /// Leaked mass (kg) over the interval from `start_ma` to `end_ma` (ages,
    /// start older) through `surface` m2 at pore water `concentration`
    /// (kg/m3). Advances the penetration distance.
    pub fn compute(&mut self, start_ma: f64, end_ma: f64, concentration: f64, surface: f64) -> f64 {
        if self.seal_thickness <= 0.0 || concentration <= 0.0 || surface <= 0.0 {
            return 0.0;
        }

        let mut remaining = start_ma - end_ma;
        let mut dt = self.max_time_step.min(remaining);
        let mut front = self.penetration_distance;
        let mut leaked = 0.0;

        while remaining > 0.0 {
            dt = dt.min(remaining);

            let (single, _) = self.step(front, dt, concentration);
            let (first_half, middle) = self.step(front, dt * 0.5, concentration);
            let (second_half, end) = self.step(middle, dt * 0.5, concentration);
            let doubled = first_half + second_half;

            let error = (single - doubled).abs() / dt;
            if error > self.max_flux_error && dt > MIN_TIME_STEP {
                dt *= 0.5;
                continue;
            }

            leaked += doubled;
            front = end;
            remaining -= dt;

            if error < 0.25 * self.max_flux_error {
                dt = (dt * 2.0).min(self.max_time_step);
            }
        }

        self.penetration_distance = front;
        leaked * surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use more_asserts::{assert_gt, assert_lt};

    fn coefficient() -> DiffusionCoefficient {
        DiffusionCoefficient::new(5.0e-7, 17_000.0)
    }

    fn uniform(thickness: f64) -> DiffusionOverburden {
        DiffusionOverburden::new(
            vec![OverburdenProp::new(thickness, 0.1, 80.0, REFERENCE_WATER_VISCOSITY)],
            1050.0,
        )
    }

    #[test]
    fn test_coefficient_grows_with_temperature() {
        let c = coefficient();
        let cold = c.at(20.0, 0.1, REFERENCE_WATER_VISCOSITY);
        let hot = c.at(120.0, 0.1, REFERENCE_WATER_VISCOSITY);
        assert_gt!(hot, cold);
        // more viscous water slows diffusion down
        assert_lt!(c.at(120.0, 0.1, 2.0e-3), hot);
        assert_eq!(c.at(120.0, 0.0, REFERENCE_WATER_VISCOSITY), 0.0);
    }

    #[test]
    fn test_series_coefficient_of_two_layers() {
        let overburden = DiffusionOverburden::new(
            vec![
                OverburdenProp::new(10.0, 0.1, 80.0, REFERENCE_WATER_VISCOSITY),
                OverburdenProp::new(10.0, 0.2, 80.0, REFERENCE_WATER_VISCOSITY),
            ],
            1000.0,
        );
        let mut leak = DiffusionLeak::new(&overburden, 0.0, 1000.0, coefficient(), 0.5, 0.05);
        let d1 = coefficient().at(80.0, 0.1, REFERENCE_WATER_VISCOSITY);
        let d2 = coefficient().at(80.0, 0.2, REFERENCE_WATER_VISCOSITY);

        assert_relative_eq!(leak.effective_coefficient(5.0), d1, max_relative = 1e-12);
        assert_relative_eq!(leak.effective_coefficient(20.0), 2.0 / (1.0 / d1 + 1.0 / d2), max_relative = 1e-12);
        // back down into the first layer after the cache moved up
        assert_relative_eq!(leak.effective_coefficient(0.0), d1, max_relative = 1e-12);
    }

    #[test]
    fn test_transient_leak_matches_semi_infinite_solution() {
        let overburden = uniform(1.0e4);
        let mut leak = DiffusionLeak::new(&overburden, 0.0, 1.0e4, coefficient(), 0.5, 0.05);
        let d = coefficient().at(80.0, 0.1, REFERENCE_WATER_VISCOSITY);

        let leaked = leak.compute(10.0, 8.0, 3.0, 100.0);
        let t = 2.0 * SECONDS_PER_MA;
        let front = (2.0 * d * t).sqrt();

        assert_relative_eq!(leak.penetration_distance(), front, max_relative = 1e-9);
        assert_relative_eq!(leaked, 100.0 * 2.0 * 3.0 * (d * t / std::f64::consts::PI).sqrt(), max_relative = 1e-9);
    }

    #[test]
    fn test_thin_seal_reaches_steady_state() {
        let overburden = uniform(1.0);
        let mut leak = DiffusionLeak::new(&overburden, 1.0, 1000.0, coefficient(), 0.5, 0.05);
        let d = coefficient().at(80.0, 0.1, REFERENCE_WATER_VISCOSITY);

        let leaked = leak.compute(5.0, 4.0, 2.0, 1.0);
        assert_relative_eq!(leaked, 2.0 * d / 1.0 * SECONDS_PER_MA, max_relative = 1e-9);
        assert_abs_diff_eq!(leak.penetration_distance(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_penetration_is_limited_to_the_seal() {
        let overburden = uniform(300.0);
        let leak = DiffusionLeak::new(&overburden, 800.0, 200.0, coefficient(), 0.5, 0.05);
        assert_abs_diff_eq!(leak.seal_thickness(), 200.0, epsilon = 1e-12);
        assert_abs_diff_eq!(leak.penetration_distance(), 200.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_seal_no_leak() {
        let overburden = DiffusionOverburden::new(Vec::new(), 1000.0);
        let mut leak = DiffusionLeak::new(&overburden, 0.0, 1000.0, coefficient(), 0.5, 0.05);
        assert_eq!(leak.compute(10.0, 0.0, 5.0, 1.0e6), 0.0);
        assert!(UniformOverburden::new(overburden).overburden("R", ColumnId::new(0, 0), 0.0).is_none());
    }

    #[test]
    fn test_methane_solubility() {
        let fresh = methane_solubility(0.0, 80.0, 30.0);
        let brine = methane_solubility(0.1, 80.0, 30.0);
        assert_gt!(fresh, 1.0e-3);
        assert_lt!(fresh, 1.0e-2);
        assert_lt!(brine, fresh);
        assert_gt!(methane_solubility(0.0, 80.0, 40.0), fresh);
        assert_eq!(methane_solubility(0.0, 80.0, 0.0), 0.0);
    }
}
