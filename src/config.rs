// Run configuration for the migration engine

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::DIFFUSION_COMPONENT_SIZE;
use crate::constants::DEFAULT_UNDEFINED_VALUE;
use crate::error::{MigrationError, MigrationResult};

pub const ENV_MAX_FLUX_ERROR: &str = "Diffusion_MaxFluxError";
pub const ENV_MAX_TIME_STEP: &str = "Diffusion_MaxTimeStep";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub undefined_value: f64,
    /// Traps holding less than this (m3) are undersized.
    pub min_trap_capacity: f64,
    /// Ring radius of the sealing-avoidance search; 0 disables it.
    pub maximum_neighbour_offset: usize,
    pub min_fill_and_spill_iterations: usize,
    pub merge_undersized_traps: bool,
    /// Let sealing columns follow their adjacent column instead of holding
    /// their own charge.
    pub route_through_sealing_columns: bool,
    pub blocking: BlockingConfig,
    pub diffusion: DiffusionConfig,
    pub cracking_enabled: bool,
    pub diagnostics: DiagnosticsConfig,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            undefined_value: DEFAULT_UNDEFINED_VALUE,
            min_trap_capacity: 500.0,
            maximum_neighbour_offset: 100,
            min_fill_and_spill_iterations: 100,
            merge_undersized_traps: false,
            route_through_sealing_columns: false,
            blocking: BlockingConfig::default(),
            diffusion: DiffusionConfig::default(),
            cracking_enabled: false,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

/// Vertical migration is blocked where the overlying formation is tighter
/// than these thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    pub enabled: bool,
    /// mD
    pub permeability: f64,
    /// fraction
    pub porosity: f64,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        BlockingConfig {
            enabled: false,
            permeability: 1.0e-9,
            porosity: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    pub enabled: bool,
    /// Ma
    pub max_time_step: f64,
    /// Step-doubling error bound on the leaked mass, kg/m2 per Ma.
    pub max_flux_error: f64,
    /// NaCl weight fraction of the pore water.
    pub salinity: f64,
    /// J/mol
    pub activation_energy: f64,
    /// Pre-exponential diffusion coefficients (m2/s), C1..C5.
    pub diffusion_consts: [f64; DIFFUSION_COMPONENT_SIZE],
    /// Solubility relative to methane, C1..C5.
    pub concentration_consts: [f64; DIFFUSION_COMPONENT_SIZE],
    /// Overburden considered for the seal (m).
    pub maximum_seal_thickness: f64,
    /// Follow the penetration front; otherwise leak at the steady-state
    /// rate from the start.
    pub transient: bool,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        DiffusionConfig {
            enabled: false,
            max_time_step: 0.5,
            max_flux_error: 0.05,
            salinity: 0.1,
            activation_energy: 17_000.0,
            diffusion_consts: [5.0e-7, 3.8e-7, 3.0e-7, 2.5e-7, 2.0e-7],
            concentration_consts: [1.0, 0.6, 0.3, 0.1, 0.03],
            maximum_seal_thickness: 1000.0,
            transient: true,
        }
    }
}

/// Replaces process-wide debug switches; scoped to one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub debug: bool,
    /// Column whose routing and trap decisions are traced.
    pub debug_point: Option<(usize, usize)>,
}

impl DiagnosticsConfig {
    pub fn traces(&self, i: usize, j: usize) -> bool {
        self.debug || self.debug_point == Some((i, j))
    }
}

impl MigrationConfig {
    pub fn from_json_str(json: &str) -> MigrationResult<Self> {
        let config: MigrationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MigrationResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Applies `Diffusion_MaxFluxError` and `Diffusion_MaxTimeStep` when set.
    pub fn apply_env_overrides(&mut self) -> MigrationResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> MigrationResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_FLUX_ERROR) {
            self.diffusion.max_flux_error = parse_override(ENV_MAX_FLUX_ERROR, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_TIME_STEP) {
            self.diffusion.max_time_step = parse_override(ENV_MAX_TIME_STEP, &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> MigrationResult<()> {
        if self.min_trap_capacity < 0.0 {
            return Err(MigrationError::Config(format!(
                "min_trap_capacity must not be negative, got {}",
                self.min_trap_capacity
            )));
        }
        if self.diffusion.max_time_step <= 0.0 {
            return Err(MigrationError::Config(format!(
                "diffusion.max_time_step must be positive, got {}",
                self.diffusion.max_time_step
            )));
        }
        if self.diffusion.max_flux_error <= 0.0 {
            return Err(MigrationError::Config(format!(
                "diffusion.max_flux_error must be positive, got {}",
                self.diffusion.max_flux_error
            )));
        }
        if !(0.0..1.0).contains(&self.diffusion.salinity) {
            return Err(MigrationError::Config(format!(
                "diffusion.salinity must be a fraction below 1, got {}",
                self.diffusion.salinity
            )));
        }
        Ok(())
    }
}

fn parse_override(name: &str, value: &str) -> MigrationResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|e| MigrationError::Config(format!("{}={} is not a number: {}", name, value, e)))
}
