// Engine constants for reservoir migration and trapping

/// Columns thinner than this (m) leak upward instead of routing laterally.
pub const MINIMUM_THICKNESS: f64 = 1.0;

/// Extreme depth (~200 km) used as "no limit" for spill and gradient searches.
pub const SEAL_DEPTH: f64 = 2.0e5;
pub const WASTE_DEPTH: f64 = 2.0e5;

/// Migrated masses below this (kg) are not traced as flux.
pub const MINIMUM_MASS: f64 = 1.0;

/// Fill depth sentinel written when fill depths are reset.
pub const RESET_FILL_DEPTH: f64 = -1.0e8;

pub const NO_TRAP_ID: i32 = -1;
pub const UNKNOWN_TRAP_ID: i32 = -1;

/// Default sentinel for undefined map values.
pub const DEFAULT_UNDEFINED_VALUE: f64 = 99999.0;

pub const NUM_NEIGHBOURS: usize = 8;

/// Lateral neighbour offsets (di, dj). Entries 0, 2, 5 and 7 are diagonal,
/// 1, 3, 4 and 6 orthogonal. The order is part of the routing tie-break.
pub const NEIGHBOUR_OFFSETS: [(isize, isize); NUM_NEIGHBOURS] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

pub const DIAGONAL_NEIGHBOURS: [usize; 4] = [0, 2, 5, 7];

// unit conversions
pub const C2K: f64 = 273.15;
pub const SECONDS_PER_MA: f64 = 3.15576e13;
pub const GAS_CONSTANT_J_PER_MOL_K: f64 = 8.314462618;
pub const MPA_TO_BAR: f64 = 10.0;

/// Immobile species (pyrobitumen, precoke) are stored at this density (kg/m3).
pub const IMMOBILES_DENSITY: f64 = 1200.0;

/// Relative PVT imbalance above which a warning is logged.
pub const PVT_BALANCE_TOLERANCE: f64 = 0.01;

/// Cracking deviation (%) below which a warning is logged.
pub const CRACKING_DEVIATION_WARNING_PERCENT: f64 = -0.5;

/// Stored-to-available ratio above which a storage clamp is worth reporting.
pub const STORAGE_FRACTION_WARNING: f64 = 1.001;
pub const STORAGE_WARNING_MINIMUM_MASS: f64 = 0.1;

/// Negative component masses larger than this (kg) are reported when floored.
pub const NEGATIVE_MASS_WARNING: f64 = 1.0e-6;

/// Reference water viscosity (Pa s) for Stokes-Einstein scaling of diffusivity.
pub const REFERENCE_WATER_VISCOSITY: f64 = 1.0e-3;

/// Methane solubility in pure water at 25 C, Henry's law constant (mol / (kg bar)).
pub const METHANE_HENRY_CONSTANT_298: f64 = 1.4e-3;
/// van 't Hoff temperature coefficient for methane (K).
pub const METHANE_HENRY_TEMPERATURE_COEFFICIENT: f64 = 1600.0;
/// Setschenow salting-out coefficient for methane in NaCl brine (kg/mol).
pub const METHANE_SETSCHENOW_COEFFICIENT: f64 = 0.127;
pub const METHANE_MOLAR_MASS: f64 = 0.016043;
pub const NACL_MOLAR_MASS: f64 = 0.05844;
