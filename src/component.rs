// src/component.rs - Hydrocarbon species and fluid phases

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const NUM_COMPONENTS: usize = 23;

/// Number of light species that take part in diffusive leakage (C1..C5).
pub const DIFFUSION_COMPONENT_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentId {
    C1 = 0,
    C2,
    C3,
    C4,
    C5,
    N2,
    Cox,
    H2S,
    C6To14Sat,
    C6To14Aro,
    C15PlusSat,
    C15PlusAro,
    Resin,
    Asphaltene,
    Lsc,
    C15PlusAt,
    C6To14Bt,
    C6To14Dbt,
    C6To14Bp,
    C15PlusAroS,
    C15PlusSatS,
    C6To14SatS,
    C6To14AroS,
}

impl ComponentId {
    pub const ALL: [ComponentId; NUM_COMPONENTS] = [
        ComponentId::C1,
        ComponentId::C2,
        ComponentId::C3,
        ComponentId::C4,
        ComponentId::C5,
        ComponentId::N2,
        ComponentId::Cox,
        ComponentId::H2S,
        ComponentId::C6To14Sat,
        ComponentId::C6To14Aro,
        ComponentId::C15PlusSat,
        ComponentId::C15PlusAro,
        ComponentId::Resin,
        ComponentId::Asphaltene,
        ComponentId::Lsc,
        ComponentId::C15PlusAt,
        ComponentId::C6To14Bt,
        ComponentId::C6To14Dbt,
        ComponentId::C6To14Bp,
        ComponentId::C15PlusAroS,
        ComponentId::C15PlusSatS,
        ComponentId::C6To14SatS,
        ComponentId::C6To14AroS,
    ];

    pub const DIFFUSING: [ComponentId; DIFFUSION_COMPONENT_SIZE] = [
        ComponentId::C1,
        ComponentId::C2,
        ComponentId::C3,
        ComponentId::C4,
        ComponentId::C5,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentId::C1 => "C1",
            ComponentId::C2 => "C2",
            ComponentId::C3 => "C3",
            ComponentId::C4 => "C4",
            ComponentId::C5 => "C5",
            ComponentId::N2 => "N2",
            ComponentId::Cox => "COx",
            ComponentId::H2S => "H2S",
            ComponentId::C6To14Sat => "C6-14Sat",
            ComponentId::C6To14Aro => "C6-14Aro",
            ComponentId::C15PlusSat => "C15+Sat",
            ComponentId::C15PlusAro => "C15+Aro",
            ComponentId::Resin => "resins",
            ComponentId::Asphaltene => "asphaltenes",
            ComponentId::Lsc => "LSC",
            ComponentId::C15PlusAt => "C15+AT",
            ComponentId::C6To14Bt => "C6-14BT",
            ComponentId::C6To14Dbt => "C6-14DBT",
            ComponentId::C6To14Bp => "C6-14BP",
            ComponentId::C15PlusAroS => "C15+AroS",
            ComponentId::C15PlusSatS => "C15+SatS",
            ComponentId::C6To14SatS => "C6-14SatS",
            ComponentId::C6To14AroS => "C6-14AroS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }

    pub fn profile(&self) -> &'static ComponentProfile {
        // every id has an entry, see COMPONENT_PROFILES
        &COMPONENT_PROFILES[self]
    }
}

/// Fluid phases. GAS is the lighter, first phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseId {
    Gas = 0,
    Oil = 1,
}

pub const NUM_PHASES: usize = 2;

impl PhaseId {
    pub const FIRST: PhaseId = PhaseId::Gas;
    pub const ALL: [PhaseId; NUM_PHASES] = [PhaseId::Gas, PhaseId::Oil];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// The next lighter phase, if any.
    pub fn lighter(&self) -> Option<PhaseId> {
        match self {
            PhaseId::Gas => None,
            PhaseId::Oil => Some(PhaseId::Gas),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::Gas => "Vapour",
            PhaseId::Oil => "Liquid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentProfile {
    pub id: ComponentId,
    pub molar_mass_kg_mol: f64,
    /// Standard-condition liquid density, used for mixing-rule densities.
    pub liquid_density_kg_m3: f64,
    /// Reports to the vapour phase in the volatility-split flash.
    pub volatile: bool,
}

pub static COMPONENT_PROFILES: Lazy<HashMap<ComponentId, ComponentProfile>> = Lazy::new(|| {
    use ComponentId::*;
    let table: [(ComponentId, f64, f64, bool); NUM_COMPONENTS] = [
        (C1, 0.016043, 300.0, true),
        (C2, 0.030070, 356.0, true),
        (C3, 0.044097, 507.0, true),
        (C4, 0.058124, 573.0, true),
        (C5, 0.072151, 626.0, true),
        (N2, 0.028014, 808.0, true),
        (Cox, 0.044010, 1101.0, true),
        (H2S, 0.034081, 993.0, true),
        (C6To14Sat, 0.142000, 740.0, false),
        (C6To14Aro, 0.128000, 860.0, false),
        (C15PlusSat, 0.290000, 820.0, false),
        (C15PlusAro, 0.320000, 950.0, false),
        (Resin, 0.650000, 1030.0, false),
        (Asphaltene, 0.800000, 1100.0, false),
        (Lsc, 0.300000, 980.0, false),
        (C15PlusAt, 0.350000, 1000.0, false),
        (C6To14Bt, 0.160000, 1050.0, false),
        (C6To14Dbt, 0.184000, 1250.0, false),
        (C6To14Bp, 0.154000, 990.0, false),
        (C15PlusAroS, 0.330000, 990.0, false),
        (C15PlusSatS, 0.300000, 860.0, false),
        (C6To14SatS, 0.150000, 800.0, false),
        (C6To14AroS, 0.135000, 900.0, false),
    ];

    let mut m = HashMap::new();
    for (id, molar_mass_kg_mol, liquid_density_kg_m3, volatile) in table {
        m.insert(
            id,
            ComponentProfile {
                id,
                molar_mass_kg_mol,
                liquid_density_kg_m3,
                volatile,
            },
        );
    }
    m
});
