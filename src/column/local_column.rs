use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::column::{ColumnId, FaultStatus};
use crate::component::{DIFFUSION_COMPONENT_SIZE, NUM_PHASES, PhaseId};
use crate::composition::{Composition, state};
use crate::constants::{
    IMMOBILES_DENSITY, MINIMUM_THICKNESS, NO_TRAP_ID, RESET_FILL_DEPTH, STORAGE_FRACTION_WARNING,
    STORAGE_WARNING_MINIMUM_MASS,
};
use crate::math_utils::{clamp, lerp};
use crate::request::ValueSpec;
use crate::trap::TrapId;

/// Whether the column has held hydrocarbons at biodegradation-prone
/// temperatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PasteurizationStatus {
    NotPasteurized,
    #[default]
    Neutral,
    Pasteurized,
}

impl PasteurizationStatus {
    pub fn code(&self) -> i32 {
        match self {
            PasteurizationStatus::NotPasteurized => -1,
            PasteurizationStatus::Neutral => 0,
            PasteurizationStatus::Pasteurized => 1,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code.signum() {
            -1 => PasteurizationStatus::NotPasteurized,
            1 => PasteurizationStatus::Pasteurized,
            _ => PasteurizationStatus::Neutral,
        }
    }
}

/// Deferred contributions to a column. Each is applied in canonical
/// position order so the sum does not depend on arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Migrated charge arriving at its target.
    Target,
    Waste,
    Spill,
    /// Charge of a trap merging into this crest. Not kept per phase.
    Merge,
}

impl BufferKind {
    pub fn value_spec(&self) -> ValueSpec {
        match self {
            BufferKind::Target => ValueSpec::IncreaseBufferTarget,
            BufferKind::Waste => ValueSpec::IncreaseBufferWaste,
            BufferKind::Spill => ValueSpec::IncreaseBufferSpill,
            BufferKind::Merge => ValueSpec::IncreaseBufferMerge,
        }
    }

    pub fn from_value_spec(spec: ValueSpec) -> Option<Self> {
        match spec {
            ValueSpec::IncreaseBufferTarget => Some(BufferKind::Target),
            ValueSpec::IncreaseBufferWaste => Some(BufferKind::Waste),
            ValueSpec::IncreaseBufferSpill => Some(BufferKind::Spill),
            ValueSpec::IncreaseBufferMerge => Some(BufferKind::Merge),
            _ => None,
        }
    }

    /// Provenance bit OR'd in when the buffer is applied.
    pub fn state_bit(&self) -> u32 {
        match self {
            BufferKind::Target => state::INITIAL,
            BufferKind::Waste => state::WASTED,
            BufferKind::Spill => state::SPILLED_IN,
            BufferKind::Merge => state::MERGED,
        }
    }
}

type Buffer = Vec<(usize, Composition)>;

#[derive(Debug, Clone, Default)]
struct PreviousProperties {
    top_depth: f64,
    pressure: f64,
    temperature: f64,
    global_trap_id: i32,
}

/// Authoritative state of a column owned by this partition.
#[derive(Debug, Clone)]
pub struct LocalColumn {
    id: ColumnId,
    undefined_value: f64,
    surface_area: f64,

    top_depth: f64,
    bottom_depth: f64,
    net_to_gross: f64,
    porosity: f64,
    permeability: f64,
    temperature: f64,
    bottom_temperature: f64,
    pressure: f64,
    fault_status: FaultStatus,
    previous: PreviousProperties,

    sealing: [bool; NUM_PHASES],
    wasting: [bool; NUM_PHASES],
    adjacent: [Option<ColumnId>; NUM_PHASES],
    adjacent_set: [bool; NUM_PHASES],
    target: [Option<ColumnId>; NUM_PHASES],

    trap: Option<TrapId>,
    global_trap_id: i32,
    drainage_area_id: i32,

    composition: Composition,
    composition_state: u32,
    to_be_migrated: Composition,
    immobiles: f64,

    migrated: [f64; NUM_PHASES],
    flux: f64,
    fill_depth: [f64; NUM_PHASES],
    charge_density: [f64; NUM_PHASES],

    penetration_distances: [f64; DIFFUSION_COMPONENT_SIZE],
    diffusion_start_time: f64,
    pasteurization: PasteurizationStatus,

    target_buffer: [Buffer; NUM_PHASES],
    waste_buffer: [Buffer; NUM_PHASES],
    spill_buffer: [Buffer; NUM_PHASES],
    merge_buffer: Buffer,

    proxies: BTreeSet<usize>,
    proxies_stale: bool,
}

impl LocalColumn {
    pub fn new(id: ColumnId, undefined_value: f64, surface_area: f64) -> Self {
        let mut column = LocalColumn {
            id,
            undefined_value,
            surface_area,
            top_depth: undefined_value,
            bottom_depth: undefined_value,
            net_to_gross: 1.0,
            porosity: undefined_value,
            permeability: undefined_value,
            temperature: undefined_value,
            bottom_temperature: undefined_value,
            pressure: undefined_value,
            fault_status: FaultStatus::NoFault,
            previous: PreviousProperties::default(),
            sealing: [false; NUM_PHASES],
            wasting: [false; NUM_PHASES],
            adjacent: [None; NUM_PHASES],
            adjacent_set: [false; NUM_PHASES],
            target: [None; NUM_PHASES],
            trap: None,
            global_trap_id: NO_TRAP_ID,
            drainage_area_id: NO_TRAP_ID,
            composition: Composition::new(),
            composition_state: 0,
            to_be_migrated: Composition::new(),
            immobiles: 0.0,
            migrated: [0.0; NUM_PHASES],
            flux: 0.0,
            fill_depth: [RESET_FILL_DEPTH; NUM_PHASES],
            charge_density: [0.0; NUM_PHASES],
            penetration_distances: [0.0; DIFFUSION_COMPONENT_SIZE],
            diffusion_start_time: -1.0,
            pasteurization: PasteurizationStatus::Neutral,
            target_buffer: Default::default(),
            waste_buffer: Default::default(),
            spill_buffer: Default::default(),
            merge_buffer: Vec::new(),
            proxies: BTreeSet::new(),
            proxies_stale: false,
        };
        column.clear_previous_properties();
        column
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn undefined_value(&self) -> f64 {
        self.undefined_value
    }

    pub fn is_valid(&self) -> bool {
        self.top_depth != self.undefined_value
    }

    fn defined_or_undefined(&self, value: f64) -> f64 {
        if self.is_valid() { value } else { self.undefined_value }
    }

    // ---- geometry and rock properties

    pub fn surface_area(&self) -> f64 {
        self.surface_area
    }

    pub fn top_depth(&self) -> f64 {
        self.top_depth
    }

    /// A changed depth drops the fill depths and leaves the registered
    /// proxies stale.
    pub fn set_top_depth(&mut self, depth: f64) {
        if depth != self.top_depth {
            self.top_depth = depth;
            self.depth_changed();
        }
    }

    pub fn bottom_depth(&self) -> f64 {
        self.bottom_depth
    }

    pub fn set_bottom_depth(&mut self, depth: f64) {
        if depth != self.bottom_depth {
            self.bottom_depth = depth;
            self.depth_changed();
        }
    }

    fn depth_changed(&mut self) {
        self.reset_fill_depths();
        self.proxies_stale |= self.has_proxies();
    }

    pub fn thickness(&self) -> f64 {
        self.defined_or_undefined(self.bottom_depth - self.top_depth)
    }

    pub fn is_thin(&self) -> bool {
        self.thickness() < MINIMUM_THICKNESS
    }

    pub fn net_to_gross(&self) -> f64 {
        self.defined_or_undefined(self.net_to_gross)
    }

    pub fn set_net_to_gross(&mut self, net_to_gross: f64) {
        self.net_to_gross = net_to_gross;
    }

    /// Fraction.
    pub fn porosity(&self) -> f64 {
        self.defined_or_undefined(self.porosity)
    }

    pub fn porosity_percentage(&self) -> f64 {
        self.defined_or_undefined(self.porosity * 100.0)
    }

    pub fn set_porosity(&mut self, porosity: f64) {
        self.porosity = porosity;
    }

    pub fn permeability(&self) -> f64 {
        self.defined_or_undefined(self.permeability)
    }

    pub fn set_permeability(&mut self, permeability: f64) {
        self.permeability = permeability;
    }

    /// Temperature (C) at the top of the column.
    pub fn temperature(&self) -> f64 {
        self.defined_or_undefined(self.temperature)
    }

    pub fn set_temperature(&mut self, top: f64, bottom: f64) {
        self.temperature = top;
        self.bottom_temperature = bottom;
    }

    pub fn pressure(&self) -> f64 {
        self.defined_or_undefined(self.pressure)
    }

    pub fn set_pressure(&mut self, pressure: f64) {
        self.pressure = pressure;
    }

    pub fn fault_status(&self) -> FaultStatus {
        self.fault_status
    }

    pub fn set_fault_status(&mut self, status: FaultStatus) {
        self.fault_status = status;
    }

    /// Temperature at a hydrocarbon-water contact depth, interpolated
    /// between the top and bottom temperatures and clamped to the column.
    pub fn owc_temperature(&self, contact_depth: f64) -> f64 {
        if !self.is_valid() {
            return self.undefined_value;
        }
        if self.bottom_temperature == self.undefined_value || self.bottom_depth <= self.top_depth {
            return self.temperature;
        }
        let fraction = clamp(
            (contact_depth - self.top_depth) / (self.bottom_depth - self.top_depth),
            0.0,
            1.0,
        );
        lerp(self.temperature, self.bottom_temperature, fraction)
    }

    pub fn previous_top_depth(&self) -> f64 {
        self.previous.top_depth
    }

    pub fn previous_pressure(&self) -> f64 {
        self.previous.pressure
    }

    pub fn previous_temperature(&self) -> f64 {
        self.previous.temperature
    }

    pub fn previous_global_trap_id(&self) -> i32 {
        self.previous.global_trap_id
    }

    pub fn retain_previous_properties(&mut self) {
        self.previous = PreviousProperties {
            top_depth: self.top_depth,
            pressure: self.pressure,
            temperature: self.temperature,
            global_trap_id: self.global_trap_id,
        };
    }

    pub fn clear_previous_properties(&mut self) {
        self.previous = PreviousProperties {
            top_depth: self.undefined_value,
            pressure: self.undefined_value,
            temperature: self.undefined_value,
            global_trap_id: NO_TRAP_ID,
        };
    }

    /// Resets everything derived for one snapshot. Charge to be migrated,
    /// immobiles and registered proxies survive.
    pub fn clear_properties(&mut self) {
        self.top_depth = self.undefined_value;
        self.bottom_depth = self.undefined_value;
        self.porosity = self.undefined_value;
        self.permeability = self.undefined_value;
        self.temperature = self.undefined_value;
        self.bottom_temperature = self.undefined_value;
        self.pressure = self.undefined_value;

        self.trap = None;
        self.flux = 0.0;
        self.global_trap_id = NO_TRAP_ID;
        self.drainage_area_id = NO_TRAP_ID;
        self.fault_status = FaultStatus::NoFault;

        self.reset_fill_depths();
        self.charge_density = [0.0; NUM_PHASES];
        self.reset_composition();

        self.sealing = [false; NUM_PHASES];
        self.wasting = [false; NUM_PHASES];
        self.adjacent = [None; NUM_PHASES];
        self.adjacent_set = [false; NUM_PHASES];
        self.target = [None; NUM_PHASES];
        self.migrated = [0.0; NUM_PHASES];
    }

    /// Geometric pore volume between two depths, clipped to the column and
    /// reduced by the immobile residue in the overlapping fraction.
    pub fn volume_between_depths(&self, upper_depth: f64, lower_depth: f64) -> f64 {
        let mut volume = 0.0;

        if self.top_depth < lower_depth {
            let top_of_fill = upper_depth.max(self.top_depth);
            let bottom_of_fill = lower_depth.min(self.bottom_depth);

            if bottom_of_fill > top_of_fill {
                volume = self.surface_area * self.net_to_gross * self.porosity * (bottom_of_fill - top_of_fill);

                let height = self.bottom_depth - self.top_depth;
                if height > 0.0 {
                    volume -= self.immobiles_volume() * (bottom_of_fill - top_of_fill) / height;
                }
            }
            if volume < 0.0 {
                volume = 0.0;
            }
        }

        volume
    }

    /// Pore volume above `spill_depth`.
    pub fn capacity(&self, spill_depth: f64) -> f64 {
        if !self.is_valid() {
            return self.undefined_value;
        }
        self.volume_between_depths(self.top_depth.min(spill_depth), self.bottom_depth.min(spill_depth))
    }

    // ---- flow state

    pub fn is_sealing(&self, phase: PhaseId) -> bool {
        self.sealing[phase.index()]
    }

    pub fn is_wasting(&self, phase: PhaseId) -> bool {
        self.wasting[phase.index()]
    }

    pub fn is_sealing_any(&self) -> bool {
        self.sealing.iter().any(|&s| s)
    }

    pub fn set_sealing(&mut self, phase: PhaseId) {
        self.sealing[phase.index()] = true;
        self.wasting[phase.index()] = false;
    }

    pub fn set_wasting(&mut self, phase: PhaseId) {
        self.wasting[phase.index()] = true;
        self.sealing[phase.index()] = false;
    }

    pub fn adjacent_column(&self, phase: PhaseId) -> Option<ColumnId> {
        self.adjacent[phase.index()]
    }

    pub fn is_adjacent_set(&self, phase: PhaseId) -> bool {
        self.adjacent_set[phase.index()]
    }

    pub fn set_adjacent_column(&mut self, phase: PhaseId, column: Option<ColumnId>) {
        self.adjacent[phase.index()] = column;
        self.adjacent_set[phase.index()] = true;
    }

    pub fn target_column(&self, phase: PhaseId) -> Option<ColumnId> {
        self.target[phase.index()]
    }

    pub fn set_target_column(&mut self, phase: PhaseId, column: Option<ColumnId>) {
        self.target[phase.index()] = column;
    }

    /// A crest candidate: its adjacent column is itself.
    pub fn is_minimum(&self, phase: PhaseId) -> bool {
        self.adjacent[phase.index()] == Some(self.id)
    }

    // ---- trap membership

    pub fn trap(&self) -> Option<TrapId> {
        self.trap
    }

    pub fn set_trap(&mut self, trap: Option<TrapId>) {
        self.trap = trap;
    }

    pub fn global_trap_id(&self) -> i32 {
        if self.is_valid() {
            self.global_trap_id
        } else {
            self.undefined_value as i32
        }
    }

    pub fn set_global_trap_id(&mut self, id: i32) {
        self.global_trap_id = id;
    }

    pub fn drainage_area_id(&self) -> i32 {
        self.drainage_area_id
    }

    pub fn set_drainage_area_id(&mut self, id: i32) {
        self.drainage_area_id = id;
    }

    // ---- compositions

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn composition_state(&self) -> u32 {
        self.composition_state
    }

    pub fn reset_composition_state(&mut self) {
        self.composition_state = 0;
    }

    pub fn reset_composition(&mut self) {
        self.composition.reset();
    }

    pub fn take_composition(&mut self) -> Composition {
        std::mem::take(&mut self.composition)
    }

    pub fn add_composition_with_state(&mut self, composition: &Composition, bit: u32) {
        self.composition.add(composition);
        self.composition_state |= bit;
    }

    pub fn add_composition(&mut self, composition: &Composition) {
        self.add_composition_with_state(composition, state::INITIAL);
    }

    pub fn add_leak_composition(&mut self, composition: &Composition) {
        self.add_composition_with_state(composition, state::LEAKED);
    }

    pub fn add_waste_composition(&mut self, composition: &Composition) {
        self.add_composition_with_state(composition, state::WASTED);
    }

    pub fn add_spill_composition(&mut self, composition: &Composition) {
        self.add_composition_with_state(composition, state::SPILLED_IN);
    }

    pub fn to_be_migrated(&self) -> &Composition {
        &self.to_be_migrated
    }

    pub fn add_composition_to_be_migrated(&mut self, composition: &Composition) {
        self.to_be_migrated.add(composition);
    }

    pub fn take_to_be_migrated(&mut self) -> Composition {
        std::mem::take(&mut self.to_be_migrated)
    }

    pub fn set_to_be_migrated(&mut self, composition: Composition) {
        self.to_be_migrated = composition;
    }

    /// Stores the share of a trap's phase charge that fits this column's
    /// fill interval into the to-be-migrated charge, and records the
    /// phase density.
    pub fn set_charges_to_be_migrated(&mut self, phase: PhaseId, composition: &Composition) {
        let weight = composition.weight();
        let upper = self.fill_depth(phase) - self.fill_height(phase);
        let stored = self.volume_between_depths(upper, self.fill_depth(phase)) * composition.density();

        let mut fraction = if composition.is_empty() { 0.0 } else { stored / weight };
        if fraction > 1.0 {
            if fraction > STORAGE_FRACTION_WARNING && stored >= STORAGE_WARNING_MINIMUM_MASS {
                log::warn!(
                    "stored fraction of column ({}, {}) is too large ({:.4e}/{:.4e} = {:.4}), truncating to 1",
                    self.id.i,
                    self.id.j,
                    stored,
                    weight,
                    fraction
                );
            }
            fraction = 1.0;
        }

        self.to_be_migrated.add_fraction(composition, fraction);
        self.set_charge_density(phase, composition.density());
    }

    /// Immobile residue (kg) left by cracking.
    pub fn immobiles(&self) -> f64 {
        self.immobiles
    }

    pub fn set_immobiles(&mut self, immobiles: f64) {
        self.immobiles = immobiles.max(0.0);
    }

    pub fn immobiles_volume(&self) -> f64 {
        self.immobiles / IMMOBILES_DENSITY
    }

    // ---- migration accumulators

    pub fn migrated(&self, phase: PhaseId) -> f64 {
        self.defined_or_undefined(self.migrated[phase.index()])
    }

    pub fn add_migrated(&mut self, phase: PhaseId, weight: f64) {
        self.migrated[phase.index()] += weight;
    }

    pub fn reset_migrated(&mut self, phase: PhaseId) {
        self.migrated[phase.index()] = 0.0;
    }

    pub fn add_flux(&mut self, weight: f64) {
        self.flux += weight;
    }

    /// Mass that passed through per unit area (kg/m2).
    pub fn flux(&self) -> f64 {
        if !self.is_valid() {
            return self.undefined_value;
        }
        if self.surface_area > 0.0 { self.flux / self.surface_area } else { 0.0 }
    }

    /// Logarithmic flux for display: `log10(flux)` above 1, else 0.
    pub fn flow(&self) -> f64 {
        if !self.is_valid() {
            return self.undefined_value;
        }
        let flux = self.flux();
        if flux > 1.0 { flux.log10() } else { 0.0 }
    }

    // ---- fill state

    pub fn fill_depth(&self, phase: PhaseId) -> f64 {
        self.fill_depth[phase.index()]
    }

    /// Oil never fills above the gas.
    pub fn set_fill_depth(&mut self, phase: PhaseId, depth: f64) {
        let depth = match phase {
            PhaseId::Gas => depth,
            PhaseId::Oil => depth.max(self.fill_depth[PhaseId::Gas.index()]),
        };
        self.fill_depth[phase.index()] = depth;
    }

    pub fn reset_fill_depths(&mut self) {
        self.fill_depth = [RESET_FILL_DEPTH; NUM_PHASES];
    }

    pub fn fill_height(&self, phase: PhaseId) -> f64 {
        match phase.lighter() {
            None => self.fill_depth(phase) - self.top_depth,
            Some(lighter) => self.fill_depth(phase) - self.fill_depth(lighter),
        }
    }

    pub fn charge_density(&self, phase: PhaseId) -> f64 {
        self.defined_or_undefined(self.charge_density[phase.index()])
    }

    pub fn set_charge_density(&mut self, phase: PhaseId, density: f64) {
        self.charge_density[phase.index()] = density;
    }

    /// Charge mass per unit area in this column for one phase.
    pub fn lateral_charge_density(&self, phase: PhaseId) -> f64 {
        if !self.is_valid() {
            return self.undefined_value;
        }
        self.charge_density[phase.index()] * self.fill_height(phase) * self.porosity
    }

    // ---- diffusion and biodegradation bookkeeping

    pub fn penetration_distance(&self, component: usize) -> f64 {
        self.penetration_distances[component]
    }

    pub fn penetration_distances(&self) -> &[f64; DIFFUSION_COMPONENT_SIZE] {
        &self.penetration_distances
    }

    pub fn set_penetration_distance(&mut self, component: usize, distance: f64) {
        self.penetration_distances[component] = distance;
    }

    pub fn diffusion_start_time(&self) -> f64 {
        self.diffusion_start_time
    }

    pub fn set_diffusion_start_time(&mut self, time: f64) {
        self.diffusion_start_time = time;
    }

    pub fn pasteurization_status(&self) -> PasteurizationStatus {
        self.pasteurization
    }

    pub fn set_pasteurization_status(&mut self, status: PasteurizationStatus) {
        self.pasteurization = status;
    }

    // ---- buffered contributions

    pub fn push_buffer(&mut self, kind: BufferKind, phase: PhaseId, position: usize, composition: Composition) {
        let buffer = match kind {
            BufferKind::Target => &mut self.target_buffer[phase.index()],
            BufferKind::Waste => &mut self.waste_buffer[phase.index()],
            BufferKind::Spill => &mut self.spill_buffer[phase.index()],
            BufferKind::Merge => &mut self.merge_buffer,
        };
        buffer.push((position, composition));
    }

    pub fn has_buffered(&self, kind: BufferKind) -> bool {
        match kind {
            BufferKind::Target => self.target_buffer.iter().any(|b| !b.is_empty()),
            BufferKind::Waste => self.waste_buffer.iter().any(|b| !b.is_empty()),
            BufferKind::Spill => self.spill_buffer.iter().any(|b| !b.is_empty()),
            BufferKind::Merge => !self.merge_buffer.is_empty(),
        }
    }

    /// Adds every buffered contribution of `kind` in ascending position
    /// order and clears the buffer. Returns the applied mass.
    pub fn apply_buffer(&mut self, kind: BufferKind) -> f64 {
        let mut drained: Vec<Buffer> = match kind {
            BufferKind::Target => self.target_buffer.iter_mut().map(std::mem::take).collect(),
            BufferKind::Waste => self.waste_buffer.iter_mut().map(std::mem::take).collect(),
            BufferKind::Spill => self.spill_buffer.iter_mut().map(std::mem::take).collect(),
            BufferKind::Merge => vec![std::mem::take(&mut self.merge_buffer)],
        };

        let mut applied = 0.0;
        for buffer in drained.iter_mut() {
            buffer.sort_by_key(|(position, _)| *position);
            for (_, composition) in buffer.iter() {
                applied += composition.weight();
                self.add_composition_with_state(composition, kind.state_bit());
            }
        }
        applied
    }

    // ---- proxy registry

    pub fn register_proxy(&mut self, rank: usize) {
        self.proxies.insert(rank);
    }

    pub fn deregister_proxy(&mut self, rank: usize) {
        self.proxies.remove(&rank);
    }

    /// Ranks holding a cached copy of this column.
    pub fn proxies(&self) -> impl Iterator<Item = usize> + '_ {
        self.proxies.iter().copied()
    }

    pub fn has_proxies(&self) -> bool {
        !self.proxies.is_empty()
    }

    /// Whether a cached value changed since the proxies were last reset.
    /// Clears the mark.
    pub fn take_stale_proxies(&mut self) -> bool {
        std::mem::take(&mut self.proxies_stale)
    }
}
