// Traps: flood-filled closures around a crest column and the charge they hold

pub mod trap_vector;

pub use trap_vector::TrapVector;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::column::{Column, ColumnArray, ColumnId, LocalColumn};
use crate::component::{ComponentId, DIFFUSION_COMPONENT_SIZE, NUM_PHASES, PhaseId};
use crate::composition::{Composition, PhaseCompositions, state};
use crate::config::DiffusionConfig;
use crate::constants::{NEIGHBOUR_OFFSETS, NO_TRAP_ID, SEAL_DEPTH, WASTE_DEPTH};
use crate::diffusion::{DiffusionCoefficient, DiffusionLeak, DiffusionOverburden, methane_solubility};
use crate::distributor::{DistributionInput, Distributor};
use crate::error::{MigrationError, MigrationResult};
use crate::grid::GridGeometry;
use crate::interpolator::{Extrapolation, Interpolator};
use crate::pathways::{Pathways, TrapFootprint};
use crate::pvt::{PvtFlash, compute_pvt};

/// Index of a trap in its reservoir's [`TrapVector`].
pub type TrapId = usize;

/// Fill depths past the spill depth by more than this (m) are reported.
const FILL_DEPTH_TOLERANCE: f64 = 1.0e-3;

/// Charge leaving a trap after distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DischargeKind {
    /// To the waste column of the phase.
    Waste(ColumnId),
    /// Past the spill column, to wherever the spill target leads.
    Spill,
}

#[derive(Debug, Clone)]
pub struct Discharge {
    pub kind: DischargeKind,
    pub phase: PhaseId,
    pub composition: Composition,
}

/// What is kept of a trap once its snapshot is over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapSummary {
    pub global_id: i32,
    pub crest: ColumnId,
    pub top_depth: f64,
    pub spill_depth: f64,
    pub capacity: f64,
    pub column_count: usize,
    pub fill_depths: [f64; NUM_PHASES],
    pub stored: PhaseCompositions,
    pub diffusion_leaked: Composition,
}

/// A closed area around a crest column. The interior is kept sorted
/// shallowest first, the perimeter shallowest non-sealing first with the
/// sealing columns at its end; the perimeter's first column is where the
/// trap spills.
#[derive(Debug, Clone)]
pub struct Trap {
    id: TrapId,
    global_id: i32,
    crest: ColumnId,
    top_depth: f64,
    min_capacity: f64,

    interior: Vec<ColumnId>,
    interior_set: HashSet<ColumnId>,
    perimeter: Vec<ColumnId>,
    perimeter_set: HashSet<ColumnId>,
    to_be_added: Vec<ColumnId>,

    spill_depth: f64,
    spill_target: Option<ColumnId>,
    spills_into_seal: bool,
    waste_columns: [Option<ColumnId>; NUM_PHASES],
    waste_depths: [f64; NUM_PHASES],
    level_to_volume: Interpolator,

    to_be_distributed: PhaseCompositions,
    distributed: PhaseCompositions,
    fill_depths: [f64; NUM_PHASES],

    diffusion_leaked: Composition,
    diffusion_start_time: f64,
    penetration_distances: [f64; DIFFUSION_COMPONENT_SIZE],

    distribution_count: usize,
    computed_pvt: bool,
    extended: bool,
    absorbed_by: Option<ColumnId>,
    spilling: bool,
}

impl TrapFootprint for Trap {
    fn contains(&self, id: ColumnId) -> bool {
        self.interior_set.contains(&id)
    }

    fn spill_depth(&self) -> f64 {
        self.spill_depth
    }
}

impl Trap {
    /// Starts a trap on local column `crest`: the crest is the only
    /// interior column and its neighbours form the perimeter.
    pub fn new(
        id: TrapId,
        global_id: i32,
        crest: ColumnId,
        min_capacity: f64,
        columns: &mut ColumnArray,
    ) -> MigrationResult<Trap> {
        let column = columns
            .local_mut(crest)
            .ok_or_else(|| MigrationError::Structural(format!("trap crest ({}, {}) is not local", crest.i, crest.j)))?;
        column.set_trap(Some(id));
        let top_depth = column.top_depth();
        let (diffusion_start_time, penetration_distances) =
            (column.diffusion_start_time(), *column.penetration_distances());

        let mut trap = Trap {
            id,
            global_id,
            crest,
            top_depth,
            min_capacity,
            interior: Vec::new(),
            interior_set: HashSet::new(),
            perimeter: Vec::new(),
            perimeter_set: HashSet::new(),
            to_be_added: Vec::new(),
            spill_depth: SEAL_DEPTH,
            spill_target: None,
            spills_into_seal: false,
            waste_columns: [None; NUM_PHASES],
            waste_depths: [WASTE_DEPTH; NUM_PHASES],
            level_to_volume: Interpolator::new(Extrapolation::Constant),
            to_be_distributed: Composition::empty_phases(),
            distributed: Composition::empty_phases(),
            fill_depths: [top_depth; NUM_PHASES],
            diffusion_leaked: Composition::new(),
            diffusion_start_time,
            penetration_distances,
            distribution_count: 0,
            computed_pvt: false,
            extended: false,
            absorbed_by: None,
            spilling: false,
        };
        trap.add_to_interior(crest, columns);
        trap.close_perimeter(crest, columns);
        Ok(trap)
    }

    pub fn id(&self) -> TrapId {
        self.id
    }

    pub fn global_id(&self) -> i32 {
        self.global_id
    }

    pub fn crest(&self) -> ColumnId {
        self.crest
    }

    pub fn top_depth(&self) -> f64 {
        self.top_depth
    }

    pub fn interior(&self) -> &[ColumnId] {
        &self.interior
    }

    pub fn perimeter(&self) -> &[ColumnId] {
        &self.perimeter
    }

    pub fn spill_column(&self) -> Option<ColumnId> {
        self.perimeter.first().copied()
    }

    pub fn spill_target(&self) -> Option<ColumnId> {
        self.spill_target
    }

    /// The spill target is a sealing column, so nothing ever reaches a
    /// trap beyond it.
    pub fn spills_into_seal(&self) -> bool {
        self.spills_into_seal
    }

    pub fn waste_column(&self, phase: PhaseId) -> Option<ColumnId> {
        self.waste_columns[phase.index()]
    }

    pub fn waste_depth(&self, phase: PhaseId) -> f64 {
        self.waste_depths[phase.index()]
    }

    pub fn level_to_volume(&self) -> &Interpolator {
        &self.level_to_volume
    }

    /// Deepest level (m below the crest top) that holds charge.
    pub fn max_level(&self) -> f64 {
        self.level_to_volume.last().map_or(0.0, |(level, _)| level)
    }

    /// Pore volume (m3) down to the spill or oil waste depth.
    pub fn capacity(&self) -> f64 {
        self.level_to_volume.last().map_or(0.0, |(_, volume)| volume)
    }

    pub fn is_undersized(&self) -> bool {
        let capacity = self.capacity();
        capacity == 0.0 || capacity < self.min_capacity
    }

    pub fn distributed(&self) -> &PhaseCompositions {
        &self.distributed
    }

    pub fn to_be_distributed(&self) -> &PhaseCompositions {
        &self.to_be_distributed
    }

    /// Charge held in the trap, distributed or waiting.
    pub fn stored_weight(&self) -> f64 {
        self.distributed
            .iter()
            .chain(self.to_be_distributed.iter())
            .map(Composition::weight)
            .sum()
    }

    pub fn fill_depth(&self, phase: PhaseId) -> f64 {
        self.fill_depths[phase.index()]
    }

    pub fn diffusion_leaked(&self) -> &Composition {
        &self.diffusion_leaked
    }

    pub fn diffusion_start_time(&self) -> f64 {
        self.diffusion_start_time
    }

    pub fn penetration_distances(&self) -> &[f64; DIFFUSION_COMPONENT_SIZE] {
        &self.penetration_distances
    }

    pub fn distribution_count(&self) -> usize {
        self.distribution_count
    }

    pub fn is_spilling(&self) -> bool {
        self.spilling
    }

    pub fn set_spilling(&mut self) {
        self.spilling = true;
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Marks the trap for a geometry update once the merges of this cycle
    /// are known.
    pub fn extend_with(&mut self) {
        self.extended = true;
    }

    pub fn is_to_be_absorbed(&self) -> bool {
        self.absorbed_by.is_some()
    }

    /// Crest of the trap that takes this one over.
    pub fn absorbed_by(&self) -> Option<ColumnId> {
        self.absorbed_by
    }

    pub fn set_to_be_absorbed(&mut self, absorbing_crest: ColumnId) {
        self.absorbed_by = Some(absorbing_crest);
    }

    /// Queues `column` for the next extension.
    pub fn add_to_your_trap(&mut self, column: ColumnId) {
        self.to_be_added.push(column);
        self.extended = true;
    }

    pub fn summary(&self) -> TrapSummary {
        TrapSummary {
            global_id: self.global_id,
            crest: self.crest,
            top_depth: self.top_depth,
            spill_depth: self.spill_depth,
            capacity: self.capacity(),
            column_count: self.interior.len(),
            fill_depths: self.fill_depths,
            stored: self.distributed.clone(),
            diffusion_leaked: self.diffusion_leaked.clone(),
        }
    }

    // ---- area

    fn insert_interior(&mut self, position: usize, id: ColumnId) {
        self.interior.insert(position, id);
        self.interior_set.insert(id);
    }

    fn add_to_interior(&mut self, id: ColumnId, columns: &mut ColumnArray) {
        if self.interior_set.contains(&id) {
            return;
        }
        let Some(column) = columns.get(id) else {
            return;
        };
        if column.is_sealing_any() {
            return;
        }

        let position = self
            .interior
            .iter()
            .rposition(|&other| columns.get(other).is_some_and(|o| o.is_shallower_than(&column)))
            .map_or(0, |p| p + 1);
        self.insert_interior(position, id);
        columns.set_global_trap_id(id, self.global_id);
    }

    fn add_to_perimeter(&mut self, id: ColumnId, columns: &ColumnArray) {
        if self.perimeter_set.contains(&id) || self.interior_set.contains(&id) {
            return;
        }
        let Some(column) = columns.get(id) else {
            return;
        };
        let sealing = column.is_sealing_any();

        let position = self
            .perimeter
            .iter()
            .position(|&other| {
                columns
                    .get(other)
                    .is_some_and(|p| p.is_sealing_any() || (!sealing && p.is_deeper_than(&column, true)))
            })
            .unwrap_or(self.perimeter.len());
        self.perimeter.insert(position, id);
        self.perimeter_set.insert(id);
    }

    fn remove_from_perimeter(&mut self, id: ColumnId) {
        if self.perimeter_set.remove(&id) {
            self.perimeter.retain(|&p| p != id);
        }
    }

    /// Puts the valid neighbours of `id` outside the interior on the
    /// perimeter.
    fn close_perimeter(&mut self, id: ColumnId, columns: &mut ColumnArray) {
        for offset in NEIGHBOUR_OFFSETS {
            let Some(neighbour) = columns.neighbour(id, offset, 1) else {
                continue;
            };
            if self.interior_set.contains(&neighbour) {
                continue;
            }
            if columns.valid(neighbour).is_some() {
                self.add_to_perimeter(neighbour, columns);
            }
        }
    }

    /// Charge reaching `id` can leave the trap: it seals, lies at the grid
    /// edge or next to an undefined column, or has a shallower neighbour
    /// the flood has not reached.
    pub fn is_spill_point(&self, id: ColumnId, columns: &ColumnArray) -> bool {
        let Some(column) = columns.get(id) else {
            return true;
        };
        if column.is_sealing_any() {
            return true;
        }

        for offset in NEIGHBOUR_OFFSETS {
            let Some(neighbour_id) = columns.neighbour(id, offset, 1) else {
                return true;
            };
            let Some(neighbour) = columns.get(neighbour_id) else {
                return true;
            };
            if !neighbour.is_valid() {
                return true;
            }
            if !neighbour.is_sealing_any()
                && !self.interior_set.contains(&neighbour_id)
                && !self.perimeter_set.contains(&neighbour_id)
                && neighbour.is_shallower_than(&column)
            {
                return true;
            }
        }
        false
    }

    fn spill_column_view<'c>(&self, columns: &'c ColumnArray) -> Option<Column<'c>> {
        self.spill_column().and_then(|id| columns.get(id))
    }

    /// Floods the trap from its crest: the shallowest perimeter column
    /// joins the interior until it is a spill point. A trap whose
    /// perimeter runs out never spills.
    pub fn compute_area(&mut self, columns: &mut ColumnArray) {
        columns.set_global_trap_id(self.crest, self.global_id);

        while let Some(spill) = self.spill_column() {
            if self.is_spill_point(spill, columns) {
                break;
            }
            self.remove_from_perimeter(spill);
            self.add_to_interior(spill, columns);
            self.close_perimeter(spill, columns);
        }

        self.spill_depth = match self.spill_column_view(columns) {
            Some(column) if !column.is_sealing_any() => column.top_depth(),
            _ => SEAL_DEPTH,
        };
    }

    /// Moves the queued columns into the interior.
    fn add_columns_to_be_added(&mut self, columns: &mut ColumnArray) {
        for id in std::mem::take(&mut self.to_be_added) {
            self.remove_from_perimeter(id);
            self.add_to_interior(id, columns);
            self.close_perimeter(id, columns);
        }
    }

    /// Absorbs the queued columns and floods on from there.
    pub fn extend_area(&mut self, columns: &mut ColumnArray) {
        self.add_columns_to_be_added(columns);
        self.compute_area(columns);
    }

    /// The shallowest wasting interior column per phase.
    pub fn compute_waste_columns(&mut self, columns: &ColumnArray) {
        for phase in PhaseId::ALL {
            let waste = self
                .interior
                .iter()
                .filter_map(|&id| columns.get(id))
                .find(|column| column.is_wasting(phase));
            self.waste_columns[phase.index()] = waste.map(|column| column.id());
            self.waste_depths[phase.index()] = waste.map_or(WASTE_DEPTH, |column| column.top_depth());
        }
    }

    /// Exact piecewise-linear pore volume above each level, with
    /// breakpoints at the interior tops and bottoms. The table ends at the
    /// oil waste depth when there is an oil waste column, else at the
    /// spill depth.
    pub fn compute_level_to_volume(&mut self, columns: &ColumnArray) {
        let cap_depth = match self.waste_columns[PhaseId::Oil.index()] {
            Some(_) => self.waste_depths[PhaseId::Oil.index()],
            None => self.spill_depth,
        };
        let interior: Vec<Column> = self.interior.iter().filter_map(|&id| columns.get(id)).collect();
        let deepest = interior
            .iter()
            .map(|column| column.bottom_depth())
            .fold(self.top_depth, f64::max);
        let max_level = (cap_depth.min(deepest) - self.top_depth).max(0.0);

        let mut levels = vec![0.0, max_level];
        for column in &interior {
            for depth in [column.top_depth(), column.bottom_depth()] {
                let level = depth - self.top_depth;
                if level > 0.0 && level < max_level {
                    levels.push(level);
                }
            }
        }
        levels.sort_by(f64::total_cmp);
        levels.dedup_by(|a, b| (*a - *b).abs() < 1.0e-9);

        self.level_to_volume = Interpolator::new(Extrapolation::Constant);
        for level in levels {
            let depth = self.top_depth + level;
            let volume: f64 = interior.iter().map(|column| column.capacity(depth).max(0.0)).sum();
            self.level_to_volume.add_point(level, volume);
        }
    }

    /// Column the trap spills to. `None` when the spill column lies at the
    /// grid edge or next to an undefined column, so spilled charge leaves
    /// the reservoir, and when nothing spills at all.
    pub fn compute_spill_target(&mut self, pathways: &Pathways, columns: &ColumnArray) {
        let target = match self.spill_column_view(columns) {
            None => None,
            Some(spill) if columns.touches_grid_edge(spill.id()) || pathways.is_on_boundary(spill.id()) => None,
            Some(spill) if spill.is_sealing_any() => Some(spill.id()),
            Some(spill) => pathways
                .adjacent_column(PhaseId::Gas, spill.id(), Some(&*self))
                .or(Some(spill.id())),
        };
        self.spills_into_seal = target.is_some_and(|id| columns.get(id).is_some_and(|c| c.is_sealing_any()));
        self.spill_target = target;
    }

    /// Geometry that follows from the area.
    pub fn compute_geometry(&mut self, pathways: &Pathways, columns: &ColumnArray) {
        self.compute_waste_columns(columns);
        self.compute_level_to_volume(columns);
        self.compute_spill_target(pathways, columns);
    }

    /// Finishes an extension: the new area and geometry, spilling and
    /// extension flags cleared. The crest may not change.
    pub fn complete_extension(&mut self, columns: &mut ColumnArray) -> MigrationResult<()> {
        let crest = self.crest;
        self.extend_area(columns);
        if self.interior.first() != Some(&crest) {
            return Err(MigrationError::Structural(format!(
                "extension of trap {} moved its crest away from ({}, {})",
                self.global_id, crest.i, crest.j
            )));
        }
        self.spilling = false;
        self.extended = false;
        Ok(())
    }

    // ---- charge

    fn crest_mut<'c>(&self, columns: &'c mut ColumnArray) -> MigrationResult<&'c mut LocalColumn> {
        let crest = self.crest;
        columns.local_mut(crest).ok_or_else(|| {
            MigrationError::Structural(format!("crest ({}, {}) of trap {} is not local", crest.i, crest.j, self.global_id))
        })
    }

    /// Charge arrived at the crest that has not been distributed yet.
    pub fn requires_distribution(&self, columns: &ColumnArray) -> bool {
        let arrived = columns.local(self.crest).is_some_and(|crest| {
            !crest.composition().is_empty()
                && crest.composition_state() & (state::INITIAL | state::SPILLED_IN | state::MERGED) != 0
        });
        arrived || self.to_be_distributed.iter().any(|c| !c.is_empty())
    }

    fn requires_pvt(&self, columns: &ColumnArray) -> bool {
        !self.computed_pvt && columns.local(self.crest).is_some_and(|crest| !crest.composition().is_empty())
    }

    /// Returns all charge to the crest column, to be flashed again.
    pub fn move_back_to_crest(&mut self, columns: &mut ColumnArray) -> MigrationResult<()> {
        let charges: Vec<Composition> = self
            .to_be_distributed
            .iter_mut()
            .chain(self.distributed.iter_mut())
            .map(std::mem::take)
            .collect();
        let crest = self.crest_mut(columns)?;
        for charge in charges.iter().filter(|c| !c.is_empty()) {
            crest.add_composition(charge);
        }
        self.fill_depths = [self.top_depth; NUM_PHASES];
        Ok(())
    }

    fn compute_pvt(&mut self, flash: &dyn PvtFlash, pvt_error: &mut f64, columns: &mut ColumnArray) -> MigrationResult<()> {
        let crest = self.crest_mut(columns)?;
        let composition = crest.take_composition();
        let (temperature, pressure) = (crest.temperature(), crest.pressure());

        let phases = compute_pvt(flash, &composition, temperature, pressure, pvt_error);
        for phase in PhaseId::ALL {
            let flashed = &phases[phase.index()];
            let pending = &mut self.to_be_distributed[phase.index()];
            pending.add(flashed);
            if flashed.density() > 0.0 {
                pending.set_density(flashed.density());
                pending.set_viscosity(flashed.viscosity());
            }
        }
        self.computed_pvt = true;
        Ok(())
    }

    /// Gathers the trap's charge at the crest when new charge arrived (or
    /// always, after diffusion), flashes it and clears the crest's
    /// provenance.
    pub fn collect_and_split(
        &mut self,
        always: bool,
        flash: &dyn PvtFlash,
        pvt_error: &mut f64,
        columns: &mut ColumnArray,
    ) -> MigrationResult<()> {
        if always || self.requires_distribution(columns) {
            self.move_back_to_crest(columns)?;
            self.computed_pvt = false;
        }
        if self.requires_pvt(columns) {
            self.compute_pvt(flash, pvt_error, columns)?;
        }
        self.crest_mut(columns)?.reset_composition_state();
        Ok(())
    }

    /// Places the flashed charge. Leaked charge goes back on the crest; the
    /// rest that does not fit is handed back for the reservoir to route.
    pub fn distribute_charges(
        &mut self,
        distributor: &dyn Distributor,
        columns: &mut ColumnArray,
    ) -> MigrationResult<Vec<Discharge>> {
        if self.to_be_distributed.iter().all(Composition::is_empty) {
            return Ok(Vec::new());
        }
        self.distribution_count += 1;
        if self.is_undersized() {
            return Ok(self.pass_on_charges());
        }

        let max_level = self.max_level();
        let gas_waste_level = match self.waste_columns[PhaseId::Gas.index()] {
            Some(_) => Some(self.waste_depths[PhaseId::Gas.index()] - self.top_depth).filter(|&level| level < max_level),
            None => None,
        };
        let output = distributor.distribute(&DistributionInput {
            charges: &self.to_be_distributed,
            level_to_volume: &self.level_to_volume,
            max_level,
            gas_waste_level,
        });

        if !output.leaked.is_empty() {
            self.crest_mut(columns)?.add_leak_composition(&output.leaked);
        }

        let mut discharges = Vec::new();
        if !output.gas_wasted.is_empty() {
            match self.waste_columns[PhaseId::Gas.index()] {
                Some(waste) => discharges.push(Discharge {
                    kind: DischargeKind::Waste(waste),
                    phase: PhaseId::Gas,
                    composition: output.gas_wasted,
                }),
                None => discharges.push(Discharge {
                    kind: DischargeKind::Spill,
                    phase: PhaseId::Gas,
                    composition: output.gas_wasted,
                }),
            }
        }
        if !output.oil_spilled_or_wasted.is_empty() {
            let kind = match self.waste_columns[PhaseId::Oil.index()] {
                Some(waste) => DischargeKind::Waste(waste),
                None => DischargeKind::Spill,
            };
            discharges.push(Discharge {
                kind,
                phase: PhaseId::Oil,
                composition: output.oil_spilled_or_wasted,
            });
        }
        if !output.gas_spilled.is_empty() {
            discharges.push(Discharge {
                kind: DischargeKind::Spill,
                phase: PhaseId::Gas,
                composition: output.gas_spilled,
            });
        }

        self.distributed = output.distributed;
        self.to_be_distributed = Composition::empty_phases();
        for phase in PhaseId::ALL {
            let depth = self.top_depth + output.final_levels[phase.index()];
            if depth > self.spill_depth + FILL_DEPTH_TOLERANCE {
                log::warn!(
                    "trap {}: {} fill depth {:.3} m lies below the spill depth {:.3} m",
                    self.global_id,
                    phase.as_str(),
                    depth,
                    self.spill_depth
                );
            }
            self.fill_depths[phase.index()] = depth;
        }

        Ok(discharges)
    }

    /// An undersized trap keeps nothing and does not leak: each phase
    /// leaves through its waste column or past the spill column.
    fn pass_on_charges(&mut self) -> Vec<Discharge> {
        let mut charges = std::mem::replace(&mut self.to_be_distributed, Composition::empty_phases());
        for (charge, held) in charges.iter_mut().zip(self.distributed.iter_mut()) {
            charge.add(&std::mem::take(held));
        }
        self.fill_depths = [self.top_depth; NUM_PHASES];

        let waste_columns = self.waste_columns;
        PhaseId::ALL
            .into_iter()
            .zip(charges)
            .filter(|(_, composition)| !composition.is_empty())
            .map(|(phase, composition)| Discharge {
                kind: waste_columns[phase.index()].map_or(DischargeKind::Spill, DischargeKind::Waste),
                phase,
                composition,
            })
            .collect()
    }

    /// Empties the trap and its crest. Returns the charge, which the caller
    /// hands to the absorbing trap.
    pub fn migrate_to(&mut self, columns: &mut ColumnArray) -> MigrationResult<Composition> {
        self.move_back_to_crest(columns)?;
        let crest = self.crest_mut(columns)?;
        let composition = crest.take_composition();
        crest.reset_composition_state();
        Ok(composition)
    }

    /// Points the crest at the absorbing crest and returns the interior,
    /// which joins the absorbing trap.
    pub fn be_absorbed(&mut self, columns: &mut ColumnArray) -> MigrationResult<Vec<ColumnId>> {
        let absorbing_crest = self.absorbed_by.ok_or_else(|| {
            MigrationError::Structural(format!("trap {} has no absorbing trap", self.global_id))
        })?;
        let spill_target = self.spill_target;
        let crest = self.crest_mut(columns)?;
        for phase in PhaseId::ALL {
            crest.set_target_column(phase, Some(absorbing_crest));
            crest.set_adjacent_column(phase, spill_target);
        }
        crest.set_trap(None);
        columns.reset_proxies(self.crest);
        Ok(std::mem::take(&mut self.interior))
    }

    /// Hands the trap's columns back once it has been dissolved.
    pub fn release(&mut self, columns: &mut ColumnArray) -> MigrationResult<()> {
        for &id in &self.interior {
            columns.set_global_trap_id(id, NO_TRAP_ID);
        }
        self.crest_mut(columns)?.set_trap(None);
        columns.reset_proxies(self.crest);
        Ok(())
    }

    /// Charge not stored by this trap that is still on its crest.
    pub fn leakage(&self, columns: &ColumnArray) -> Option<Composition> {
        columns
            .local(self.crest)
            .map(|crest| crest.composition())
            .filter(|composition| !composition.is_empty())
            .cloned()
    }

    // ---- broadcasts to the interior

    pub fn broadcast_fill_depths(&self, columns: &mut ColumnArray) {
        for phase in PhaseId::ALL {
            let depth = self.fill_depths[phase.index()];
            if depth > self.spill_depth + FILL_DEPTH_TOLERANCE {
                log::warn!(
                    "trap {}: broadcasting {} fill depth {:.3} m below the spill depth {:.3} m",
                    self.global_id,
                    phase.as_str(),
                    depth,
                    self.spill_depth
                );
            }
        }
        for &id in &self.interior {
            for phase in PhaseId::ALL {
                columns.set_fill_depth(id, phase, self.fill_depths[phase.index()]);
            }
        }
    }

    /// Spreads the distributed charge over the interior's to-be-migrated
    /// charge in proportion to each column's share of the fill. Fill
    /// depths must have been broadcast first.
    pub fn broadcast_charges(&self, columns: &mut ColumnArray) {
        for &id in &self.interior {
            for phase in PhaseId::ALL {
                let charge = &self.distributed[phase.index()];
                if !charge.is_empty() {
                    columns.set_charges_to_be_migrated(id, phase, charge);
                }
            }
        }
    }

    pub fn broadcast_diffusion_state(&self, columns: &mut ColumnArray) {
        for &id in &self.interior {
            columns.set_diffusion_start_time(id, self.diffusion_start_time);
            for (component, &distance) in self.penetration_distances.iter().enumerate() {
                columns.set_penetration_distance(id, component, distance);
            }
        }
    }

    /// Gas-filled surface (m2): interior columns whose top lies above the
    /// gas fill depth.
    fn gas_surface(&self, columns: &ColumnArray, grid: &dyn GridGeometry) -> f64 {
        let gas_fill = self.fill_depths[PhaseId::Gas.index()];
        self.interior
            .iter()
            .filter_map(|&id| columns.get(id))
            .filter(|column| column.top_depth() < gas_fill)
            .map(|column| grid.surface_area(column.id().i, column.id().j))
            .sum()
    }

    /// Light gas lost through the overburden between `start_ma` and
    /// `end_ma`. Removed from the distributed gas and returned.
    pub fn diffusion_leak(
        &mut self,
        overburden: &DiffusionOverburden,
        config: &DiffusionConfig,
        start_ma: f64,
        end_ma: f64,
        columns: &ColumnArray,
        grid: &dyn GridGeometry,
    ) -> MigrationResult<Composition> {
        let gas = &self.distributed[PhaseId::Gas.index()];
        let total: f64 = ComponentId::DIFFUSING.iter().map(|&c| gas.get(c)).sum();
        if total < 1.0 {
            self.diffusion_start_time = -1.0;
            return Ok(Composition::new());
        }

        let crest = columns.local(self.crest).ok_or_else(|| {
            MigrationError::Structural(format!("crest of trap {} is not local", self.global_id))
        })?;
        if self.diffusion_start_time < 0.0 {
            self.diffusion_start_time = start_ma;
        }

        let solubility =
            methane_solubility(config.salinity, crest.temperature(), crest.pressure()) * overburden.seal_fluid_density;
        let surface = self.gas_surface(columns, grid);

        let mut leaked = Composition::new();
        for (k, &component) in ComponentId::DIFFUSING.iter().enumerate() {
            let penetration = if config.transient {
                self.penetration_distances[k]
            } else {
                config.maximum_seal_thickness
            };
            let mut leak = DiffusionLeak::new(
                overburden,
                penetration,
                config.maximum_seal_thickness,
                DiffusionCoefficient::new(config.diffusion_consts[k], config.activation_energy),
                config.max_time_step,
                config.max_flux_error,
            );
            let concentration = solubility * config.concentration_consts[k];
            let mass = leak.compute(start_ma, end_ma, concentration, surface).min(gas.get(component));
            if mass > 0.0 {
                leaked.add_component(component, mass);
            }
            if config.transient {
                self.penetration_distances[k] = leak.penetration_distance();
            }
        }

        self.distributed[PhaseId::Gas.index()].subtract(&leaked);
        self.diffusion_leaked.add(&leaked);
        Ok(leaked)
    }
}
