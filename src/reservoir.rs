// One reservoir of one partition: columns, traps and the migration stages

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::barrier::Barrier;
use crate::column::{BufferKind, Column, ColumnArray, ColumnId, LocalColumn, PasteurizationStatus};
use crate::component::{ComponentId, PhaseId};
use crate::composition::Composition;
use crate::config::MigrationConfig;
use crate::constants::{CRACKING_DEVIATION_WARNING_PERCENT, MINIMUM_MASS, NEIGHBOUR_OFFSETS, NO_TRAP_ID};
use crate::cracking::{CrackingInput, OilToGasCracker};
use crate::diffusion::OverburdenProvider;
use crate::distributor::Distributor;
use crate::error::{MigrationError, MigrationResult};
use crate::grid::GridGeometry;
use crate::mass_balance::{Endpoint, MassBalanceKind, MassBalanceLedger, MassBalanceRecord, MassBalanceSink};
use crate::math_utils::balance_deviation_percent;
use crate::pathways::Pathways;
use crate::property::{PropertyKind, PropertyProvider, RetrievedField};
use crate::pvt::{PvtFlash, compute_pvt};
use crate::request::{ColumnRequest, ColumnResponse, RequestPayload, ResponseValue, ValueSpec};
use crate::transport::Transport;
use crate::trap::{DischargeKind, Trap, TrapId, TrapSummary, TrapVector};

/// How a source rock splits its expelled charge between the formations
/// above and below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpulsionMode {
    UpAndDown,
    SingleDirection,
}

impl ExpulsionMode {
    pub fn fraction(&self) -> f64 {
        match self {
            ExpulsionMode::UpAndDown => 1.0,
            ExpulsionMode::SingleDirection => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRock {
    pub formation: String,
    pub expulsion: ExpulsionMode,
}

/// Static description of a reservoir: where its properties come from and
/// which formations charge or block it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirDefinition {
    pub name: String,
    /// Scope of the reservoir's own property fields.
    pub formation: String,
    #[serde(default)]
    pub source_rocks: Vec<SourceRock>,
    /// Overlying formations checked for vertical blocking.
    #[serde(default)]
    pub barrier_formations: Vec<String>,
}

impl ReservoirDefinition {
    pub fn new(name: &str, formation: &str) -> Self {
        ReservoirDefinition {
            name: name.to_string(),
            formation: formation.to_string(),
            source_rocks: Vec::new(),
            barrier_formations: Vec::new(),
        }
    }

    pub fn with_source_rock(mut self, formation: &str, expulsion: ExpulsionMode) -> Self {
        self.source_rocks.push(SourceRock {
            formation: formation.to_string(),
            expulsion,
        });
        self
    }

    pub fn with_barrier(mut self, formation: &str) -> Self {
        self.barrier_formations.push(formation.to_string());
        self
    }
}

/// When two traps that spill into each other become one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCondition {
    BothSpilling,
    EitherUndersized,
}

/// Orchestrates migration for one reservoir on one partition. Owns the
/// columns of the partition, proxies for the rest of the grid and the
/// traps whose crest lies in the partition.
pub struct MigrationReservoir {
    index: usize,
    definition: ReservoirDefinition,
    config: MigrationConfig,
    grid: Rc<dyn GridGeometry>,
    columns: ColumnArray,
    traps: TrapVector,
    previous_traps: Vec<TrapSummary>,
    barrier: Option<Barrier>,
    /// Traps that lost mass since their last flash.
    reflash: HashSet<TrapId>,

    start_age_ma: f64,
    end_age_ma: f64,

    pvt_error: f64,
    charge_distribution_count: usize,
    blocked: Composition,
    cracking_loss: Composition,
    cracking_gain: Composition,
    ledger: MassBalanceLedger,
}

impl MigrationReservoir {
    pub fn new(
        index: usize,
        definition: ReservoirDefinition,
        config: MigrationConfig,
        grid: Rc<dyn GridGeometry>,
        transport: Rc<dyn Transport>,
    ) -> MigrationResult<Self> {
        config.validate()?;
        let columns = ColumnArray::new(grid.as_ref(), index, config.undefined_value, transport);
        let barrier = (config.blocking.enabled && !definition.barrier_formations.is_empty())
            .then(|| Barrier::new(grid.local_partition(), &config.blocking));

        Ok(MigrationReservoir {
            index,
            definition,
            config,
            grid,
            columns,
            traps: TrapVector::new(),
            previous_traps: Vec::new(),
            barrier,
            reflash: HashSet::new(),
            start_age_ma: 0.0,
            end_age_ma: 0.0,
            pvt_error: 0.0,
            charge_distribution_count: 0,
            blocked: Composition::new(),
            cracking_loss: Composition::new(),
            cracking_gain: Composition::new(),
            ledger: MassBalanceLedger::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ReservoirDefinition {
        &self.definition
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn grid(&self) -> &dyn GridGeometry {
        self.grid.as_ref()
    }

    pub fn columns(&self) -> &ColumnArray {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut ColumnArray {
        &mut self.columns
    }

    pub fn traps(&self) -> &TrapVector {
        &self.traps
    }

    pub fn previous_traps(&self) -> &[TrapSummary] {
        &self.previous_traps
    }

    pub fn barrier(&self) -> Option<&Barrier> {
        self.barrier.as_ref()
    }

    pub fn ledger(&self) -> &MassBalanceLedger {
        &self.ledger
    }

    pub fn rank(&self) -> usize {
        self.columns.transport().rank()
    }

    pub fn rank_count(&self) -> usize {
        self.columns.transport().rank_count()
    }

    pub fn start_age(&self) -> f64 {
        self.start_age_ma
    }

    pub fn end_age(&self) -> f64 {
        self.end_age_ma
    }

    // ---- bookkeeping

    pub fn pvt_error(&self) -> f64 {
        self.pvt_error
    }

    pub fn accumulate_error_in_pvt(&mut self, error: f64) {
        self.pvt_error += error;
    }

    pub fn charge_distribution_count(&self) -> usize {
        self.charge_distribution_count
    }

    pub fn total_blocked(&self) -> &Composition {
        &self.blocked
    }

    pub fn cracking_loss(&self) -> &Composition {
        &self.cracking_loss
    }

    pub fn cracking_gain(&self) -> &Composition {
        &self.cracking_gain
    }

    /// Charge held by the traps of this partition.
    pub fn total_stored_charges(&self) -> Composition {
        let mut total = Composition::new();
        for trap in self.traps.iter() {
            for charge in trap.distributed().iter().chain(trap.to_be_distributed().iter()) {
                total.add(charge);
            }
        }
        total
    }

    pub fn total_to_be_migrated(&self) -> Composition {
        let mut total = Composition::new();
        for column in self.columns.locals() {
            total.add(column.to_be_migrated());
        }
        total
    }

    pub fn total_immobiles(&self) -> f64 {
        self.columns.locals().map(LocalColumn::immobiles).sum()
    }

    /// Charge sitting in column compositions: leaks, wastes and spills
    /// that did not reach a trap.
    pub fn mass_stored_in_columns(&self) -> Composition {
        let mut total = Composition::new();
        for column in self.columns.locals() {
            total.add(column.composition());
        }
        total
    }

    pub fn retain_previous_traps(&mut self) {
        self.previous_traps = self.traps.iter().map(Trap::summary).collect();
    }

    pub fn remove_previous_traps(&mut self) {
        self.previous_traps.clear();
    }

    /// Resets the proxies of columns whose cached values were changed in
    /// place.
    pub fn flush_stale_proxies(&mut self) -> usize {
        self.columns.flush_stale_proxies()
    }

    pub fn retain_previous_properties(&mut self) {
        self.columns.locals_mut().for_each(LocalColumn::retain_previous_properties);
    }

    pub fn clear_previous_properties(&mut self) {
        self.columns.locals_mut().for_each(LocalColumn::clear_previous_properties);
    }

    /// Drops everything derived for the last snapshot and tells the other
    /// partitions their copies are stale.
    pub fn clear_properties(&mut self) {
        self.columns.locals_mut().for_each(LocalColumn::clear_properties);
        self.traps.clear();
        self.reflash.clear();
        if let Some(barrier) = &mut self.barrier {
            barrier.clear();
        }
        self.columns.reset_all_proxies();
    }

    fn report(
        &mut self,
        sink: &mut dyn MassBalanceSink,
        kind: MassBalanceKind,
        source: Endpoint,
        destination: Endpoint,
        composition: &Composition,
    ) {
        let record = MassBalanceRecord {
            kind,
            reservoir: self.definition.name.clone(),
            age_ma: self.end_age_ma,
            source,
            destination,
            composition: composition.clone(),
        };
        sink.report(&record);
        self.ledger.record(kind, composition);
    }

    // ---- properties and geometry

    /// Keeps the old snapshot's properties and clears the rest, ready for
    /// the interval from `start_ma` to `end_ma`.
    pub fn begin_interval(&mut self, start_ma: f64, end_ma: f64) {
        self.start_age_ma = start_ma;
        self.end_age_ma = end_ma;
        self.retain_previous_properties();
        self.clear_properties();
    }

    /// Fills the local columns from the property fields at the end of the
    /// interval. Depth, porosity, temperature and pressure are required.
    pub fn compute_properties(&mut self, provider: &dyn PropertyProvider) -> MigrationResult<()> {
        let scope = self.definition.formation.as_str();
        let age = self.end_age_ma;

        let depth = provider.retrieve(scope, PropertyKind::Depth, age)?;
        let porosity = provider.retrieve(scope, PropertyKind::Porosity, age)?;
        let temperature = provider.retrieve(scope, PropertyKind::Temperature, age)?;
        let pressure = provider.retrieve(scope, PropertyKind::Pressure, age)?;
        let permeability = provider.property(scope, PropertyKind::Permeability, age).map(RetrievedField::new);
        let net_to_gross = provider.property(scope, PropertyKind::NetToGross, age).map(RetrievedField::new);
        let faults = provider.property(scope, PropertyKind::FaultStatus, age).map(RetrievedField::new);

        let mut defined = 0usize;
        for column in self.columns.locals_mut() {
            let ColumnId { i, j } = column.id();
            let (top, bottom) = (depth.top(i, j), depth.bottom(i, j));
            if depth.is_undefined(top) || depth.is_undefined(bottom) {
                continue;
            }
            defined += 1;
            let undefined = column.undefined_value();

            column.set_top_depth(top);
            column.set_bottom_depth(bottom.max(top));
            column.set_porosity(middle(&porosity, i, j).unwrap_or(0.0));
            column.set_temperature(
                defined_or(&temperature, temperature.top(i, j), undefined),
                defined_or(&temperature, temperature.bottom(i, j), undefined),
            );
            column.set_pressure(middle(&pressure, i, j).unwrap_or(undefined));
            if let Some(field) = &permeability {
                column.set_permeability(middle(field, i, j).unwrap_or(undefined));
            }
            if let Some(field) = &net_to_gross {
                column.set_net_to_gross(defined_or(field, field.top(i, j), 1.0));
            }
            if let Some(field) = &faults {
                column.set_fault_status(crate::column::FaultStatus::from_code(field.top(i, j), field.undefined_value()));
            }
        }
        log::debug!("{}: {} defined columns at {} Ma", self.definition.name, defined, age);
        Ok(())
    }

    pub fn update_barrier(&mut self, provider: &dyn PropertyProvider) -> MigrationResult<()> {
        let Some(barrier) = &mut self.barrier else {
            return Ok(());
        };
        for formation in &self.definition.barrier_formations {
            barrier.update_blocking(provider, formation, self.end_age_ma)?;
        }
        log::debug!("{}: {} blocked cells", self.definition.name, barrier.blocked_count());
        Ok(())
    }

    fn is_blocking(&self, id: ColumnId) -> bool {
        self.barrier.as_ref().is_some_and(|barrier| barrier.is_blocking(id.i, id.j))
    }

    /// Thin columns waste, or seal where they border a thick column; then
    /// the fault map overrides per phase.
    pub fn refine_geometry(&mut self) {
        let mut thin = Vec::new();
        for column in self.columns.locals() {
            if !column.is_valid() || !column.is_thin() {
                continue;
            }
            let id = column.id();
            let borders_thick = NEIGHBOUR_OFFSETS
                .iter()
                .filter_map(|&offset| self.columns.neighbour(id, offset, 1))
                .filter_map(|neighbour| self.columns.valid(neighbour))
                .any(|neighbour| !neighbour.is_thin());
            thin.push((id, borders_thick));
        }

        for (id, borders_thick) in thin {
            if let Some(column) = self.columns.local_mut(id) {
                for phase in PhaseId::ALL {
                    if borders_thick {
                        column.set_sealing(phase);
                    } else {
                        column.set_wasting(phase);
                    }
                }
            }
        }

        for column in self.columns.locals_mut() {
            if !column.is_valid() {
                continue;
            }
            let fault = column.fault_status();
            for phase in PhaseId::ALL {
                match fault.phase_effect(phase) {
                    Some((true, _)) => column.set_sealing(phase),
                    Some((_, true)) => column.set_wasting(phase),
                    _ => {}
                }
            }
        }
        self.columns.reset_all_proxies();
    }

    // ---- routing

    pub fn compute_pathways(&mut self) {
        let mut adjacency = Vec::new();
        {
            let pathways = Pathways::new(&self.columns, self.grid.as_ref(), self.config.maximum_neighbour_offset);
            for column in self.columns.locals() {
                if !column.is_valid() {
                    continue;
                }
                for phase in PhaseId::ALL {
                    if !column.is_adjacent_set(phase) {
                        adjacency.push((column.id(), phase, pathways.adjacent_column(phase, column.id(), None)));
                    }
                }
            }
        }

        for (id, phase, adjacent) in adjacency {
            if self.config.diagnostics.traces(id.i, id.j) {
                log::debug!("({}, {}) {} adjacent column {:?}", id.i, id.j, phase.as_str(), adjacent);
            }
            if let Some(column) = self.columns.local_mut(id) {
                column.set_adjacent_column(phase, adjacent);
            }
        }
        self.columns.reset_all_proxies();
    }

    /// Follows the adjacency chain from `start` to the first column that
    /// holds its own charge and stores the result on every local column
    /// of the chain. Returns `false` when the chain runs into a remote
    /// column whose target is not known yet.
    fn resolve_target(&mut self, phase: PhaseId, start: ColumnId) -> MigrationResult<bool> {
        let route_through_seals = self.config.route_through_sealing_columns;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;

        let resolved = loop {
            let next = match self.columns.get(current) {
                None => break current,
                Some(Column::Proxy(proxy)) => match proxy.target_column(phase) {
                    Some(target) => break target,
                    None => return Ok(false),
                },
                Some(Column::Local(column)) => {
                    if let Some(target) = column.target_column(phase) {
                        break target;
                    }
                    if column.is_wasting(phase) || column.is_thin() {
                        break current;
                    }
                    if column.is_sealing(phase) && !route_through_seals {
                        break current;
                    }
                    match column.adjacent_column(phase) {
                        Some(adjacent) if adjacent != current => adjacent,
                        _ => break current,
                    }
                }
            };

            if !visited.insert(current) {
                return Err(MigrationError::RoutingCycle {
                    i: current.i,
                    j: current.j,
                    phase,
                });
            }
            chain.push(current);
            current = next;
        };

        for id in chain.into_iter().chain(std::iter::once(current)) {
            if let Some(column) = self.columns.local_mut(id) {
                if column.target_column(phase).is_none() {
                    column.set_target_column(phase, Some(resolved));
                }
            }
        }
        Ok(true)
    }

    /// One resolution pass over the local columns. Returns how many are
    /// still waiting on another partition.
    pub fn compute_target_columns(&mut self, phase: PhaseId) -> MigrationResult<usize> {
        let mut unresolved = 0;
        for id in self.columns.local_ids() {
            let pending = self
                .columns
                .local(id)
                .is_some_and(|column| column.is_valid() && column.target_column(phase).is_none());
            if pending && !self.resolve_target(phase, id)? {
                unresolved += 1;
            }
        }
        Ok(unresolved)
    }

    /// End of the target chain from `id`. `None` while part of the chain
    /// is unresolved.
    ///
    /// # Panics
    /// When the chain is longer than the grid, which means the targets
    /// form a cycle.
    pub fn final_target_column(&self, phase: PhaseId, id: ColumnId) -> Option<ColumnId> {
        let limit = self.columns.num_i() * self.columns.num_j() + 1;
        let mut current = id;
        for _ in 0..limit {
            let next = match self.columns.get(current)? {
                Column::Local(column) => column.target_column(phase),
                Column::Proxy(proxy) => proxy.final_target_column(phase),
            }?;
            if next == current {
                return Some(current);
            }
            current = next;
        }
        panic!(
            "target chain of column ({}, {}) for {} does not end",
            id.i,
            id.j,
            phase.as_str()
        );
    }

    /// The part of the target chain held by this partition: its end, or
    /// the first column owned elsewhere.
    fn local_final_target(&self, phase: PhaseId, id: ColumnId) -> Option<ColumnId> {
        let limit = self.columns.num_i() * self.columns.num_j() + 1;
        let mut current = id;
        for _ in 0..limit {
            let Some(column) = self.columns.local(current) else {
                return Some(current);
            };
            let next = column.target_column(phase)?;
            if next == current {
                return Some(current);
            }
            current = next;
        }
        panic!(
            "target chain of column ({}, {}) for {} does not end",
            id.i,
            id.j,
            phase.as_str()
        );
    }

    fn crest_trap(&self, id: ColumnId) -> Option<&Trap> {
        self.columns
            .local(id)
            .and_then(LocalColumn::trap)
            .and_then(|trap| self.traps.get(trap))
    }

    fn local_final_spill_target(&self, phase: PhaseId, crest: ColumnId) -> Option<ColumnId> {
        let trap = self.crest_trap(crest)?;
        if trap.spills_into_seal() {
            return None;
        }
        self.local_final_target(phase, trap.spill_target()?)
    }

    /// Where charge spilling from the trap crested at `crest` ends up.
    /// `None` if the column crests no trap, the trap does not spill or it
    /// spills into a seal.
    pub fn final_spill_target(&self, phase: PhaseId, crest: ColumnId) -> Option<ColumnId> {
        let partial = match self.columns.get(crest)? {
            Column::Local(_) => self.local_final_spill_target(phase, crest),
            Column::Proxy(proxy) => proxy.final_spill_target(phase),
        }?;
        self.final_target_column(phase, partial)
    }

    /// The crest this trap spills to, provided that trap spills straight
    /// back for some phase.
    pub fn spill_back_target(&self, phase: PhaseId, crest: ColumnId) -> Option<ColumnId> {
        let target = self.final_spill_target(phase, crest)?;
        PhaseId::ALL
            .iter()
            .any(|&other| self.final_spill_target(other, target) == Some(crest))
            .then_some(target)
    }

    pub fn is_spilling(&self, crest: ColumnId) -> bool {
        match self.columns.get(crest) {
            Some(Column::Local(_)) => self.crest_trap(crest).is_some_and(Trap::is_spilling),
            Some(Column::Proxy(proxy)) => proxy.is_spilling(),
            None => false,
        }
    }

    pub fn is_undersized(&self, crest: ColumnId) -> bool {
        match self.columns.get(crest) {
            Some(Column::Local(_)) => self.crest_trap(crest).is_some_and(Trap::is_undersized),
            Some(Column::Proxy(proxy)) => proxy.is_undersized(),
            None => false,
        }
    }

    // ---- traps

    /// A trap on every valid local minimum that neither wastes nor seals
    /// and is not in a trap yet.
    pub fn compute_trap_tops(&mut self) -> MigrationResult<usize> {
        let rank = self.rank();
        let rank_count = self.rank_count();
        let mut created = 0;

        for phase in PhaseId::ALL {
            for id in self.columns.local_ids() {
                let is_top = self.columns.local(id).is_some_and(|column| {
                    column.is_valid()
                        && column.is_minimum(phase)
                        && !column.is_wasting(phase)
                        && !column.is_sealing(phase)
                        && column.trap().is_none()
                });
                if !is_top {
                    continue;
                }
                if let Some(column) = self.columns.local_mut(id) {
                    column.reset_composition_state();
                }

                let local_id = self.traps.next_id();
                let global_id = (rank + local_id * rank_count) as i32;
                let trap = Trap::new(local_id, global_id, id, self.config.min_trap_capacity, &mut self.columns)?;
                self.traps.push(trap);
                created += 1;
                if self.config.diagnostics.traces(id.i, id.j) {
                    log::debug!("trap {} crested at ({}, {})", global_id, id.i, id.j);
                }
            }
        }
        Ok(created)
    }

    pub fn compute_trap_extents(&mut self) -> MigrationResult<()> {
        for trap in self.traps.iter_mut() {
            trap.compute_area(&mut self.columns);
        }
        let pathways = Pathways::new(&self.columns, self.grid.as_ref(), self.config.maximum_neighbour_offset);
        for trap in self.traps.iter_mut() {
            trap.compute_geometry(&pathways, &self.columns);
        }
        for id in self.traps.ids() {
            self.check_spill_target(id)?;
        }
        Ok(())
    }

    /// Tags every local column with the global id of the trap its oil
    /// ends up in, or no trap when it leaves the reservoir.
    pub fn compute_drainage_areas(&mut self) {
        for id in self.columns.local_ids() {
            let area = self
                .drainage_end(id)
                .and_then(|end| self.columns.get(end))
                .map_or(NO_TRAP_ID, |end| end.global_trap_id());
            if let Some(column) = self.columns.local_mut(id) {
                column.set_drainage_area_id(area);
            }
        }
    }

    /// End of the oil target chain of `id`, passing through undersized
    /// traps to wherever they spill.
    fn drainage_end(&self, id: ColumnId) -> Option<ColumnId> {
        let mut end = self.final_target_column(PhaseId::Oil, id)?;
        for _ in 0..=self.columns.num_i() * self.columns.num_j() {
            if !self.is_undersized(end) {
                return Some(end);
            }
            end = self.final_spill_target(PhaseId::Oil, end)?;
        }
        None
    }

    fn check_spill_target(&self, id: TrapId) -> MigrationResult<()> {
        let Some(trap) = self.traps.get(id) else {
            return Ok(());
        };
        let destination = trap
            .spill_target()
            .and_then(|spill| self.final_target_column(PhaseId::Gas, spill));
        if destination == Some(trap.crest()) {
            return Err(MigrationError::Structural(format!(
                "trap {} spills back onto its own crest ({}, {})",
                trap.global_id(),
                trap.crest().i,
                trap.crest().j
            )));
        }
        Ok(())
    }

    /// Decides which traps merge under `condition`. The shallower trap of
    /// a pair is marked extended; the deeper one hands its charge to the
    /// other's crest through the merge buffer and waits to be absorbed.
    /// Returns the number of traps that take part.
    pub fn determine_traps_to_merge(
        &mut self,
        condition: MergeCondition,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<usize> {
        let mut decisions = Vec::new();
        for trap in self.traps.iter() {
            let crest = trap.crest();
            for phase in PhaseId::ALL {
                let Some(target) = self.spill_back_target(phase, crest) else {
                    continue;
                };
                let merge = match condition {
                    MergeCondition::BothSpilling => self.is_spilling(crest) && self.is_spilling(target),
                    MergeCondition::EitherUndersized => self.is_undersized(crest) || self.is_undersized(target),
                };
                if !merge {
                    continue;
                }
                let extends = match (self.columns.get(crest), self.columns.get(target)) {
                    (Some(a), Some(b)) => a.is_shallower_than(&b),
                    _ => false,
                };
                decisions.push((trap.id(), target, extends));
                break;
            }
        }

        for &(id, target, extends) in &decisions {
            let Some(trap) = self.traps.get_mut(id) else {
                continue;
            };
            if extends {
                trap.move_back_to_crest(&mut self.columns)?;
                trap.extend_with();
                log::debug!("trap {} extends over ({}, {})", trap.global_id(), target.i, target.j);
                continue;
            }

            let composition = trap.migrate_to(&mut self.columns)?;
            trap.set_to_be_absorbed(target);
            let (crest, global_id) = (trap.crest(), trap.global_id());
            log::debug!("trap {} is absorbed at ({}, {})", global_id, target.i, target.j);
            if composition.is_empty() {
                continue;
            }

            let position = self.columns.position(crest);
            self.columns
                .push_buffer(target, BufferKind::Merge, PhaseId::FIRST, position, composition.clone());
            self.report(
                sink,
                MassBalanceKind::TrapAbsorption,
                Endpoint::Trap(global_id),
                Endpoint::Column { i: target.i, j: target.j },
                &composition,
            );
        }
        Ok(decisions.len())
    }

    /// Hands the interior of every trap marked for absorption to the
    /// absorbing trap and tombstones it.
    pub fn absorb_traps(&mut self) -> MigrationResult<usize> {
        let absorbed: Vec<TrapId> = self
            .traps
            .iter()
            .filter(|trap| trap.is_to_be_absorbed())
            .map(Trap::id)
            .collect();

        for &id in &absorbed {
            let Some(mut trap) = self.traps.remove(id) else {
                continue;
            };
            let absorbing = trap.absorbed_by().ok_or_else(|| {
                MigrationError::Structural(format!("trap {} has no absorbing trap", trap.global_id()))
            })?;
            let interior = trap.be_absorbed(&mut self.columns)?;

            if self.columns.is_local(absorbing) {
                let absorbing_trap = self
                    .columns
                    .local(absorbing)
                    .and_then(LocalColumn::trap)
                    .and_then(|trap_id| self.traps.get_mut(trap_id))
                    .ok_or_else(|| {
                        MigrationError::Structural(format!(
                            "absorbing crest ({}, {}) has no trap",
                            absorbing.i, absorbing.j
                        ))
                    })?;
                for column in interior {
                    absorbing_trap.add_to_your_trap(column);
                }
            } else if let Some(Column::Proxy(proxy)) = self.columns.get(absorbing) {
                for column in interior {
                    proxy.add_to_your_trap(column);
                }
            }
        }
        Ok(absorbed.len())
    }

    /// Dissolves the traps below the minimum capacity. Distribution has
    /// already passed their charge on.
    pub fn remove_undersized_traps(&mut self) -> MigrationResult<usize> {
        let undersized: Vec<TrapId> = self
            .traps
            .iter()
            .filter(|trap| trap.is_undersized())
            .map(Trap::id)
            .collect();

        for &id in &undersized {
            let Some(mut trap) = self.traps.remove(id) else {
                continue;
            };
            log::debug!(
                "{}: dissolving trap {} with {:.1} m3 of capacity",
                self.definition.name,
                trap.global_id(),
                trap.capacity()
            );
            trap.release(&mut self.columns)?;
        }
        Ok(undersized.len())
    }

    /// Grows the extended traps over their new columns and recomputes
    /// their geometry.
    pub fn complete_trap_extensions(&mut self) -> MigrationResult<usize> {
        let extended: Vec<TrapId> = self
            .traps
            .iter()
            .filter(|trap| trap.is_extended())
            .map(Trap::id)
            .collect();

        for &id in &extended {
            if let Some(trap) = self.traps.get_mut(id) {
                trap.complete_extension(&mut self.columns)?;
            }
        }
        {
            let pathways = Pathways::new(&self.columns, self.grid.as_ref(), self.config.maximum_neighbour_offset);
            for &id in &extended {
                if let Some(trap) = self.traps.get_mut(id) {
                    trap.compute_geometry(&pathways, &self.columns);
                }
            }
        }
        for &id in &extended {
            self.check_spill_target(id)?;
        }
        Ok(extended.len())
    }

    // ---- charge collection

    /// Expelled charge of the source rocks over the interval, into the
    /// to-be-migrated charge of the columns, or into the blocked charge
    /// where the barrier blocks.
    pub fn collect_expelled_charges(&mut self, provider: &dyn PropertyProvider) -> MigrationResult<()> {
        let sources = self.definition.source_rocks.clone();
        for source in &sources {
            let fraction = source.expulsion.fraction();
            for component in ComponentId::ALL {
                let kind = PropertyKind::Expelled(component);
                let (Some(start), Some(end)) = (
                    provider.property(&source.formation, kind, self.start_age_ma),
                    provider.property(&source.formation, kind, self.end_age_ma),
                ) else {
                    continue;
                };
                let (start, end) = (RetrievedField::new(start), RetrievedField::new(end));

                for id in self.columns.local_ids() {
                    let (s, e) = (start.top(id.i, id.j), end.top(id.i, id.j));
                    if start.is_undefined(s) || end.is_undefined(e) {
                        continue;
                    }
                    let blocking = self.is_blocking(id);
                    let Some(column) = self.columns.local_mut(id) else {
                        continue;
                    };
                    if !column.is_valid() {
                        continue;
                    }
                    let mass = (e - s) * fraction * column.surface_area();
                    if mass <= 0.0 {
                        continue;
                    }
                    let charge = Composition::from_masses(&[(component, mass)]);
                    if blocking {
                        self.blocked.add(&charge);
                    } else {
                        column.add_composition_to_be_migrated(&charge);
                    }
                }
            }
        }
        Ok(())
    }

    /// Charge leaking out of the reservoir below enters this one where
    /// both columns are valid and the lower one is not on a boundary.
    pub fn collect_leaked_charges(&mut self, below: &MigrationReservoir) {
        let pathways = Pathways::new(&below.columns, below.grid.as_ref(), 0);
        for id in self.columns.local_ids() {
            if !self.columns.local(id).is_some_and(LocalColumn::is_valid) {
                continue;
            }
            let Some(lower) = below.columns.local(id) else {
                continue;
            };
            if !lower.is_valid() || lower.composition().is_empty() || pathways.is_on_boundary(id) {
                continue;
            }
            let leaked = lower.composition().clone();
            if self.is_blocking(id) {
                self.blocked.add(&leaked);
            } else if let Some(column) = self.columns.local_mut(id) {
                column.add_composition_to_be_migrated(&leaked);
            }
        }
    }

    /// Cracks the to-be-migrated charge of every valid column over the
    /// interval and books the per-component gains and losses.
    pub fn crack_charges_to_be_migrated(
        &mut self,
        cracker: &dyn OilToGasCracker,
        sink: &mut dyn MassBalanceSink,
    ) {
        for id in self.columns.local_ids() {
            let Some(column) = self.columns.local(id) else {
                continue;
            };
            if !column.is_valid() || column.to_be_migrated().is_empty() {
                continue;
            }
            let undefined = column.undefined_value();
            let or_current = |previous: f64, current: f64| if previous == undefined { current } else { previous };
            let input = column.to_be_migrated().clone();
            let immobiles = column.immobiles();
            let previous_trap = column.previous_global_trap_id();

            let output = cracker.compute(&CrackingInput {
                composition: &input,
                immobiles,
                start_age_ma: self.start_age_ma,
                end_age_ma: self.end_age_ma,
                start_pressure_mpa: or_current(column.previous_pressure(), column.pressure()),
                end_pressure_mpa: column.pressure(),
                start_temperature_c: or_current(column.previous_temperature(), column.temperature()),
                end_temperature_c: column.temperature(),
            });

            let before = input.weight() + immobiles;
            let deviation = balance_deviation_percent(before, output.composition.weight() + output.immobiles);
            if deviation < CRACKING_DEVIATION_WARNING_PERCENT {
                log::warn!(
                    "{} at ({}, {}): cracking lost {:.3}% of {:.6e} kg",
                    cracker.name(),
                    id.i,
                    id.j,
                    -deviation,
                    before
                );
            }

            let (mut loss, mut gain) = (Composition::new(), Composition::new());
            for component in ComponentId::ALL {
                let change = output.composition.get(component) - input.get(component);
                if change > 0.0 {
                    gain.add_component(component, change);
                } else if change < 0.0 {
                    loss.add_component(component, -change);
                }
            }

            if let Some(column) = self.columns.local_mut(id) {
                column.set_to_be_migrated(output.composition);
                column.set_immobiles(output.immobiles);
            }
            if !loss.is_empty() {
                self.cracking_loss.add(&loss);
                self.report(sink, MassBalanceKind::CrackingLoss, Endpoint::Trap(previous_trap), Endpoint::Outside, &loss);
            }
            if !gain.is_empty() {
                self.cracking_gain.add(&gain);
                self.report(sink, MassBalanceKind::CrackingGain, Endpoint::Outside, Endpoint::Trap(previous_trap), &gain);
            }
        }
    }

    // ---- migration

    /// Flashes every column's to-be-migrated charge and buffers each phase
    /// at the end of its target chain. Apply with
    /// [`MigrationReservoir::apply_target_buffers`].
    pub fn migrate_charges_to_be_migrated(
        &mut self,
        flash: &dyn PvtFlash,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<()> {
        for id in self.columns.local_ids() {
            let Some(column) = self.columns.local_mut(id) else {
                continue;
            };
            if !column.is_valid() || column.to_be_migrated().is_empty() {
                continue;
            }
            let charge = column.take_to_be_migrated();
            let (temperature, pressure) = (column.temperature(), column.pressure());
            let previous_trap = column.previous_global_trap_id();

            let phases = compute_pvt(flash, &charge, temperature, pressure, &mut self.pvt_error);
            let position = self.columns.position(id);
            for phase in PhaseId::ALL {
                let composition = &phases[phase.index()];
                if composition.is_empty() {
                    continue;
                }
                let target = self.final_target_column(phase, id).ok_or_else(|| {
                    MigrationError::Structural(format!(
                        "column ({}, {}) has no {} target",
                        id.i,
                        id.j,
                        phase.as_str()
                    ))
                })?;
                self.columns
                    .push_buffer(target, BufferKind::Target, phase, position, composition.clone());

                let (kind, source) = if previous_trap >= 0 {
                    (MassBalanceKind::LateralMigration, Endpoint::Trap(previous_trap))
                } else {
                    (MassBalanceKind::VerticalMigration, Endpoint::Column { i: id.i, j: id.j })
                };
                self.report(sink, kind, source, Endpoint::Column { i: target.i, j: target.j }, composition);
                self.columns.add_migrated(id, phase, composition.weight());
            }
        }
        Ok(())
    }

    pub fn apply_target_buffers(&mut self) -> f64 {
        self.columns.apply_buffers(BufferKind::Target)
    }

    pub fn apply_discharge_buffers(&mut self) -> f64 {
        self.columns.apply_buffers(BufferKind::Spill) + self.columns.apply_buffers(BufferKind::Waste)
    }

    pub fn apply_merge_buffers(&mut self) -> f64 {
        self.columns.apply_buffers(BufferKind::Merge)
    }

    // ---- fill and spill

    pub fn requires_distribution(&self) -> bool {
        self.traps.iter().any(|trap| trap.requires_distribution(&self.columns))
    }

    /// Gathers and flashes new charge at the crests. Traps that lost mass
    /// by diffusion are flashed again in any case.
    pub fn collect_and_split_charges(&mut self, flash: &dyn PvtFlash) -> MigrationResult<()> {
        let reflash = std::mem::take(&mut self.reflash);
        let mut error = 0.0;
        for trap in self.traps.iter_mut() {
            let always = reflash.contains(&trap.id());
            trap.collect_and_split(always, flash, &mut error, &mut self.columns)?;
        }
        self.accumulate_error_in_pvt(error);
        Ok(())
    }

    /// Distributes the flashed charge of every trap and buffers what does
    /// not fit at the waste column or at the end of the spill path.
    pub fn distribute_charges(
        &mut self,
        distributor: &dyn Distributor,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<usize> {
        let mut discharged = 0;
        for id in self.traps.ids() {
            let Some(trap) = self.traps.get_mut(id) else {
                continue;
            };
            let count = trap.distribution_count();
            let discharges = trap.distribute_charges(distributor, &mut self.columns)?;
            self.charge_distribution_count += trap.distribution_count() - count;
            let (crest, global_id, spill_target) = (trap.crest(), trap.global_id(), trap.spill_target());
            let position = self.columns.position(crest);

            for discharge in discharges {
                discharged += 1;
                let composition = discharge.composition;
                match discharge.kind {
                    DischargeKind::Waste(waste) => {
                        self.columns
                            .push_buffer(waste, BufferKind::Waste, discharge.phase, position, composition.clone());
                        self.report(
                            sink,
                            MassBalanceKind::Waste,
                            Endpoint::Trap(global_id),
                            Endpoint::Column { i: waste.i, j: waste.j },
                            &composition,
                        );
                    }
                    DischargeKind::Spill => {
                        let destination =
                            spill_target.and_then(|spill| self.final_target_column(discharge.phase, spill));
                        match (spill_target, destination) {
                            (Some(spill), Some(destination)) => {
                                let weight = composition.weight();
                                self.columns.push_buffer(
                                    destination,
                                    BufferKind::Spill,
                                    discharge.phase,
                                    position,
                                    composition.clone(),
                                );
                                self.report(
                                    sink,
                                    MassBalanceKind::Spill,
                                    Endpoint::Trap(global_id),
                                    Endpoint::Column {
                                        i: destination.i,
                                        j: destination.j,
                                    },
                                    &composition,
                                );
                                self.columns.add_migrated(spill, discharge.phase, weight);
                            }
                            _ => self.report(
                                sink,
                                MassBalanceKind::Spill,
                                Endpoint::Trap(global_id),
                                Endpoint::Outside,
                                &composition,
                            ),
                        }
                        if let Some(trap) = self.traps.get_mut(id) {
                            trap.set_spilling();
                        }
                    }
                }
            }
        }
        Ok(discharged)
    }

    /// Light gas lost through the overburden of each trap over the
    /// interval. Traps that lose mass are flashed again next cycle.
    pub fn diffusion_leak_charges(
        &mut self,
        overburden: &dyn OverburdenProvider,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<()> {
        if !self.config.diffusion.enabled {
            return Ok(());
        }
        for id in self.traps.ids() {
            let Some(trap) = self.traps.get_mut(id) else {
                continue;
            };
            let Some(stack) = overburden.overburden(&self.definition.name, trap.crest(), self.end_age_ma) else {
                continue;
            };
            let stack = stack.limited(self.config.diffusion.maximum_seal_thickness);
            let leaked = trap.diffusion_leak(
                &stack,
                &self.config.diffusion,
                self.start_age_ma,
                self.end_age_ma,
                &self.columns,
                self.grid.as_ref(),
            )?;
            let global_id = trap.global_id();
            if !leaked.is_empty() {
                self.reflash.insert(id);
                self.report(sink, MassBalanceKind::DiffusionLoss, Endpoint::Trap(global_id), Endpoint::Outside, &leaked);
            }
        }
        Ok(())
    }

    /// Charge left on a crest after distribution is reported as wasted at
    /// the crest, where the reservoir above collects it.
    pub fn report_leakages(&mut self, sink: &mut dyn MassBalanceSink) {
        let leakages: Vec<(i32, ColumnId, Composition)> = self
            .traps
            .iter()
            .filter_map(|trap| trap.leakage(&self.columns).map(|leak| (trap.global_id(), trap.crest(), leak)))
            .collect();
        for (global_id, crest, leak) in leakages {
            self.report(
                sink,
                MassBalanceKind::Waste,
                Endpoint::Trap(global_id),
                Endpoint::Column { i: crest.i, j: crest.j },
                &leak,
            );
        }
    }

    pub fn broadcast_fill_depths(&mut self) {
        for trap in self.traps.iter() {
            trap.broadcast_fill_depths(&mut self.columns);
        }
    }

    /// Needs the fill depths of every partition broadcast first.
    pub fn broadcast_charges(&mut self) {
        for trap in self.traps.iter() {
            trap.broadcast_charges(&mut self.columns);
            trap.broadcast_diffusion_state(&mut self.columns);
        }
    }

    /// Pushes each column's migrated mass down its adjacency chain as
    /// flux. Returns `false` when mass was handed to another partition
    /// and another pass is needed there.
    pub fn compute_fluxes(&mut self) -> bool {
        let limit = self.columns.num_i() * self.columns.num_j();
        let mut finished = true;

        for phase in PhaseId::ALL {
            for id in self.columns.local_ids() {
                let Some(column) = self.columns.local_mut(id) else {
                    continue;
                };
                if !column.is_valid() {
                    continue;
                }
                let weight = column.migrated(phase);
                column.reset_migrated(phase);
                if weight < MINIMUM_MASS || column.is_wasting(phase) {
                    continue;
                }
                column.add_flux(weight);

                let mut previous = id;
                let mut next = column.adjacent_column(phase);
                for _ in 0..limit {
                    let Some(current) = next.filter(|&adjacent| adjacent != previous) else {
                        break;
                    };
                    match self.columns.valid(current) {
                        None => break,
                        Some(adjacent) if adjacent.is_wasting(phase) => break,
                        Some(Column::Proxy(proxy)) => {
                            proxy.add_migrated(phase, weight);
                            finished = false;
                            break;
                        }
                        Some(Column::Local(_)) => {}
                    }
                    let Some(local) = self.columns.local_mut(current) else {
                        break;
                    };
                    local.add_flux(weight);
                    previous = current;
                    next = local.adjacent_column(phase);
                }
            }
        }
        finished
    }

    // ---- request servicing

    fn owned(&self, request: &ColumnRequest) -> &LocalColumn {
        match self.columns.local(request.column()) {
            Some(column) => column,
            None => panic!(
                "{} request for column ({}, {}) of reservoir {}, which rank {} does not own",
                request.spec.as_str(),
                request.i,
                request.j,
                self.index,
                self.rank()
            ),
        }
    }

    fn owned_mut(&mut self, request: &ColumnRequest) -> &mut LocalColumn {
        let rank = self.rank();
        match self.columns.local_mut(request.column()) {
            Some(column) => column,
            None => panic!(
                "{} request for column ({}, {}) of reservoir {}, which rank {} does not own",
                request.spec.as_str(),
                request.i,
                request.j,
                self.index,
                rank
            ),
        }
    }

    fn owned_trap_mut(&mut self, request: &ColumnRequest) -> &mut Trap {
        let trap = self.owned(request).trap();
        match trap.and_then(|id| self.traps.get_mut(id)) {
            Some(trap) => trap,
            None => panic!(
                "{} request for column ({}, {}), which crests no trap",
                request.spec.as_str(),
                request.i,
                request.j
            ),
        }
    }

    /// Answers a request from another partition out of local state. Never
    /// sends a request of its own.
    ///
    /// # Panics
    /// On a column this partition does not own and on a payload that does
    /// not fit the tag; both mean the partitions disagree on the protocol.
    pub fn handle_request(&mut self, request: &ColumnRequest) -> ColumnResponse {
        let phase = request.phase;
        let value = |v: f64| ColumnResponse::to(request, ResponseValue::Value(v));
        let flag = |b: bool| value(if b { 1.0 } else { 0.0 });
        let column_ref = |c: Option<ColumnId>| ColumnResponse::to(request, ResponseValue::Column(c));
        let done = || ColumnResponse::to(request, ResponseValue::None);

        match request.spec {
            ValueSpec::TopDepth => value(self.owned(request).top_depth()),
            ValueSpec::BottomDepth => value(self.owned(request).bottom_depth()),
            ValueSpec::Thickness => value(self.owned(request).thickness()),
            ValueSpec::NetToGross => value(self.owned(request).net_to_gross()),
            ValueSpec::Porosity => value(self.owned(request).porosity()),
            ValueSpec::PorosityPercentage => value(self.owned(request).porosity_percentage()),
            ValueSpec::Permeability => value(self.owned(request).permeability()),
            ValueSpec::Pressure => value(self.owned(request).pressure()),
            ValueSpec::Temperature => value(self.owned(request).temperature()),
            ValueSpec::Capacity => value(self.owned(request).capacity(value_payload(request))),
            ValueSpec::FaultStatus => value(self.owned(request).fault_status().code() as f64),
            ValueSpec::IsSealing => flag(self.owned(request).is_sealing(phase)),
            ValueSpec::IsWasting => flag(self.owned(request).is_wasting(phase)),
            ValueSpec::IsValid => flag(self.owned(request).is_valid()),
            ValueSpec::GlobalTrapId => value(self.owned(request).global_trap_id() as f64),
            ValueSpec::DrainageAreaId => value(self.owned(request).drainage_area_id() as f64),
            ValueSpec::FillDepth => value(self.owned(request).fill_depth(phase)),
            ValueSpec::ChargeDensity => value(self.owned(request).charge_density(phase)),
            ValueSpec::LateralChargeDensity => value(self.owned(request).lateral_charge_density(phase)),
            ValueSpec::Flux => value(self.owned(request).flux()),
            ValueSpec::Flow => value(self.owned(request).flow()),
            ValueSpec::Migrated => value(self.owned(request).migrated(phase)),
            ValueSpec::IsSpilling => {
                self.owned(request);
                flag(self.crest_trap(request.column()).is_some_and(Trap::is_spilling))
            }
            ValueSpec::IsUndersized => {
                self.owned(request);
                flag(self.crest_trap(request.column()).is_some_and(Trap::is_undersized))
            }
            ValueSpec::HasTrap => flag(self.owned(request).trap().is_some()),
            ValueSpec::PasteurizationStatus => value(self.owned(request).pasteurization_status().code() as f64),
            ValueSpec::DiffusionStartTime => value(self.owned(request).diffusion_start_time()),
            ValueSpec::PenetrationDistance => {
                let (index, _) = indexed_payload(request);
                value(self.owned(request).penetration_distance(index))
            }
            ValueSpec::ImmobilesVolume => value(self.owned(request).immobiles_volume()),
            ValueSpec::OwcTemperature => value(self.owned(request).owc_temperature(value_payload(request))),

            ValueSpec::SetGlobalTrapId => {
                let id = value_payload(request) as i32;
                self.owned_mut(request).set_global_trap_id(id);
                done()
            }
            ValueSpec::SetTopDepth => {
                self.owned(request);
                self.columns.set_top_depth(request.column(), value_payload(request));
                done()
            }
            ValueSpec::SetBottomDepth => {
                self.owned(request);
                self.columns.set_bottom_depth(request.column(), value_payload(request));
                done()
            }
            ValueSpec::SetFillDepth => {
                let depth = value_payload(request);
                self.owned_mut(request).set_fill_depth(phase, depth);
                done()
            }
            ValueSpec::SetChargeDensity => {
                let density = value_payload(request);
                self.owned_mut(request).set_charge_density(phase, density);
                done()
            }
            ValueSpec::SetPasteurizationStatus => {
                let status = PasteurizationStatus::from_code(value_payload(request) as i32);
                self.owned_mut(request).set_pasteurization_status(status);
                done()
            }
            ValueSpec::SetDiffusionStartTime => {
                let time = value_payload(request);
                self.owned_mut(request).set_diffusion_start_time(time);
                done()
            }
            ValueSpec::SetPenetrationDistance => {
                let (index, distance) = indexed_payload(request);
                self.owned_mut(request).set_penetration_distance(index, distance);
                done()
            }
            ValueSpec::AddMigrated => {
                let weight = value_payload(request);
                self.owned_mut(request).add_migrated(phase, weight);
                done()
            }
            ValueSpec::AddFlux => {
                let weight = value_payload(request);
                self.owned_mut(request).add_flux(weight);
                done()
            }

            ValueSpec::AdjacentColumn => column_ref(self.owned(request).adjacent_column(phase)),
            ValueSpec::TargetColumn => column_ref(self.owned(request).target_column(phase)),
            ValueSpec::FinalTargetColumn => {
                self.owned(request);
                column_ref(self.local_final_target(phase, request.column()))
            }
            ValueSpec::SpillTarget => {
                self.owned(request);
                column_ref(self.crest_trap(request.column()).and_then(Trap::spill_target))
            }
            ValueSpec::FinalSpillTarget => {
                self.owned(request);
                column_ref(self.local_final_spill_target(phase, request.column()))
            }
            ValueSpec::TrapSpillColumn => {
                self.owned(request);
                column_ref(self.crest_trap(request.column()).and_then(Trap::spill_column))
            }

            ValueSpec::GetCharges => {
                self.owned(request);
                let charge = self
                    .crest_trap(request.column())
                    .map(|trap| trap.distributed()[phase.index()].clone())
                    .unwrap_or_default();
                ColumnResponse::to(request, ResponseValue::Composition(charge))
            }
            ValueSpec::AddCompositionToBeMigrated => {
                let composition = composition_payload(request);
                self.owned_mut(request).add_composition_to_be_migrated(composition);
                done()
            }
            ValueSpec::SetChargesToBeMigrated => {
                let composition = composition_payload(request);
                self.owned_mut(request).set_charges_to_be_migrated(phase, composition);
                done()
            }

            ValueSpec::IncreaseBufferTarget
            | ValueSpec::IncreaseBufferWaste
            | ValueSpec::IncreaseBufferSpill
            | ValueSpec::IncreaseBufferMerge => {
                let (position, composition) = buffered_payload(request);
                let kind = match BufferKind::from_value_spec(request.spec) {
                    Some(kind) => kind,
                    None => unreachable!("buffer tags map to buffer kinds"),
                };
                self.owned_mut(request)
                    .push_buffer(kind, phase, position, composition.clone());
                done()
            }

            ValueSpec::AddToYourTrap => {
                let column = match &request.payload {
                    RequestPayload::Column(column) => *column,
                    other => payload_mismatch(request, other, "a column"),
                };
                self.owned_trap_mut(request).add_to_your_trap(column);
                done()
            }
            ValueSpec::ResetProxy => {
                self.columns.clear_proxy_cache(request.column());
                done()
            }
            ValueSpec::Register => {
                let rank = rank_payload(request);
                self.owned_mut(request).register_proxy(rank);
                done()
            }
            ValueSpec::Deregister => {
                let rank = rank_payload(request);
                self.owned_mut(request).deregister_proxy(rank);
                done()
            }
        }
    }

    /// Drops the cached copy of a column another partition changed.
    pub fn handle_proxy_reset(&self, request: &ColumnRequest) {
        self.columns.clear_proxy_cache(request.column());
    }
}

/// Middle k level of a field, if defined.
fn middle(field: &RetrievedField, i: usize, j: usize) -> Option<f64> {
    let k = field.num_k().saturating_sub(1) as f64 / 2.0;
    let value = field.interpolate(i, j, k);
    (!field.is_undefined(value)).then_some(value)
}

fn defined_or(field: &RetrievedField, value: f64, fallback: f64) -> f64 {
    if field.is_undefined(value) { fallback } else { value }
}

fn payload_mismatch(request: &ColumnRequest, payload: &RequestPayload, expected: &str) -> ! {
    panic!(
        "{} request for column ({}, {}) carries {:?}, expected {}",
        request.spec.as_str(),
        request.i,
        request.j,
        payload,
        expected
    )
}

fn value_payload(request: &ColumnRequest) -> f64 {
    match &request.payload {
        RequestPayload::Value(value) => *value,
        other => payload_mismatch(request, other, "a value"),
    }
}

fn indexed_payload(request: &ColumnRequest) -> (usize, f64) {
    match &request.payload {
        RequestPayload::Indexed { index, value } => (*index, *value),
        other => payload_mismatch(request, other, "an indexed value"),
    }
}

fn composition_payload(request: &ColumnRequest) -> &Composition {
    match &request.payload {
        RequestPayload::Composition(composition) => composition,
        other => payload_mismatch(request, other, "a composition"),
    }
}

fn buffered_payload(request: &ColumnRequest) -> (usize, &Composition) {
    match &request.payload {
        RequestPayload::Buffered { position, composition } => (*position, composition),
        other => payload_mismatch(request, other, "a buffered composition"),
    }
}

fn rank_payload(request: &ColumnRequest) -> usize {
    match &request.payload {
        RequestPayload::Rank(rank) => *rank,
        other => payload_mismatch(request, other, "a rank"),
    }
}
