// All partitions of one reservoir, driven through the stages in lockstep

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;

use crate::component::{NUM_PHASES, PhaseId};
use crate::composition::Composition;
use crate::config::MigrationConfig;
use crate::cracking::OilToGasCracker;
use crate::diffusion::OverburdenProvider;
use crate::distributor::Distributor;
use crate::error::{MigrationError, MigrationResult};
use crate::grid::RegularGrid;
use crate::mass_balance::MassBalanceSink;
use crate::property::PropertyProvider;
use crate::pvt::PvtFlash;
use crate::reservoir::{MergeCondition, MigrationReservoir, ReservoirDefinition};
use crate::transport::{InProcessNetwork, SinglePartitionTransport};

/// One reservoir split over its partitions. Every stage runs on each
/// partition in rank order, with queued proxy resets delivered in between,
/// so a stage never starts before the previous one finished everywhere.
pub struct ReservoirLayer {
    name: String,
    partitions: Vec<Rc<RefCell<MigrationReservoir>>>,
    network: Option<Rc<InProcessNetwork>>,
}

impl ReservoirLayer {
    /// A layer that owns the whole grid.
    pub fn single(reservoir: MigrationReservoir) -> Self {
        ReservoirLayer {
            name: reservoir.name().to_string(),
            partitions: vec![Rc::new(RefCell::new(reservoir))],
            network: None,
        }
    }

    pub fn whole(
        index: usize,
        definition: ReservoirDefinition,
        config: MigrationConfig,
        grid: RegularGrid,
    ) -> MigrationResult<Self> {
        let reservoir = MigrationReservoir::new(
            index,
            definition,
            config,
            Rc::new(grid),
            Rc::new(SinglePartitionTransport::new()),
        )?;
        Ok(Self::single(reservoir))
    }

    /// A layer over `partitions` of `grid`, wired through `network`. Layers
    /// of one run share the network and differ by `index`.
    pub fn partitioned(
        index: usize,
        definition: ReservoirDefinition,
        config: MigrationConfig,
        grid: &RegularGrid,
        network: &Rc<InProcessNetwork>,
    ) -> MigrationResult<Self> {
        let mut partitions = Vec::with_capacity(network.partitions().len());
        for partition in network.partitions().to_vec() {
            let local_grid = RegularGrid::with_partition(grid.num_i, grid.num_j, grid.delta_i, grid.delta_j, partition)?;
            let reservoir = MigrationReservoir::new(
                index,
                definition.clone(),
                config.clone(),
                Rc::new(local_grid),
                network.transport(partition.rank),
            )?;
            let reservoir = Rc::new(RefCell::new(reservoir));
            network.attach(partition.rank, &reservoir);
            partitions.push(reservoir);
        }
        log::debug!("{}: {} partitions", definition.name, partitions.len());

        Ok(ReservoirLayer {
            name: definition.name,
            partitions,
            network: Some(Rc::clone(network)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, rank: usize) -> Ref<'_, MigrationReservoir> {
        self.partitions[rank].borrow()
    }

    pub fn partition_mut(&self, rank: usize) -> RefMut<'_, MigrationReservoir> {
        self.partitions[rank].borrow_mut()
    }

    pub fn partitions(&self) -> impl Iterator<Item = Ref<'_, MigrationReservoir>> {
        self.partitions.iter().map(|reservoir| reservoir.borrow())
    }

    /// Queues resets for columns changed in place, then hands every queued
    /// reset to its rank. A partition borrowed by the caller keeps its marks
    /// until the next delivery.
    pub fn deliver_resets(&self) -> MigrationResult<usize> {
        let Some(network) = &self.network else {
            return Ok(0);
        };
        for reservoir in &self.partitions {
            if let Ok(mut reservoir) = reservoir.try_borrow_mut() {
                reservoir.flush_stale_proxies();
            }
        }
        network.deliver_resets()
    }

    fn each<T>(&self, mut stage: impl FnMut(&mut MigrationReservoir) -> MigrationResult<T>) -> MigrationResult<Vec<T>> {
        let mut results = Vec::with_capacity(self.partitions.len());
        for reservoir in &self.partitions {
            let result = stage(&mut reservoir.borrow_mut());
            results.push(result?);
            self.deliver_resets()?;
        }
        Ok(results)
    }

    fn any(&self, test: impl Fn(&MigrationReservoir) -> bool) -> bool {
        self.partitions.iter().any(|reservoir| test(&reservoir.borrow()))
    }

    pub fn config(&self) -> MigrationConfig {
        self.partitions
            .first()
            .map(|reservoir| reservoir.borrow().config().clone())
            .unwrap_or_default()
    }

    fn cell_count(&self) -> usize {
        self.partitions
            .first()
            .map_or(0, |reservoir| reservoir.borrow().grid().num_cells())
    }

    // ---- stages

    pub fn begin_interval(&self, start_ma: f64, end_ma: f64) -> MigrationResult<()> {
        self.each(|reservoir| {
            reservoir.begin_interval(start_ma, end_ma);
            Ok(())
        })?;
        Ok(())
    }

    pub fn compute_properties(&self, provider: &dyn PropertyProvider) -> MigrationResult<()> {
        self.each(|reservoir| {
            reservoir.compute_properties(provider)?;
            reservoir.update_barrier(provider)
        })?;
        self.each(|reservoir| {
            reservoir.refine_geometry();
            Ok(())
        })?;
        Ok(())
    }

    /// Adjacency, targets, trap tops and extents, undersized merges when
    /// configured, then drainage areas.
    pub fn compute_routing(&self, sink: &mut dyn MassBalanceSink) -> MigrationResult<()> {
        self.each(|reservoir| {
            reservoir.compute_pathways();
            Ok(())
        })?;
        for phase in PhaseId::ALL {
            self.compute_target_columns(phase)?;
        }

        let tops: usize = self.each(|reservoir| reservoir.compute_trap_tops())?.iter().sum();
        self.each(|reservoir| reservoir.compute_trap_extents())?;
        log::debug!("{}: {} traps", self.name, tops);

        if self.config().merge_undersized_traps {
            let rounds = self.trap_count() + 1;
            for _ in 0..rounds {
                if self.merge_traps(MergeCondition::EitherUndersized, sink)? == 0 {
                    break;
                }
            }
        }
        self.each(|reservoir| {
            reservoir.compute_drainage_areas();
            Ok(())
        })?;
        Ok(())
    }

    /// Resolution passes until every target is known. A pass that makes
    /// no progress means the partitions wait on each other.
    fn compute_target_columns(&self, phase: PhaseId) -> MigrationResult<()> {
        let mut previous = usize::MAX;
        loop {
            let unresolved: usize = self
                .each(|reservoir| reservoir.compute_target_columns(phase))?
                .iter()
                .sum();
            if unresolved == 0 {
                return Ok(());
            }
            if unresolved >= previous {
                return Err(MigrationError::TargetResolutionStalled { phase, unresolved });
            }
            previous = unresolved;
        }
    }

    pub fn trap_count(&self) -> usize {
        self.partitions().map(|reservoir| reservoir.traps().len()).sum()
    }

    /// One merge round under `condition`. Returns the number of traps that
    /// took part.
    pub fn merge_traps(&self, condition: MergeCondition, sink: &mut dyn MassBalanceSink) -> MigrationResult<usize> {
        let merging: usize = self
            .each(|reservoir| reservoir.determine_traps_to_merge(condition, sink))?
            .iter()
            .sum();
        if merging == 0 {
            return Ok(0);
        }
        self.each(|reservoir| Ok(reservoir.apply_merge_buffers()))?;
        self.each(|reservoir| reservoir.absorb_traps())?;
        self.each(|reservoir| reservoir.complete_trap_extensions())?;
        Ok(merging)
    }

    /// Expelled charge of the source rocks, then leakage from `below`.
    pub fn collect_charges(&self, provider: &dyn PropertyProvider, below: Option<&ReservoirLayer>) -> MigrationResult<()> {
        self.each(|reservoir| reservoir.collect_expelled_charges(provider))?;
        if let Some(below) = below {
            if below.partition_count() != self.partition_count() {
                return Err(MigrationError::InvalidGrid(format!(
                    "{} has {} partitions but {} below has {}",
                    self.name,
                    self.partition_count(),
                    below.name,
                    below.partition_count()
                )));
            }
            for (reservoir, lower) in self.partitions.iter().zip(&below.partitions) {
                reservoir.borrow_mut().collect_leaked_charges(&lower.borrow());
            }
        }
        Ok(())
    }

    pub fn crack_charges(&self, cracker: &dyn OilToGasCracker, sink: &mut dyn MassBalanceSink) -> MigrationResult<()> {
        self.each(|reservoir| {
            reservoir.crack_charges_to_be_migrated(cracker, sink);
            Ok(())
        })?;
        Ok(())
    }

    /// Migrates the collected charge into the traps and runs fill and
    /// spill, with a diffusion pass when an overburden is given. Traps
    /// below the minimum capacity pass everything on and are dissolved.
    pub fn migrate_and_fill(
        &self,
        flash: &dyn PvtFlash,
        distributor: &dyn Distributor,
        overburden: Option<&dyn OverburdenProvider>,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<()> {
        self.each(|reservoir| reservoir.migrate_charges_to_be_migrated(flash, sink))?;
        self.each(|reservoir| Ok(reservoir.apply_target_buffers()))?;

        self.distribution_cycle(flash, distributor, false, sink)?;
        if let Some(overburden) = overburden {
            if self.config().diffusion.enabled {
                self.each(|reservoir| reservoir.diffusion_leak_charges(overburden, sink))?;
                self.distribution_cycle(flash, distributor, true, sink)?;
            }
        }
        self.each(|reservoir| reservoir.remove_undersized_traps())?;

        self.each(|reservoir| {
            reservoir.report_leakages(sink);
            reservoir.broadcast_fill_depths();
            Ok(())
        })?;
        self.each(|reservoir| {
            reservoir.broadcast_charges();
            reservoir.retain_previous_traps();
            Ok(())
        })?;
        Ok(())
    }

    /// Fill-and-spill iterations until no trap has charge waiting. With
    /// `force` the first iteration runs in any case. Returns the number of
    /// iterations.
    pub fn distribution_cycle(
        &self,
        flash: &dyn PvtFlash,
        distributor: &dyn Distributor,
        force: bool,
        sink: &mut dyn MassBalanceSink,
    ) -> MigrationResult<usize> {
        let cap = self.config().min_fill_and_spill_iterations.max(self.trap_count());
        let mut iterations = 0;
        loop {
            let pending = (force && iterations == 0) || self.any(MigrationReservoir::requires_distribution);
            if !pending {
                break;
            }
            if iterations >= cap {
                log::warn!("{}: fill and spill stopped after {} iterations", self.name, iterations);
                break;
            }
            iterations += 1;

            self.each(|reservoir| reservoir.collect_and_split_charges(flash))?;
            self.each(|reservoir| reservoir.distribute_charges(distributor, sink))?;
            self.each(|reservoir| Ok(reservoir.apply_discharge_buffers()))?;
            self.merge_traps(MergeCondition::BothSpilling, sink)?;
        }
        log::debug!("{}: fill and spill settled after {} iterations", self.name, iterations);
        Ok(iterations)
    }

    /// Flux passes until no partition hands mass to another.
    pub fn compute_fluxes(&self) -> MigrationResult<()> {
        let limit = self.cell_count() + 1;
        for _ in 0..limit {
            let finished = self.each(|reservoir| Ok(reservoir.compute_fluxes()))?;
            if finished.iter().all(|&done| done) {
                return Ok(());
            }
        }
        Err(MigrationError::Structural(format!(
            "{}: flux accumulation did not settle after {} passes",
            self.name, limit
        )))
    }

    // ---- totals over the partitions

    pub fn total_stored_charges(&self) -> Composition {
        let mut total = Composition::new();
        for reservoir in self.partitions() {
            total.add(&reservoir.total_stored_charges());
        }
        total
    }

    pub fn mass_stored_in_columns(&self) -> Composition {
        let mut total = Composition::new();
        for reservoir in self.partitions() {
            total.add(&reservoir.mass_stored_in_columns());
        }
        total
    }

    pub fn total_blocked(&self) -> Composition {
        let mut total = Composition::new();
        for reservoir in self.partitions() {
            total.add(reservoir.total_blocked());
        }
        total
    }

    /// Stored charge per phase over all traps.
    pub fn stored_by_phase(&self) -> [f64; NUM_PHASES] {
        let mut stored = [0.0; NUM_PHASES];
        for reservoir in self.partitions() {
            for trap in reservoir.traps().iter() {
                for phase in PhaseId::ALL {
                    stored[phase.index()] += trap.distributed()[phase.index()].weight();
                }
            }
        }
        stored
    }
}
