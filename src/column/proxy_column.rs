use std::cell::Cell;
use std::rc::Rc;

use crate::column::{ColumnId, FaultStatus};
use crate::component::{NUM_PHASES, PhaseId};
use crate::composition::Composition;
use crate::request::{ColumnRequest, ColumnResponse, RequestPayload, ValueSpec};
use crate::transport::Transport;

/// Mirror of a column owned by another partition.
///
/// Static properties are cached until the owner resets the proxy. Volatile
/// values are always fetched, and every write is forwarded to the owner.
pub struct ProxyColumn {
    id: ColumnId,
    reservoir_index: usize,
    undefined_value: f64,
    transport: Rc<dyn Transport>,

    top_depth: Cell<Option<f64>>,
    bottom_depth: Cell<Option<f64>>,
    net_to_gross: Cell<Option<f64>>,
    porosity: Cell<Option<f64>>,
    fault_status: Cell<Option<FaultStatus>>,
    sealing: [Cell<Option<bool>>; NUM_PHASES],
    wasting: [Cell<Option<bool>>; NUM_PHASES],
    adjacent: [Cell<Option<Option<ColumnId>>>; NUM_PHASES],
    target: [Cell<Option<ColumnId>>; NUM_PHASES],
}

impl ProxyColumn {
    /// Creates the proxy and registers it with the owner.
    pub fn new(id: ColumnId, reservoir_index: usize, undefined_value: f64, transport: Rc<dyn Transport>) -> Self {
        let proxy = ProxyColumn {
            id,
            reservoir_index,
            undefined_value,
            transport,
            top_depth: Cell::new(None),
            bottom_depth: Cell::new(None),
            net_to_gross: Cell::new(None),
            porosity: Cell::new(None),
            fault_status: Cell::new(None),
            sealing: Default::default(),
            wasting: Default::default(),
            adjacent: Default::default(),
            target: Default::default(),
        };
        let rank = proxy.transport.rank();
        proxy.send(PhaseId::FIRST, ValueSpec::Register, RequestPayload::Rank(rank));
        proxy
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    fn request(&self, phase: PhaseId, spec: ValueSpec, payload: RequestPayload) -> ColumnRequest {
        ColumnRequest::new(self.reservoir_index, self.id, phase, spec).with_payload(payload)
    }

    /// A failed request leaves this partition with no consistent view of
    /// the owner, so it ends the run.
    fn send(&self, phase: PhaseId, spec: ValueSpec, payload: RequestPayload) -> ColumnResponse {
        let request = self.request(phase, spec, payload);
        match self.transport.send_request(request) {
            Ok(response) => response,
            Err(error) => panic!(
                "proxy request {} for column ({}, {}) of reservoir {} failed: {}",
                spec.as_str(),
                self.id.i,
                self.id.j,
                self.reservoir_index,
                error
            ),
        }
    }

    fn fetch_value(&self, phase: PhaseId, spec: ValueSpec) -> f64 {
        self.send(phase, spec, RequestPayload::None).expect_value()
    }

    fn cached<T: Copy>(&self, cell: &Cell<Option<T>>, fetch: impl FnOnce() -> T) -> T {
        if let Some(value) = cell.get() {
            return value;
        }
        let value = fetch();
        cell.set(Some(value));
        value
    }

    /// Drops every cached value; the next read asks the owner again.
    pub fn clear_cache(&self) {
        self.top_depth.set(None);
        self.bottom_depth.set(None);
        self.net_to_gross.set(None);
        self.porosity.set(None);
        self.fault_status.set(None);
        for phase in 0..NUM_PHASES {
            self.sealing[phase].set(None);
            self.wasting[phase].set(None);
            self.adjacent[phase].set(None);
            self.target[phase].set(None);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.top_depth() != self.undefined_value
    }

    pub fn top_depth(&self) -> f64 {
        self.cached(&self.top_depth, || self.fetch_value(PhaseId::FIRST, ValueSpec::TopDepth))
    }

    pub fn bottom_depth(&self) -> f64 {
        self.cached(&self.bottom_depth, || self.fetch_value(PhaseId::FIRST, ValueSpec::BottomDepth))
    }

    pub fn thickness(&self) -> f64 {
        if self.is_valid() {
            self.bottom_depth() - self.top_depth()
        } else {
            self.undefined_value
        }
    }

    pub fn net_to_gross(&self) -> f64 {
        self.cached(&self.net_to_gross, || self.fetch_value(PhaseId::FIRST, ValueSpec::NetToGross))
    }

    pub fn porosity(&self) -> f64 {
        self.cached(&self.porosity, || self.fetch_value(PhaseId::FIRST, ValueSpec::Porosity))
    }

    pub fn fault_status(&self) -> FaultStatus {
        self.cached(&self.fault_status, || {
            FaultStatus::from_code(self.fetch_value(PhaseId::FIRST, ValueSpec::FaultStatus), self.undefined_value)
        })
    }

    pub fn is_sealing(&self, phase: PhaseId) -> bool {
        self.cached(&self.sealing[phase.index()], || {
            self.send(phase, ValueSpec::IsSealing, RequestPayload::None).expect_flag()
        })
    }

    pub fn is_wasting(&self, phase: PhaseId) -> bool {
        self.cached(&self.wasting[phase.index()], || {
            self.send(phase, ValueSpec::IsWasting, RequestPayload::None).expect_flag()
        })
    }

    pub fn adjacent_column(&self, phase: PhaseId) -> Option<ColumnId> {
        self.cached(&self.adjacent[phase.index()], || {
            self.send(phase, ValueSpec::AdjacentColumn, RequestPayload::None).expect_column()
        })
    }

    /// Only a resolved target is cached; an unresolved one is asked for
    /// again next time.
    pub fn target_column(&self, phase: PhaseId) -> Option<ColumnId> {
        let cell = &self.target[phase.index()];
        if let Some(target) = cell.get() {
            return Some(target);
        }
        let target = self.send(phase, ValueSpec::TargetColumn, RequestPayload::None).expect_column();
        cell.set(target);
        target
    }

    // volatile reads

    pub fn global_trap_id(&self) -> i32 {
        self.fetch_value(PhaseId::FIRST, ValueSpec::GlobalTrapId) as i32
    }

    pub fn capacity(&self, spill_depth: f64) -> f64 {
        self.send(PhaseId::FIRST, ValueSpec::Capacity, RequestPayload::Value(spill_depth))
            .expect_value()
    }

    pub fn migrated(&self, phase: PhaseId) -> f64 {
        self.fetch_value(phase, ValueSpec::Migrated)
    }

    pub fn fill_depth(&self, phase: PhaseId) -> f64 {
        self.fetch_value(phase, ValueSpec::FillDepth)
    }

    pub fn final_target_column(&self, phase: PhaseId) -> Option<ColumnId> {
        self.send(phase, ValueSpec::FinalTargetColumn, RequestPayload::None).expect_column()
    }

    pub fn spill_target(&self, phase: PhaseId) -> Option<ColumnId> {
        self.send(phase, ValueSpec::SpillTarget, RequestPayload::None).expect_column()
    }

    pub fn final_spill_target(&self, phase: PhaseId) -> Option<ColumnId> {
        self.send(phase, ValueSpec::FinalSpillTarget, RequestPayload::None).expect_column()
    }

    pub fn is_spilling(&self) -> bool {
        self.send(PhaseId::FIRST, ValueSpec::IsSpilling, RequestPayload::None).expect_flag()
    }

    pub fn is_undersized(&self) -> bool {
        self.send(PhaseId::FIRST, ValueSpec::IsUndersized, RequestPayload::None).expect_flag()
    }

    pub fn has_trap(&self) -> bool {
        self.send(PhaseId::FIRST, ValueSpec::HasTrap, RequestPayload::None).expect_flag()
    }

    pub fn charges(&self, phase: PhaseId) -> Composition {
        self.send(phase, ValueSpec::GetCharges, RequestPayload::None).expect_composition()
    }

    // forwarded writes

    pub fn set_global_trap_id(&self, id: i32) {
        self.send(PhaseId::FIRST, ValueSpec::SetGlobalTrapId, RequestPayload::Value(id as f64));
    }

    pub fn set_top_depth(&self, depth: f64) {
        self.top_depth.set(None);
        self.send(PhaseId::FIRST, ValueSpec::SetTopDepth, RequestPayload::Value(depth));
    }

    pub fn set_bottom_depth(&self, depth: f64) {
        self.bottom_depth.set(None);
        self.send(PhaseId::FIRST, ValueSpec::SetBottomDepth, RequestPayload::Value(depth));
    }

    pub fn set_fill_depth(&self, phase: PhaseId, depth: f64) {
        self.send(phase, ValueSpec::SetFillDepth, RequestPayload::Value(depth));
    }

    pub fn set_charges_to_be_migrated(&self, phase: PhaseId, composition: &Composition) {
        self.send(
            phase,
            ValueSpec::SetChargesToBeMigrated,
            RequestPayload::Composition(composition.clone()),
        );
    }

    pub fn set_diffusion_start_time(&self, time: f64) {
        self.send(PhaseId::FIRST, ValueSpec::SetDiffusionStartTime, RequestPayload::Value(time));
    }

    pub fn set_penetration_distance(&self, component: usize, distance: f64) {
        self.send(
            PhaseId::FIRST,
            ValueSpec::SetPenetrationDistance,
            RequestPayload::Indexed { index: component, value: distance },
        );
    }

    pub fn add_migrated(&self, phase: PhaseId, weight: f64) {
        self.send(phase, ValueSpec::AddMigrated, RequestPayload::Value(weight));
    }

    pub fn add_flux(&self, weight: f64) {
        self.send(PhaseId::FIRST, ValueSpec::AddFlux, RequestPayload::Value(weight));
    }

    pub fn add_composition_to_be_migrated(&self, composition: &Composition) {
        self.send(
            PhaseId::FIRST,
            ValueSpec::AddCompositionToBeMigrated,
            RequestPayload::Composition(composition.clone()),
        );
    }

    pub fn push_buffer(&self, spec: ValueSpec, phase: PhaseId, position: usize, composition: Composition) {
        self.send(phase, spec, RequestPayload::Buffered { position, composition });
    }

    /// Asks the owner to add `column` to the trap this column crests.
    pub fn add_to_your_trap(&self, column: ColumnId) {
        self.send(PhaseId::FIRST, ValueSpec::AddToYourTrap, RequestPayload::Column(column));
    }
}

impl Drop for ProxyColumn {
    fn drop(&mut self) {
        // the owner may already be gone at teardown
        let rank = self.transport.rank();
        let request = self.request(PhaseId::FIRST, ValueSpec::Deregister, RequestPayload::Rank(rank));
        if let Err(error) = self.transport.send_request(request) {
            log::debug!(
                "deregistering proxy ({}, {}) of reservoir {} failed: {}",
                self.id.i,
                self.id.j,
                self.reservoir_index,
                error
            );
        }
    }
}
