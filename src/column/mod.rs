// Grid columns of one reservoir: owned, mirrored and the array holding both

pub mod column_array;
pub mod local_column;
pub mod proxy_column;

pub use column_array::ColumnArray;
pub use local_column::{BufferKind, LocalColumn, PasteurizationStatus};
pub use proxy_column::ProxyColumn;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::component::PhaseId;
use crate::constants::MINIMUM_THICKNESS;

/// Global grid coordinates of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    pub i: usize,
    pub j: usize,
}

impl ColumnId {
    pub fn new(i: usize, j: usize) -> Self {
        ColumnId { i, j }
    }

    /// The column `scale` steps along `(di, dj)`, if its indices stay
    /// non-negative. Upper bounds are the array's business.
    pub fn offset(&self, (di, dj): (isize, isize), scale: isize) -> Option<ColumnId> {
        let i = self.i as isize + di * scale;
        let j = self.j as isize + dj * scale;
        if i < 0 || j < 0 {
            None
        } else {
            Some(ColumnId::new(i as usize, j as usize))
        }
    }
}

/// Fault classification of a column as stored in the fault map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaultStatus {
    #[default]
    NoFault,
    Seal,
    Pass,
    Waste,
    /// Gas leaks, oil is held.
    SealOil,
    /// Gas leaks, oil passes.
    PassOil,
}

impl FaultStatus {
    pub fn code(&self) -> i32 {
        match self {
            FaultStatus::NoFault => 0,
            FaultStatus::Seal => 1,
            FaultStatus::Pass => 2,
            FaultStatus::Waste => 3,
            FaultStatus::SealOil => 4,
            FaultStatus::PassOil => 5,
        }
    }

    /// Undefined and unknown map values mean no fault.
    pub fn from_code(value: f64, undefined_value: f64) -> Self {
        if value == undefined_value {
            return FaultStatus::NoFault;
        }
        match value.round() as i32 {
            1 => FaultStatus::Seal,
            2 => FaultStatus::Pass,
            3 => FaultStatus::Waste,
            4 => FaultStatus::SealOil,
            5 => FaultStatus::PassOil,
            _ => FaultStatus::NoFault,
        }
    }

    /// Per-phase (sealing, wasting) overrides implied by the fault, or
    /// `None` where the fault leaves the phase alone.
    pub fn phase_effect(&self, phase: PhaseId) -> Option<(bool, bool)> {
        match (self, phase) {
            (FaultStatus::Seal, _) => Some((true, false)),
            (FaultStatus::Waste, _) => Some((false, true)),
            (FaultStatus::SealOil, PhaseId::Gas) => Some((false, true)),
            (FaultStatus::SealOil, PhaseId::Oil) => Some((true, false)),
            (FaultStatus::PassOil, PhaseId::Gas) => Some((false, true)),
            _ => None,
        }
    }
}

/// Read view over either kind of column. Local reads are direct; proxy
/// reads go through the proxy's cache.
#[derive(Clone, Copy)]
pub enum Column<'a> {
    Local(&'a LocalColumn),
    Proxy(&'a ProxyColumn),
}

impl<'a> Column<'a> {
    pub fn id(&self) -> ColumnId {
        match self {
            Column::Local(c) => c.id(),
            Column::Proxy(p) => p.id(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Column::Local(_))
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Column::Local(c) => c.is_valid(),
            Column::Proxy(p) => p.is_valid(),
        }
    }

    pub fn top_depth(&self) -> f64 {
        match self {
            Column::Local(c) => c.top_depth(),
            Column::Proxy(p) => p.top_depth(),
        }
    }

    pub fn bottom_depth(&self) -> f64 {
        match self {
            Column::Local(c) => c.bottom_depth(),
            Column::Proxy(p) => p.bottom_depth(),
        }
    }

    pub fn thickness(&self) -> f64 {
        match self {
            Column::Local(c) => c.thickness(),
            Column::Proxy(p) => p.thickness(),
        }
    }

    pub fn is_sealing(&self, phase: PhaseId) -> bool {
        match self {
            Column::Local(c) => c.is_sealing(phase),
            Column::Proxy(p) => p.is_sealing(phase),
        }
    }

    pub fn is_wasting(&self, phase: PhaseId) -> bool {
        match self {
            Column::Local(c) => c.is_wasting(phase),
            Column::Proxy(p) => p.is_wasting(phase),
        }
    }

    pub fn is_sealing_any(&self) -> bool {
        PhaseId::ALL.iter().any(|&phase| self.is_sealing(phase))
    }

    pub fn is_thin(&self) -> bool {
        self.thickness() < MINIMUM_THICKNESS
    }

    pub fn adjacent_column(&self, phase: PhaseId) -> Option<ColumnId> {
        match self {
            Column::Local(c) => c.adjacent_column(phase),
            Column::Proxy(p) => p.adjacent_column(phase),
        }
    }

    /// `None` when the owner has not resolved it yet.
    pub fn target_column(&self, phase: PhaseId) -> Option<ColumnId> {
        match self {
            Column::Local(c) => c.target_column(phase),
            Column::Proxy(p) => p.target_column(phase),
        }
    }

    pub fn global_trap_id(&self) -> i32 {
        match self {
            Column::Local(c) => c.global_trap_id(),
            Column::Proxy(p) => p.global_trap_id(),
        }
    }

    pub fn net_to_gross(&self) -> f64 {
        match self {
            Column::Local(c) => c.net_to_gross(),
            Column::Proxy(p) => p.net_to_gross(),
        }
    }

    pub fn porosity(&self) -> f64 {
        match self {
            Column::Local(c) => c.porosity(),
            Column::Proxy(p) => p.porosity(),
        }
    }

    pub fn fault_status(&self) -> FaultStatus {
        match self {
            Column::Local(c) => c.fault_status(),
            Column::Proxy(p) => p.fault_status(),
        }
    }

    pub fn capacity(&self, spill_depth: f64) -> f64 {
        match self {
            Column::Local(c) => c.capacity(spill_depth),
            Column::Proxy(p) => p.capacity(spill_depth),
        }
    }

    /// Depth used for ordering: the bottom of a sealing column, the top
    /// otherwise.
    pub fn ordering_depth(&self) -> f64 {
        if self.is_sealing_any() {
            self.bottom_depth()
        } else {
            self.top_depth()
        }
    }

    /// `Less` when this column is shallower than `other`. With the
    /// tie-breaker, equal depths are ordered by larger `i + j`, then larger
    /// `i`, then larger `j` first, which makes the order strict for
    /// distinct columns.
    pub fn compare_depths(&self, other: &Column, use_tie_breaker: bool) -> Ordering {
        let depth = self.ordering_depth();
        let other_depth = other.ordering_depth();

        if depth < other_depth {
            return Ordering::Less;
        }
        if depth > other_depth {
            return Ordering::Greater;
        }
        if !use_tie_breaker {
            return Ordering::Equal;
        }

        let (a, b) = (self.id(), other.id());
        (b.i + b.j)
            .cmp(&(a.i + a.j))
            .then(b.i.cmp(&a.i))
            .then(b.j.cmp(&a.j))
    }

    pub fn is_shallower_than(&self, other: &Column) -> bool {
        self.compare_depths(other, true) == Ordering::Less
    }

    pub fn is_deeper_than(&self, other: &Column, use_tie_breaker: bool) -> bool {
        self.compare_depths(other, use_tie_breaker) == Ordering::Greater
    }
}
