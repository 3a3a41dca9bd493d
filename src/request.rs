// Column request/response records exchanged between partitions

use serde::{Deserialize, Serialize};

use crate::column::ColumnId;
use crate::component::PhaseId;
use crate::composition::Composition;

/// Flat tag space of column requests: getters, setters, column references,
/// composition transfers, buffered contributions and cache control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueSpec {
    // getters
    TopDepth,
    BottomDepth,
    Thickness,
    NetToGross,
    Porosity,
    PorosityPercentage,
    Permeability,
    Pressure,
    Temperature,
    Capacity,
    FaultStatus,
    IsSealing,
    IsWasting,
    IsValid,
    GlobalTrapId,
    DrainageAreaId,
    FillDepth,
    ChargeDensity,
    LateralChargeDensity,
    Flux,
    Flow,
    Migrated,
    IsSpilling,
    IsUndersized,
    HasTrap,
    PasteurizationStatus,
    DiffusionStartTime,
    PenetrationDistance,
    ImmobilesVolume,
    OwcTemperature,
    // setters
    SetGlobalTrapId,
    SetTopDepth,
    SetBottomDepth,
    SetFillDepth,
    SetChargeDensity,
    SetPasteurizationStatus,
    SetDiffusionStartTime,
    SetPenetrationDistance,
    AddMigrated,
    AddFlux,
    // column references
    AdjacentColumn,
    TargetColumn,
    FinalTargetColumn,
    SpillTarget,
    FinalSpillTarget,
    TrapSpillColumn,
    // compositions
    GetCharges,
    AddCompositionToBeMigrated,
    SetChargesToBeMigrated,
    // buffered contributions
    IncreaseBufferTarget,
    IncreaseBufferWaste,
    IncreaseBufferSpill,
    IncreaseBufferMerge,
    // control
    AddToYourTrap,
    ResetProxy,
    Register,
    Deregister,
}

impl ValueSpec {
    /// Wire-level name of the tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSpec::TopDepth => "TOPDEPTH",
            ValueSpec::BottomDepth => "BOTTOMDEPTH",
            ValueSpec::Thickness => "THICKNESS",
            ValueSpec::NetToGross => "NETTOGROSS",
            ValueSpec::Porosity => "POROSITY",
            ValueSpec::PorosityPercentage => "POROSITYPERCENTAGE",
            ValueSpec::Permeability => "PERMEABILITY",
            ValueSpec::Pressure => "PRESSURE",
            ValueSpec::Temperature => "TEMPERATURE",
            ValueSpec::Capacity => "CAPACITY",
            ValueSpec::FaultStatus => "FAULTSTATUS",
            ValueSpec::IsSealing => "ISSEALING",
            ValueSpec::IsWasting => "ISWASTING",
            ValueSpec::IsValid => "ISVALID",
            ValueSpec::GlobalTrapId => "GLOBALTRAPID",
            ValueSpec::DrainageAreaId => "DRAINAGEAREAID",
            ValueSpec::FillDepth => "FILLDEPTH",
            ValueSpec::ChargeDensity => "CHARGEDENSITY",
            ValueSpec::LateralChargeDensity => "LATERALCHARGEDENSITY",
            ValueSpec::Flux => "FLUX",
            ValueSpec::Flow => "FLOW",
            ValueSpec::Migrated => "MIGRATED",
            ValueSpec::IsSpilling => "ISSPILLING",
            ValueSpec::IsUndersized => "ISUNDERSIZED",
            ValueSpec::HasTrap => "HASTRAP",
            ValueSpec::PasteurizationStatus => "PASTEURIZATIONSTATUS",
            ValueSpec::DiffusionStartTime => "DIFFUSIONSTARTTIME",
            ValueSpec::PenetrationDistance => "PENETRATIONDISTANCE",
            ValueSpec::ImmobilesVolume => "IMMOBILESVOLUME",
            ValueSpec::OwcTemperature => "OWCTEMPERATURE",
            ValueSpec::SetGlobalTrapId => "SETGLOBALTRAPID",
            ValueSpec::SetTopDepth => "SETTOPDEPTH",
            ValueSpec::SetBottomDepth => "SETBOTTOMDEPTH",
            ValueSpec::SetFillDepth => "SETFILLDEPTH",
            ValueSpec::SetChargeDensity => "SETCHARGEDENSITY",
            ValueSpec::SetPasteurizationStatus => "SETPASTEURIZATIONSTATUS",
            ValueSpec::SetDiffusionStartTime => "SETDIFFUSIONSTARTTIME",
            ValueSpec::SetPenetrationDistance => "SETPENETRATIONDISTANCE",
            ValueSpec::AddMigrated => "ADDMIGRATED",
            ValueSpec::AddFlux => "ADDFLUX",
            ValueSpec::AdjacentColumn => "ADJACENTCOLUMN",
            ValueSpec::TargetColumn => "TARGETCOLUMN",
            ValueSpec::FinalTargetColumn => "FINALTARGETCOLUMN",
            ValueSpec::SpillTarget => "SPILLTARGET",
            ValueSpec::FinalSpillTarget => "FINALSPILLTARGET",
            ValueSpec::TrapSpillColumn => "TRAPSPILLCOLUMN",
            ValueSpec::GetCharges => "GETCHARGES",
            ValueSpec::AddCompositionToBeMigrated => "ADDCOMPOSITIONTOBEMIGRATED",
            ValueSpec::SetChargesToBeMigrated => "SETCHARGESTOBEMIGRATED",
            ValueSpec::IncreaseBufferTarget => "INCREASEBUFFERTARGET",
            ValueSpec::IncreaseBufferWaste => "INCREASEBUFFERWASTE",
            ValueSpec::IncreaseBufferSpill => "INCREASEBUFFERSPILL",
            ValueSpec::IncreaseBufferMerge => "INCREASEBUFFEMERGE",
            ValueSpec::AddToYourTrap => "ADDTOYOURTRAP",
            ValueSpec::ResetProxy => "RESETPROXY",
            ValueSpec::Register => "REGISTER",
            ValueSpec::Deregister => "DEREGISTER",
        }
    }

    /// Setters, transfers and control requests change the owner's state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ValueSpec::SetGlobalTrapId
                | ValueSpec::SetTopDepth
                | ValueSpec::SetBottomDepth
                | ValueSpec::SetFillDepth
                | ValueSpec::SetChargeDensity
                | ValueSpec::SetPasteurizationStatus
                | ValueSpec::SetDiffusionStartTime
                | ValueSpec::SetPenetrationDistance
                | ValueSpec::AddMigrated
                | ValueSpec::AddFlux
                | ValueSpec::AddCompositionToBeMigrated
                | ValueSpec::SetChargesToBeMigrated
                | ValueSpec::IncreaseBufferTarget
                | ValueSpec::IncreaseBufferWaste
                | ValueSpec::IncreaseBufferSpill
                | ValueSpec::IncreaseBufferMerge
                | ValueSpec::AddToYourTrap
                | ValueSpec::ResetProxy
                | ValueSpec::Register
                | ValueSpec::Deregister
        )
    }
}

/// Arguments carried with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    None,
    Value(f64),
    Composition(Composition),
    /// A contribution keyed by the sender's canonical position.
    Buffered { position: usize, composition: Composition },
    Column(ColumnId),
    /// A value for one slot of an indexed property.
    Indexed { index: usize, value: f64 },
    /// Requesting rank, for registration and proxy resets.
    Rank(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRequest {
    pub reservoir_index: usize,
    pub i: usize,
    pub j: usize,
    pub phase: PhaseId,
    pub spec: ValueSpec,
    pub payload: RequestPayload,
}

impl ColumnRequest {
    pub fn new(reservoir_index: usize, id: ColumnId, phase: PhaseId, spec: ValueSpec) -> Self {
        ColumnRequest {
            reservoir_index,
            i: id.i,
            j: id.j,
            phase,
            spec,
            payload: RequestPayload::None,
        }
    }

    pub fn with_payload(mut self, payload: RequestPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn column(&self) -> ColumnId {
        ColumnId::new(self.i, self.j)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseValue {
    None,
    Value(f64),
    Column(Option<ColumnId>),
    Composition(Composition),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnResponse {
    pub reservoir_index: usize,
    pub i: usize,
    pub j: usize,
    pub spec: ValueSpec,
    pub value: ResponseValue,
}

impl ColumnResponse {
    pub fn to(request: &ColumnRequest, value: ResponseValue) -> Self {
        ColumnResponse {
            reservoir_index: request.reservoir_index,
            i: request.i,
            j: request.j,
            spec: request.spec,
            value,
        }
    }

    /// The scalar answer. Any other shape is a protocol mismatch.
    pub fn expect_value(&self) -> f64 {
        match &self.value {
            ResponseValue::Value(value) => *value,
            other => panic!(
                "{} response for column ({}, {}) carries {:?}, expected a value",
                self.spec.as_str(),
                self.i,
                self.j,
                other
            ),
        }
    }

    pub fn expect_flag(&self) -> bool {
        self.expect_value() != 0.0
    }

    pub fn expect_column(&self) -> Option<ColumnId> {
        match &self.value {
            ResponseValue::Column(column) => *column,
            other => panic!(
                "{} response for column ({}, {}) carries {:?}, expected a column",
                self.spec.as_str(),
                self.i,
                self.j,
                other
            ),
        }
    }

    pub fn expect_composition(self) -> Composition {
        match self.value {
            ResponseValue::Composition(composition) => composition,
            other => panic!(
                "{} response for column ({}, {}) carries {:?}, expected a composition",
                self.spec.as_str(),
                self.i,
                self.j,
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_for_the_wire() {
        let request = ColumnRequest::new(2, ColumnId::new(4, 7), PhaseId::Oil, ValueSpec::IncreaseBufferSpill)
            .with_payload(RequestPayload::Buffered {
                position: 74,
                composition: Composition::new(),
            });
        let json = serde_json::to_string(&request).unwrap();
        let back: ColumnRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
        assert_eq!(back.column(), ColumnId::new(4, 7));
    }

    #[test]
    fn test_mutation_tags() {
        assert!(ValueSpec::SetTopDepth.is_mutation());
        assert!(ValueSpec::IncreaseBufferMerge.is_mutation());
        assert!(!ValueSpec::TopDepth.is_mutation());
        assert!(!ValueSpec::FinalSpillTarget.is_mutation());
        assert_eq!(ValueSpec::IncreaseBufferMerge.as_str(), "INCREASEBUFFEMERGE");
    }

    #[test]
    #[should_panic(expected = "expected a column")]
    fn test_wrong_response_shape_panics() {
        let request = ColumnRequest::new(0, ColumnId::new(0, 0), PhaseId::Gas, ValueSpec::TargetColumn);
        ColumnResponse::to(&request, ResponseValue::Value(1.0)).expect_column();
    }
}
