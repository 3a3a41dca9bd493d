use thiserror::Error;

use crate::component::PhaseId;
use crate::request::ValueSpec;

/// Errors surfaced by the migration pipeline.
///
/// Tolerance problems (PVT imbalance, clamped storage fractions) are not
/// errors; they are logged and accumulated where they occur.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("property {property} is not available for {scope}")]
    MissingProperty { property: String, scope: String },

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("routing cycle through column ({i}, {j}) for phase {phase:?}")]
    RoutingCycle { i: usize, j: usize, phase: PhaseId },

    #[error("target resolution stalled for phase {phase:?} with {unresolved} unresolved columns")]
    TargetResolutionStalled { phase: PhaseId, unresolved: usize },

    #[error("request {spec:?} for column ({i}, {j}) failed: {reason}")]
    Transport {
        spec: ValueSpec,
        i: usize,
        j: usize,
        reason: String,
    },

    #[error("nested request {spec:?} issued while servicing another request")]
    NestedRequest { spec: ValueSpec },

    #[error("structural invariant violated: {0}")]
    Structural(String),
}

pub type MigrationResult<T> = Result<T, MigrationError>;
