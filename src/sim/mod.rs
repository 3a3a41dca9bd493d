pub mod layer;
pub mod simulation;

pub use layer::ReservoirLayer;
pub use simulation::{OpTiming, SimProps, Simulation, StageOutcome};
