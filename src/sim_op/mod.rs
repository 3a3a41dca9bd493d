// Pipeline stages, in the order a run normally lists them
pub mod properties_op;
pub mod routing_op;
pub mod charge_op;
pub mod cracking_op;
pub mod fill_spill_op;
pub mod flux_op;
pub mod reporting_op;

pub use charge_op::ChargeOp;
pub use cracking_op::CrackingOp;
pub use fill_spill_op::FillSpillOp;
pub use flux_op::FluxOp;
pub use properties_op::PropertiesOp;
pub use reporting_op::{ReportRow, ReportingOp};
pub use routing_op::RoutingOp;

use crate::sim::simulation::Simulation;

pub trait SimOp {
    /// The name of this operator (for identification and lookup)
    fn name(&self) -> &str;

    /// Called once at the beginning of the simulation
    fn init_sim(&mut self, _sim: &mut Simulation) {
        // Default implementation does nothing
    }

    /// Called for every reservoir in every snapshot interval
    fn update_sim(&mut self, _sim: &mut Simulation) {
        // Default implementation does nothing
    }

    /// Called once at the end of the simulation
    fn after_sim(&mut self, _sim: &mut Simulation) {
        // Default implementation does nothing
    }
}

pub struct SimOpHandle {
    pub op: Box<dyn SimOp>,
}

impl SimOpHandle {
    /// Create a new SimOpHandle with the given operation
    pub fn new(op: Box<dyn SimOp>) -> Self {
        SimOpHandle { op }
    }

    /// Execute the operation on the simulation
    pub fn execute(&mut self, sim: &mut Simulation) {
        self.op.update_sim(sim);
    }
}
