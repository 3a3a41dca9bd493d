/// Flux stage
/// Pushes the migrated mass of each column down its drainage path.
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

#[derive(Default)]
pub struct FluxOp;

impl FluxOp {
    pub fn new() -> Self {
        Self
    }

    pub fn handle() -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new()))
    }
}

impl SimOp for FluxOp {
    fn name(&self) -> &str {
        "Flux"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        if let Err(error) = sim.layers[sim.layer].compute_fluxes() {
            sim.fail(self.name(), error);
        }
    }
}
