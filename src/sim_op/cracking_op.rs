/// Cracking stage
/// Runs the oil-to-gas cracker over the charge waiting to migrate. Does
/// nothing for reservoirs with cracking disabled.
use crate::cracking::OilToGasCracker;
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

pub struct CrackingOp {
    cracker: Box<dyn OilToGasCracker>,
}

impl CrackingOp {
    pub fn new(cracker: Box<dyn OilToGasCracker>) -> Self {
        Self { cracker }
    }

    pub fn handle(cracker: Box<dyn OilToGasCracker>) -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new(cracker)))
    }
}

impl SimOp for CrackingOp {
    fn name(&self) -> &str {
        "Cracking"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        let layer = &sim.layers[sim.layer];
        if !layer.config().cracking_enabled {
            return;
        }
        if let Err(error) = layer.crack_charges(self.cracker.as_ref(), sim.sink.as_mut()) {
            sim.fail(self.name(), error);
        }
    }
}
