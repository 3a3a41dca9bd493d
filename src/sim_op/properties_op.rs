/// Property stage
/// Loads the end-of-interval properties into every column of the current
/// reservoir, updates the barrier, then marks thin and faulted columns.
use std::rc::Rc;

use crate::property::PropertyProvider;
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

pub struct PropertiesOp {
    provider: Rc<dyn PropertyProvider>,
}

impl PropertiesOp {
    pub fn new(provider: Rc<dyn PropertyProvider>) -> Self {
        Self { provider }
    }

    pub fn handle(provider: Rc<dyn PropertyProvider>) -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new(provider)))
    }
}

impl SimOp for PropertiesOp {
    fn name(&self) -> &str {
        "Properties"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        if let Err(error) = sim.layers[sim.layer].compute_properties(self.provider.as_ref()) {
            sim.fail(self.name(), error);
        }
    }
}
