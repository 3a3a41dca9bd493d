/// Charge collection stage
/// Expelled charge of the source rocks over the interval, plus whatever
/// leaked out of the reservoir below.
use std::rc::Rc;

use crate::property::PropertyProvider;
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

pub struct ChargeOp {
    provider: Rc<dyn PropertyProvider>,
}

impl ChargeOp {
    pub fn new(provider: Rc<dyn PropertyProvider>) -> Self {
        Self { provider }
    }

    pub fn handle(provider: Rc<dyn PropertyProvider>) -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new(provider)))
    }
}

impl SimOp for ChargeOp {
    fn name(&self) -> &str {
        "ChargeCollection"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        let result = sim.layers[sim.layer].collect_charges(self.provider.as_ref(), sim.layer_below());
        if let Err(error) = result {
            sim.fail(self.name(), error);
        }
    }
}
