/// Routing stage
/// Adjacent and target columns for both phases, then the traps: tops,
/// extents and, when configured, undersized merges.
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

#[derive(Default)]
pub struct RoutingOp;

impl RoutingOp {
    pub fn new() -> Self {
        Self
    }

    pub fn handle() -> SimOpHandle {
        SimOpHandle::new(Box::new(Self::new()))
    }
}

impl SimOp for RoutingOp {
    fn name(&self) -> &str {
        "Routing"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        let result = sim.layers[sim.layer].compute_routing(sim.sink.as_mut());
        match result {
            Ok(()) => {
                if sim.debug {
                    let layer = &sim.layers[sim.layer];
                    log::debug!("{}: {} traps after routing", layer.name(), layer.trap_count());
                }
            }
            Err(error) => sim.fail(self.name(), error),
        }
    }
}
