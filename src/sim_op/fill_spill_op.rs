/// Migration and fill-and-spill stage
/// Flashes the collected charge, moves it to its targets and fills the
/// traps until nothing is left to distribute. With an overburden provider
/// the traps also lose gas by diffusion and are filled again.
use crate::diffusion::OverburdenProvider;
use crate::distributor::{Distributor, SpillDistributor};
use crate::pvt::PvtFlash;
use crate::sim::simulation::Simulation;
use crate::sim_op::{SimOp, SimOpHandle};

pub struct FillSpillOp {
    flash: Box<dyn PvtFlash>,
    distributor: Box<dyn Distributor>,
    overburden: Option<Box<dyn OverburdenProvider>>,
}

impl FillSpillOp {
    pub fn new(flash: Box<dyn PvtFlash>) -> Self {
        Self {
            flash,
            distributor: Box::new(SpillDistributor::new()),
            overburden: None,
        }
    }

    pub fn with_distributor(mut self, distributor: Box<dyn Distributor>) -> Self {
        self.distributor = distributor;
        self
    }

    pub fn with_overburden(mut self, overburden: Box<dyn OverburdenProvider>) -> Self {
        self.overburden = Some(overburden);
        self
    }

    pub fn handle(self) -> SimOpHandle {
        SimOpHandle::new(Box::new(self))
    }
}

impl SimOp for FillSpillOp {
    fn name(&self) -> &str {
        "FillAndSpill"
    }

    fn update_sim(&mut self, sim: &mut Simulation) {
        let result = sim.layers[sim.layer].migrate_and_fill(
            self.flash.as_ref(),
            self.distributor.as_ref(),
            self.overburden.as_deref(),
            sim.sink.as_mut(),
        );
        if let Err(error) = result {
            sim.fail(self.name(), error);
        }
    }
}
