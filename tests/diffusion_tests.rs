// Gas lost through the overburden of a trap during fill and spill

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use more_asserts::assert_gt;

use hc_migration::component::ComponentId;
use hc_migration::config::{DiffusionConfig, MigrationConfig};
use hc_migration::constants::REFERENCE_WATER_VISCOSITY;
use hc_migration::diffusion::{DiffusionOverburden, OverburdenProp, UniformOverburden};
use hc_migration::distributor::SpillDistributor;
use hc_migration::grid::RegularGrid;
use hc_migration::mass_balance::{MassBalanceKind, MassBalanceRecord, MassBalanceSink};
use hc_migration::property::{GridPropertyField, MemoryPropertyProvider, PropertyKind, PropertyProvider};
use hc_migration::pvt::ComponentSplitFlash;
use hc_migration::reservoir::ExpulsionMode;
use hc_migration::sim::{ReservoirLayer, SimProps, Simulation};
use hc_migration::sim_op::{ChargeOp, FillSpillOp, PropertiesOp, ReportingOp, RoutingOp};
use hc_migration::ReservoirDefinition;

const NUM_I: usize = 5;
const NUM_J: usize = 3;

struct RecordingSink(Rc<RefCell<Vec<MassBalanceRecord>>>);

impl MassBalanceSink for RecordingSink {
    fn report(&mut self, record: &MassBalanceRecord) {
        self.0.borrow_mut().push(record.clone());
    }
}

/// One trap crested at (1, 1), charged with methane from below.
fn gas_provider() -> MemoryPropertyProvider {
    let mut tops = vec![30.0; NUM_I * NUM_J];
    tops[NUM_I..2 * NUM_I].copy_from_slice(&[30.0, 5.0, 8.0, 12.0, 30.0]);
    let bottoms: Vec<f64> = tops.iter().map(|top| top + 20.0).collect();
    let expelled = PropertyKind::Expelled(ComponentId::C1);
    MemoryPropertyProvider::new()
        .with("Res", PropertyKind::Depth, 0.0, GridPropertyField::from_layers(NUM_I, NUM_J, vec![bottoms, tops]).unwrap())
        .with("Res", PropertyKind::Porosity, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 0.2))
        .with("Res", PropertyKind::Temperature, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 60.0))
        .with("Res", PropertyKind::Pressure, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 20.0))
        .with("Source", expelled, 10.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 0.0))
        .with("Source", expelled, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 2.0))
}

/// 50 m of shale over every crest.
fn shale() -> UniformOverburden {
    UniformOverburden::new(DiffusionOverburden::new(
        vec![OverburdenProp::new(50.0, 0.1, 55.0, REFERENCE_WATER_VISCOSITY)],
        1050.0,
    ))
}

fn gas_run(diffusion: bool, records: &Rc<RefCell<Vec<MassBalanceRecord>>>) -> Simulation {
    let config = MigrationConfig {
        diffusion: DiffusionConfig {
            enabled: diffusion,
            ..DiffusionConfig::default()
        },
        ..MigrationConfig::default()
    };
    let grid = RegularGrid::new(NUM_I, NUM_J, 100.0, 100.0).unwrap();
    let definition = ReservoirDefinition::new("Res", "Res").with_source_rock("Source", ExpulsionMode::SingleDirection);
    let provider: Rc<dyn PropertyProvider> = Rc::new(gas_provider());

    let fill_spill = FillSpillOp::new(Box::new(ComponentSplitFlash::new()))
        .with_distributor(Box::new(SpillDistributor::new()))
        .with_overburden(Box::new(shale()));

    let mut sim = Simulation::new(SimProps {
        name: "diffusion",
        layers: vec![ReservoirLayer::whole(0, definition, config, grid).unwrap()],
        ages: vec![10.0, 0.0],
        ops: vec![
            PropertiesOp::handle(Rc::clone(&provider)),
            RoutingOp::handle(),
            ChargeOp::handle(Rc::clone(&provider)),
            fill_spill.handle(),
            ReportingOp::printing().handle(),
        ],
        sink: Some(Box::new(RecordingSink(Rc::clone(records)))),
        debug: false,
    });
    sim.run();
    sim
}

fn diffusion_loss(records: &[MassBalanceRecord]) -> f64 {
    records
        .iter()
        .filter(|record| record.kind == MassBalanceKind::DiffusionLoss)
        .map(|record| record.composition.weight())
        .sum()
}

#[test]
fn test_diffusion_removes_gas_from_the_trap() {
    println!("💨 Testing methane loss through a 50 m shale seal");

    let sealed_records = Rc::new(RefCell::new(Vec::new()));
    let sealed = gas_run(false, &sealed_records);
    let leaky_records = Rc::new(RefCell::new(Vec::new()));
    let leaky = gas_run(true, &leaky_records);

    assert!(sealed.all_succeeded());
    assert!(leaky.all_succeeded());

    let without = sealed.layers[0].total_stored_charges().weight();
    let with = leaky.layers[0].total_stored_charges().weight();
    let lost = diffusion_loss(&leaky_records.borrow());
    println!("   Stored without diffusion: {:.4e} kg", without);
    println!("   Stored with diffusion: {:.4e} kg, lost {:.4e} kg", with, lost);

    assert_gt!(without, 0.0);
    assert_gt!(lost, 0.0);
    assert_relative_eq!(with + lost, without, max_relative = 1e-9);

    // the trap keeps its own tally of what left it
    let reservoir = leaky.layers[0].partition(0);
    let trap = reservoir.traps().iter().next().unwrap();
    assert_relative_eq!(trap.diffusion_leaked().weight(), lost, max_relative = 1e-9);
    assert!(
        trap.diffusion_leaked()
            .iter()
            .filter(|&(_, mass)| mass > 0.0)
            .all(|(id, _)| ComponentId::DIFFUSING.contains(&id))
    );

    println!("   ✅ Every kilogram lost by diffusion is booked");
}

#[test]
fn test_disabled_diffusion_books_nothing() {
    println!("🧱 Testing that an overburden alone does not leak");

    let records = Rc::new(RefCell::new(Vec::new()));
    let sim = gas_run(false, &records);

    assert!(sim.all_succeeded());
    assert_eq!(diffusion_loss(&records.borrow()), 0.0);
    let reservoir = sim.layers[0].partition(0);
    for trap in reservoir.traps().iter() {
        assert!(trap.diffusion_leaked().is_empty());
    }

    println!("   ✅ No diffusion records");
}
