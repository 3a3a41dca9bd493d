// Partitioned reservoirs talking through proxy columns

use std::rc::Rc;

use approx::assert_relative_eq;
use more_asserts::{assert_ge, assert_gt};

use hc_migration::column::{Column, ColumnId};
use hc_migration::component::{ComponentId, PhaseId};
use hc_migration::composition::Composition;
use hc_migration::config::MigrationConfig;
use hc_migration::distributor::SpillDistributor;
use hc_migration::grid::{Partition, RegularGrid};
use hc_migration::mass_balance::MassBalanceLedger;
use hc_migration::property::{GridPropertyField, MemoryPropertyProvider, PropertyKind};
use hc_migration::pvt::ComponentSplitFlash;
use hc_migration::reservoir::ExpulsionMode;
use hc_migration::sim::ReservoirLayer;
use hc_migration::transport::InProcessNetwork;
use hc_migration::ReservoirDefinition;

const NUM_I: usize = 5;
const NUM_J: usize = 3;

/// One trap crested at (1, 1) whose interior reaches into the second
/// partition. Every column expels 1e4 kg of oil over the interval.
fn basin_provider() -> MemoryPropertyProvider {
    let mut tops = vec![30.0; NUM_I * NUM_J];
    tops[NUM_I..2 * NUM_I].copy_from_slice(&[30.0, 5.0, 8.0, 12.0, 30.0]);
    let bottoms: Vec<f64> = tops.iter().map(|top| top + 20.0).collect();
    let expelled = PropertyKind::Expelled(ComponentId::C15PlusSat);
    MemoryPropertyProvider::new()
        .with("Res", PropertyKind::Depth, 0.0, GridPropertyField::from_layers(NUM_I, NUM_J, vec![bottoms, tops]).unwrap())
        .with("Res", PropertyKind::Porosity, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 0.2))
        .with("Res", PropertyKind::Temperature, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 60.0))
        .with("Res", PropertyKind::Pressure, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 20.0))
        .with("Source", expelled, 10.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 0.0))
        .with("Source", expelled, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 2.0))
}

fn definition() -> ReservoirDefinition {
    ReservoirDefinition::new("Res", "Res").with_source_rock("Source", ExpulsionMode::SingleDirection)
}

fn grid() -> RegularGrid {
    RegularGrid::new(NUM_I, NUM_J, 100.0, 100.0).unwrap()
}

fn partitioned_layer() -> (ReservoirLayer, Rc<InProcessNetwork>) {
    let network = InProcessNetwork::new(Partition::strips_along_i(NUM_I, NUM_J, 2).unwrap());
    let layer = ReservoirLayer::partitioned(0, definition(), MigrationConfig::default(), &grid(), &network).unwrap();
    (layer, network)
}

fn run_interval(layer: &ReservoirLayer, provider: &MemoryPropertyProvider, ledger: &mut MassBalanceLedger) {
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(provider).unwrap();
    layer.compute_routing(ledger).unwrap();
    layer.collect_charges(provider, None).unwrap();
    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, ledger)
        .unwrap();
    layer.compute_fluxes().unwrap();
}

#[test]
fn test_partitioned_run_matches_the_whole_grid() {
    println!("🧩 Testing a two-partition run against the single-partition run");

    let provider = basin_provider();

    let whole = ReservoirLayer::whole(0, definition(), MigrationConfig::default(), grid()).unwrap();
    let mut whole_ledger = MassBalanceLedger::new();
    run_interval(&whole, &provider, &mut whole_ledger);

    let (split, network) = partitioned_layer();
    let mut split_ledger = MassBalanceLedger::new();
    run_interval(&split, &provider, &mut split_ledger);

    let whole_stored = whole.total_stored_charges().weight();
    let split_stored = split.total_stored_charges().weight();
    println!("   Whole grid: {} traps, {:.4e} kg", whole.trap_count(), whole_stored);
    println!("   Two partitions: {} traps, {:.4e} kg, {} requests", split.trap_count(), split_stored, network.request_count());

    assert_eq!(split.partition_count(), 2);
    assert_eq!(whole.trap_count(), 1);
    assert_eq!(split.trap_count(), 1);
    assert_relative_eq!(whole_stored, 1.5e5, max_relative = 1e-9);
    assert_relative_eq!(split_stored, whole_stored, max_relative = 1e-9);
    assert_gt!(network.request_count(), 0);

    // the trap lives with its crest
    assert_eq!(split.partition(0).traps().len(), 1);
    assert!(split.partition(1).traps().is_empty());

    // fill depths reached the interior columns on the other rank
    let remote = split.partition(1);
    let interior = remote.columns().local(ColumnId::new(2, 1)).unwrap();
    let local = whole.partition(0);
    let reference = local.columns().local(ColumnId::new(2, 1)).unwrap();
    for phase in PhaseId::ALL {
        assert_relative_eq!(interior.fill_depth(phase), reference.fill_depth(phase), max_relative = 1e-9);
    }
    assert_relative_eq!(interior.flux(), reference.flux(), max_relative = 1e-9);

    println!("   ✅ Partitioning does not change the result");
}

#[test]
fn test_static_reads_are_cached_until_reset() {
    println!("🗄️ Testing proxy caching and owner resets");

    let provider = basin_provider();
    let (layer, network) = partitioned_layer();
    let mut ledger = MassBalanceLedger::new();
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(&provider).unwrap();
    layer.compute_routing(&mut ledger).unwrap();

    let crest = ColumnId::new(1, 1);
    let read_top = || {
        let remote = layer.partition(1);
        let column = remote.columns().get(crest).unwrap();
        assert!(matches!(column, Column::Proxy(_)));
        column.top_depth()
    };

    assert_eq!(read_top(), 5.0);
    let cached = network.request_count();
    assert_eq!(read_top(), 5.0);
    println!("   Requests after a repeated read: {} -> {}", cached, network.request_count());
    assert_eq!(network.request_count(), cached);

    // the owner moves the crest up; the copy stays until the reset arrives
    layer.partition_mut(0).columns_mut().local_mut(crest).unwrap().set_top_depth(3.0);
    assert_eq!(read_top(), 5.0);
    assert_eq!(network.request_count(), cached);

    assert_ge!(layer.deliver_resets().unwrap(), 1);
    assert_eq!(network.pending_resets(), 0);

    let top = read_top();
    println!("   Owner top 3 m, proxy reads {} m after {} requests", top, network.request_count());
    assert_eq!(top, 3.0);
    assert_eq!(network.request_count(), cached + 1);

    // the new value is cached again
    assert_eq!(read_top(), 3.0);
    assert_eq!(network.request_count(), cached + 1);

    println!("   ✅ A reset forces one fresh request that sees the new depth");
}

#[test]
fn test_depth_written_through_a_proxy_resets_every_copy() {
    println!("📏 Testing a depth written from another partition");

    let provider = basin_provider();
    let (layer, network) = partitioned_layer();
    let mut ledger = MassBalanceLedger::new();
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(&provider).unwrap();
    layer.compute_routing(&mut ledger).unwrap();

    let crest = ColumnId::new(1, 1);
    {
        let remote = layer.partition(1);
        let Some(Column::Proxy(proxy)) = remote.columns().get(crest) else {
            panic!("(1, 1) should be a proxy on the second partition");
        };
        assert_eq!(proxy.bottom_depth(), 25.0);
        proxy.set_bottom_depth(27.0);
    }
    println!("   {} resets queued by the owner", network.pending_resets());
    assert_ge!(network.pending_resets(), 1);
    layer.deliver_resets().unwrap();

    let owner = layer.partition(0);
    assert_eq!(owner.columns().local(crest).unwrap().bottom_depth(), 27.0);
    let remote = layer.partition(1);
    assert_eq!(remote.columns().get(crest).unwrap().bottom_depth(), 27.0);
    assert_eq!(remote.columns().get(crest).unwrap().thickness(), 22.0);

    println!("   ✅ Owner and proxy agree on the new bottom");
}

#[test]
fn test_volatile_reads_always_ask_the_owner() {
    println!("📡 Testing that volatile proxy reads are never cached");

    let provider = basin_provider();
    let (layer, network) = partitioned_layer();
    let mut ledger = MassBalanceLedger::new();
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(&provider).unwrap();
    layer.compute_routing(&mut ledger).unwrap();

    let remote = layer.partition(1);
    let Some(Column::Proxy(crest)) = remote.columns().get(ColumnId::new(1, 1)) else {
        panic!("(1, 1) should be a proxy on the second partition");
    };

    let before = network.request_count();
    let first = crest.global_trap_id();
    let second = crest.global_trap_id();
    assert!(crest.has_trap());
    println!("   Global trap id {} read twice, {} requests", first, network.request_count() - before);

    assert_eq!(first, second);
    assert_ge!(first, 0);
    assert_eq!(network.request_count(), before + 3);

    println!("   ✅ Every volatile read reached the owner");
}

#[test]
fn test_writes_through_a_proxy_land_on_the_owner() {
    println!("✍️ Testing forwarded writes");

    let provider = basin_provider();
    let (layer, network) = partitioned_layer();
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(&provider).unwrap();

    let charge = Composition::from_masses(&[(ComponentId::C1, 42.0)]);
    {
        let first = layer.partition(0);
        let Some(Column::Proxy(remote)) = first.columns().get(ColumnId::new(2, 1)) else {
            panic!("(2, 1) should be a proxy on the first partition");
        };
        remote.add_composition_to_be_migrated(&charge);
        remote.add_flux(1.0e4);
    }
    println!("   {} requests served", network.request_count());

    let owner = layer.partition(1);
    let column = owner.columns().local(ColumnId::new(2, 1)).unwrap();
    assert_relative_eq!(column.to_be_migrated().weight(), 42.0);
    assert_relative_eq!(column.flux(), 1.0);

    println!("   ✅ The owning partition holds the written values");
}
