// Single-trap scenarios on a three-column strip, driven through a whole layer

use approx::assert_abs_diff_eq;
use more_asserts::assert_gt;

use hc_migration::component::{ComponentId, PhaseId};
use hc_migration::config::MigrationConfig;
use hc_migration::distributor::SpillDistributor;
use hc_migration::grid::RegularGrid;
use hc_migration::mass_balance::{MassBalanceKind, MassBalanceLedger};
use hc_migration::property::{GridPropertyField, MemoryPropertyProvider, PropertyKind};
use hc_migration::pvt::ComponentSplitFlash;
use hc_migration::reservoir::ExpulsionMode;
use hc_migration::sim::ReservoirLayer;
use hc_migration::ReservoirDefinition;
use hc_migration::column::ColumnId;
use hc_migration::constants::NO_TRAP_ID;

/// Tops 10, 5 and 8 m, 20 m thick, porosity 0.2, 100 m cells. Column 1
/// crests a trap of 6000 m3 that spills over the strip's end.
fn strip_provider(expelled_at_first_column: f64) -> MemoryPropertyProvider {
    let tops = vec![10.0, 5.0, 8.0];
    let bottoms = vec![30.0, 25.0, 28.0];
    let expelled = PropertyKind::Expelled(ComponentId::C15PlusSat);
    MemoryPropertyProvider::new()
        .with("Res", PropertyKind::Depth, 0.0, GridPropertyField::from_layers(3, 1, vec![bottoms, tops]).unwrap())
        .with("Res", PropertyKind::Porosity, 0.0, GridPropertyField::uniform(3, 1, 1, 0.2))
        .with("Res", PropertyKind::Temperature, 0.0, GridPropertyField::uniform(3, 1, 1, 60.0))
        .with("Res", PropertyKind::Pressure, 0.0, GridPropertyField::uniform(3, 1, 1, 20.0))
        .with("Source", expelled, 10.0, GridPropertyField::uniform(3, 1, 1, 0.0))
        .with(
            "Source",
            expelled,
            0.0,
            GridPropertyField::from_map(3, 1, vec![expelled_at_first_column, 0.0, 0.0]).unwrap(),
        )
}

fn strip_layer() -> ReservoirLayer {
    strip_layer_with(MigrationConfig::default())
}

fn strip_layer_with(config: MigrationConfig) -> ReservoirLayer {
    let definition = ReservoirDefinition::new("Res", "Res").with_source_rock("Source", ExpulsionMode::UpAndDown);
    let grid = RegularGrid::new(3, 1, 100.0, 100.0).unwrap();
    ReservoirLayer::whole(0, definition, config, grid).unwrap()
}

fn run_interval(layer: &ReservoirLayer, provider: &MemoryPropertyProvider, ledger: &mut MassBalanceLedger) {
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(provider).unwrap();
    layer.compute_routing(ledger).unwrap();
    layer.collect_charges(provider, None).unwrap();
    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, ledger)
        .unwrap();
}

#[test]
fn test_small_charge_is_held_by_the_crest() {
    println!("🛢️ Testing a strip trap holding a small oil charge");

    let layer = strip_layer();
    let provider = strip_provider(0.05);
    let mut ledger = MassBalanceLedger::new();
    run_interval(&layer, &provider, &mut ledger);

    let stored = layer.stored_by_phase();
    println!("   Stored oil: {:.3} kg, gas: {:.3} kg", stored[PhaseId::Oil.index()], stored[PhaseId::Gas.index()]);

    assert_eq!(layer.trap_count(), 1);
    assert_abs_diff_eq!(stored[PhaseId::Oil.index()], 500.0, epsilon = 1e-9);
    assert_abs_diff_eq!(stored[PhaseId::Gas.index()], 0.0);
    assert_eq!(ledger.count(MassBalanceKind::Spill), 0);
    assert_abs_diff_eq!(layer.mass_stored_in_columns().weight(), 0.0);

    let reservoir = layer.partition(0);
    let trap = reservoir.traps().iter().next().unwrap();
    assert_eq!(trap.crest(), ColumnId::new(1, 0));
    assert_eq!(trap.spill_target(), None);
    assert_abs_diff_eq!(trap.capacity(), 6000.0, epsilon = 1e-6);

    println!("   ✅ All charge reached the crest and stayed there");
}

#[test]
fn test_overfilled_trap_spills_out_of_the_reservoir() {
    println!("🌊 Testing a strip trap charged past its capacity");

    // 8200 m3 of oil at 820 kg/m3 from the first column
    let input = 8200.0 * 820.0;
    let layer = strip_layer();
    let provider = strip_provider(input / 1.0e4);
    let mut ledger = MassBalanceLedger::new();
    run_interval(&layer, &provider, &mut ledger);

    let stored = layer.total_stored_charges().weight();
    let spilled = ledger.total(MassBalanceKind::Spill);
    println!("   Input: {:.4e} kg", input);
    println!("   Stored: {:.4e} kg, spilled: {:.4e} kg", stored, spilled);

    assert_abs_diff_eq!(stored, 6000.0 * 820.0, epsilon = 1e-3);
    assert_abs_diff_eq!(stored + spilled, input, epsilon = 1e-3);
    assert_eq!(ledger.count(MassBalanceKind::Spill), 1);

    let reservoir = layer.partition(0);
    let trap = reservoir.traps().iter().next().unwrap();
    assert!(trap.is_spilling());
    assert_abs_diff_eq!(trap.fill_depth(PhaseId::Oil), 8.0, epsilon = 1e-9);

    println!("   ✅ The excess left the reservoir and was booked as spill");
}

#[test]
fn test_stored_charge_is_carried_by_the_interior() {
    println!("📦 Testing that stored charge is handed to the trap interior");

    let layer = strip_layer();
    let provider = strip_provider(0.05);
    let mut ledger = MassBalanceLedger::new();
    run_interval(&layer, &provider, &mut ledger);

    let reservoir = layer.partition(0);
    let carried = reservoir.total_to_be_migrated().weight();
    println!("   Carried into the next interval: {:.6} kg", carried);
    assert_abs_diff_eq!(carried, reservoir.total_stored_charges().weight(), epsilon = 1e-6);
    assert_eq!(reservoir.previous_traps().len(), 1);

    println!("   ✅ Interior columns carry the trap charge");
}

#[test]
fn test_flux_follows_the_drainage_path() {
    println!("➡️ Testing flux accumulation along the strip");

    let layer = strip_layer();
    let provider = strip_provider(0.05);
    let mut ledger = MassBalanceLedger::new();
    run_interval(&layer, &provider, &mut ledger);
    layer.compute_fluxes().unwrap();

    let reservoir = layer.partition(0);
    let flux = |i: usize| reservoir.columns().local(ColumnId::new(i, 0)).unwrap().flux();
    println!("   Flux: {:.4} | {:.4} | {:.4} kg/m2", flux(0), flux(1), flux(2));

    // 500 kg over 1e4 m2 passes the first column and ends at the crest
    assert_abs_diff_eq!(flux(0), 0.05, epsilon = 1e-12);
    assert_abs_diff_eq!(flux(1), 0.05, epsilon = 1e-12);
    assert_abs_diff_eq!(flux(2), 0.0);
    assert_gt!(flux(1), flux(2));

    println!("   ✅ Flux stops at the crest");
}

#[test]
fn test_trap_below_the_minimum_capacity_is_dissolved() {
    println!("🫧 Testing a strip trap smaller than the minimum capacity");

    let config = MigrationConfig {
        min_trap_capacity: 1.0e6,
        ..MigrationConfig::default()
    };
    let layer = strip_layer_with(config);
    let provider = strip_provider(0.05);
    let mut ledger = MassBalanceLedger::new();
    run_interval(&layer, &provider, &mut ledger);

    let stored = layer.total_stored_charges().weight();
    let spilled = ledger.total(MassBalanceKind::Spill);
    println!("   Traps left: {}, stored: {:.3} kg, spilled: {:.3} kg", layer.trap_count(), stored, spilled);

    assert_eq!(layer.trap_count(), 0);
    assert_abs_diff_eq!(stored, 0.0);
    assert_abs_diff_eq!(spilled, 500.0, epsilon = 1e-9);
    assert_eq!(ledger.count(MassBalanceKind::Spill), 1);
    assert_abs_diff_eq!(layer.mass_stored_in_columns().weight(), 0.0);

    let reservoir = layer.partition(0);
    assert!(reservoir.previous_traps().is_empty());
    let crest = reservoir.columns().local(ColumnId::new(1, 0)).unwrap();
    assert_eq!(crest.trap(), None);
    assert_eq!(crest.global_trap_id(), NO_TRAP_ID);
    // the oil of the first column leaves over the strip's end
    assert_eq!(reservoir.columns().local(ColumnId::new(0, 0)).unwrap().drainage_area_id(), NO_TRAP_ID);

    println!("   ✅ The charge passed through and the trap is gone");
}
