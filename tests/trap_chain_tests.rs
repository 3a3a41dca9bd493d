// Traps that spill into each other: merging, termination and conservation

use approx::{assert_abs_diff_eq, assert_relative_eq};
use more_asserts::{assert_gt, assert_le};

use hc_migration::column::ColumnId;
use hc_migration::component::{ComponentId, PhaseId};
use hc_migration::composition::Composition;
use hc_migration::config::MigrationConfig;
use hc_migration::distributor::SpillDistributor;
use hc_migration::grid::RegularGrid;
use hc_migration::mass_balance::{Endpoint, MassBalanceKind, MassBalanceLedger, MassBalanceRecord, MassBalanceSink};
use hc_migration::property::{GridPropertyField, MemoryPropertyProvider, PropertyKind};
use hc_migration::pvt::ComponentSplitFlash;
use hc_migration::sim::ReservoirLayer;
use hc_migration::ReservoirDefinition;

const NUM_I: usize = 5;
const NUM_J: usize = 3;

/// 5x3 basin: a 30 m deep rim around a middle row of `middle` tops.
fn basin_provider(middle: [f64; NUM_I]) -> MemoryPropertyProvider {
    let mut tops = vec![30.0; NUM_I * NUM_J];
    tops[NUM_I..2 * NUM_I].copy_from_slice(&middle);
    let bottoms: Vec<f64> = tops.iter().map(|top| top + 20.0).collect();
    MemoryPropertyProvider::new()
        .with("Res", PropertyKind::Depth, 0.0, GridPropertyField::from_layers(NUM_I, NUM_J, vec![bottoms, tops]).unwrap())
        .with("Res", PropertyKind::Porosity, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 0.2))
        .with("Res", PropertyKind::Temperature, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 60.0))
        .with("Res", PropertyKind::Pressure, 0.0, GridPropertyField::uniform(NUM_I, NUM_J, 1, 20.0))
}

fn basin_layer() -> ReservoirLayer {
    let grid = RegularGrid::new(NUM_I, NUM_J, 100.0, 100.0).unwrap();
    ReservoirLayer::whole(0, ReservoirDefinition::new("Res", "Res"), MigrationConfig::default(), grid).unwrap()
}

fn route(layer: &ReservoirLayer, provider: &MemoryPropertyProvider, ledger: &mut MassBalanceLedger) {
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(provider).unwrap();
    layer.compute_routing(ledger).unwrap();
}

fn charge(layer: &ReservoirLayer, id: ColumnId, oil_m3: f64) -> f64 {
    let mass = oil_m3 * 820.0;
    layer
        .partition_mut(0)
        .columns_mut()
        .local_mut(id)
        .unwrap()
        .add_composition_to_be_migrated(&Composition::from_masses(&[(ComponentId::C15PlusSat, mass)]));
    mass
}

#[test]
fn test_two_traps_share_a_saddle() {
    println!("⛰️ Testing trap geometry around a shared saddle");

    let layer = basin_layer();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);

    let reservoir = layer.partition(0);
    let traps: Vec<_> = reservoir.traps().iter().collect();
    assert_eq!(traps.len(), 2);

    let (a, b) = (traps[0], traps[1]);
    println!("   Trap A at {:?}: {:.1} m3, Trap B at {:?}: {:.1} m3", a.crest(), a.capacity(), b.crest(), b.capacity());
    assert_eq!(a.crest(), ColumnId::new(1, 1));
    assert_eq!(b.crest(), ColumnId::new(3, 1));
    assert_eq!(a.spill_column(), Some(ColumnId::new(2, 1)));
    assert_eq!(b.spill_column(), Some(ColumnId::new(2, 1)));
    assert_eq!(a.spill_target(), Some(b.crest()));
    assert_eq!(b.spill_target(), Some(a.crest()));
    assert_abs_diff_eq!(a.capacity(), 6000.0, epsilon = 1e-6);
    assert_abs_diff_eq!(b.capacity(), 4000.0, epsilon = 1e-6);

    assert_eq!(reservoir.spill_back_target(PhaseId::Oil, a.crest()), Some(b.crest()));
    assert_eq!(reservoir.spill_back_target(PhaseId::Oil, b.crest()), Some(a.crest()));

    // the flanks drain into the trap next to them
    let columns = reservoir.columns();
    assert_eq!(columns.local(ColumnId::new(0, 1)).unwrap().drainage_area_id(), a.global_id());
    assert_eq!(columns.local(ColumnId::new(4, 1)).unwrap().drainage_area_id(), b.global_id());

    println!("   ✅ Each trap spills into the other");
}

#[test]
fn test_spilling_pair_merges_into_the_shallower_trap() {
    println!("🔗 Testing that two spilling traps merge and hold the whole charge");

    let layer = basin_layer();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);
    let input = charge(&layer, ColumnId::new(0, 1), 12000.0);

    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, &mut ledger)
        .unwrap();

    let stored = layer.total_stored_charges().weight();
    println!("   Input: {:.4e} kg, stored: {:.4e} kg", input, stored);
    println!("   Spilled: {:.4e} kg, absorbed: {:.4e} kg",
        ledger.total(MassBalanceKind::Spill),
        ledger.total(MassBalanceKind::TrapAbsorption)
    );

    assert_eq!(layer.trap_count(), 1);
    assert_abs_diff_eq!(stored, input, epsilon = 1e-3);
    assert_gt!(ledger.total(MassBalanceKind::Spill), 0.0);
    assert_gt!(ledger.total(MassBalanceKind::TrapAbsorption), 0.0);
    assert_abs_diff_eq!(layer.mass_stored_in_columns().weight(), 0.0, epsilon = 1e-6);

    let reservoir = layer.partition(0);
    let merged = reservoir.traps().iter().next().unwrap();
    assert_eq!(merged.crest(), ColumnId::new(1, 1));
    assert!(merged.interior().contains(&ColumnId::new(2, 1)));
    assert!(merged.interior().contains(&ColumnId::new(3, 1)));
    assert!(!merged.is_spilling());
    // the rim at 30 m is the new spill depth, at the grid edge
    assert_eq!(merged.spill_target(), None);
    assert_abs_diff_eq!(merged.capacity(), 120000.0, epsilon = 1e-6);

    // the absorbed crest now routes into the surviving trap
    assert_eq!(reservoir.final_target_column(PhaseId::Oil, ColumnId::new(3, 1)), Some(ColumnId::new(1, 1)));

    println!("   ✅ One trap holds everything");
}

#[test]
fn test_fill_and_spill_terminates_within_its_cap() {
    println!("⏹️ Testing that the fill-and-spill cycle ends");

    let layer = basin_layer();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);
    charge(&layer, ColumnId::new(0, 1), 12000.0);

    let flash = ComponentSplitFlash::new();
    let distributor = SpillDistributor::new();
    layer.partition_mut(0).migrate_charges_to_be_migrated(&flash, &mut ledger).unwrap();
    layer.partition_mut(0).apply_target_buffers();

    let iterations = layer.distribution_cycle(&flash, &distributor, false, &mut ledger).unwrap();
    println!("   Settled after {} iterations", iterations);
    assert_gt!(iterations, 1);
    assert_le!(iterations, layer.config().min_fill_and_spill_iterations);

    // nothing left to distribute, a second cycle is a no-op
    assert_eq!(layer.distribution_cycle(&flash, &distributor, false, &mut ledger).unwrap(), 0);

    println!("   ✅ The cycle settles");
}

#[test]
fn test_small_charge_does_not_merge() {
    println!("🧊 Testing that traps below their spill depth stay apart");

    let layer = basin_layer();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);
    let input = charge(&layer, ColumnId::new(0, 1), 1000.0) + charge(&layer, ColumnId::new(4, 1), 1000.0);

    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, &mut ledger)
        .unwrap();

    assert_eq!(layer.trap_count(), 2);
    assert_eq!(ledger.count(MassBalanceKind::Spill), 0);
    assert_eq!(ledger.count(MassBalanceKind::TrapAbsorption), 0);
    assert_abs_diff_eq!(layer.total_stored_charges().weight(), input, epsilon = 1e-6);
    for trap in layer.partition(0).traps().iter() {
        assert_abs_diff_eq!(trap.stored_weight(), 1000.0 * 820.0, epsilon = 1e-6);
    }

    println!("   ✅ Each trap keeps its own charge");
}

#[test]
fn test_undersized_traps_merge_during_routing() {
    println!("🔬 Testing undersized trap merging");

    let config = MigrationConfig {
        merge_undersized_traps: true,
        min_trap_capacity: 5000.0,
        ..MigrationConfig::default()
    };
    let grid = RegularGrid::new(NUM_I, NUM_J, 100.0, 100.0).unwrap();
    let layer = ReservoirLayer::whole(0, ReservoirDefinition::new("Res", "Res"), config, grid).unwrap();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);

    // trap B holds 4000 m3, below the minimum
    assert_eq!(layer.trap_count(), 1);
    let reservoir = layer.partition(0);
    let merged = reservoir.traps().iter().next().unwrap();
    assert_eq!(merged.crest(), ColumnId::new(1, 1));
    assert!(!merged.is_undersized());

    println!("   ✅ The undersized trap joined its neighbour");
}

#[test]
fn test_undersized_trap_hands_its_charge_to_the_next_trap() {
    println!("🪣 Testing an undersized trap spilling into its neighbour");

    // trap B holds 4000 m3 and is dissolved, trap A holds 6000 m3
    let config = MigrationConfig {
        min_trap_capacity: 5000.0,
        ..MigrationConfig::default()
    };
    let grid = RegularGrid::new(NUM_I, NUM_J, 100.0, 100.0).unwrap();
    let layer = ReservoirLayer::whole(0, ReservoirDefinition::new("Res", "Res"), config, grid).unwrap();
    let mut ledger = MassBalanceLedger::new();
    route(&layer, &basin_provider([30.0, 5.0, 8.0, 6.0, 30.0]), &mut ledger);
    assert_eq!(layer.trap_count(), 2);

    let a_id = {
        let reservoir = layer.partition(0);
        let a = reservoir.traps().iter().find(|trap| trap.crest() == ColumnId::new(1, 1)).unwrap();
        let columns = reservoir.columns();
        // the flank under B already drains into A
        assert_eq!(columns.local(ColumnId::new(4, 1)).unwrap().drainage_area_id(), a.global_id());
        a.global_id()
    };

    let input = charge(&layer, ColumnId::new(4, 1), 1000.0);
    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, &mut ledger)
        .unwrap();

    let stored = layer.total_stored_charges().weight();
    println!("   Input: {:.4e} kg, stored: {:.4e} kg, spilled: {:.4e} kg",
        input,
        stored,
        ledger.total(MassBalanceKind::Spill)
    );

    assert_eq!(layer.trap_count(), 1);
    assert_abs_diff_eq!(stored, input, epsilon = 1e-6);
    assert_abs_diff_eq!(ledger.total(MassBalanceKind::Spill), input, epsilon = 1e-6);
    assert_eq!(ledger.count(MassBalanceKind::TrapAbsorption), 0);

    let reservoir = layer.partition(0);
    let a = reservoir.traps().iter().next().unwrap();
    assert_eq!(a.global_id(), a_id);
    assert_abs_diff_eq!(a.stored_weight(), input, epsilon = 1e-6);
    assert!(!a.is_spilling());
    assert_eq!(reservoir.columns().local(ColumnId::new(3, 1)).unwrap().trap(), None);

    println!("   ✅ The small trap kept nothing");
}

struct Records(Vec<MassBalanceRecord>);

impl MassBalanceSink for Records {
    fn report(&mut self, record: &MassBalanceRecord) {
        self.0.push(record.clone());
    }
}

#[test]
fn test_cascade_of_three_traps_conserves_mass() {
    println!("🪜 Testing a chain of traps each spilling into the next");

    // A (5 m) spills at 20 m into B (10 m), B at 14 m into C (12 m), C at
    // 13 m over the grid edge
    let (num_i, num_j) = (7, 3);
    let mut tops = vec![30.0; num_i * num_j];
    tops[num_i..2 * num_i].copy_from_slice(&[30.0, 5.0, 20.0, 10.0, 14.0, 12.0, 13.0]);
    let bottoms: Vec<f64> = tops.iter().map(|top| top + 20.0).collect();
    let provider = MemoryPropertyProvider::new()
        .with("Res", PropertyKind::Depth, 0.0, GridPropertyField::from_layers(num_i, num_j, vec![bottoms, tops]).unwrap())
        .with("Res", PropertyKind::Porosity, 0.0, GridPropertyField::uniform(num_i, num_j, 1, 0.2))
        .with("Res", PropertyKind::Temperature, 0.0, GridPropertyField::uniform(num_i, num_j, 1, 60.0))
        .with("Res", PropertyKind::Pressure, 0.0, GridPropertyField::uniform(num_i, num_j, 1, 20.0));
    let grid = RegularGrid::new(num_i, num_j, 100.0, 100.0).unwrap();
    let layer = ReservoirLayer::whole(0, ReservoirDefinition::new("Res", "Res"), MigrationConfig::default(), grid).unwrap();

    let mut records = Records(Vec::new());
    layer.begin_interval(10.0, 0.0).unwrap();
    layer.compute_properties(&provider).unwrap();
    layer.compute_routing(&mut records).unwrap();
    assert_eq!(layer.trap_count(), 3);

    // 50000 m3 of oil into 30000 + 8000 + 2000 m3 of room
    let input = charge(&layer, ColumnId::new(0, 1), 50000.0);
    layer
        .migrate_and_fill(&ComponentSplitFlash::new(), &SpillDistributor::new(), None, &mut records)
        .unwrap();

    let stored = layer.total_stored_charges().weight();
    let lost: f64 = records
        .0
        .iter()
        .filter(|record| record.kind == MassBalanceKind::Spill && record.destination == Endpoint::Outside)
        .map(|record| record.composition.weight())
        .sum();
    println!("   Input: {:.4e} kg, stored: {:.4e} kg, spilled out: {:.4e} kg", input, stored, lost);

    assert_eq!(layer.trap_count(), 3);
    assert_relative_eq!(stored, 40000.0 * 820.0, max_relative = 1e-9);
    assert_relative_eq!(stored + lost, input, max_relative = 1e-9);

    let reservoir = layer.partition(0);
    for (crest, room) in [((1, 1), 30000.0), ((3, 1), 8000.0), ((5, 1), 2000.0)] {
        let trap = reservoir
            .traps()
            .iter()
            .find(|trap| trap.crest() == ColumnId::new(crest.0, crest.1))
            .unwrap();
        println!("   Trap at {:?} holds {:.4e} kg", crest, trap.stored_weight());
        assert!(trap.is_spilling());
        assert_relative_eq!(trap.stored_weight(), room * 820.0, max_relative = 1e-9);
    }

    println!("   ✅ Each trap filled to its spill point and the rest left the reservoir");
}
