// Buffered arrivals are summed in a fixed order whatever order they came in

use approx::assert_relative_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use hc_migration::column::{BufferKind, ColumnId, LocalColumn};
use hc_migration::component::{ComponentId, PhaseId};
use hc_migration::composition::Composition;

/// Contributions whose magnitudes differ enough that summation order
/// changes the last bits of the result.
fn contributions() -> Vec<(usize, Composition)> {
    (0..64)
        .map(|position| {
            let scale = 10f64.powi((position % 9) as i32 - 3);
            let composition = Composition::from_masses(&[
                (ComponentId::C1, 0.1 * scale + position as f64 * 1.0e-7),
                (ComponentId::C15PlusSat, 1.0 / (position as f64 + 3.0)),
            ]);
            (position * 7 + 1, composition)
        })
        .collect()
}

fn apply_in_order(arrivals: &[(usize, Composition)]) -> Composition {
    let mut column = LocalColumn::new(ColumnId::new(0, 0), -9999.0, 1.0e4);
    for (position, composition) in arrivals {
        column.push_buffer(BufferKind::Target, PhaseId::Oil, *position, composition.clone());
    }
    column.apply_buffer(BufferKind::Target);
    column.composition().clone()
}

#[test]
fn test_arrival_order_does_not_change_the_sum() {
    println!("🎲 Testing that buffered arrivals sum identically in any order");

    let arrivals = contributions();
    let reference = apply_in_order(&arrivals);
    let expected: f64 = arrivals.iter().map(|(_, composition)| composition.weight()).sum();
    println!("   Reference weight: {:.17e} kg", reference.weight());
    assert_relative_eq!(reference.weight(), expected, max_relative = 1e-12);

    for seed in [7_u64, 42, 1234, 99_991] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut shuffled = arrivals.clone();
        shuffled.shuffle(&mut rng);

        let result = apply_in_order(&shuffled);
        println!("   Seed {:>6}: {:.17e} kg", seed, result.weight());
        assert_eq!(result, reference);
    }

    println!("   ✅ Bitwise identical for every shuffle");
}

#[test]
fn test_reversed_arrivals_match() {
    println!("🔁 Testing reversed arrival order");

    let arrivals = contributions();
    let mut reversed = arrivals.clone();
    reversed.reverse();

    assert_eq!(apply_in_order(&reversed), apply_in_order(&arrivals));
    println!("   ✅ Same composition");
}
