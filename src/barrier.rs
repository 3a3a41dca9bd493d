// Vertical migration barriers

use crate::config::BlockingConfig;
use crate::error::MigrationResult;
use crate::grid::Partition;
use crate::property::{PropertyKind, PropertyProvider};

/// Marks the cells of a reservoir where charge from below cannot enter
/// because an overlying formation is too tight.
#[derive(Debug, Clone)]
pub struct Barrier {
    partition: Partition,
    permeability: f64,
    porosity: f64,
    blocked: Vec<bool>,
}

impl Barrier {
    pub fn new(partition: Partition, config: &BlockingConfig) -> Self {
        Barrier {
            partition,
            permeability: config.permeability,
            porosity: config.porosity,
            blocked: vec![false; partition.num_i() * partition.num_j()],
        }
    }

    fn index(&self, i: usize, j: usize) -> Option<usize> {
        if !self.partition.contains(i, j) {
            return None;
        }
        Some((i - self.partition.first_i) + (j - self.partition.first_j) * self.partition.num_i())
    }

    /// Blocked cells outside the partition are never reported.
    pub fn is_blocking(&self, i: usize, j: usize) -> bool {
        self.index(i, j).is_some_and(|index| self.blocked[index])
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|&&b| b).count()
    }

    pub fn clear(&mut self) {
        self.blocked.iter_mut().for_each(|b| *b = false);
    }

    /// Adds the cells where any k level of `formation` at `age_ma` is
    /// below the permeability or porosity threshold. Cells already
    /// blocked stay blocked.
    pub fn update_blocking(
        &mut self,
        provider: &dyn PropertyProvider,
        formation: &str,
        age_ma: f64,
    ) -> MigrationResult<()> {
        let permeability = provider.retrieve(formation, PropertyKind::Permeability, age_ma)?;
        let porosity = provider.retrieve(formation, PropertyKind::Porosity, age_ma)?;

        let partition = self.partition;
        for (i, j) in partition.cells() {
            let Some(index) = self.index(i, j) else {
                continue;
            };
            if self.blocked[index] {
                continue;
            }

            let tight_permeability = (0..permeability.num_k()).any(|k| {
                let value = permeability.get(i, j, k);
                !permeability.is_undefined(value) && value < self.permeability
            });
            let tight_porosity = (0..porosity.num_k()).any(|k| {
                let value = porosity.get(i, j, k);
                !porosity.is_undefined(value) && value < self.porosity
            });

            self.blocked[index] = tight_permeability || tight_porosity;
        }

        log::debug!(
            "barrier update from {} at {} Ma: {} blocked cells",
            formation,
            age_ma,
            self.blocked_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{GridPropertyField, MemoryPropertyProvider};

    fn config() -> BlockingConfig {
        BlockingConfig {
            enabled: true,
            permeability: 1.0e-3,
            porosity: 0.05,
        }
    }

    #[test]
    fn test_tight_cells_block() {
        // 3x1 grid, two k levels; cell 1 is tight in its upper level only
        let permeability =
            GridPropertyField::from_layers(3, 1, vec![vec![1.0, 1.0, 1.0], vec![1.0, 1.0e-5, 1.0]]).unwrap();
        let porosity = GridPropertyField::from_layers(3, 1, vec![vec![0.2, 0.2, 0.01], vec![0.2, 0.2, 0.2]]).unwrap();
        let provider = MemoryPropertyProvider::new()
            .with("Seal", PropertyKind::Permeability, 5.0, permeability)
            .with("Seal", PropertyKind::Porosity, 5.0, porosity);

        let mut barrier = Barrier::new(Partition::whole(3, 1), &config());
        barrier.update_blocking(&provider, "Seal", 5.0).unwrap();

        assert!(!barrier.is_blocking(0, 0));
        assert!(barrier.is_blocking(1, 0));
        assert!(barrier.is_blocking(2, 0));
        assert!(!barrier.is_blocking(7, 0));
        assert_eq!(barrier.blocked_count(), 2);
    }

    #[test]
    fn test_updates_accumulate_over_formations() {
        let tight = GridPropertyField::from_map(2, 1, vec![1.0e-6, 1.0]).unwrap();
        let open = GridPropertyField::uniform(2, 1, 1, 1.0);
        let porous = GridPropertyField::uniform(2, 1, 1, 0.3);
        let provider = MemoryPropertyProvider::new()
            .with("Lower", PropertyKind::Permeability, 0.0, tight)
            .with("Lower", PropertyKind::Porosity, 0.0, porous.clone())
            .with("Upper", PropertyKind::Permeability, 0.0, open)
            .with("Upper", PropertyKind::Porosity, 0.0, porous);

        let mut barrier = Barrier::new(Partition::whole(2, 1), &config());
        barrier.update_blocking(&provider, "Lower", 0.0).unwrap();
        barrier.update_blocking(&provider, "Upper", 0.0).unwrap();
        assert!(barrier.is_blocking(0, 0));
        assert!(!barrier.is_blocking(1, 0));

        barrier.clear();
        assert_eq!(barrier.blocked_count(), 0);
    }

    #[test]
    fn test_missing_formation_is_an_error() {
        let provider = MemoryPropertyProvider::new();
        let mut barrier = Barrier::new(Partition::whole(2, 2), &config());
        assert!(barrier.update_blocking(&provider, "Nowhere", 0.0).is_err());
    }
}
