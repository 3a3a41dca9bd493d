// Grid geometry and partition bounds

use serde::{Deserialize, Serialize};

use crate::constants::{NEIGHBOUR_OFFSETS, NUM_NEIGHBOURS};
use crate::error::{MigrationError, MigrationResult};

/// Inclusive index bounds of the sub-rectangle owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub rank: usize,
    pub num_processors: usize,
    pub first_i: usize,
    pub last_i: usize,
    pub first_j: usize,
    pub last_j: usize,
}

impl Partition {
    /// The whole grid on a single rank.
    pub fn whole(num_i: usize, num_j: usize) -> Self {
        Partition {
            rank: 0,
            num_processors: 1,
            first_i: 0,
            last_i: num_i.saturating_sub(1),
            first_j: 0,
            last_j: num_j.saturating_sub(1),
        }
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        i >= self.first_i && i <= self.last_i && j >= self.first_j && j <= self.last_j
    }

    pub fn num_i(&self) -> usize {
        self.last_i + 1 - self.first_i
    }

    pub fn num_j(&self) -> usize {
        self.last_j + 1 - self.first_j
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.first_i..=self.last_i).flat_map(move |i| (self.first_j..=self.last_j).map(move |j| (i, j)))
    }

    /// Splits a grid into `count` strips along I. The last strip takes the
    /// remainder.
    pub fn strips_along_i(num_i: usize, num_j: usize, count: usize) -> MigrationResult<Vec<Partition>> {
        if count == 0 || count > num_i {
            return Err(MigrationError::InvalidGrid(format!(
                "cannot split {} columns along I into {} partitions",
                num_i, count
            )));
        }
        let width = num_i / count;
        Ok((0..count)
            .map(|rank| Partition {
                rank,
                num_processors: count,
                first_i: rank * width,
                last_i: if rank + 1 == count { num_i - 1 } else { (rank + 1) * width - 1 },
                first_j: 0,
                last_j: num_j - 1,
            })
            .collect())
    }
}

/// Real-world geometry of the global grid, plus the partition this rank
/// owns.
pub trait GridGeometry {
    fn num_i(&self) -> usize;
    fn num_j(&self) -> usize;

    /// Cell spacing along I and J (m).
    fn delta_i(&self) -> f64;
    fn delta_j(&self) -> f64;

    fn local_partition(&self) -> Partition;

    fn surface_area(&self, _i: usize, _j: usize) -> f64 {
        self.delta_i() * self.delta_j()
    }

    /// Lateral distance (m) to neighbour `n` of `NEIGHBOUR_OFFSETS`.
    fn neighbour_distance(&self, n: usize) -> f64 {
        let (di, dj) = NEIGHBOUR_OFFSETS[n % NUM_NEIGHBOURS];
        let x = di as f64 * self.delta_i();
        let y = dj as f64 * self.delta_j();
        (x * x + y * y).sqrt()
    }

    fn contains(&self, i: isize, j: isize) -> bool {
        i >= 0 && j >= 0 && (i as usize) < self.num_i() && (j as usize) < self.num_j()
    }

    /// Canonical position key used to order buffered contributions.
    fn position(&self, i: usize, j: usize) -> usize {
        i + j * self.num_i()
    }

    fn num_cells(&self) -> usize {
        self.num_i() * self.num_j()
    }
}

/// Uniformly spaced rectangular grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegularGrid {
    pub num_i: usize,
    pub num_j: usize,
    pub delta_i: f64,
    pub delta_j: f64,
    pub partition: Partition,
}

impl RegularGrid {
    pub fn new(num_i: usize, num_j: usize, delta_i: f64, delta_j: f64) -> MigrationResult<Self> {
        Self::with_partition(num_i, num_j, delta_i, delta_j, Partition::whole(num_i, num_j))
    }

    pub fn with_partition(
        num_i: usize,
        num_j: usize,
        delta_i: f64,
        delta_j: f64,
        partition: Partition,
    ) -> MigrationResult<Self> {
        if num_i == 0 || num_j == 0 {
            return Err(MigrationError::InvalidGrid(format!("empty grid {}x{}", num_i, num_j)));
        }
        if delta_i <= 0.0 || delta_j <= 0.0 {
            return Err(MigrationError::InvalidGrid(format!(
                "non-positive spacing {} x {}",
                delta_i, delta_j
            )));
        }
        if partition.last_i >= num_i || partition.last_j >= num_j || partition.first_i > partition.last_i {
            return Err(MigrationError::InvalidGrid(format!(
                "partition {:?} outside a {}x{} grid",
                partition, num_i, num_j
            )));
        }
        Ok(RegularGrid {
            num_i,
            num_j,
            delta_i,
            delta_j,
            partition,
        })
    }
}

impl GridGeometry for RegularGrid {
    fn num_i(&self) -> usize {
        self.num_i
    }

    fn num_j(&self) -> usize {
        self.num_j
    }

    fn delta_i(&self) -> f64 {
        self.delta_i
    }

    fn delta_j(&self) -> f64 {
        self.delta_j
    }

    fn local_partition(&self) -> Partition {
        self.partition
    }
}
