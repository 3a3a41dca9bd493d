// Lateral migration pathways: steepest-ascent adjacency and sealing avoidance

use std::cmp::Ordering;

use crate::column::{Column, ColumnArray, ColumnId};
use crate::component::PhaseId;
use crate::constants::{DIAGONAL_NEIGHBOURS, MINIMUM_THICKNESS, NEIGHBOUR_OFFSETS, NUM_NEIGHBOURS, SEAL_DEPTH};
use crate::grid::GridGeometry;

/// The parts of a trap the pathway search needs when it looks for a way
/// out of it.
pub trait TrapFootprint {
    fn contains(&self, id: ColumnId) -> bool;

    fn spill_depth(&self) -> f64;
}

/// Adjacency search over one reservoir's columns.
pub struct Pathways<'a> {
    columns: &'a ColumnArray,
    grid: &'a dyn GridGeometry,
    maximum_neighbour_offset: usize,
}

impl<'a> Pathways<'a> {
    pub fn new(columns: &'a ColumnArray, grid: &'a dyn GridGeometry, maximum_neighbour_offset: usize) -> Self {
        Pathways {
            columns,
            grid,
            maximum_neighbour_offset,
        }
    }

    fn column_at(&self, id: ColumnId, offset: (isize, isize), scale: isize) -> Option<Column<'a>> {
        self.columns
            .neighbour(id, offset, scale)
            .and_then(|neighbour| self.columns.get(neighbour))
    }

    /// A column next to an undefined column of the grid. Positions beyond
    /// the grid edge are not columns and do not count.
    pub fn is_on_boundary(&self, id: ColumnId) -> bool {
        NEIGHBOUR_OFFSETS
            .iter()
            .filter_map(|&offset| self.column_at(id, offset, 1))
            .any(|neighbour| !neighbour.is_valid())
    }

    /// The column that charge of `phase` moves to from `id`, skipping the
    /// columns of `trap`.
    ///
    /// Thin and wasting columns are their own adjacent column; boundary
    /// columns have none, so their charge leaves the reservoir. Otherwise
    /// the neighbour with the steepest upward gradient wins, and a
    /// shallower-ranked neighbour at equal depth is taken with a zero
    /// gradient. A sealing column without such a neighbour searches
    /// further out.
    pub fn adjacent_column(&self, phase: PhaseId, id: ColumnId, trap: Option<&dyn TrapFootprint>) -> Option<ColumnId> {
        let column = self.columns.get(id)?;

        if column.is_wasting(phase) || column.is_thin() {
            return Some(id);
        }
        if self.is_on_boundary(id) {
            return None;
        }

        let depth = if column.is_sealing(phase) {
            column.bottom_depth()
        } else {
            column.top_depth()
        };

        let mut adjacent = column;
        let mut min_gradient = SEAL_DEPTH;
        let mut found = false;

        for (n, &offset) in NEIGHBOUR_OFFSETS.iter().enumerate() {
            let Some(neighbour) = self.column_at(id, offset, 1) else {
                continue;
            };
            if trap.is_some_and(|t| t.contains(neighbour.id())) {
                continue;
            }
            if neighbour.is_sealing(phase) {
                continue;
            }

            if column.is_shallower_than(&neighbour) {
                continue;
            }
            if column.is_deeper_than(&neighbour, false) {
                let gradient = (neighbour.top_depth() - depth) / self.grid.neighbour_distance(n);
                if gradient <= min_gradient {
                    min_gradient = gradient;
                    adjacent = neighbour;
                    found = true;
                }
            } else if adjacent.compare_depths(&neighbour, true) == Ordering::Greater {
                min_gradient = 0.0;
                adjacent = neighbour;
                found = true;
            }
        }

        if column.is_sealing(phase) && !found {
            return Some(self.avoid_sealing_column(phase, id, trap).unwrap_or(id));
        }

        Some(adjacent.id())
    }

    /// Ring search for a way past a sealing column: for kappa = 2, 3, ...
    /// the shallowest qualifying column on the ring wins, and the first
    /// ring with one ends the search.
    pub fn avoid_sealing_column(&self, phase: PhaseId, id: ColumnId, trap: Option<&dyn TrapFootprint>) -> Option<ColumnId> {
        if self.maximum_neighbour_offset == 0 {
            return None;
        }

        let mut best: Option<Column<'a>> = None;
        let mut shallowest = SEAL_DEPTH;
        let mut kappa = 2;

        while best.is_none() {
            for n in 0..NUM_NEIGHBOURS {
                if let Some(candidate) = self.find_non_sealing_column(kappa, n, phase, id, trap) {
                    if candidate.top_depth() < shallowest {
                        shallowest = candidate.top_depth();
                        best = Some(candidate);
                    }
                }
            }

            kappa += 1;
            if kappa > self.maximum_neighbour_offset {
                break;
            }
        }

        best.map(|column| column.id())
    }

    /// Last qualifying column in direction `n` at ring `kappa`. Diagonal
    /// directions also cover the ring cells between the diagonal and the
    /// two orthogonals.
    fn find_non_sealing_column(
        &self,
        kappa: usize,
        n: usize,
        phase: PhaseId,
        id: ColumnId,
        trap: Option<&dyn TrapFootprint>,
    ) -> Option<Column<'a>> {
        let mut new_depth = trap.map_or(SEAL_DEPTH, |t| t.spill_depth());
        let mut chosen = None;
        let (di, dj) = NEIGHBOUR_OFFSETS[n];
        let ring = kappa as isize;

        let mut consider = |candidate: Option<Column<'a>>, new_depth: &mut f64| {
            let Some(candidate) = candidate.filter(|c| c.is_valid()) else {
                return;
            };
            let qualifies = self.is_on_boundary(candidate.id())
                || (candidate.top_depth() < *new_depth && candidate.thickness() < MINIMUM_THICKNESS)
                || (candidate.top_depth() < *new_depth
                    && !candidate.is_sealing(phase)
                    && !trap.is_some_and(|t| t.contains(candidate.id())));
            if qualifies {
                *new_depth = candidate.top_depth();
                chosen = Some(candidate);
            }
        };

        consider(self.column_at(id, (di, dj), ring), &mut new_depth);

        if DIAGONAL_NEIGHBOURS.contains(&n) {
            for k in (2..=ring).rev() {
                consider(self.column_at_offset(id, (k - 1) * di, ring * dj), &mut new_depth);
                consider(self.column_at_offset(id, ring * di, (k - 1) * dj), &mut new_depth);
            }
        }

        chosen
    }

    fn column_at_offset(&self, id: ColumnId, di: isize, dj: isize) -> Option<Column<'a>> {
        self.column_at(id, (di, dj), 1)
    }
}
