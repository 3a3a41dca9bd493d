use crate::trap::{Trap, TrapId};

/// Traps of one reservoir, indexed by [`TrapId`]. Absorbed traps leave a
/// tombstone so ids stay stable for the rest of the snapshot.
#[derive(Debug, Clone, Default)]
pub struct TrapVector {
    traps: Vec<Option<Trap>>,
}

impl TrapVector {
    pub fn new() -> Self {
        TrapVector { traps: Vec::new() }
    }

    /// Id the next pushed trap gets.
    pub fn next_id(&self) -> TrapId {
        self.traps.len()
    }

    pub fn push(&mut self, trap: Trap) -> TrapId {
        let id = self.traps.len();
        self.traps.push(Some(trap));
        id
    }

    pub fn get(&self, id: TrapId) -> Option<&Trap> {
        self.traps.get(id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: TrapId) -> Option<&mut Trap> {
        self.traps.get_mut(id).and_then(Option::as_mut)
    }

    /// Takes the trap out and leaves a tombstone.
    pub fn remove(&mut self, id: TrapId) -> Option<Trap> {
        self.traps.get_mut(id).and_then(Option::take)
    }

    /// Live trap ids in ascending order.
    pub fn ids(&self) -> Vec<TrapId> {
        self.traps
            .iter()
            .enumerate()
            .filter_map(|(id, trap)| trap.as_ref().map(|_| id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trap> {
        self.traps.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Trap> {
        self.traps.iter_mut().flatten()
    }

    /// Live traps.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.traps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnArray, ColumnId};
    use crate::grid::RegularGrid;
    use crate::transport::SinglePartitionTransport;
    use std::rc::Rc;

    #[test]
    fn test_tombstones_keep_ids_stable() {
        let grid = RegularGrid::new(3, 1, 100.0, 100.0).unwrap();
        let mut columns = ColumnArray::new(&grid, 0, 1.0e8, Rc::new(SinglePartitionTransport::new()));
        for (i, top) in [5.0, 9.0, 6.0].into_iter().enumerate() {
            let column = columns.local_mut(ColumnId::new(i, 0)).unwrap();
            column.set_top_depth(top);
            column.set_bottom_depth(top + 10.0);
        }

        let mut traps = TrapVector::new();
        for i in [0, 2] {
            let id = traps.next_id();
            let trap = Trap::new(id, id as i32, ColumnId::new(i, 0), 0.0, &mut columns).unwrap();
            assert_eq!(traps.push(trap), id);
        }
        assert_eq!(traps.len(), 2);

        let removed = traps.remove(0).unwrap();
        assert_eq!(removed.crest(), ColumnId::new(0, 0));
        assert!(traps.get(0).is_none());
        assert_eq!(traps.ids(), vec![1]);
        assert_eq!(traps.get(1).unwrap().crest(), ColumnId::new(2, 0));
        assert_eq!(traps.next_id(), 2);
        assert!(!traps.is_empty());
    }
}
