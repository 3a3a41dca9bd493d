use std::cell::Cell;
use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::column::{BufferKind, Column, ColumnId, LocalColumn, ProxyColumn};
use crate::component::PhaseId;
use crate::composition::Composition;
use crate::constants::NEIGHBOUR_OFFSETS;
use crate::grid::{GridGeometry, Partition};
use crate::request::{ColumnRequest, RequestPayload, ValueSpec};
use crate::transport::Transport;

enum Slot {
    Local(LocalColumn),
    /// Created on first access.
    Remote(OnceCell<ProxyColumn>),
}

/// Every column of the global grid for one reservoir. Columns of the local
/// partition are owned here; the others are proxies made on demand.
pub struct ColumnArray {
    num_i: usize,
    num_j: usize,
    partition: Partition,
    reservoir_index: usize,
    undefined_value: f64,
    slots: Vec<Slot>,
    transport: Rc<dyn Transport>,
    proxy_count: Cell<usize>,
}

impl ColumnArray {
    pub fn new(
        grid: &dyn GridGeometry,
        reservoir_index: usize,
        undefined_value: f64,
        transport: Rc<dyn Transport>,
    ) -> Self {
        let partition = grid.local_partition();
        let (num_i, num_j) = (grid.num_i(), grid.num_j());

        let mut slots = Vec::with_capacity(num_i * num_j);
        for j in 0..num_j {
            for i in 0..num_i {
                if partition.contains(i, j) {
                    let id = ColumnId::new(i, j);
                    slots.push(Slot::Local(LocalColumn::new(id, undefined_value, grid.surface_area(i, j))));
                } else {
                    slots.push(Slot::Remote(OnceCell::new()));
                }
            }
        }

        ColumnArray {
            num_i,
            num_j,
            partition,
            reservoir_index,
            undefined_value,
            slots,
            transport,
            proxy_count: Cell::new(0),
        }
    }

    pub fn num_i(&self) -> usize {
        self.num_i
    }

    pub fn num_j(&self) -> usize {
        self.num_j
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn transport(&self) -> &Rc<dyn Transport> {
        &self.transport
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        id.i < self.num_i && id.j < self.num_j
    }

    pub fn is_local(&self, id: ColumnId) -> bool {
        self.partition.contains(id.i, id.j)
    }

    /// Canonical position used to order buffered contributions.
    pub fn position(&self, id: ColumnId) -> usize {
        id.i + id.j * self.num_i
    }

    fn index(&self, id: ColumnId) -> usize {
        id.i + id.j * self.num_i
    }

    /// The column at `id`, creating its proxy on first access. `None`
    /// outside the grid.
    pub fn get(&self, id: ColumnId) -> Option<Column<'_>> {
        if !self.contains(id) {
            return None;
        }
        match &self.slots[self.index(id)] {
            Slot::Local(column) => Some(Column::Local(column)),
            Slot::Remote(cell) => {
                let proxy = cell.get_or_init(|| {
                    self.proxy_count.set(self.proxy_count.get() + 1);
                    ProxyColumn::new(id, self.reservoir_index, self.undefined_value, Rc::clone(&self.transport))
                });
                Some(Column::Proxy(proxy))
            }
        }
    }

    /// A valid column at `id`.
    pub fn valid(&self, id: ColumnId) -> Option<Column<'_>> {
        self.get(id).filter(|column| column.is_valid())
    }

    pub fn local(&self, id: ColumnId) -> Option<&LocalColumn> {
        if !self.contains(id) {
            return None;
        }
        match &self.slots[self.index(id)] {
            Slot::Local(column) => Some(column),
            Slot::Remote(_) => None,
        }
    }

    pub fn local_mut(&mut self, id: ColumnId) -> Option<&mut LocalColumn> {
        if !self.contains(id) {
            return None;
        }
        let index = self.index(id);
        match &mut self.slots[index] {
            Slot::Local(column) => Some(column),
            Slot::Remote(_) => None,
        }
    }

    /// A proxy that already exists; never creates one.
    pub fn existing_proxy(&self, id: ColumnId) -> Option<&ProxyColumn> {
        if !self.contains(id) {
            return None;
        }
        match &self.slots[self.index(id)] {
            Slot::Remote(cell) => cell.get(),
            Slot::Local(_) => None,
        }
    }

    /// Ids of the local partition, in canonical (i fastest) order.
    pub fn local_ids(&self) -> Vec<ColumnId> {
        let p = self.partition;
        (p.first_j..=p.last_j)
            .flat_map(|j| (p.first_i..=p.last_i).map(move |i| ColumnId::new(i, j)))
            .collect()
    }

    pub fn locals(&self) -> impl Iterator<Item = &LocalColumn> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Local(column) => Some(column),
            Slot::Remote(_) => None,
        })
    }

    pub fn locals_mut(&mut self) -> impl Iterator<Item = &mut LocalColumn> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Local(column) => Some(column),
            Slot::Remote(_) => None,
        })
    }

    /// Number of proxies created so far.
    pub fn proxy_count(&self) -> usize {
        self.proxy_count.get()
    }

    /// Neighbour `scale` steps along `offset`, if it lies on the grid.
    pub fn neighbour(&self, id: ColumnId, offset: (isize, isize), scale: isize) -> Option<ColumnId> {
        id.offset(offset, scale).filter(|n| self.contains(*n))
    }

    /// A column with a neighbour position beyond the grid edge.
    pub fn touches_grid_edge(&self, id: ColumnId) -> bool {
        NEIGHBOUR_OFFSETS
            .iter()
            .any(|&offset| self.neighbour(id, offset, 1).is_none())
    }

    // ---- writes that reach either kind of column

    pub fn add_migrated(&mut self, id: ColumnId, phase: PhaseId, weight: f64) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.add_migrated(phase, weight);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.add_migrated(phase, weight);
        }
    }

    pub fn add_flux(&mut self, id: ColumnId, weight: f64) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.add_flux(weight);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.add_flux(weight);
        }
    }

    /// Sets the top depth of `id` wherever it is owned. An owned column
    /// resets its proxies straight away.
    pub fn set_top_depth(&mut self, id: ColumnId, depth: f64) {
        if self.is_local(id) {
            let stale = self.local_mut(id).is_some_and(|column| {
                column.set_top_depth(depth);
                column.take_stale_proxies()
            });
            if stale {
                self.reset_proxies(id);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_top_depth(depth);
        }
    }

    pub fn set_bottom_depth(&mut self, id: ColumnId, depth: f64) {
        if self.is_local(id) {
            let stale = self.local_mut(id).is_some_and(|column| {
                column.set_bottom_depth(depth);
                column.take_stale_proxies()
            });
            if stale {
                self.reset_proxies(id);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_bottom_depth(depth);
        }
    }

    pub fn set_global_trap_id(&mut self, id: ColumnId, trap_id: i32) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.set_global_trap_id(trap_id);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_global_trap_id(trap_id);
        }
    }

    pub fn set_fill_depth(&mut self, id: ColumnId, phase: PhaseId, depth: f64) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.set_fill_depth(phase, depth);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_fill_depth(phase, depth);
        }
    }

    pub fn set_charges_to_be_migrated(&mut self, id: ColumnId, phase: PhaseId, composition: &Composition) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.set_charges_to_be_migrated(phase, composition);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_charges_to_be_migrated(phase, composition);
        }
    }

    pub fn set_diffusion_start_time(&mut self, id: ColumnId, time: f64) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.set_diffusion_start_time(time);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_diffusion_start_time(time);
        }
    }

    pub fn set_penetration_distance(&mut self, id: ColumnId, component: usize, distance: f64) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.set_penetration_distance(component, distance);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.set_penetration_distance(component, distance);
        }
    }

    pub fn add_composition_to_be_migrated(&mut self, id: ColumnId, composition: &Composition) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.add_composition_to_be_migrated(composition);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.add_composition_to_be_migrated(composition);
        }
    }

    /// Queues a contribution at `id`, keyed by the sender's position.
    pub fn push_buffer(
        &mut self,
        id: ColumnId,
        kind: BufferKind,
        phase: PhaseId,
        position: usize,
        composition: Composition,
    ) {
        if self.is_local(id) {
            if let Some(column) = self.local_mut(id) {
                column.push_buffer(kind, phase, position, composition);
            }
        } else if let Some(Column::Proxy(proxy)) = self.get(id) {
            proxy.push_buffer(kind.value_spec(), phase, position, composition);
        }
    }

    /// Applies the buffers of `kind` on every local column. Returns the
    /// applied mass.
    pub fn apply_buffers(&mut self, kind: BufferKind) -> f64 {
        self.locals_mut().map(|column| column.apply_buffer(kind)).sum()
    }

    // ---- proxy cache control

    /// Tells every rank holding a copy of local column `id` to drop it.
    pub fn reset_proxies(&self, id: ColumnId) {
        let Some(column) = self.local(id) else {
            return;
        };
        for rank in column.proxies() {
            let request = ColumnRequest::new(self.reservoir_index, id, PhaseId::FIRST, ValueSpec::ResetProxy)
                .with_payload(RequestPayload::Rank(self.transport.rank()));
            self.transport.send_proxy_reset(rank, request);
        }
    }

    /// Resets the proxies of the local columns changed since the last
    /// reset. Returns how many columns that was.
    pub fn flush_stale_proxies(&mut self) -> usize {
        let stale: Vec<ColumnId> = self
            .locals_mut()
            .filter_map(|column| column.take_stale_proxies().then(|| column.id()))
            .collect();
        for &id in &stale {
            self.reset_proxies(id);
        }
        stale.len()
    }

    pub fn reset_all_proxies(&mut self) {
        self.locals_mut().for_each(|column| {
            column.take_stale_proxies();
        });
        for column in self.locals() {
            if column.has_proxies() {
                self.reset_proxies(column.id());
            }
        }
    }

    /// Handles a reset sent by the owner of `id`.
    pub fn clear_proxy_cache(&self, id: ColumnId) {
        if let Some(proxy) = self.existing_proxy(id) {
            proxy.clear_cache();
        }
    }
}
