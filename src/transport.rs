// Request transport between grid partitions

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use crate::error::{MigrationError, MigrationResult};
use crate::grid::Partition;
use crate::request::{ColumnRequest, ColumnResponse};
use crate::reservoir::MigrationReservoir;

/// Synchronous request/response channel to the owners of remote columns.
///
/// `send_request` blocks until the owner answered. `send_proxy_reset` is
/// fire-and-forget and must not wait on the receiving rank.
pub trait Transport {
    fn rank(&self) -> usize;

    /// Number of partitions taking part in the run.
    fn rank_count(&self) -> usize {
        1
    }

    fn send_request(&self, request: ColumnRequest) -> MigrationResult<ColumnResponse>;

    fn send_proxy_reset(&self, rank: usize, request: ColumnRequest);
}

/// Transport of a run that owns the whole grid. Nothing is remote, so
/// every request is an error.
#[derive(Debug, Clone, Default)]
pub struct SinglePartitionTransport;

impl SinglePartitionTransport {
    pub fn new() -> Self {
        SinglePartitionTransport
    }
}

impl Transport for SinglePartitionTransport {
    fn rank(&self) -> usize {
        0
    }

    fn send_request(&self, request: ColumnRequest) -> MigrationResult<ColumnResponse> {
        Err(MigrationError::Transport {
            spec: request.spec,
            i: request.i,
            j: request.j,
            reason: "no remote partitions in a single-partition run".to_string(),
        })
    }

    fn send_proxy_reset(&self, rank: usize, request: ColumnRequest) {
        log::debug!(
            "dropping {} for rank {} at ({}, {}): single-partition run",
            request.spec.as_str(),
            rank,
            request.i,
            request.j
        );
    }
}

/// Partitions of one process wired to each other through shared reservoir
/// handles. Each request borrows the owning reservoir for its duration;
/// an owner that is already busy means a nested request, which is
/// refused. Proxy resets are queued and handed out by
/// [`InProcessNetwork::deliver_resets`].
pub struct InProcessNetwork {
    partitions: Vec<Partition>,
    peers: RefCell<HashMap<(usize, usize), Weak<RefCell<MigrationReservoir>>>>,
    requests: Cell<usize>,
    resets: RefCell<VecDeque<(usize, ColumnRequest)>>,
}

impl InProcessNetwork {
    pub fn new(partitions: Vec<Partition>) -> Rc<Self> {
        Rc::new(InProcessNetwork {
            partitions,
            peers: RefCell::new(HashMap::new()),
            requests: Cell::new(0),
            resets: RefCell::new(VecDeque::new()),
        })
    }

    /// Transport endpoint for `rank`.
    pub fn transport(self: &Rc<Self>, rank: usize) -> Rc<dyn Transport> {
        Rc::new(InProcessTransport {
            rank,
            network: Rc::clone(self),
        })
    }

    /// Makes `reservoir` reachable as the owner of its rank's columns.
    pub fn attach(&self, rank: usize, reservoir: &Rc<RefCell<MigrationReservoir>>) {
        let index = reservoir.borrow().index();
        self.peers.borrow_mut().insert((rank, index), Rc::downgrade(reservoir));
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    pub fn pending_resets(&self) -> usize {
        self.resets.borrow().len()
    }

    fn owner_of(&self, i: usize, j: usize) -> Option<usize> {
        self.partitions
            .iter()
            .find(|partition| partition.contains(i, j))
            .map(|partition| partition.rank)
    }

    fn peer(&self, rank: usize, reservoir_index: usize) -> Option<Rc<RefCell<MigrationReservoir>>> {
        self.peers
            .borrow()
            .get(&(rank, reservoir_index))
            .and_then(Weak::upgrade)
    }

    fn serve(&self, request: ColumnRequest) -> MigrationResult<ColumnResponse> {
        let transport_error = |reason: String| MigrationError::Transport {
            spec: request.spec,
            i: request.i,
            j: request.j,
            reason,
        };

        let owner = self
            .owner_of(request.i, request.j)
            .ok_or_else(|| transport_error("column lies outside every partition".to_string()))?;
        let peer = self
            .peer(owner, request.reservoir_index)
            .ok_or_else(|| transport_error(format!("rank {} has no reservoir {}", owner, request.reservoir_index)))?;

        let mut reservoir = peer
            .try_borrow_mut()
            .map_err(|_| MigrationError::NestedRequest { spec: request.spec })?;

        self.requests.set(self.requests.get() + 1);
        Ok(reservoir.handle_request(&request))
    }

    /// Hands every queued proxy reset to its rank. Call with no reservoir
    /// borrowed. Returns the number delivered.
    pub fn deliver_resets(&self) -> MigrationResult<usize> {
        let mut delivered = 0;
        loop {
            let next = self.resets.borrow_mut().pop_front();
            let Some((rank, request)) = next else {
                break;
            };
            let Some(peer) = self.peer(rank, request.reservoir_index) else {
                continue;
            };
            let reservoir = peer
                .try_borrow()
                .map_err(|_| MigrationError::NestedRequest { spec: request.spec })?;
            reservoir.handle_proxy_reset(&request);
            delivered += 1;
        }
        Ok(delivered)
    }
}

pub struct InProcessTransport {
    rank: usize,
    network: Rc<InProcessNetwork>,
}

impl Transport for InProcessTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn rank_count(&self) -> usize {
        self.network.partitions.len().max(1)
    }

    fn send_request(&self, request: ColumnRequest) -> MigrationResult<ColumnResponse> {
        self.network.serve(request)
    }

    fn send_proxy_reset(&self, rank: usize, request: ColumnRequest) {
        self.network.resets.borrow_mut().push_back((rank, request));
    }
}
