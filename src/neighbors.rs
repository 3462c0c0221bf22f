use std::cell::RefCell;

use glam::DVec3;

use crate::error::SimError;
use crate::particles::Particle;

/// Raised by tree walks when a buffer hits its current capacity. The
/// caller doubles and retries; the condition only becomes fatal at the
/// doubling cap.
#[derive(Debug, Clone, Copy)]
pub struct Overflow;

/// Snapshot of an accepted tree cell for the multipole sum.
#[derive(Debug, Clone)]
pub struct CellContribution {
    pub com: DVec3,
    pub m: f64,
    pub quad: [f64; 6],
}

const INITIAL_CAPACITY: usize = 512;
const CAPACITY_CAP: usize = 1 << 26;

/// Per-worker scratch for neighbour queries: the raw neighbour id list
/// with particle snapshots, the gravity split lists (smoothed pair /
/// direct / cell) and the growth bookkeeping. Buffers grow by doubling
/// and never shrink within a step.
pub struct NeighborBuffers {
    pub neiblist: Vec<usize>,
    pub neibpart: Vec<Particle>,
    pub directlist: Vec<usize>,
    pub cells: Vec<CellContribution>,
    capacity: usize,
}

impl Default for NeighborBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborBuffers {
    pub fn new() -> Self {
        Self {
            neiblist: Vec::with_capacity(INITIAL_CAPACITY),
            neibpart: Vec::with_capacity(INITIAL_CAPACITY),
            directlist: Vec::new(),
            cells: Vec::new(),
            capacity: INITIAL_CAPACITY,
        }
    }

    pub fn clear(&mut self) {
        self.neiblist.clear();
        self.neibpart.clear();
        self.directlist.clear();
        self.cells.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push_neib(&mut self, id: usize) -> Result<(), Overflow> {
        if self.neiblist.len() >= self.capacity {
            return Err(Overflow);
        }
        self.neiblist.push(id);
        Ok(())
    }

    pub fn push_direct(&mut self, id: usize) -> Result<(), Overflow> {
        if self.directlist.len() >= self.capacity {
            return Err(Overflow);
        }
        self.directlist.push(id);
        Ok(())
    }

    pub fn push_cell(&mut self, cell: CellContribution) -> Result<(), Overflow> {
        if self.cells.len() >= self.capacity {
            return Err(Overflow);
        }
        self.cells.push(cell);
        Ok(())
    }

    /// Takes the snapshots for the current neighbour list in one
    /// contiguous block.
    pub fn snapshot_neighbors(&mut self, parts: &[Particle]) {
        self.neibpart.clear();
        self.neibpart.extend(self.neiblist.iter().map(|i| parts[*i].clone()));
    }

    fn grow(&mut self) -> Result<(), ()> {
        if self.capacity >= CAPACITY_CAP {
            return Err(());
        }
        self.capacity *= 2;
        Ok(())
    }
}

thread_local! {
    static THREAD_BUFFERS: RefCell<NeighborBuffers> = RefCell::new(NeighborBuffers::new());
}

/// Runs `body` against this worker's scratch buffers, retrying with
/// doubled capacity whenever a tree walk overflows.
pub fn with_thread_buffers<R>(
    step: usize,
    mut body: impl FnMut(&mut NeighborBuffers) -> Result<R, Overflow>,
) -> Result<R, SimError> {
    THREAD_BUFFERS.with(|buffers| {
        let mut buffers = buffers.borrow_mut();
        loop {
            buffers.clear();
            match body(&mut buffers) {
                Ok(result) => return Ok(result),
                Err(Overflow) => {
                    if buffers.grow().is_err() {
                        return Err(SimError::NeighborBufferExhausted {
                            step,
                            requested: 2 * buffers.capacity(),
                            cap: CAPACITY_CAP,
                        });
                    }
                }
            }
        }
    })
}
