use super::{
    state::{ActiveBlocks, PhaseState},
    BlockMgr,
};
use crate::{
    block::{Block, BlockAccess, BlockError, BlockId},
    metrics::{BlockMgrMetrics, UpdateMetrics},
};
use parking_lot::Mutex;

/// The policy layer over a [`BlockAccess`]: enforces phases and keeps count of checked out
/// blocks.
///
/// Allows any number of (nested) read phases, or a single update, at a time. Every violation is
/// reported as an error from the offending call; the phase and block accounting are left
/// unchanged by a failed call, except at the end of a phase, where leaked blocks are reported and
/// forgotten.
#[derive(Debug)]
pub struct BlockMgrCore<A> {
    access: A,
    state: Mutex<CoreState>,
    metrics: BlockMgrMetrics,
}

#[derive(Debug, Default)]
struct CoreState {
    phase: PhaseState,
    active: ActiveBlocks,
    update: UpdateMetrics,
}

impl<A: BlockAccess> BlockMgrCore<A> {
    pub fn new(access: A) -> Self {
        Self { access, state: Mutex::default(), metrics: BlockMgrMetrics::default() }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    /// Returns the block counts of the running update, or of the last one if none is running.
    pub fn update_metrics(&self) -> UpdateMetrics {
        self.state.lock().update
    }

    fn store(&self, op: &'static str, block: Block, overwrite: bool) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), op)?;
        state.active.check_in_write(self.label(), op, block.id(), block.is_read_only())?;
        if overwrite {
            self.access.overwrite(&block)?;
        } else {
            self.access.write(&block)?;
        }
        state.update.blocks_written += 1;
        Ok(())
    }
}

impl<A: BlockAccess> BlockMgr for BlockMgrCore<A> {
    fn label(&self) -> &str {
        self.access.label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        self.state.lock().phase.begin_read(self.label())
    }

    fn end_read(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        if state.phase.end_read(self.label())? {
            state.active.check_leaks(self.label(), "end_read", false)?;
        }
        Ok(())
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.begin_update(self.label())?;
        state.update = UpdateMetrics::default();
        Ok(())
    }

    fn end_update(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.end_update(self.label())?;
        self.metrics.record_update(&state.update);
        state.active.check_leaks(self.label(), "end_update", true)
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), "allocate")?;
        let block = self.access.allocate(size)?;
        state.active.add_write(block.id());
        state.update.blocks_allocated += 1;
        Ok(block)
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        state.phase.require_active(self.label(), "get_read")?;
        let mut block = self.access.read(id)?;
        self.metrics.blocks_read.increment(1);
        if state.active.is_write_held(id) {
            state.active.add_write(id);
        } else {
            block.set_read_only();
            state.active.add_read(id);
        }
        Ok(block)
    }

    fn get_write(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), "get_write")?;
        if state.active.is_read_held(id) {
            return Err(BlockError::WrongHold {
                label: self.label().to_owned(),
                op: "get_write",
                id,
                reason: "is checked out for reading; promote it instead",
            });
        }
        let block = self.access.read(id)?;
        self.metrics.blocks_read.increment(1);
        state.active.add_write(id);
        Ok(block)
    }

    fn promote(&self, block: &mut Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), "promote")?;
        if !state.active.promote(block.id()) {
            return Err(BlockError::NotActive {
                label: self.label().to_owned(),
                op: "promote",
                id: block.id(),
            });
        }
        block.set_writable();
        Ok(())
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.require_active(self.label(), "release")?;
        if state.active.remove_read(block.id()) || state.active.remove_write(block.id()) {
            return Ok(());
        }
        Err(BlockError::NotActive { label: self.label().to_owned(), op: "release", id: block.id() })
    }

    fn write(&self, block: Block) -> Result<(), BlockError> {
        self.store("write", block, false)
    }

    fn overwrite(&self, block: Block) -> Result<(), BlockError> {
        self.store("overwrite", block, true)
    }

    fn free(&self, block: Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), "free")?;
        state.active.check_in_write(self.label(), "free", block.id(), block.is_read_only())?;
        state.update.blocks_freed += 1;
        Ok(())
    }

    fn recycle(&self, mut block: Block) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        state.phase.require_update(self.label(), "recycle")?;
        let boundary = self.access.alloc_boundary();
        if block.id() >= boundary {
            return Err(BlockError::OutOfBounds {
                label: self.label().to_owned(),
                id: block.id(),
                boundary,
            });
        }
        if state.active.is_read_held(block.id()) || state.active.is_write_held(block.id()) {
            return Err(BlockError::WrongHold {
                label: self.label().to_owned(),
                op: "recycle",
                id: block.id(),
                reason: "is still checked out",
            });
        }
        block.clear();
        block.set_writable();
        state.active.add_write(block.id());
        state.update.blocks_recycled += 1;
        Ok(block)
    }

    fn valid(&self, id: BlockId) -> bool {
        self.access.valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        self.access.alloc_boundary()
    }

    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError> {
        self.access.reset_alloc_boundary(boundary)
    }

    fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.access.sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.access.sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        self.access.close()
    }

    fn is_closed(&self) -> bool {
        self.access.is_closed()
    }
}
