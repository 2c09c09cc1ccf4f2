use super::BlockMgr;
use crate::block::{Block, BlockError, BlockId};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A block manager that reuses freed blocks for new allocations.
///
/// Only blocks allocated since the current update began (or since the manager was created) are
/// reused: anything below that point may be part of the last durable state, and must not be
/// overwritten until that state is superseded. The queue of reusable blocks lives in memory only
/// and is discarded by [`reset_alloc`](BlockMgr::reset_alloc).
#[derive(Debug)]
pub struct BlockMgrFreeChain<M> {
    manager: M,
    chain: Mutex<FreeChain>,
}

#[derive(Debug)]
struct FreeChain {
    // Freed blocks, oldest first.
    queue: VecDeque<Block>,
    // Allocation limit when the current update began; only ids at or above it are queued.
    origin: BlockId,
}

impl<M: BlockMgr> BlockMgrFreeChain<M> {
    pub fn new(manager: M) -> Self {
        let origin = manager.alloc_limit();
        Self { manager, chain: Mutex::new(FreeChain { queue: VecDeque::new(), origin }) }
    }

    /// Returns the ids of the blocks waiting to be reused, oldest first.
    pub fn queued(&self) -> Vec<BlockId> {
        self.chain.lock().queue.iter().map(Block::id).collect()
    }

    /// Returns the lowest block id that may currently be queued for reuse.
    pub fn origin(&self) -> BlockId {
        self.chain.lock().origin
    }
}

impl<M: BlockMgr> BlockMgr for BlockMgrFreeChain<M> {
    fn label(&self) -> &str {
        self.manager.label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        self.manager.begin_read()
    }

    fn end_read(&self) -> Result<(), BlockError> {
        self.manager.end_read()
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        self.manager.begin_update()?;
        self.chain.lock().origin = self.manager.alloc_limit();
        Ok(())
    }

    fn end_update(&self) -> Result<(), BlockError> {
        self.manager.end_update()
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let mut chain = self.chain.lock();
        let index = chain.queue.iter().position(|block| block.size() == size);
        match index.and_then(|index| chain.queue.remove(index)) {
            Some(block) => {
                log::trace!("{}: reusing freed block {}", self.label(), block.id());
                self.manager.recycle(block)
            }
            None => self.manager.allocate(size),
        }
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        self.manager.get_read(id)
    }

    fn get_write(&self, id: BlockId) -> Result<Block, BlockError> {
        self.manager.get_write(id)
    }

    fn promote(&self, block: &mut Block) -> Result<(), BlockError> {
        self.manager.promote(block)
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        self.manager.release(block)
    }

    fn write(&self, block: Block) -> Result<(), BlockError> {
        self.manager.write(block)
    }

    fn overwrite(&self, block: Block) -> Result<(), BlockError> {
        self.manager.overwrite(block)
    }

    fn free(&self, block: Block) -> Result<(), BlockError> {
        let mut chain = self.chain.lock();
        if block.id() < chain.origin {
            return self.manager.free(block);
        }
        let copy = block.clone();
        self.manager.free(block)?;
        chain.queue.push_back(copy);
        Ok(())
    }

    fn recycle(&self, block: Block) -> Result<Block, BlockError> {
        self.manager.recycle(block)
    }

    fn valid(&self, id: BlockId) -> bool {
        self.chain.lock().queue.iter().any(|block| block.id() == id) || self.manager.valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        self.manager.alloc_limit()
    }

    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError> {
        let mut chain = self.chain.lock();
        self.manager.reset_alloc(boundary)?;
        chain.queue.clear();
        chain.origin = chain.origin.min(boundary);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.manager.sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.manager.sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        self.chain.lock().queue.clear();
        self.manager.close()
    }

    fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }
}
