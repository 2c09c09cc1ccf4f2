use super::{Block, BlockError, BlockId};
use std::fmt::Debug;

mod core;
mod free_chain;
mod logger;
mod readonly;
mod state;
mod tracker;

pub use self::core::BlockMgrCore;
pub use free_chain::BlockMgrFreeChain;
pub use logger::BlockMgrLogger;
pub use readonly::BlockMgrReadonly;
pub use tracker::{Action, BlockMgrTracker};

/// Controlled access to blocks, within read and update phases.
///
/// A block manager is used in phases: readers bracket their work with
/// [`begin_read`](BlockMgr::begin_read)/[`end_read`](BlockMgr::end_read) (read phases nest), and a
/// single writer brackets its work with [`begin_update`](BlockMgr::begin_update)/
/// [`end_update`](BlockMgr::end_update). Within a phase, blocks are checked out with
/// [`get_read`](BlockMgr::get_read), [`get_write`](BlockMgr::get_write) or
/// [`allocate`](BlockMgr::allocate), and checked back in by passing them by value to
/// [`release`](BlockMgr::release), [`write`](BlockMgr::write), [`overwrite`](BlockMgr::overwrite)
/// or [`free`](BlockMgr::free). A phase must end with every block checked back in.
///
/// Any operation called in the wrong phase, or on a block that is not checked out appropriately,
/// fails immediately.
pub trait BlockMgr: Debug + Send + Sync {
    /// Diagnostic name, used in errors and logs.
    fn label(&self) -> &str;

    /// Starts a read phase. Read phases nest, and cannot start during an update.
    fn begin_read(&self) -> Result<(), BlockError>;

    /// Ends the innermost read phase. Ending the outermost one fails if blocks checked out for
    /// reading were never released.
    fn end_read(&self) -> Result<(), BlockError>;

    /// Starts an update. Only possible when no phase is active.
    fn begin_update(&self) -> Result<(), BlockError>;

    /// Ends the update. Fails if any block is still checked out.
    fn end_update(&self) -> Result<(), BlockError>;

    /// Creates a new zeroed, writable block of `size` bytes, checked out for writing.
    fn allocate(&self, size: usize) -> Result<Block, BlockError>;

    /// Checks out block `id` for reading.
    ///
    /// The returned block is read-only, unless the same block is already checked out for writing,
    /// in which case it counts as one more write checkout and is writable.
    fn get_read(&self, id: BlockId) -> Result<Block, BlockError>;

    /// Checks out block `id` for writing. Fails if the block is checked out for reading: use
    /// [`promote`](BlockMgr::promote) instead.
    fn get_write(&self, id: BlockId) -> Result<Block, BlockError>;

    /// Turns a block checked out for reading into one checked out for writing. Promoting a block
    /// that is already writable does nothing.
    fn promote(&self, block: &mut Block) -> Result<(), BlockError>;

    /// Checks a block back in without writing it.
    fn release(&self, block: Block) -> Result<(), BlockError>;

    /// Stores a newly allocated block and checks it back in.
    fn write(&self, block: Block) -> Result<(), BlockError>;

    /// Stores a block over its previous contents and checks it back in.
    fn overwrite(&self, block: Block) -> Result<(), BlockError>;

    /// Gives up a block checked out for writing. The block's storage is not touched.
    fn free(&self, block: Block) -> Result<(), BlockError>;

    /// Checks out a previously freed block again, for writing, without reading its storage. The
    /// block is returned zeroed and rewound.
    fn recycle(&self, block: Block) -> Result<Block, BlockError>;

    /// Returns true if `id` refers to an allocated block.
    fn valid(&self, id: BlockId) -> bool;

    /// Returns the id the next allocation from storage will receive.
    fn alloc_limit(&self) -> BlockId;

    /// Rolls the allocation limit back to `boundary`, e.g. to abort an update.
    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError>;

    /// Returns true if no block was ever allocated.
    fn is_empty(&self) -> bool;

    fn sync(&self) -> Result<(), BlockError>;

    fn sync_force(&self) -> Result<(), BlockError>;

    fn close(&self) -> Result<(), BlockError>;

    fn is_closed(&self) -> bool;
}

impl<M: BlockMgr + ?Sized> BlockMgr for Box<M> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        (**self).begin_read()
    }

    fn end_read(&self) -> Result<(), BlockError> {
        (**self).end_read()
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        (**self).begin_update()
    }

    fn end_update(&self) -> Result<(), BlockError> {
        (**self).end_update()
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        (**self).allocate(size)
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        (**self).get_read(id)
    }

    fn get_write(&self, id: BlockId) -> Result<Block, BlockError> {
        (**self).get_write(id)
    }

    fn promote(&self, block: &mut Block) -> Result<(), BlockError> {
        (**self).promote(block)
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        (**self).release(block)
    }

    fn write(&self, block: Block) -> Result<(), BlockError> {
        (**self).write(block)
    }

    fn overwrite(&self, block: Block) -> Result<(), BlockError> {
        (**self).overwrite(block)
    }

    fn free(&self, block: Block) -> Result<(), BlockError> {
        (**self).free(block)
    }

    fn recycle(&self, block: Block) -> Result<Block, BlockError> {
        (**self).recycle(block)
    }

    fn valid(&self, id: BlockId) -> bool {
        (**self).valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        (**self).alloc_limit()
    }

    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError> {
        (**self).reset_alloc(boundary)
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        (**self).sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        (**self).sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}
