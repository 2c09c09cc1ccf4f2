use super::{Block, BlockError, BlockId};
use std::fmt::Debug;

mod cache;
mod clock;
mod dirty;
mod file;
mod mem;
mod mmap;
mod options;

pub use cache::CachedBlockAccess;
pub use file::FileBlockAccess;
pub use mem::MemBlockAccess;
pub use mmap::MmapBlockAccess;
pub use options::BlockAccessOptions;

/// Raw storage of numbered blocks.
///
/// A `BlockAccess` stores blocks at consecutive ids starting from 0, and keeps track of the
/// allocation boundary (one past the highest id ever allocated). It knows nothing about
/// read/update phases; that policy lives in the block managers layered on top.
///
/// All methods take `&self` so that a single instance can be shared across threads.
/// Implementations use interior mutability to protect their state.
pub trait BlockAccess: Debug + Send + Sync {
    /// Diagnostic name, used in errors and logs.
    fn label(&self) -> &str;

    /// The size of every block, or `None` if blocks may have different sizes.
    fn block_size(&self) -> Option<usize>;

    /// Creates a new zeroed, writable block of `size` bytes at the next free id, and advances the
    /// allocation boundary.
    fn allocate(&self, size: usize) -> Result<Block, BlockError>;

    /// Loads the stored contents of block `id`.
    ///
    /// Fails with [`BlockError::OutOfBounds`] if `id` is at or beyond the allocation boundary.
    fn read(&self, id: BlockId) -> Result<Block, BlockError>;

    /// Stores a newly allocated block.
    fn write(&self, block: &Block) -> Result<(), BlockError>;

    /// Stores a block over its previous contents.
    fn overwrite(&self, block: &Block) -> Result<(), BlockError>;

    /// Returns true if no block was ever allocated.
    fn is_empty(&self) -> bool {
        self.alloc_boundary() == 0
    }

    /// Returns true if `id` is below the allocation boundary.
    fn valid(&self, id: BlockId) -> bool {
        id < self.alloc_boundary()
    }

    fn alloc_boundary(&self) -> BlockId;

    /// Moves the allocation boundary, typically back to where it was when a transaction began.
    fn reset_alloc_boundary(&self, boundary: BlockId) -> Result<(), BlockError>;

    /// Flushes written blocks to durable storage. Does nothing if nothing was written since the
    /// last sync.
    fn sync(&self) -> Result<(), BlockError>;

    /// Flushes to durable storage unconditionally.
    fn sync_force(&self) -> Result<(), BlockError>;

    /// Syncs and releases the underlying resource. Any I/O operation after this fails with
    /// [`BlockError::Closed`].
    fn close(&self) -> Result<(), BlockError>;

    fn is_closed(&self) -> bool;
}

impl<A: BlockAccess + ?Sized> BlockAccess for Box<A> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn block_size(&self) -> Option<usize> {
        (**self).block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        (**self).allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, BlockError> {
        (**self).read(id)
    }

    fn write(&self, block: &Block) -> Result<(), BlockError> {
        (**self).write(block)
    }

    fn overwrite(&self, block: &Block) -> Result<(), BlockError> {
        (**self).overwrite(block)
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn valid(&self, id: BlockId) -> bool {
        (**self).valid(id)
    }

    fn alloc_boundary(&self) -> BlockId {
        (**self).alloc_boundary()
    }

    fn reset_alloc_boundary(&self, boundary: BlockId) -> Result<(), BlockError> {
        (**self).reset_alloc_boundary(boundary)
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

/// Checks that `block` fits a store of fixed `block_size` blocks and lies below `boundary`.
pub(super) fn check_write(
    label: &str,
    block: &Block,
    block_size: usize,
    boundary: BlockId,
) -> Result<(), BlockError> {
    if block.id() >= boundary {
        return Err(BlockError::OutOfBounds { label: label.to_owned(), id: block.id(), boundary });
    }
    if block.size() != block_size {
        return Err(BlockError::SizeMismatch {
            label: label.to_owned(),
            id: block.id(),
            expected: block_size,
            actual: block.size(),
        });
    }
    Ok(())
}
