use super::{check_write, BlockAccess};
use crate::block::{Block, BlockError, BlockId};
use parking_lot::Mutex;

/// Block storage held entirely in memory.
///
/// Blocks are copied in and out, so a caller modifying a checked-out block never changes the
/// stored contents until it is written.
///
/// In fixed-size mode (see [`MemBlockAccess::new`]) every block has the same size. In
/// variable-size mode (see [`MemBlockAccess::variable`]) each block keeps the size it was
/// allocated with.
#[derive(Debug)]
pub struct MemBlockAccess {
    label: String,
    block_size: Option<usize>,
    state: Mutex<MemState>,
}

#[derive(Debug, Default)]
struct MemState {
    // Indexed by block id. `sizes` records the allocated size, `blocks` the written contents.
    sizes: Vec<usize>,
    blocks: Vec<Option<Box<[u8]>>>,
    closed: bool,
}

impl MemBlockAccess {
    /// Creates an empty store of `block_size` byte blocks.
    pub fn new(label: impl Into<String>, block_size: usize) -> Self {
        Self { label: label.into(), block_size: Some(block_size), state: Mutex::default() }
    }

    /// Creates an empty store where every block may have its own size.
    pub fn variable(label: impl Into<String>) -> Self {
        Self { label: label.into(), block_size: None, state: Mutex::default() }
    }

    fn closed(&self) -> BlockError {
        BlockError::Closed { label: self.label.clone() }
    }

    fn store(&self, block: &Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed());
        }
        let boundary = state.sizes.len() as BlockId;
        let index = block.id() as usize;
        let expected = match self.block_size {
            Some(block_size) => block_size,
            None => state.sizes.get(index).copied().unwrap_or(block.size()),
        };
        check_write(&self.label, block, expected, boundary)?;
        state.blocks[index] = Some(block.contents().into());
        Ok(())
    }
}

impl BlockAccess for MemBlockAccess {
    fn label(&self) -> &str {
        &self.label
    }

    fn block_size(&self) -> Option<usize> {
        self.block_size
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed());
        }
        let id = state.sizes.len() as BlockId;
        if let Some(block_size) = self.block_size {
            if size != block_size {
                return Err(BlockError::SizeMismatch {
                    label: self.label.clone(),
                    id,
                    expected: block_size,
                    actual: size,
                });
            }
        }
        state.sizes.push(size);
        state.blocks.push(None);
        Ok(Block::zeroed(id, size))
    }

    fn read(&self, id: BlockId) -> Result<Block, BlockError> {
        let state = self.state.lock();
        if state.closed {
            return Err(self.closed());
        }
        let boundary = state.sizes.len() as BlockId;
        if id >= boundary {
            return Err(BlockError::OutOfBounds { label: self.label.clone(), id, boundary });
        }
        match &state.blocks[id as usize] {
            Some(data) => Ok(Block::new(id, data.clone())),
            None => Err(BlockError::NeverWritten { label: self.label.clone(), id }),
        }
    }

    fn write(&self, block: &Block) -> Result<(), BlockError> {
        self.store(block)
    }

    fn overwrite(&self, block: &Block) -> Result<(), BlockError> {
        self.store(block)
    }

    fn alloc_boundary(&self) -> BlockId {
        self.state.lock().sizes.len() as BlockId
    }

    fn reset_alloc_boundary(&self, boundary: BlockId) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed());
        }
        let current = state.sizes.len() as BlockId;
        if boundary > current {
            return Err(BlockError::OutOfBounds {
                label: self.label.clone(),
                id: boundary,
                boundary: current,
            });
        }
        state.sizes.truncate(boundary as usize);
        state.blocks.truncate(boundary as usize);
        Ok(())
    }

    fn sync(&self) -> Result<(), BlockError> {
        if self.state.lock().closed {
            return Err(self.closed());
        }
        Ok(())
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.sync()
    }

    fn close(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.closed = true;
        state.blocks.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}
