use super::{
    clock::{ClockReplacer, FrameId},
    BlockAccess,
};
use crate::block::{Block, BlockError, BlockId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A [`BlockAccess`] decorator that keeps recently read blocks in a bounded number of frames.
///
/// Writes go straight through to the wrapped access and refresh the cached copy, so the cache never
/// holds data that is not also in the wrapped store. When all frames are in use, a victim is chosen
/// by second-chance replacement.
#[derive(Debug)]
pub struct CachedBlockAccess<A> {
    inner: A,
    state: Mutex<CacheState>,
}

#[derive(Debug)]
struct CacheState {
    // Block id to the frame holding its contents.
    table: HashMap<BlockId, FrameId>,
    // Contents of each frame, indexed by frame id. `None` for free frames.
    frames: Vec<Option<Block>>,
    free_frames: Vec<FrameId>,
    replacer: ClockReplacer,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn new(num_frames: usize) -> Self {
        Self {
            table: HashMap::with_capacity(num_frames),
            frames: vec![None; num_frames],
            // Reversed, so that frames are handed out from 0 upwards.
            free_frames: (0..num_frames).rev().map(FrameId::from_usize).collect(),
            replacer: ClockReplacer::new(num_frames),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, id: BlockId) -> Option<Block> {
        let frame_id = *self.table.get(&id)?;
        self.replacer.touch(frame_id);
        let mut block = self.frames[frame_id.as_usize()].clone()?;
        block.rewind();
        Some(block)
    }

    fn insert(&mut self, block: &Block) {
        if let Some(&frame_id) = self.table.get(&block.id()) {
            self.frames[frame_id.as_usize()] = Some(block.clone());
            self.replacer.touch(frame_id);
            return;
        }

        let frame_id = match self.free_frames.pop() {
            Some(frame_id) => frame_id,
            None => match self.replacer.victim() {
                Some(frame_id) => {
                    if let Some(evicted) = self.frames[frame_id.as_usize()].take() {
                        self.table.remove(&evicted.id());
                    }
                    frame_id
                }
                // No frames at all.
                None => return,
            },
        };
        self.replacer.touch(frame_id);
        self.frames[frame_id.as_usize()] = Some(block.clone());
        self.table.insert(block.id(), frame_id);
    }

    /// Refreshes the cached copy of `block`, if there is one.
    fn update(&mut self, block: &Block) {
        if let Some(&frame_id) = self.table.get(&block.id()) {
            self.frames[frame_id.as_usize()] = Some(block.clone());
        }
    }

    fn drop_from(&mut self, boundary: BlockId) {
        let mut dropped = Vec::new();
        self.table.retain(|&id, &mut frame_id| {
            if id >= boundary {
                dropped.push(frame_id);
            }
            id < boundary
        });
        for frame_id in dropped {
            self.frames[frame_id.as_usize()] = None;
            self.replacer.reset(frame_id);
            self.free_frames.push(frame_id);
        }
    }

    fn clear(&mut self) {
        for (_, frame_id) in self.table.drain() {
            self.frames[frame_id.as_usize()] = None;
            self.replacer.reset(frame_id);
            self.free_frames.push(frame_id);
        }
    }
}

impl<A: BlockAccess> CachedBlockAccess<A> {
    /// Wraps `inner` with a cache of `num_frames` blocks.
    pub fn new(inner: A, num_frames: usize) -> Self {
        log::debug!("{}: read cache of {num_frames} blocks", inner.label());
        Self { inner, state: Mutex::new(CacheState::new(num_frames)) }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Returns the number of reads served from the cache.
    pub fn hits(&self) -> u64 {
        self.state.lock().hits
    }

    /// Returns the number of reads that went to the wrapped access.
    pub fn misses(&self) -> u64 {
        self.state.lock().misses
    }

    /// Returns the number of blocks currently cached.
    pub fn cached_blocks(&self) -> usize {
        self.state.lock().table.len()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.state.lock().table.contains_key(&id)
    }
}

impl<A: BlockAccess> BlockAccess for CachedBlockAccess<A> {
    fn label(&self) -> &str {
        self.inner.label()
    }

    fn block_size(&self) -> Option<usize> {
        self.inner.block_size()
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        self.inner.allocate(size)
    }

    fn read(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut state = self.state.lock();
        if self.inner.is_closed() {
            return Err(BlockError::Closed { label: self.label().to_owned() });
        }
        if let Some(block) = state.get(id) {
            state.hits += 1;
            return Ok(block);
        }
        state.misses += 1;
        let block = self.inner.read(id)?;
        state.insert(&block);
        Ok(block)
    }

    fn write(&self, block: &Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        self.inner.write(block)?;
        state.update(block);
        Ok(())
    }

    fn overwrite(&self, block: &Block) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        self.inner.overwrite(block)?;
        state.update(block);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn valid(&self, id: BlockId) -> bool {
        self.inner.valid(id)
    }

    fn alloc_boundary(&self) -> BlockId {
        self.inner.alloc_boundary()
    }

    fn reset_alloc_boundary(&self, boundary: BlockId) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        self.inner.reset_alloc_boundary(boundary)?;
        state.drop_from(boundary);
        Ok(())
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.inner.sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.inner.sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        state.clear();
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
