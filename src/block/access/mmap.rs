use super::{
    check_write,
    dirty::{DirtyBlocks, WrittenBlocks},
    BlockAccess, BlockAccessOptions,
};
use crate::block::{Block, BlockError, BlockId};
use memmap2::{MmapOptions, MmapRaw};
use parking_lot::Mutex;
use std::{
    fs::File,
    io,
    path::Path,
    ptr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Block storage in a memory mapped file.
///
/// Block `id` lives at byte offset `id * block_size`. The file grows in large steps as blocks are
/// allocated, and is cut back to the allocation boundary when the access is closed or dropped.
/// Writes land in the mapping and are flushed to the file on `sync`, limited to the runs of blocks
/// written since the previous flush.
#[derive(Debug)]
pub struct MmapBlockAccess {
    label: String,
    block_size: usize,
    mmap: MmapRaw,
    file: Mutex<File>,
    file_len: AtomicU64,
    boundary: AtomicU64,
    dirty: Mutex<DirtyBlocks>,
    written: Mutex<WrittenBlocks>,
    read_only: bool,
    closed: AtomicBool,
}

impl MmapBlockAccess {
    /// Minimum number of blocks added to the file whenever it grows.
    const MIN_GROWTH_BLOCKS: u64 = 1024;

    pub fn options(block_size: usize) -> BlockAccessOptions {
        BlockAccessOptions::new(block_size)
    }

    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, BlockError> {
        Self::options(block_size).open_mapped(path)
    }

    pub(super) fn from_file_with_options(
        opts: &BlockAccessOptions,
        file: File,
        label: String,
    ) -> Result<Self, BlockError> {
        assert!(opts.block_size > 0, "block size must be positive");

        // Reserve a memory map as large as the maximum number of blocks, so that remapping is
        // never needed. This only reserves address space: it allocates no memory and does not
        // grow the file. Reading or writing past the end of the file would still fault, so every
        // access is checked against the allocation boundary, which never exceeds the file length.
        let mmap_len = opts.max_blocks_or_default() as usize * opts.block_size;

        // SAFETY: we assume that we have full ownership of the file, even though in practice
        // there's no way to guarantee it
        let mmap = if cfg!(not(miri)) {
            let mut mmap_options = MmapOptions::new();
            mmap_options.len(mmap_len);
            let mmap = if opts.read_only {
                mmap_options.map_raw_read_only(&file)?
            } else {
                mmap_options.map_raw(&file)?
            };
            #[cfg(unix)]
            mmap.advise(memmap2::Advice::Random)?;
            mmap
        } else {
            MmapOptions::new().len(mmap_len).map_anon()?.into()
        };

        let file_len = file.metadata()?.len();
        let block_count = opts.block_count.unwrap_or(file_len / opts.block_size as u64);
        log::debug!(
            "{label}: mapped file with {block_count} blocks of {} bytes (capacity {})",
            opts.block_size,
            mmap_len / opts.block_size
        );

        let access = Self {
            label,
            block_size: opts.block_size,
            mmap,
            file: Mutex::new(file),
            file_len: AtomicU64::new(file_len),
            boundary: AtomicU64::new(block_count),
            dirty: Mutex::new(DirtyBlocks::default()),
            written: Mutex::new(WrittenBlocks::new(
                block_count.min(file_len / opts.block_size as u64),
            )),
            read_only: opts.read_only,
            closed: AtomicBool::new(false),
        };
        access.grow_if_needed(block_count * access.block_size as u64)?;
        Ok(access)
    }

    /// Returns the maximum number of blocks that fit in the memory map.
    pub fn capacity(&self) -> BlockId {
        (self.mmap.len() / self.block_size) as BlockId
    }

    fn check_open(&self) -> Result<(), BlockError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(BlockError::Closed { label: self.label.clone() });
        }
        Ok(())
    }

    /// Fails if the mapping is read-only.
    fn check_writable(&self) -> Result<(), BlockError> {
        if self.read_only {
            let msg = format!("{}: mapped read-only", self.label);
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, msg).into());
        }
        Ok(())
    }

    #[inline]
    fn offset(&self, id: BlockId) -> usize {
        id as usize * self.block_size
    }

    /// Grows the underlying file to make room for additional blocks.
    ///
    /// This will increase the file size by a constant factor of 1024 blocks, or a relative factor
    /// of 12.5%, whichever is greater, without exceeding the size of the memory map.
    ///
    /// On success, returns the new length (in bytes) of the file.
    fn grow(&self, file: &mut File) -> Result<u64, BlockError> {
        let cur_len = self.file_len.load(Ordering::Relaxed);
        let increment = (cur_len / 8).max(Self::MIN_GROWTH_BLOCKS * self.block_size as u64);
        let new_len = cur_len
            .checked_add(increment)
            .ok_or_else(|| BlockError::LimitReached { label: self.label.clone() })?;
        let new_len = new_len.min(self.mmap.len() as u64);
        if new_len <= cur_len {
            return Err(BlockError::LimitReached { label: self.label.clone() });
        }

        file.set_len(new_len)?;
        self.file_len.store(new_len, Ordering::Relaxed);
        log::trace!("{}: file grown to {new_len} bytes", self.label);
        Ok(new_len)
    }

    /// Ensures that the underlying file has at least `min_len` bytes, growing it if needed.
    #[inline]
    fn grow_if_needed(&self, min_len: u64) -> Result<(), BlockError> {
        // Only a single atomic load in the common case where the file is already large enough.
        if min_len > self.file_len.load(Ordering::Relaxed) {
            let mut file = self.file.lock();
            // Another thread may have grown the file before we acquired the lock.
            while min_len > self.file_len.load(Ordering::Relaxed) {
                self.grow(&mut file)?;
            }
        }
        Ok(())
    }

    /// Increments the boundary and returns the id of the new block.
    ///
    /// The file is grown to cover the new block before the boundary moves, so that every id below
    /// the boundary is backed by the file even if growing fails.
    fn next_block_id(&self) -> Result<BlockId, BlockError> {
        let capacity = self.capacity();
        let mut old = self.boundary.load(Ordering::Relaxed);
        loop {
            let new = old
                .checked_add(1)
                .filter(|&new| new <= capacity)
                .ok_or_else(|| BlockError::LimitReached { label: self.label.clone() })?;
            self.grow_if_needed(new * self.block_size as u64)?;
            match self.boundary.compare_exchange_weak(old, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(old),
                Err(value) => old = value,
            }
        }
    }

    fn store(&self, block: &Block) -> Result<(), BlockError> {
        self.check_open()?;
        self.check_writable()?;
        check_write(&self.label, block, self.block_size, self.alloc_boundary())?;

        let offset = self.offset(block.id());
        // SAFETY: the block is below the boundary, and the file always covers the boundary, so
        // the destination lies inside both the memory map and the file. The block manager
        // guarantees a single writer per block.
        unsafe {
            ptr::copy_nonoverlapping(
                block.contents().as_ptr(),
                self.mmap.as_mut_ptr().add(offset),
                self.block_size,
            );
        }
        self.dirty.lock().mark_dirty(block.id());
        self.written.lock().mark_written(block.id());
        Ok(())
    }

    fn flush_dirty(&self) -> Result<(), BlockError> {
        let mut dirty = self.dirty.lock();
        if dirty.is_empty() {
            return Ok(());
        }
        for (offset, len) in dirty.byte_runs(self.block_size) {
            self.mmap.flush_range(offset, len)?;
        }
        dirty.clear();
        Ok(())
    }

    /// Shrinks the file to the allocation boundary, so that a reopen finds exactly the allocated
    /// blocks.
    fn trim(&self) -> Result<(), BlockError> {
        if self.read_only {
            return Ok(());
        }
        let file = self.file.lock();
        let len = self.offset(self.alloc_boundary()) as u64;
        if self.file_len.load(Ordering::Relaxed) > len {
            file.set_len(len)?;
            self.file_len.store(len, Ordering::Relaxed);
            log::trace!("{}: file trimmed to {len} bytes", self.label);
        }
        Ok(())
    }
}

impl BlockAccess for MmapBlockAccess {
    fn label(&self) -> &str {
        &self.label
    }

    fn block_size(&self) -> Option<usize> {
        Some(self.block_size)
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        self.check_open()?;
        self.check_writable()?;
        if size != self.block_size {
            return Err(BlockError::SizeMismatch {
                label: self.label.clone(),
                id: self.alloc_boundary(),
                expected: self.block_size,
                actual: size,
            });
        }
        let id = self.next_block_id()?;
        Ok(Block::zeroed(id, size))
    }

    fn read(&self, id: BlockId) -> Result<Block, BlockError> {
        self.check_open()?;
        let boundary = self.alloc_boundary();
        if id >= boundary {
            return Err(BlockError::OutOfBounds { label: self.label.clone(), id, boundary });
        }
        if !self.written.lock().contains(id) {
            return Err(BlockError::NeverWritten { label: self.label.clone(), id });
        }

        let mut data = vec![0; self.block_size].into_boxed_slice();
        // SAFETY: We have checked that the block lies below the boundary, which the file covers.
        unsafe {
            ptr::copy_nonoverlapping(
                self.mmap.as_ptr().add(self.offset(id)),
                data.as_mut_ptr(),
                self.block_size,
            );
        }
        Ok(Block::new(id, data))
    }

    fn write(&self, block: &Block) -> Result<(), BlockError> {
        self.store(block)
    }

    fn overwrite(&self, block: &Block) -> Result<(), BlockError> {
        self.store(block)
    }

    fn alloc_boundary(&self) -> BlockId {
        self.boundary.load(Ordering::Relaxed)
    }

    fn reset_alloc_boundary(&self, boundary: BlockId) -> Result<(), BlockError> {
        self.check_open()?;
        let current = self.alloc_boundary();
        if boundary > current {
            return Err(BlockError::OutOfBounds {
                label: self.label.clone(),
                id: boundary,
                boundary: current,
            });
        }
        self.boundary.store(boundary, Ordering::Relaxed);
        self.dirty.lock().truncate(boundary);
        self.written.lock().truncate(boundary);
        Ok(())
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.check_open()?;
        self.flush_dirty()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.check_open()?;
        self.flush_dirty()?;
        let file = self.file.lock();
        let len = self.file_len.load(Ordering::Relaxed) as usize;
        if len > 0 {
            self.mmap.flush_range(0, len)?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn close(&self) -> Result<(), BlockError> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        self.flush_dirty()?;
        self.trim()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Drop for MmapBlockAccess {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.flush_dirty().and_then(|()| self.trim()) {
            log::warn!("{}: sync on drop failed: {e}", self.label);
        }
    }
}
