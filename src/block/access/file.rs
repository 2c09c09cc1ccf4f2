use super::{check_write, dirty::WrittenBlocks, BlockAccess, BlockAccessOptions};
use crate::block::{Block, BlockError, BlockId};
use parking_lot::{Mutex, MutexGuard};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Block storage in a file, accessed with explicit reads and writes.
///
/// Block `id` lives at byte offset `id * block_size`. Allocation only moves the boundary; the file
/// grows when a block is first written, and shrinks when the boundary is reset below its end.
#[derive(Debug)]
pub struct FileBlockAccess {
    label: String,
    block_size: usize,
    // `None` once closed.
    file: Mutex<Option<File>>,
    boundary: AtomicU64,
    // Locked after `file`.
    written: Mutex<WrittenBlocks>,
    sync_needed: AtomicBool,
}

impl FileBlockAccess {
    pub fn options(block_size: usize) -> BlockAccessOptions {
        BlockAccessOptions::new(block_size)
    }

    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self, BlockError> {
        Self::options(block_size).open_direct(path)
    }

    pub(super) fn from_file_with_options(
        opts: &BlockAccessOptions,
        file: File,
        label: String,
    ) -> Result<Self, BlockError> {
        assert!(opts.block_size > 0, "block size must be positive");
        let file_len = file.metadata()?.len();
        let block_count = opts.block_count.unwrap_or(file_len / opts.block_size as u64);
        log::debug!("{label}: opened file with {block_count} blocks of {} bytes", opts.block_size);

        Ok(Self {
            label,
            block_size: opts.block_size,
            file: Mutex::new(Some(file)),
            boundary: AtomicU64::new(block_count),
            written: Mutex::new(WrittenBlocks::new(
                block_count.min(file_len / opts.block_size as u64),
            )),
            sync_needed: AtomicBool::new(false),
        })
    }

    #[inline]
    fn offset(&self, id: BlockId) -> u64 {
        id * self.block_size as u64
    }

    /// Locks the file, failing if it has been closed.
    fn lock_file(&self) -> Result<MutexGuard<'_, Option<File>>, BlockError> {
        let guard = self.file.lock();
        if guard.is_none() {
            return Err(BlockError::Closed { label: self.label.clone() });
        }
        Ok(guard)
    }

    fn store(&self, block: &Block) -> Result<(), BlockError> {
        let mut guard = self.lock_file()?;
        check_write(&self.label, block, self.block_size, self.alloc_boundary())?;
        let file = guard.as_mut().ok_or_else(|| BlockError::Closed { label: self.label.clone() })?;
        file.seek(SeekFrom::Start(self.offset(block.id())))?;
        file.write_all(block.contents())?;
        self.written.lock().mark_written(block.id());
        self.sync_needed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self, file: &File, force: bool) -> Result<(), BlockError> {
        let needed = self.sync_needed.swap(false, Ordering::Relaxed);
        if force {
            file.sync_all()?;
        } else if needed {
            file.sync_data()?;
        }
        Ok(())
    }
}

impl BlockAccess for FileBlockAccess {
    fn label(&self) -> &str {
        &self.label
    }

    fn block_size(&self) -> Option<usize> {
        Some(self.block_size)
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let _guard = self.lock_file()?;
        let id = self.boundary.load(Ordering::Relaxed);
        if size != self.block_size {
            return Err(BlockError::SizeMismatch {
                label: self.label.clone(),
                id,
                expected: self.block_size,
                actual: size,
            });
        }
        self.boundary.store(id + 1, Ordering::Relaxed);
        Ok(Block::zeroed(id, size))
    }

    fn read(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut guard = self.lock_file()?;
        let boundary = self.alloc_boundary();
        if id >= boundary {
            return Err(BlockError::OutOfBounds { label: self.label.clone(), id, boundary });
        }
        if !self.written.lock().contains(id) {
            return Err(BlockError::NeverWritten { label: self.label.clone(), id });
        }
        let file = guard.as_mut().ok_or_else(|| BlockError::Closed { label: self.label.clone() })?;
        let mut data = vec![0; self.block_size].into_boxed_slice();
        file.seek(SeekFrom::Start(self.offset(id)))?;
        match file.read_exact(&mut data) {
            Ok(()) => Ok(Block::new(id, data)),
            // Truncated behind our back.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(BlockError::NeverWritten { label: self.label.clone(), id })
            }
            Err(e) => Err(e.into()),
        }
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
        let guard = self.lock_file()?;
        let current = self.alloc_boundary();
        if boundary > current {
            return Err(BlockError::OutOfBounds {
                label: self.label.clone(),
                id: boundary,
                boundary: current,
            });
        }
        let file = guard.as_ref().ok_or_else(|| BlockError::Closed { label: self.label.clone() })?;
        // Drop the contents past the boundary, so that neither a reallocation nor a reopen sees
        // them again.
        let len = self.offset(boundary);
        if file.metadata()?.len() > len {
            file.set_len(len)?;
            self.sync_needed.store(true, Ordering::Relaxed);
        }
        self.written.lock().truncate(boundary);
        self.boundary.store(boundary, Ordering::Relaxed);
        Ok(())
    }

    fn sync(&self) -> Result<(), BlockError> {
        let guard = self.lock_file()?;
        match guard.as_ref() {
            Some(file) => self.flush(file, false),
            None => Ok(()),
        }
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        let guard = self.lock_file()?;
        match guard.as_ref() {
            Some(file) => self.flush(file, true),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), BlockError> {
        let mut guard = self.file.lock();
        match guard.take() {
            Some(file) => self.flush(&file, false),
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }
}

impl Drop for FileBlockAccess {
    fn drop(&mut self) {
        if let Some(file) = self.file.get_mut().take() {
            if let Err(e) = self.flush(&file, false) {
                log::warn!("{}: sync on drop failed: {e}", self.label);
            }
        }
    }
}
