use super::{FileBlockAccess, MmapBlockAccess};
use crate::block::{BlockError, BlockId};
use std::{
    fs::{File, OpenOptions},
    path::Path,
};

/// Options for opening file-backed block storage.
#[derive(Clone, Debug)]
pub struct BlockAccessOptions {
    pub(super) open_options: OpenOptions,
    pub(super) read_only: bool,
    pub(super) label: Option<String>,
    pub(super) block_size: usize,
    pub(super) block_count: Option<BlockId>,
    pub(super) max_blocks: Option<BlockId>,
}

impl BlockAccessOptions {
    /// Largest memory map reserved by default.
    pub const DEFAULT_MAX_MAP_LEN: u64 = if cfg!(not(test)) {
        1 << 40
    } else {
        // Tests run in parallel and each one reserves address space, so be conservative.
        1 << 30
    };

    pub fn new(block_size: usize) -> Self {
        let mut open_options = File::options();
        open_options.read(true).write(true).create(true).truncate(false);
        Self {
            open_options,
            read_only: false,
            label: None,
            block_size,
            block_count: None,
            max_blocks: None,
        }
    }

    /// Sets the option to create a new file, or open it if it already exists.
    ///
    /// The default is `true`.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.open_options.create(create);
        self
    }

    /// Sets the option to create a new file, failing if it already exists.
    ///
    /// The default is `false`.
    ///
    /// If `.create_new(true)` is set, then `.create()` is ignored.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.open_options.create_new(create_new);
        self
    }

    /// Opens the file without write access. Writes through the resulting access fail, and a
    /// memory map is mapped read-only.
    ///
    /// The default is `false`.
    pub fn read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self.open_options.write(!read_only);
        if read_only {
            self.open_options.create(false);
        }
        self
    }

    /// Causes the file length to be set to 0 after opening it.
    ///
    /// Note that if `wipe(true)` is set, then setting [`block_count()`](Self::block_count) with
    /// any number greater than `0` will cause the open to fail.
    pub fn wipe(&mut self, wipe: bool) -> &mut Self {
        self.open_options.truncate(wipe);
        self
    }

    /// Sets the diagnostic label. The default is the file path.
    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the number of blocks already allocated in the file, i.e. the initial allocation
    /// boundary.
    ///
    /// By default this is derived from the file length.
    pub fn block_count(&mut self, block_count: BlockId) -> &mut Self {
        self.block_count = Some(block_count);
        self
    }

    /// Sets the maximum number of blocks that can be allocated in a memory mapped file.
    ///
    /// The default is [`DEFAULT_MAX_MAP_LEN`](Self::DEFAULT_MAX_MAP_LEN) divided by the block
    /// size.
    pub fn max_blocks(&mut self, max_blocks: BlockId) -> &mut Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    pub(super) fn max_blocks_or_default(&self) -> BlockId {
        self.max_blocks.unwrap_or(Self::DEFAULT_MAX_MAP_LEN / self.block_size as u64)
    }

    pub(super) fn label_or(&self, path: &Path) -> String {
        self.label.clone().unwrap_or_else(|| path.display().to_string())
    }

    /// Opens the file at `path` for positional reads and writes.
    pub fn open_direct(&self, path: impl AsRef<Path>) -> Result<FileBlockAccess, BlockError> {
        let path = path.as_ref();
        let file = self.open_options.open(path)?;
        FileBlockAccess::from_file_with_options(self, file, self.label_or(path))
    }

    /// Opens the file at `path` through a memory map.
    pub fn open_mapped(&self, path: impl AsRef<Path>) -> Result<MmapBlockAccess, BlockError> {
        let path = path.as_ref();
        let file = self.open_options.open(path)?;
        MmapBlockAccess::from_file_with_options(self, file, self.label_or(path))
    }

    /// Wraps the given `file` for positional reads and writes.
    ///
    /// If `.wrap_direct()` is called, `.create()`, `.create_new()` and `.wipe()` are ignored.
    pub fn wrap_direct(&self, file: File) -> Result<FileBlockAccess, BlockError> {
        let label = self.label.clone().unwrap_or_else(|| "file".to_owned());
        FileBlockAccess::from_file_with_options(self, file, label)
    }

    /// Wraps the given `file` through a memory map.
    ///
    /// If `.wrap_mapped()` is called, `.create()`, `.create_new()` and `.wipe()` are ignored.
    pub fn wrap_mapped(&self, file: File) -> Result<MmapBlockAccess, BlockError> {
        let label = self.label.clone().unwrap_or_else(|| "mmap".to_owned());
        MmapBlockAccess::from_file_with_options(self, file, label)
    }
}
