use log::{Level, LevelFilter};

pub mod logger;

/// Config lets you control the block size, which decorators are stacked on a block manager, and
/// logging. It is passed in when opening a block manager through the [`factory`](crate::factory).
#[derive(Debug, Clone)]
pub struct Config {
    /// The size of every block, in bytes.
    pub block_size: usize,
    /// The log level for binaries that install [`logger::Logger`].
    pub log_level: LevelFilter,
    /// Check every operation against a record of phases and checked out blocks.
    pub track: bool,
    /// Dump the operation log when tracking detects a violation.
    pub verbose: bool,
    /// Reuse blocks freed during an update.
    pub free_chain: bool,
    /// Number of blocks kept in the read cache. 0 disables the cache.
    pub read_cache: usize,
    /// Reject every operation that could modify the blocks.
    pub read_only: bool,
    /// Log every operation at this level.
    pub log_ops: Option<Level>,
    /// Number of blocks the memory map can hold. Only used by mapped storage.
    pub max_blocks: Option<u64>,
}

impl Config {
    pub const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

    pub fn new() -> Self {
        Self::default()
    }

    // Setters
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_log_level(mut self, log_level: LevelFilter) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_track(mut self, track: bool) -> Self {
        self.track = track;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_free_chain(mut self, free_chain: bool) -> Self {
        self.free_chain = free_chain;
        self
    }

    pub fn with_read_cache(mut self, read_cache: usize) -> Self {
        self.read_cache = read_cache;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_log_ops(mut self, log_ops: Option<Level>) -> Self {
        self.log_ops = log_ops;
        self
    }

    pub fn with_max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: Self::DEFAULT_BLOCK_SIZE,
            log_level: LevelFilter::Info,
            track: false,
            verbose: false,
            free_chain: true,
            read_cache: 0,
            read_only: false,
            log_ops: None,
            max_blocks: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters() {
        let config = Config::new()
            .with_block_size(64)
            .with_track(true)
            .with_verbose(true)
            .with_free_chain(false)
            .with_read_cache(16)
            .with_read_only(true)
            .with_log_ops(Some(Level::Debug))
            .with_log_level(LevelFilter::Warn)
            .with_max_blocks(100);
        assert_eq!(config.block_size, 64);
        assert!(config.track && config.verbose && config.read_only);
        assert!(!config.free_chain);
        assert_eq!(config.read_cache, 16);
        assert_eq!(config.log_ops, Some(Level::Debug));
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert_eq!(config.max_blocks, Some(100));
    }

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.block_size, Config::DEFAULT_BLOCK_SIZE);
        assert!(config.free_chain);
        assert!(!config.track);
        assert_eq!(config.read_cache, 0);
    }
}
