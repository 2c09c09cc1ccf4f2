//! Builds block managers from a [`Config`].
//!
//! Every function returns the full stack of decorators selected by the config, wrapped around a
//! core manager, in this order from the inside out:
//!
//! storage, read cache, core, operation logging, free chain, read-only, tracking.

use crate::{
    block::{
        access::{BlockAccessOptions, CachedBlockAccess, MemBlockAccess},
        mgr::{
            BlockMgrCore, BlockMgrFreeChain, BlockMgrLogger, BlockMgrReadonly, BlockMgrTracker,
        },
        BlockAccess, BlockError, BlockMgr,
    },
    config::Config,
};
use std::path::Path;

/// Opens an in-memory block manager.
pub fn mem(label: impl Into<String>, config: &Config) -> Box<dyn BlockMgr> {
    build(MemBlockAccess::new(label, config.block_size), config)
}

/// Opens a block manager on the file at `path`, using positional reads and writes.
pub fn direct(path: impl AsRef<Path>, config: &Config) -> Result<Box<dyn BlockMgr>, BlockError> {
    let access = options(config).open_direct(path)?;
    Ok(build(access, config))
}

/// Opens a block manager on the file at `path`, through a memory map.
pub fn mapped(path: impl AsRef<Path>, config: &Config) -> Result<Box<dyn BlockMgr>, BlockError> {
    let access = options(config).open_mapped(path)?;
    Ok(build(access, config))
}

fn options(config: &Config) -> BlockAccessOptions {
    let mut opts = BlockAccessOptions::new(config.block_size);
    opts.read_only(config.read_only);
    if let Some(max_blocks) = config.max_blocks {
        opts.max_blocks(max_blocks);
    }
    opts
}

/// Stacks the decorators selected by `config` on top of `access`.
pub fn build(access: impl BlockAccess + 'static, config: &Config) -> Box<dyn BlockMgr> {
    let label = access.label().to_owned();
    let access: Box<dyn BlockAccess> = if config.read_cache > 0 {
        Box::new(CachedBlockAccess::new(access, config.read_cache))
    } else {
        Box::new(access)
    };

    let mut mgr: Box<dyn BlockMgr> = Box::new(BlockMgrCore::new(access));
    if let Some(level) = config.log_ops {
        mgr = Box::new(BlockMgrLogger::new(mgr, level));
    }
    if config.free_chain && !config.read_only {
        mgr = Box::new(BlockMgrFreeChain::new(mgr));
    }
    if config.read_only {
        mgr = Box::new(BlockMgrReadonly::new(mgr));
    }
    if config.track {
        mgr = Box::new(BlockMgrTracker::with_verbose(mgr, config.verbose));
    }

    log::debug!(
        "{label}: block manager ready (cache: {}, free chain: {}, read-only: {}, tracked: {})",
        config.read_cache,
        config.free_chain && !config.read_only,
        config.read_only,
        config.track
    );
    mgr
}
