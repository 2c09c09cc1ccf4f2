//! Block storage management: allocation, recycling and checkout discipline for numbered blocks of
//! bytes, backed by memory, a file or a memory mapped file.

pub mod block;
pub mod config;
pub mod factory;
pub mod metrics;

pub use block::{
    access::{
        BlockAccessOptions, CachedBlockAccess, FileBlockAccess, MemBlockAccess, MmapBlockAccess,
    },
    mgr::{BlockMgrCore, BlockMgrFreeChain, BlockMgrLogger, BlockMgrReadonly, BlockMgrTracker},
    Block, BlockAccess, BlockError, BlockId, BlockMgr, ErrorKind, Phase,
};
pub use config::Config;
pub use crate::metrics::UpdateMetrics;
