//! Blocks, the storage they live in, and the managers that control access to them.
//!
//! The layering, from the bottom up:
//!
//! - [`Block`]: an id plus an owned byte region.
//! - [`BlockAccess`]: raw storage of numbered blocks (memory, file, memory map, read cache).
//! - [`BlockMgr`]: phase discipline and block accounting on top of a `BlockAccess`, plus the
//!   decorators that add free-block recycling, read-only enforcement, tracking and logging.

#[allow(clippy::module_inception)]
mod block;
mod error;

pub mod access;
pub mod mgr;

pub use access::BlockAccess;
pub use block::Block;
pub use error::{BlockError, ErrorKind, Phase};
pub use mgr::BlockMgr;

/// Identifies a block within its storage. Ids are assigned in allocation order, starting from 0.
pub type BlockId = u64;
