use super::BlockMgr;
use crate::block::{Block, BlockError, BlockId};
use log::Level;
use std::fmt;

/// A block manager that logs every operation, and its outcome, at a fixed level.
#[derive(Debug)]
pub struct BlockMgrLogger<M> {
    manager: M,
    level: Level,
}

/// Formats the outcome of an operation for the log.
struct Outcome<'a, T>(&'a Result<T, BlockError>);

impl<T> fmt::Display for Outcome<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Ok(_) => write!(f, "ok"),
            Err(err) => write!(f, "failed: {err}"),
        }
    }
}

impl<M: BlockMgr> BlockMgrLogger<M> {
    pub fn new(manager: M, level: Level) -> Self {
        Self { manager, level }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    fn log<T>(
        &self,
        op: fmt::Arguments<'_>,
        result: Result<T, BlockError>,
    ) -> Result<T, BlockError> {
        log::log!(self.level, "{}: {op}: {}", self.label(), Outcome(&result));
        result
    }
}

impl<M: BlockMgr> BlockMgr for BlockMgrLogger<M> {
    fn label(&self) -> &str {
        self.manager.label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        self.log(format_args!("begin_read"), self.manager.begin_read())
    }

    fn end_read(&self) -> Result<(), BlockError> {
        self.log(format_args!("end_read"), self.manager.end_read())
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        self.log(format_args!("begin_update"), self.manager.begin_update())
    }

    fn end_update(&self) -> Result<(), BlockError> {
        self.log(format_args!("end_update"), self.manager.end_update())
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let result = self.manager.allocate(size);
        match result.as_ref().ok().map(Block::id) {
            Some(id) => self.log(format_args!("allocate({size}) -> {id}"), result),
            None => self.log(format_args!("allocate({size})"), result),
        }
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        self.log(format_args!("get_read({id})"), self.manager.get_read(id))
    }

    fn get_write(&self, id: BlockId) -> Result<Block, BlockError> {
        self.log(format_args!("get_write({id})"), self.manager.get_write(id))
    }

    fn promote(&self, block: &mut Block) -> Result<(), BlockError> {
        let id = block.id();
        self.log(format_args!("promote({id})"), self.manager.promote(block))
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        self.log(format_args!("release({id})"), self.manager.release(block))
    }

    fn write(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        self.log(format_args!("write({id})"), self.manager.write(block))
    }

    fn overwrite(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        self.log(format_args!("overwrite({id})"), self.manager.overwrite(block))
    }

    fn free(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        self.log(format_args!("free({id})"), self.manager.free(block))
    }

    fn recycle(&self, block: Block) -> Result<Block, BlockError> {
        let id = block.id();
        self.log(format_args!("recycle({id})"), self.manager.recycle(block))
    }

    fn valid(&self, id: BlockId) -> bool {
        self.manager.valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        self.manager.alloc_limit()
    }

    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError> {
        self.log(format_args!("reset_alloc({boundary})"), self.manager.reset_alloc(boundary))
    }

    fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.log(format_args!("sync"), self.manager.sync())
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.log(format_args!("sync_force"), self.manager.sync_force())
    }

    fn close(&self) -> Result<(), BlockError> {
        self.log(format_args!("close"), self.manager.close())
    }

    fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{access::MemBlockAccess, mgr::BlockMgrCore};
    use test_log::test;

    #[test]
    fn test_delegates() {
        let core = BlockMgrCore::new(MemBlockAccess::new("logged", 4));
        let mgr = BlockMgrLogger::new(core, Level::Info);
        assert_eq!(mgr.level(), Level::Info);

        mgr.begin_update().unwrap();
        let mut block = mgr.allocate(4).unwrap();
        block.contents_mut().copy_from_slice(b"abcd");
        mgr.write(block).unwrap();
        assert!(mgr.get_read(1).is_err());
        mgr.end_update().unwrap();

        mgr.begin_read().unwrap();
        let block = mgr.get_read(0).unwrap();
        assert_eq!(block.contents(), b"abcd");
        mgr.release(block).unwrap();
        mgr.end_read().unwrap();
    }

    #[test]
    fn test_outcome_display() {
        let ok: Result<(), BlockError> = Ok(());
        assert_eq!(Outcome(&ok).to_string(), "ok");
        let err: Result<(), BlockError> = Err(BlockError::Closed { label: "x".to_owned() });
        assert_eq!(Outcome(&err).to_string(), "failed: x: closed");
    }
}
