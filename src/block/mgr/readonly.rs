use super::BlockMgr;
use crate::block::{Block, BlockError, BlockId};

/// A block manager that only allows reading.
///
/// Every operation that could change the stored blocks, or the allocation limit, fails with
/// [`BlockError::ReadOnly`] without reaching the wrapped manager.
#[derive(Debug)]
pub struct BlockMgrReadonly<M> {
    manager: M,
}

impl<M: BlockMgr> BlockMgrReadonly<M> {
    pub fn new(manager: M) -> Self {
        Self { manager }
    }

    fn reject<T>(&self, op: &'static str) -> Result<T, BlockError> {
        Err(BlockError::ReadOnly { label: self.manager.label().to_owned(), op })
    }
}

impl<M: BlockMgr> BlockMgr for BlockMgrReadonly<M> {
    fn label(&self) -> &str {
        self.manager.label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        self.manager.begin_read()
    }

    fn end_read(&self) -> Result<(), BlockError> {
        self.manager.end_read()
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        self.reject("begin_update")
    }

    fn end_update(&self) -> Result<(), BlockError> {
        self.reject("end_update")
    }

    fn allocate(&self, _size: usize) -> Result<Block, BlockError> {
        self.reject("allocate")
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        self.manager.get_read(id)
    }

    fn get_write(&self, _id: BlockId) -> Result<Block, BlockError> {
        self.reject("get_write")
    }

    fn promote(&self, _block: &mut Block) -> Result<(), BlockError> {
        self.reject("promote")
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        self.manager.release(block)
    }

    fn write(&self, _block: Block) -> Result<(), BlockError> {
        self.reject("write")
    }

    fn overwrite(&self, _block: Block) -> Result<(), BlockError> {
        self.reject("overwrite")
    }

    fn free(&self, _block: Block) -> Result<(), BlockError> {
        self.reject("free")
    }

    fn recycle(&self, _block: Block) -> Result<Block, BlockError> {
        self.reject("recycle")
    }

    fn valid(&self, id: BlockId) -> bool {
        self.manager.valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        self.manager.alloc_limit()
    }

    fn reset_alloc(&self, _boundary: BlockId) -> Result<(), BlockError> {
        self.reject("reset_alloc")
    }

    fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        self.manager.sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        self.manager.sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        self.manager.close()
    }

    fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{access::MemBlockAccess, mgr::BlockMgrCore, ErrorKind};

    #[test]
    fn test_rejects_mutators() {
        let core = BlockMgrCore::new(MemBlockAccess::new("ro", 4));
        core.begin_update().unwrap();
        let block = core.allocate(4).unwrap();
        core.write(block).unwrap();
        core.end_update().unwrap();

        let mgr = BlockMgrReadonly::new(core);
        let limit = mgr.alloc_limit();

        let err = mgr.begin_update().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnly);
        assert_eq!(err.to_string(), "ro: begin_update on a read-only block manager");
        assert!(matches!(mgr.allocate(4), Err(BlockError::ReadOnly { op: "allocate", .. })));
        assert!(matches!(mgr.get_write(0), Err(BlockError::ReadOnly { op: "get_write", .. })));
        assert!(matches!(mgr.reset_alloc(0), Err(BlockError::ReadOnly { .. })));
        assert!(matches!(mgr.end_update(), Err(BlockError::ReadOnly { .. })));
        assert_eq!(mgr.alloc_limit(), limit);

        mgr.begin_read().unwrap();
        let mut block = mgr.get_read(0).unwrap();
        assert!(matches!(mgr.promote(&mut block), Err(BlockError::ReadOnly { .. })));
        assert!(matches!(mgr.free(block.clone()), Err(BlockError::ReadOnly { .. })));
        assert!(matches!(mgr.write(block.clone()), Err(BlockError::ReadOnly { .. })));
        assert!(matches!(mgr.overwrite(block.clone()), Err(BlockError::ReadOnly { .. })));
        mgr.release(block).unwrap();
        mgr.end_read().unwrap();
    }
}
