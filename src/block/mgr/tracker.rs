use super::{
    state::{ActiveBlocks, PhaseState},
    BlockMgr,
};
use crate::block::{Block, BlockError, BlockId, Phase};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// An operation recorded by a [`BlockMgrTracker`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    BeginRead,
    EndRead,
    BeginUpdate,
    EndUpdate,
    /// `None` if the allocation failed.
    Allocate(Option<BlockId>),
    GetRead(BlockId),
    GetWrite(BlockId),
    Promote(BlockId),
    Release(BlockId),
    Write(BlockId),
    Overwrite(BlockId),
    Free(BlockId),
    Recycle(BlockId),
    ResetAlloc(BlockId),
    Sync,
    SyncForce,
    Close,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginRead => write!(f, "begin_read"),
            Self::EndRead => write!(f, "end_read"),
            Self::BeginUpdate => write!(f, "begin_update"),
            Self::EndUpdate => write!(f, "end_update"),
            Self::Allocate(Some(id)) => write!(f, "allocate -> {id}"),
            Self::Allocate(None) => write!(f, "allocate"),
            Self::GetRead(id) => write!(f, "get_read({id})"),
            Self::GetWrite(id) => write!(f, "get_write({id})"),
            Self::Promote(id) => write!(f, "promote({id})"),
            Self::Release(id) => write!(f, "release({id})"),
            Self::Write(id) => write!(f, "write({id})"),
            Self::Overwrite(id) => write!(f, "overwrite({id})"),
            Self::Free(id) => write!(f, "free({id})"),
            Self::Recycle(id) => write!(f, "recycle({id})"),
            Self::ResetAlloc(boundary) => write!(f, "reset_alloc({boundary})"),
            Self::Sync => write!(f, "sync"),
            Self::SyncForce => write!(f, "sync_force"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// A block manager that checks every operation against its own record of phases and checked out
/// blocks, before passing it on.
///
/// The tracker keeps a log of the operations of the current phase. Any violation fails the call
/// without reaching the wrapped manager; in verbose mode, the log is written out through
/// `log::error!` first. Calls are serialized: one lock covers the checks and the delegation.
#[derive(Debug)]
pub struct BlockMgrTracker<M> {
    manager: M,
    verbose: bool,
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    phase: PhaseState,
    active: ActiveBlocks,
    actions: Vec<Action>,
}

impl<M: BlockMgr> BlockMgrTracker<M> {
    pub fn new(manager: M) -> Self {
        Self::with_verbose(manager, false)
    }

    /// Creates a tracker that dumps its operation log whenever it detects a violation.
    pub fn with_verbose(manager: M, verbose: bool) -> Self {
        Self { manager, verbose, state: Mutex::default() }
    }

    /// Returns the number of outstanding read checkouts of `id`.
    pub fn read_holds(&self, id: BlockId) -> usize {
        self.state.lock().active.read_count(id)
    }

    /// Returns the number of outstanding write checkouts of `id`.
    pub fn write_holds(&self, id: BlockId) -> usize {
        self.state.lock().active.write_count(id)
    }

    /// Returns the operations recorded since the current (or last) phase began.
    pub fn actions(&self) -> Vec<Action> {
        self.state.lock().actions.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase.get()
    }

    fn record(&self, action: Action) -> MutexGuard<'_, TrackerState> {
        let mut state = self.state.lock();
        state.actions.push(action);
        state
    }

    /// Reports a violation, dumping the operation log in verbose mode.
    fn fail(&self, state: &TrackerState, err: BlockError) -> BlockError {
        if self.verbose {
            log::error!("{}: {err}", self.label());
            for (index, action) in state.actions.iter().enumerate() {
                log::error!("{}: #{index:<4} {action}", self.label());
            }
        }
        err
    }

    fn check_update(&self, state: &TrackerState, op: &'static str) -> Result<(), BlockError> {
        state.phase.require_update(self.label(), op).map_err(|err| self.fail(state, err))
    }

    fn check_active(&self, state: &TrackerState, op: &'static str) -> Result<(), BlockError> {
        state.phase.require_active(self.label(), op).map_err(|err| self.fail(state, err))
    }

    fn check_write_held(
        &self,
        state: &TrackerState,
        op: &'static str,
        block: &Block,
    ) -> Result<(), BlockError> {
        state
            .active
            .check_write_held(self.label(), op, block.id(), block.is_read_only())
            .map_err(|err| self.fail(state, err))
    }

    fn store(&self, action: Action, block: Block) -> Result<(), BlockError> {
        let (op, overwrite) = match action {
            Action::Overwrite(_) => ("overwrite", true),
            _ => ("write", false),
        };
        let mut state = self.record(action);
        self.check_update(&state, op)?;
        self.check_write_held(&state, op, &block)?;
        let id = block.id();
        if overwrite {
            self.manager.overwrite(block)?;
        } else {
            self.manager.write(block)?;
        }
        state.active.remove_write(id);
        Ok(())
    }
}

impl<M: BlockMgr> BlockMgr for BlockMgrTracker<M> {
    fn label(&self) -> &str {
        self.manager.label()
    }

    fn begin_read(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        if state.phase.get() == Phase::Idle {
            state.actions.clear();
        }
        state.actions.push(Action::BeginRead);

        let mut next = state.phase.clone();
        next.begin_read(self.label()).map_err(|err| self.fail(&state, err))?;
        self.manager.begin_read()?;
        state.phase = next;
        Ok(())
    }

    fn end_read(&self) -> Result<(), BlockError> {
        let mut state = self.record(Action::EndRead);
        let mut next = state.phase.clone();
        let outermost = next.end_read(self.label()).map_err(|err| self.fail(&state, err))?;
        let leaks = if outermost {
            state.active.check_leaks(self.label(), "end_read", false)
        } else {
            Ok(())
        };
        let result = self.manager.end_read();
        state.phase = next;
        leaks.map_err(|err| self.fail(&state, err))?;
        result
    }

    fn begin_update(&self) -> Result<(), BlockError> {
        let mut state = self.state.lock();
        if state.phase.get() == Phase::Idle {
            state.actions.clear();
        }
        state.actions.push(Action::BeginUpdate);

        let mut next = state.phase.clone();
        next.begin_update(self.label()).map_err(|err| self.fail(&state, err))?;
        self.manager.begin_update()?;
        state.phase = next;
        Ok(())
    }

    fn end_update(&self) -> Result<(), BlockError> {
        let mut state = self.record(Action::EndUpdate);
        let mut next = state.phase.clone();
        next.end_update(self.label()).map_err(|err| self.fail(&state, err))?;
        let leaks = state.active.check_leaks(self.label(), "end_update", true);
        let result = self.manager.end_update();
        state.phase = next;
        leaks.map_err(|err| self.fail(&state, err))?;
        result
    }

    fn allocate(&self, size: usize) -> Result<Block, BlockError> {
        let mut state = self.record(Action::Allocate(None));
        self.check_update(&state, "allocate")?;
        let block = self.manager.allocate(size)?;
        if let Some(action) = state.actions.last_mut() {
            *action = Action::Allocate(Some(block.id()));
        }
        state.active.add_write(block.id());
        Ok(block)
    }

    fn get_read(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut state = self.record(Action::GetRead(id));
        self.check_active(&state, "get_read")?;
        let block = self.manager.get_read(id)?;
        if state.active.is_write_held(id) {
            state.active.add_write(id);
        } else {
            state.active.add_read(id);
        }
        Ok(block)
    }

    fn get_write(&self, id: BlockId) -> Result<Block, BlockError> {
        let mut state = self.record(Action::GetWrite(id));
        self.check_update(&state, "get_write")?;
        if state.active.is_read_held(id) {
            let err = BlockError::WrongHold {
                label: self.label().to_owned(),
                op: "get_write",
                id,
                reason: "is checked out for reading; promote it instead",
            };
            return Err(self.fail(&state, err));
        }
        let block = self.manager.get_write(id)?;
        state.active.add_write(id);
        Ok(block)
    }

    fn promote(&self, block: &mut Block) -> Result<(), BlockError> {
        let id = block.id();
        let mut state = self.record(Action::Promote(id));
        self.check_update(&state, "promote")?;
        if !state.active.is_read_held(id) && !state.active.is_write_held(id) {
            let err = BlockError::NotActive { label: self.label().to_owned(), op: "promote", id };
            return Err(self.fail(&state, err));
        }
        self.manager.promote(block)?;
        state.active.promote(id);
        Ok(())
    }

    fn release(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        let mut state = self.record(Action::Release(id));
        self.check_active(&state, "release")?;
        if !state.active.is_read_held(id) && !state.active.is_write_held(id) {
            let err = BlockError::NotActive { label: self.label().to_owned(), op: "release", id };
            return Err(self.fail(&state, err));
        }
        self.manager.release(block)?;
        if !state.active.remove_read(id) {
            state.active.remove_write(id);
        }
        Ok(())
    }

    fn write(&self, block: Block) -> Result<(), BlockError> {
        self.store(Action::Write(block.id()), block)
    }

    fn overwrite(&self, block: Block) -> Result<(), BlockError> {
        self.store(Action::Overwrite(block.id()), block)
    }

    fn free(&self, block: Block) -> Result<(), BlockError> {
        let id = block.id();
        let mut state = self.record(Action::Free(id));
        self.check_update(&state, "free")?;
        self.check_write_held(&state, "free", &block)?;
        self.manager.free(block)?;
        state.active.remove_write(id);
        Ok(())
    }

    fn recycle(&self, block: Block) -> Result<Block, BlockError> {
        let id = block.id();
        let mut state = self.record(Action::Recycle(id));
        self.check_update(&state, "recycle")?;
        if state.active.is_read_held(id) || state.active.is_write_held(id) {
            let err = BlockError::WrongHold {
                label: self.label().to_owned(),
                op: "recycle",
                id,
                reason: "is still checked out",
            };
            return Err(self.fail(&state, err));
        }
        let block = self.manager.recycle(block)?;
        state.active.add_write(block.id());
        Ok(block)
    }

    fn valid(&self, id: BlockId) -> bool {
        self.manager.valid(id)
    }

    fn alloc_limit(&self) -> BlockId {
        self.manager.alloc_limit()
    }

    fn reset_alloc(&self, boundary: BlockId) -> Result<(), BlockError> {
        let _state = self.record(Action::ResetAlloc(boundary));
        self.manager.reset_alloc(boundary)
    }

    fn is_empty(&self) -> bool {
        self.manager.is_empty()
    }

    fn sync(&self) -> Result<(), BlockError> {
        let _state = self.record(Action::Sync);
        self.manager.sync()
    }

    fn sync_force(&self) -> Result<(), BlockError> {
        let _state = self.record(Action::SyncForce);
        self.manager.sync_force()
    }

    fn close(&self) -> Result<(), BlockError> {
        let _state = self.record(Action::Close);
        self.manager.close()
    }

    fn is_closed(&self) -> bool {
        self.manager.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{
        access::MemBlockAccess,
        mgr::{BlockMgrCore, BlockMgrFreeChain},
        ErrorKind,
    };

    fn tracker() -> BlockMgrTracker<BlockMgrCore<MemBlockAccess>> {
        let tracker = BlockMgrTracker::new(BlockMgrCore::new(MemBlockAccess::new("tracked", 4)));
        tracker.begin_update().unwrap();
        for _ in 0..2 {
            let block = tracker.allocate(4).unwrap();
            tracker.write(block).unwrap();
        }
        tracker.end_update().unwrap();
        tracker
    }

    #[test]
    fn test_actions() {
        let tracker = tracker();
        assert_eq!(
            tracker.actions(),
            vec![
                Action::BeginUpdate,
                Action::Allocate(Some(0)),
                Action::Write(0),
                Action::Allocate(Some(1)),
                Action::Write(1),
                Action::EndUpdate,
            ]
        );

        // A new phase starts a new log.
        tracker.begin_read().unwrap();
        let block = tracker.get_read(1).unwrap();
        tracker.release(block).unwrap();
        tracker.end_read().unwrap();
        assert_eq!(
            tracker.actions(),
            vec![Action::BeginRead, Action::GetRead(1), Action::Release(1), Action::EndRead]
        );
        assert_eq!(Action::GetRead(1).to_string(), "get_read(1)");
    }

    #[test]
    fn test_hold_counts() {
        let tracker = tracker();
        tracker.begin_update().unwrap();
        let mut a = tracker.get_read(0).unwrap();
        let b = tracker.get_read(0).unwrap();
        assert_eq!(tracker.read_holds(0), 2);

        tracker.promote(&mut a).unwrap();
        tracker.promote(&mut a).unwrap();
        assert_eq!(tracker.read_holds(0), 1);
        assert_eq!(tracker.write_holds(0), 1);

        tracker.release(b).unwrap();
        tracker.overwrite(a).unwrap();
        assert_eq!(tracker.read_holds(0), 0);
        assert_eq!(tracker.write_holds(0), 0);
        tracker.end_update().unwrap();
    }

    #[test]
    fn test_violations_do_not_reach_manager() {
        let tracker = tracker();
        tracker.begin_read().unwrap();
        let err = tracker.release(Block::zeroed(1, 4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tracking);
        let err = tracker.allocate(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Phase);
        assert_eq!(tracker.alloc_limit(), 2);
        // Rejected calls are logged too.
        assert_eq!(tracker.actions().last(), Some(&Action::Allocate(None)));
        tracker.end_read().unwrap();
        assert_eq!(tracker.phase(), Phase::Idle);
    }

    #[test]
    fn test_freed_block_is_not_recycled_while_read() {
        let chain = BlockMgrFreeChain::new(BlockMgrCore::new(MemBlockAccess::new("tracked", 4)));
        let tracker = BlockMgrTracker::new(chain);

        tracker.begin_update().unwrap();
        let mut block = tracker.allocate(4).unwrap();
        block.contents_mut().fill(9);
        tracker.write(block).unwrap();
        let block = tracker.get_write(0).unwrap();
        tracker.free(block).unwrap();
        let reader = tracker.get_read(0).unwrap();

        let err = tracker.recycle(Block::zeroed(0, 4)).unwrap_err();
        assert!(matches!(err, BlockError::WrongHold { op: "recycle", id: 0, .. }));
        // The free chain offers block 0, which the wrapped manager refuses.
        let err = tracker.allocate(4).unwrap_err();
        assert!(matches!(err, BlockError::WrongHold { op: "recycle", id: 0, .. }));
        assert_eq!((tracker.read_holds(0), tracker.write_holds(0)), (1, 0));

        tracker.release(reader).unwrap();
        let block = tracker.allocate(4).unwrap();
        assert_eq!(block.id(), 1);
        tracker.write(block).unwrap();
        tracker.end_update().unwrap();
    }

    #[test]
    fn test_leak_detection() {
        let tracker = BlockMgrTracker::with_verbose(
            BlockMgrCore::new(MemBlockAccess::new("tracked", 4)),
            true,
        );
        tracker.begin_update().unwrap();
        let block = tracker.allocate(4).unwrap();
        tracker.write(block).unwrap();
        tracker.end_update().unwrap();

        tracker.begin_read().unwrap();
        let _leaked = tracker.get_read(0).unwrap();
        let err = tracker.end_read().unwrap_err();
        assert!(matches!(err, BlockError::Leaked { op: "end_read", ref read, .. } if read == &[0]));

        // The tracker and the wrapped manager are both back to idle.
        assert_eq!(tracker.phase(), Phase::Idle);
        tracker.begin_update().unwrap();
        tracker.end_update().unwrap();
    }
}
