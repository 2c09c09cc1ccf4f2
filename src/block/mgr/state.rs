//! Phase transitions and block checkout accounting, shared by the managers that enforce them.
//!
//! A manager is in one of 3 phases:
//!
//! - **Idle:** no phase is active.
//! - **Reading(n):** `n` nested read phases are active.
//! - **Updating:** the single update is active.
//!
//! Checked out blocks are counted per id in two multisets, one for read checkouts and one for
//! write checkouts. A phase may only end once the relevant multisets are empty.

use crate::block::{BlockError, BlockId, Phase};
use std::collections::HashMap;

/// Tracks the current phase and validates transitions.
#[derive(Clone, Debug)]
pub(super) struct PhaseState {
    phase: Phase,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl PhaseState {
    #[inline]
    pub(super) fn get(&self) -> Phase {
        self.phase
    }

    fn error(&self, label: &str, op: &'static str) -> BlockError {
        BlockError::Phase { label: label.to_owned(), op, state: self.phase }
    }

    pub(super) fn begin_read(&mut self, label: &str) -> Result<(), BlockError> {
        self.phase = match self.phase {
            Phase::Idle => Phase::Reading(1),
            Phase::Reading(depth) => Phase::Reading(depth + 1),
            Phase::Updating => return Err(self.error(label, "begin_read")),
        };
        Ok(())
    }

    /// Leaves a read phase, returning true if it was the outermost one.
    pub(super) fn end_read(&mut self, label: &str) -> Result<bool, BlockError> {
        self.phase = match self.phase {
            Phase::Reading(1) => Phase::Idle,
            Phase::Reading(depth) => Phase::Reading(depth - 1),
            Phase::Idle | Phase::Updating => return Err(self.error(label, "end_read")),
        };
        Ok(self.phase == Phase::Idle)
    }

    pub(super) fn begin_update(&mut self, label: &str) -> Result<(), BlockError> {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Updating;
                Ok(())
            }
            Phase::Reading(_) | Phase::Updating => Err(self.error(label, "begin_update")),
        }
    }

    pub(super) fn end_update(&mut self, label: &str) -> Result<(), BlockError> {
        match self.phase {
            Phase::Updating => {
                self.phase = Phase::Idle;
                Ok(())
            }
            Phase::Idle | Phase::Reading(_) => Err(self.error(label, "end_update")),
        }
    }

    /// Fails unless an update is active.
    pub(super) fn require_update(&self, label: &str, op: &'static str) -> Result<(), BlockError> {
        match self.phase {
            Phase::Updating => Ok(()),
            Phase::Idle | Phase::Reading(_) => Err(self.error(label, op)),
        }
    }

    /// Fails unless a read phase or an update is active.
    pub(super) fn require_active(&self, label: &str, op: &'static str) -> Result<(), BlockError> {
        match self.phase {
            Phase::Reading(_) | Phase::Updating => Ok(()),
            Phase::Idle => Err(self.error(label, op)),
        }
    }
}

/// Multisets of checked out block ids.
#[derive(Debug, Default)]
pub(super) struct ActiveBlocks {
    read: HashMap<BlockId, usize>,
    write: HashMap<BlockId, usize>,
}

fn add(set: &mut HashMap<BlockId, usize>, id: BlockId) {
    *set.entry(id).or_insert(0) += 1;
}

fn remove(set: &mut HashMap<BlockId, usize>, id: BlockId) -> bool {
    match set.get_mut(&id) {
        Some(1) => {
            set.remove(&id);
            true
        }
        Some(count) => {
            *count -= 1;
            true
        }
        None => false,
    }
}

fn sorted_ids(set: &HashMap<BlockId, usize>) -> Vec<BlockId> {
    let mut ids = set.keys().copied().collect::<Vec<_>>();
    ids.sort_unstable();
    ids
}

impl ActiveBlocks {
    pub(super) fn add_read(&mut self, id: BlockId) {
        add(&mut self.read, id)
    }

    pub(super) fn add_write(&mut self, id: BlockId) {
        add(&mut self.write, id)
    }

    /// Drops one read checkout of `id`, returning false if there was none.
    pub(super) fn remove_read(&mut self, id: BlockId) -> bool {
        remove(&mut self.read, id)
    }

    /// Drops one write checkout of `id`, returning false if there was none.
    pub(super) fn remove_write(&mut self, id: BlockId) -> bool {
        remove(&mut self.write, id)
    }

    pub(super) fn read_count(&self, id: BlockId) -> usize {
        self.read.get(&id).copied().unwrap_or(0)
    }

    pub(super) fn write_count(&self, id: BlockId) -> usize {
        self.write.get(&id).copied().unwrap_or(0)
    }

    #[inline]
    pub(super) fn is_read_held(&self, id: BlockId) -> bool {
        self.read.contains_key(&id)
    }

    #[inline]
    pub(super) fn is_write_held(&self, id: BlockId) -> bool {
        self.write.contains_key(&id)
    }

    /// Moves one read checkout of `id` to a write checkout, unless the block is already checked
    /// out for writing. Returns false if the block is not checked out at all.
    pub(super) fn promote(&mut self, id: BlockId) -> bool {
        if self.is_write_held(id) {
            return true;
        }
        if !self.remove_read(id) {
            return false;
        }
        self.add_write(id);
        true
    }

    /// Checks that a block given back for writing or freeing is checked out for writing.
    pub(super) fn check_write_held(
        &self,
        label: &str,
        op: &'static str,
        id: BlockId,
        read_only: bool,
    ) -> Result<(), BlockError> {
        let wrong_hold = |reason: &'static str| BlockError::WrongHold {
            label: label.to_owned(),
            op,
            id,
            reason,
        };
        if read_only {
            return Err(wrong_hold("is read-only"));
        }
        if self.is_write_held(id) {
            return Ok(());
        }
        if self.is_read_held(id) {
            return Err(wrong_hold("is checked out for reading"));
        }
        Err(BlockError::NotActive { label: label.to_owned(), op, id })
    }

    /// Like [`check_write_held`](Self::check_write_held), and drops the write checkout.
    pub(super) fn check_in_write(
        &mut self,
        label: &str,
        op: &'static str,
        id: BlockId,
        read_only: bool,
    ) -> Result<(), BlockError> {
        self.check_write_held(label, op, id, read_only)?;
        self.remove_write(id);
        Ok(())
    }

    /// Checks that a phase can end with the given checkouts outstanding. On failure all checkouts
    /// are forgotten, so that the next phase starts clean.
    pub(super) fn check_leaks(
        &mut self,
        label: &str,
        op: &'static str,
        include_write: bool,
    ) -> Result<(), BlockError> {
        let leaked_write = include_write && !self.write.is_empty();
        if self.read.is_empty() && !leaked_write {
            return Ok(());
        }
        let read = sorted_ids(&self.read);
        let write = if include_write { sorted_ids(&self.write) } else { Vec::new() };
        self.clear();
        Err(BlockError::Leaked { label: label.to_owned(), op, read, write })
    }

    pub(super) fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
    }
}
