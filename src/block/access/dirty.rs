use std::collections::BTreeMap;

use crate::block::BlockId;

/// Tracks which blocks of a memory mapped file were written since the last flush, as runs of
/// consecutive ids.
#[derive(Debug, Default)]
pub(super) struct DirtyBlocks {
    // Half-open ranges [start, end) of dirty blocks, non-overlapping and non-adjacent.
    runs: BTreeMap<BlockId, BlockId>,
}

impl DirtyBlocks {
    pub(super) fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Iterate over the dirty runs as (byte offset, length) pairs.
    pub(super) fn byte_runs(&self, block_size: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.runs.iter().map(move |(&start, &end)| {
            (start as usize * block_size, (end - start) as usize * block_size)
        })
    }

    pub(super) fn contains(&self, id: BlockId) -> bool {
        self.runs.range(..=id).next_back().is_some_and(|(_, &end)| id < end)
    }

    /// Marks a block as dirty, returning true if the block was newly marked.
    pub(super) fn mark_dirty(&mut self, id: BlockId) -> bool {
        if self.contains(id) {
            return false;
        }
        let next = id + 1;

        // Predecessor run: start <= id; it touches `id` if it ends exactly there.
        let left = self.runs.range(..=id).next_back().filter(|&(_, &end)| end == id);
        let left = left.map(|(&start, _)| start);
        // Successor run: it touches `id` if it starts right after it.
        let right = self.runs.get(&next).copied();

        match (left, right) {
            (Some(l_start), Some(r_end)) => {
                self.runs.remove(&next);
                self.runs.insert(l_start, r_end);
            }
            (Some(l_start), None) => {
                self.runs.insert(l_start, next);
            }
            (None, Some(r_end)) => {
                self.runs.remove(&next);
                self.runs.insert(id, r_end);
            }
            (None, None) => {
                self.runs.insert(id, next);
            }
        }

        true
    }

    /// Forgets dirty blocks at or beyond `boundary`.
    pub(super) fn truncate(&mut self, boundary: BlockId) {
        self.runs.retain(|&start, _| start < boundary);
        if let Some(end) = self.runs.values_mut().next_back() {
            *end = (*end).min(boundary);
        }
    }

    pub(super) fn clear(&mut self) {
        self.runs.clear();
    }
}

/// Tracks which blocks of a file hold written contents.
///
/// Blocks below `persisted` were found in the file when it was opened; blocks written since are
/// kept as runs. Anything else below the allocation boundary was allocated but never written.
#[derive(Debug, Default)]
pub(super) struct WrittenBlocks {
    persisted: BlockId,
    written: DirtyBlocks,
}

impl WrittenBlocks {
    pub(super) fn new(persisted: BlockId) -> Self {
        Self { persisted, written: DirtyBlocks::default() }
    }

    pub(super) fn contains(&self, id: BlockId) -> bool {
        id < self.persisted || self.written.contains(id)
    }

    pub(super) fn mark_written(&mut self, id: BlockId) {
        if id >= self.persisted {
            self.written.mark_dirty(id);
        }
    }

    /// Forgets written blocks at or beyond `boundary`.
    pub(super) fn truncate(&mut self, boundary: BlockId) {
        self.persisted = self.persisted.min(boundary);
        self.written.truncate(boundary);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const SIZE: usize = 4096;

    fn runs(dirty: &DirtyBlocks) -> Vec<(usize, usize)> {
        dirty.byte_runs(SIZE).collect()
    }

    #[test]
    fn test_clear() {
        let mut dirty = DirtyBlocks::default();
        assert!(dirty.is_empty());
        assert!(dirty.mark_dirty(0));
        assert!(!dirty.mark_dirty(0));
        assert_eq!(runs(&dirty), vec![(0, 4096)]);
        assert!(!dirty.is_empty());

        dirty.clear();
        assert!(runs(&dirty).is_empty());
        assert!(dirty.mark_dirty(0));
        assert_eq!(runs(&dirty), vec![(0, 4096)]);
    }

    #[test]
    fn test_mark_dirty_noncontiguous_runs() {
        let mut dirty = DirtyBlocks::default();
        assert!(dirty.mark_dirty(0));
        assert!(dirty.mark_dirty(2));
        assert!(dirty.mark_dirty(10));
        assert_eq!(runs(&dirty), vec![(0, 4096), (8192, 4096), (40960, 4096)]);
    }

    #[test]
    fn test_mark_dirty_extend_right() {
        let mut dirty = DirtyBlocks::default();
        assert!(dirty.mark_dirty(0));
        assert!(dirty.mark_dirty(1));
        assert!(dirty.mark_dirty(2));
        assert_eq!(runs(&dirty), vec![(0, 12288)]);

        assert!(dirty.mark_dirty(10));
        assert!(dirty.mark_dirty(11));
        assert_eq!(runs(&dirty), vec![(0, 12288), (40960, 8192)]);
    }

    #[test]
    fn test_mark_dirty_extend_left() {
        let mut dirty = DirtyBlocks::default();
        assert!(dirty.mark_dirty(99));
        assert!(dirty.mark_dirty(98));
        assert!(dirty.mark_dirty(97));
        assert_eq!(runs(&dirty), vec![(97 * 4096, 12288)]);

        assert!(dirty.mark_dirty(1));
        assert!(dirty.mark_dirty(0));
        assert_eq!(runs(&dirty), vec![(0, 8192), (97 * 4096, 12288)]);
    }

    #[test]
    fn test_mark_dirty_merge_runs() {
        let mut dirty = DirtyBlocks::default();
        assert!(dirty.mark_dirty(99));
        assert!(dirty.mark_dirty(97));
        assert_eq!(runs(&dirty), vec![(97 * 4096, 4096), (99 * 4096, 4096)]);

        assert!(dirty.mark_dirty(98));
        assert_eq!(runs(&dirty), vec![(97 * 4096, 12288)]);
    }

    #[test]
    fn test_truncate() {
        let mut dirty = DirtyBlocks::default();
        for id in [0, 1, 2, 3, 7, 8] {
            dirty.mark_dirty(id);
        }
        dirty.truncate(2);
        assert_eq!(runs(&dirty), vec![(0, 8192)]);
        assert!(dirty.mark_dirty(2));
        assert_eq!(runs(&dirty), vec![(0, 12288)]);
    }

    #[test]
    fn test_contains() {
        let mut dirty = DirtyBlocks::default();
        for id in [2, 3, 7] {
            dirty.mark_dirty(id);
        }
        let found = (0..10).filter(|&id| dirty.contains(id)).collect::<Vec<_>>();
        assert_eq!(found, vec![2, 3, 7]);
    }

    #[test]
    fn test_written_blocks() {
        let mut written = WrittenBlocks::new(3);
        assert!(written.contains(2));
        assert!(!written.contains(3));

        written.mark_written(1);
        written.mark_written(5);
        assert!(written.contains(5));
        assert!(!written.contains(4));

        written.truncate(2);
        assert!(written.contains(1));
        assert!(!written.contains(2));
        assert!(!written.contains(5));
        written.mark_written(2);
        assert!(written.contains(2));
    }

    proptest! {
        #[test]
        fn test_mark_dirty_random(ids in prop::collection::vec(0..10_000u64, 1..1000)) {
            let mut dirty = DirtyBlocks::default();
            for id in &ids {
                dirty.mark_dirty(*id);
            }

            let runs = runs(&dirty);
            assert!(runs.is_sorted_by_key(|(start, _)| *start));
            // ensure that runs are non-overlapping and non-adjacent
            assert!(runs.windows(2).all(|w| w[0].0 + w[0].1 < w[1].0));

            let mut unique = ids.clone();
            unique.sort();
            unique.dedup();
            let covered: usize = runs.iter().map(|(_, len)| len / SIZE).sum();
            assert_eq!(covered, unique.len());
        }
    }
}
