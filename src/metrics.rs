use metrics::{Counter, Histogram};
use metrics_derive::Metrics;

#[derive(Metrics, Clone)]
#[metrics(scope = "blockmgr")]
pub struct BlockMgrMetrics {
    /// The number of blocks loaded from storage by get_read or get_write
    #[metrics(describe = "The number of blocks loaded from storage by get_read or get_write")]
    pub(crate) blocks_read: Counter,
    /// The number of blocks allocated by an update
    #[metrics(describe = "The number of blocks allocated by an update")]
    pub(crate) update_blocks_allocated: Histogram,
    /// The number of freed blocks reused by an update
    #[metrics(describe = "The number of freed blocks reused by an update")]
    pub(crate) update_blocks_recycled: Histogram,
    /// The number of blocks written by an update
    #[metrics(describe = "The number of blocks written by an update")]
    pub(crate) update_blocks_written: Histogram,
    /// The number of blocks freed by an update
    #[metrics(describe = "The number of blocks freed by an update")]
    pub(crate) update_blocks_freed: Histogram,
}

/// Block counts of the current (or last) update.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateMetrics {
    pub blocks_allocated: u32,
    pub blocks_recycled: u32,
    pub blocks_written: u32,
    pub blocks_freed: u32,
}

impl BlockMgrMetrics {
    pub(crate) fn record_update(&self, update: &UpdateMetrics) {
        self.update_blocks_allocated.record(f64::from(update.blocks_allocated));
        self.update_blocks_recycled.record(f64::from(update.blocks_recycled));
        self.update_blocks_written.record(f64::from(update.blocks_written));
        self.update_blocks_freed.record(f64::from(update.blocks_freed));
    }
}
