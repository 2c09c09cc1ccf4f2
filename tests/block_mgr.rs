use blockmgr::{
    factory, Block, BlockError, BlockMgr, BlockMgrCore, BlockMgrFreeChain, BlockMgrReadonly,
    BlockMgrTracker, Config, ErrorKind, FileBlockAccess, MemBlockAccess, Phase,
};
use proptest::prelude::*;
use std::io::Write;
use test_log::test;

fn config() -> Config {
    Config::new().with_block_size(64)
}

/// Allocates and writes `n` blocks, each filled with its own index.
fn populate(mgr: &impl BlockMgr, n: u8) {
    mgr.begin_update().unwrap();
    for i in 0..n {
        let mut block = mgr.allocate(64).unwrap();
        block.contents_mut().fill(i);
        mgr.write(block).unwrap();
    }
    mgr.end_update().unwrap();
}

#[test]
fn write_then_read_a_64_byte_block_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let access = FileBlockAccess::open(dir.path().join("blocks.dat"), 64).unwrap();
    let mgr = BlockMgrCore::new(access);
    let expected = (0..64).collect::<Vec<u8>>();

    mgr.begin_update().unwrap();
    let mut block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), 0);
    block.write_all(&expected).unwrap();
    assert_eq!(block.position(), 64);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();

    mgr.begin_read().unwrap();
    let block = mgr.get_read(0).unwrap();
    assert!(block.is_read_only());
    assert_eq!(block.contents(), &expected[..]);
    mgr.release(block).unwrap();
    mgr.end_read().unwrap();

    mgr.sync().unwrap();
    mgr.close().unwrap();
}

proptest! {
    #[test]
    fn allocation_is_monotonic(count in 1usize..64, updates in 1usize..4) {
        let mgr = factory::mem("mem", &config().with_free_chain(false));
        let mut last: Option<u64> = None;
        for _ in 0..updates {
            mgr.begin_update().unwrap();
            for _ in 0..count {
                let limit = mgr.alloc_limit();
                let block = mgr.allocate(64).unwrap();
                prop_assert_eq!(block.id(), limit);
                prop_assert!(last.is_none_or(|last| block.id() > last));
                prop_assert_eq!(mgr.alloc_limit(), limit + 1);
                last = Some(block.id());
                mgr.write(block).unwrap();
            }
            mgr.end_update().unwrap();
        }
        prop_assert_eq!(mgr.alloc_limit(), (count * updates) as u64);
    }
}

#[test]
fn read_after_write_within_and_after_update() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_track(true).with_max_blocks(1024);
    let mgr = factory::mapped(dir.path().join("blocks.mmap"), &config).unwrap();
    populate(&mgr, 4);

    mgr.begin_update().unwrap();
    let mut block = mgr.get_write(2).unwrap();
    block.contents_mut().fill(0xee);
    mgr.overwrite(block).unwrap();
    // Visible within the same update.
    let block = mgr.get_read(2).unwrap();
    assert_eq!(block.contents(), &[0xee; 64]);
    mgr.release(block).unwrap();
    mgr.end_update().unwrap();

    mgr.begin_read().unwrap();
    for (id, byte) in [(0, 0), (1, 1), (2, 0xee), (3, 3)] {
        let block = mgr.get_read(id).unwrap();
        assert_eq!(block.contents(), &[byte; 64]);
        mgr.release(block).unwrap();
    }
    mgr.end_read().unwrap();
}

#[test]
fn reads_beyond_the_allocation_limit_fail() {
    let mgr = factory::mem("mem", &config());
    populate(&mgr, 3);

    mgr.begin_read().unwrap();
    let err = mgr.get_read(mgr.alloc_limit()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::File);
    assert!(matches!(err, BlockError::OutOfBounds { id: 3, boundary: 3, .. }));
    assert!(!mgr.valid(3));
    assert!(mgr.valid(2));
    mgr.end_read().unwrap();
}

#[test]
fn freed_blocks_are_recycled() {
    let mgr = BlockMgrFreeChain::new(BlockMgrCore::new(MemBlockAccess::new("mem", 64)));
    mgr.begin_update().unwrap();
    let block = mgr.allocate(64).unwrap();
    let id = block.id();
    mgr.free(block).unwrap();
    let block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), id);
    assert_eq!(mgr.alloc_limit(), 1);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();

    // Without the free chain, allocation strictly advances.
    let mgr = BlockMgrCore::new(MemBlockAccess::new("mem", 64));
    mgr.begin_update().unwrap();
    let block = mgr.allocate(64).unwrap();
    mgr.free(block).unwrap();
    let block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), 1);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();
}

#[test]
fn blocks_that_predate_the_update_are_not_recycled() {
    let mgr = BlockMgrFreeChain::new(BlockMgrCore::new(MemBlockAccess::new("mem", 64)));
    populate(&mgr, 2);

    mgr.begin_update().unwrap();
    let old = mgr.get_write(0).unwrap();
    mgr.free(old).unwrap();
    let new = mgr.allocate(64).unwrap();
    assert_eq!(new.id(), 2);
    mgr.free(new).unwrap();
    assert_eq!(mgr.queued(), vec![2]);
    assert_eq!(mgr.allocate(64).unwrap().id(), 2);
}

#[test]
fn unreleased_reads_are_reported_at_end_of_read() {
    let core = BlockMgrCore::new(MemBlockAccess::new("mem", 64));
    let mgr = BlockMgrTracker::with_verbose(core, true);
    populate(&mgr, 8);

    mgr.begin_read().unwrap();
    let _block = mgr.get_read(7).unwrap();
    let err = mgr.end_read().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Tracking);
    match err {
        BlockError::Leaked { read, write, .. } => {
            assert_eq!(read, vec![7]);
            assert!(write.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mgr.phase(), Phase::Idle);
}

#[test]
fn read_only_manager_rejects_allocation() {
    let core = BlockMgrCore::new(MemBlockAccess::new("mem", 64));
    populate(&core, 2);
    let mgr = BlockMgrReadonly::new(core);

    let before = mgr.alloc_limit();
    let err = mgr.allocate(64).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReadOnly);
    assert_eq!(mgr.alloc_limit(), before);
    assert!(mgr.begin_update().is_err());
    assert!(mgr.reset_alloc(0).is_err());
    assert_eq!(mgr.alloc_limit(), before);
}

#[test]
fn promotion_is_idempotent() {
    let mgr = BlockMgrTracker::new(BlockMgrCore::new(MemBlockAccess::new("mem", 64)));
    populate(&mgr, 1);

    mgr.begin_update().unwrap();
    let mut block = mgr.get_read(0).unwrap();
    assert_eq!(mgr.read_holds(0), 1);
    mgr.promote(&mut block).unwrap();
    mgr.promote(&mut block).unwrap();
    assert_eq!(mgr.read_holds(0), 0);
    assert_eq!(mgr.write_holds(0), 1);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();
}

#[test]
fn reset_alloc_discards_the_recycle_queue() {
    let mgr = BlockMgrFreeChain::new(BlockMgrCore::new(MemBlockAccess::new("mem", 64)));
    mgr.begin_update().unwrap();
    let start = mgr.alloc_limit();
    let blocks = (0..3).map(|_| mgr.allocate(64).unwrap()).collect::<Vec<Block>>();
    for block in blocks {
        mgr.free(block).unwrap();
    }
    assert_eq!(mgr.queued().len(), 3);

    mgr.reset_alloc(start).unwrap();
    assert!(mgr.queued().is_empty());
    let block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), start);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();
}

#[test]
fn phase_violations_fail_immediately() {
    let mgr = factory::mem("mem", &config().with_track(true));
    let err = mgr.get_write(0).unwrap_err();
    assert!(matches!(err, BlockError::Phase { op: "get_write", state: Phase::Idle, .. }));

    mgr.begin_update().unwrap();
    assert!(matches!(mgr.begin_read().unwrap_err(), BlockError::Phase { .. }));
    assert!(matches!(mgr.begin_update().unwrap_err(), BlockError::Phase { .. }));
    mgr.end_update().unwrap();
    assert!(matches!(mgr.end_update().unwrap_err(), BlockError::Phase { .. }));
}

#[test]
fn concurrent_readers() {
    let mgr = factory::mem("mem", &config().with_track(true).with_read_cache(4));
    populate(&mgr, 16);

    std::thread::scope(|s| {
        for t in 0..4u8 {
            let mgr = &mgr;
            s.spawn(move || {
                for round in 0..50u8 {
                    mgr.begin_read().unwrap();
                    let id = ((t + round) % 16) as u64;
                    let block = mgr.get_read(id).unwrap();
                    assert_eq!(block.contents(), &[id as u8; 64]);
                    mgr.release(block).unwrap();
                    mgr.end_read().unwrap();
                }
            });
        }
    });

    // All readers are gone, so an update can start.
    mgr.begin_update().unwrap();
    mgr.end_update().unwrap();
}

#[test]
fn mapped_store_reopens_with_its_allocation_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blocks.mmap");
    let config = config().with_max_blocks(4096);

    let mgr = factory::mapped(&path, &config).unwrap();
    populate(&mgr, 3);
    mgr.begin_update().unwrap();
    let block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), 3);
    // Allocated but never written.
    mgr.free(block).unwrap();
    mgr.end_update().unwrap();
    mgr.reset_alloc(3).unwrap();
    mgr.close().unwrap();
    drop(mgr);

    let mgr = factory::mapped(&path, &config).unwrap();
    assert_eq!(mgr.alloc_limit(), 3);
    mgr.begin_read().unwrap();
    let block = mgr.get_read(2).unwrap();
    assert_eq!(block.contents(), &[2; 64]);
    mgr.release(block).unwrap();
    let err = mgr.get_read(500).unwrap_err();
    assert!(matches!(err, BlockError::OutOfBounds { id: 500, boundary: 3, .. }));
    mgr.end_read().unwrap();

    mgr.begin_update().unwrap();
    let block = mgr.allocate(64).unwrap();
    assert_eq!(block.id(), 3);
    mgr.write(block).unwrap();
    mgr.end_update().unwrap();
}

#[test]
fn unwritten_blocks_are_never_served() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_max_blocks(1024);
    let stores = [
        factory::mem("mem", &config),
        factory::direct(dir.path().join("blocks.dat"), &config).unwrap(),
        factory::mapped(dir.path().join("blocks.mmap"), &config).unwrap(),
    ];
    for mgr in stores {
        mgr.begin_update().unwrap();
        let block = mgr.allocate(64).unwrap();
        let copy = block.clone();
        mgr.release(block).unwrap();
        let err = mgr.get_read(copy.id()).unwrap_err();
        assert!(matches!(err, BlockError::NeverWritten { id: 0, .. }), "{}", mgr.label());
        mgr.end_update().unwrap();
    }
}

#[test]
fn closed_manager() {
    let mgr = factory::mem("mem", &config());
    populate(&mgr, 1);
    mgr.close().unwrap();
    assert!(mgr.is_closed());
    assert!(!mgr.is_empty());

    mgr.begin_read().unwrap();
    assert!(matches!(mgr.get_read(0).unwrap_err(), BlockError::Closed { .. }));
    mgr.end_read().unwrap();
}
