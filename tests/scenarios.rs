use std::ptr::NonNull;

use segalloc::{Arena, BLOCK_SIZE, MAX_CLASS_SIZE, MAX_REGION, OVERHEAD, SliceSource};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn buffer(blocks: usize) -> Vec<u8> {
    vec![0; blocks * BLOCK_SIZE + 8]
}

fn addr(p: NonNull<u8>) -> usize {
    p.as_ptr().addr()
}

#[test]
fn two_neighbours_merge_back() {
    init_logger();
    let mut buf = buffer(1);
    let mut arena = Arena::new(SliceSource::new(&mut buf));
    arena.init();

    let a = arena.allocate(16).unwrap();
    let b = arena.allocate(16).unwrap();
    assert_eq!(addr(b), addr(a) + 16 + OVERHEAD);

    unsafe {
        arena.release(a);
        arena.release(b);
    }
    let c = arena.allocate(40).unwrap();
    assert_eq!(c, a);
}

#[test]
fn release_then_allocate_reuses_range() {
    init_logger();
    let mut buf = buffer(1);
    let mut arena = Arena::new(SliceSource::new(&mut buf));
    let mut live = Vec::new();
    for size in [8, 24, 256, 264, 1024] {
        live.push(arena.allocate(8).unwrap());
        let p = arena.allocate(size).unwrap();
        unsafe { arena.release(p) };
        assert_eq!(arena.allocate(size).unwrap(), p, "size {size}");
        live.push(p);
    }
    for p in live {
        unsafe { arena.release(p) };
    }
    let stats = arena.check().unwrap();
    assert_eq!(stats.free_regions, 1);
    assert_eq!(stats.free_bytes, MAX_REGION);
}

#[test]
fn block_growth_is_one_request_per_full_block() {
    init_logger();
    for size in [8, 16, 32, 72, MAX_CLASS_SIZE, 1000] {
        let per_block = (MAX_REGION + OVERHEAD) / (size + OVERHEAD);
        let mut buf = buffer(4);
        let mut arena = Arena::new(SliceSource::new(&mut buf));
        for round in 1..=3 {
            for _ in 0..per_block {
                arena.allocate(size).unwrap();
            }
            assert_eq!(arena.source().issued(), round, "size {size}");
        }
        arena.allocate(size).unwrap();
        assert_eq!(arena.source().issued(), 4, "size {size}");
        arena.check().unwrap();
    }
}

#[test]
fn smallest_class_coalesces_from_the_middle() {
    init_logger();
    let mut buf = buffer(1);
    let mut arena = Arena::new(SliceSource::new(&mut buf));
    let ptrs: Vec<_> = (0..9).map(|_| arena.allocate(8).unwrap()).collect();

    // Leave every other 8-byte region free, then fill the gaps.
    for &p in ptrs.iter().step_by(2) {
        unsafe { arena.release(p) };
    }
    assert_eq!(arena.check().unwrap().free_regions, 5);
    for &p in ptrs.iter().skip(1).step_by(2) {
        unsafe { arena.release(p) };
        arena.check().unwrap();
    }
    let stats = arena.check().unwrap();
    assert_eq!(stats.free_regions, 1);
    assert_eq!(stats.free_bytes, MAX_REGION);
}

#[test]
fn occupied_tags_stay_consistent() {
    init_logger();
    let mut buf = buffer(2);
    let mut arena = Arena::new(SliceSource::new(&mut buf));
    let sizes = [8, 16, 40, 128, 256, 512, 8, 96];
    let ptrs: Vec<_> = sizes.iter().map(|&s| arena.allocate(s).unwrap()).collect();
    for (i, &p) in ptrs.iter().enumerate() {
        if i % 3 == 0 {
            unsafe { arena.release(p) };
        }
    }
    for (i, (&p, &size)) in ptrs.iter().zip(&sizes).enumerate() {
        if i % 3 != 0 {
            let got = unsafe { arena.check_occupied(p) }.unwrap();
            assert!(got >= size && got <= size + OVERHEAD);
        }
    }
    arena.check().unwrap();
}
