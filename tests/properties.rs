use std::ptr::NonNull;

use proptest::prelude::*;
use segalloc::{Arena, BLOCK_SIZE, Error, MAX_REGION, OVERHEAD, SliceSource};

const BLOCKS: usize = 8;

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Release(usize),
}

fn arb_size() -> impl Strategy<Value = usize> {
    prop_oneof![
        4 => (1usize..=32).prop_map(|n| n * 8),
        1 => (33usize..=MAX_REGION / 8).prop_map(|n| n * 8),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => arb_size().prop_map(Op::Allocate),
        2 => any::<usize>().prop_map(Op::Release),
    ]
}

struct Live {
    ptr: NonNull<u8>,
    size: usize,
    fill: u8,
}

fn disjoint(live: &[Live], ptr: NonNull<u8>, size: usize) -> bool {
    let start = ptr.as_ptr().addr();
    live.iter().all(|l| {
        let other = l.ptr.as_ptr().addr();
        start + size <= other || other + l.size <= start
    })
}

proptest! {
    #[test]
    fn random_sequences_keep_invariants(ops in prop::collection::vec(arb_op(), 1..200)) {
        let mut buf = vec![0u8; BLOCKS * BLOCK_SIZE + 8];
        let mut arena = Arena::new(SliceSource::new(&mut buf));
        arena.init();
        let mut live: Vec<Live> = Vec::new();

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Allocate(size) => match arena.allocate(size) {
                    Ok(ptr) => {
                        prop_assert_eq!(ptr.as_ptr().addr() % 8, 0);
                        prop_assert!(disjoint(&live, ptr, size));
                        let fill = step as u8;
                        unsafe { ptr.write_bytes(fill, size) };
                        live.push(Live { ptr, size, fill });
                    }
                    Err(e) => {
                        prop_assert_eq!(e, Error::OutOfMemory);
                    }
                },
                Op::Release(pick) if !live.is_empty() => {
                    let l = live.swap_remove(pick % live.len());
                    let bytes = unsafe { std::slice::from_raw_parts(l.ptr.as_ptr(), l.size) };
                    prop_assert!(bytes.iter().all(|&b| b == l.fill));
                    unsafe { arena.release(l.ptr) };
                }
                Op::Release(_) => {}
            }
            prop_assert!(arena.check().is_ok());
            for l in &live {
                let got = unsafe { arena.check_occupied(l.ptr) };
                prop_assert!(matches!(got, Ok(s) if s >= l.size && s <= l.size + OVERHEAD));
            }
        }

        for l in live.drain(..) {
            unsafe { arena.release(l.ptr) };
        }
        let stats = arena.check().unwrap();
        prop_assert_eq!(stats.free_regions, arena.blocks());
        prop_assert_eq!(stats.free_bytes, arena.blocks() * MAX_REGION);
    }

    #[test]
    fn release_then_allocate_returns_same_range(
        prefix in prop::collection::vec(arb_size(), 0..20),
        size in arb_size(),
    ) {
        // Every request fits in one block, so this can never run dry.
        let mut buf = vec![0u8; (prefix.len() + 1) * BLOCK_SIZE + 8];
        let mut arena = Arena::new(SliceSource::new(&mut buf));
        for s in prefix {
            arena.allocate(s).unwrap();
        }
        let p = arena.allocate(size).unwrap();
        unsafe { arena.release(p) };
        prop_assert_eq!(arena.allocate(size).unwrap(), p);
    }
}
