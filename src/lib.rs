//! A segregated free-list allocator with boundary tags.
//!
//! Memory comes from a [`BlockSource`] in blocks of [`BLOCK_SIZE`] bytes that
//! are never given back. Each block is a sequence of regions bracketed by
//! 4-byte boundary tags, between a start and an end sentinel:
//!
//! ```text
//!   +------+------+-----------+------+------+-----------+------+------+
//!   | S(0) | H(a) | payload a | F(a) | H(b) | payload b | F(b) | S(0) |
//!   +------+------+-----------+------+------+-----------+------+------+
//! ```
//!
//! Free regions are linked through their own payloads into one of
//! [`BUCKET_COUNT`] buckets: one exact-fit bucket per multiple of 8 up to
//! [`MAX_CLASS_SIZE`], plus an overflow bucket. Releasing a region merges it
//! with free neighbours right away, so no two free regions are ever adjacent.
//!
//! ```
//! use segalloc::{Arena, OVERHEAD, SliceSource, BLOCK_SIZE};
//!
//! let mut buf = vec![0u8; 2 * BLOCK_SIZE];
//! let mut arena = Arena::new(SliceSource::new(&mut buf));
//! arena.init();
//!
//! let a = arena.allocate(16)?;
//! let b = arena.allocate(16)?;
//! unsafe {
//!     arena.release(a);
//!     arena.release(b);
//! }
//! assert_eq!(arena.allocate(16 + 16 + OVERHEAD)?, a);
//! # Ok::<(), segalloc::Error>(())
//! ```
//!
//! An arena is single-threaded; wrap it in a lock to share it.

#![cfg_attr(not(test), no_std)]

mod arena;
mod base;
mod block;
mod bucket;
mod check;
mod mmap;
mod source;
mod tag;

pub use arena::Arena;
pub use base::{
    ALIGN, BLOCK_SIZE, BUCKET_COUNT, BlockSource, CLASS_COUNT, Error, MAX_CLASS_SIZE, MAX_REGION,
    OVERHEAD, TAG_SIZE,
};
pub use check::{Corruption, Stats};
pub use mmap::MmapSource;
pub use source::SliceSource;
