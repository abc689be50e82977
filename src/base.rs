use core::{mem, ptr::NonNull};

use thiserror::Error;

/// Size in bytes of every block handed out by a [`BlockSource`].
pub const BLOCK_SIZE: usize = 8192;

/// Payload alignment and allocation granularity.
pub const ALIGN: usize = 8;

/// Size of one boundary tag (header or footer).
pub const TAG_SIZE: usize = mem::size_of::<u32>();

/// Bytes spent on the header/footer pair of a region.
pub const OVERHEAD: usize = 2 * TAG_SIZE;

/// Payload size of the single free region of a fresh block. This is also the
/// largest request [`Arena::allocate`](crate::Arena::allocate) accepts.
pub const MAX_REGION: usize = BLOCK_SIZE - 2 * OVERHEAD;

/// Largest size with a dedicated exact-fit bucket.
pub const MAX_CLASS_SIZE: usize = 256;

/// Number of exact-fit buckets.
pub const CLASS_COUNT: usize = MAX_CLASS_SIZE / ALIGN;

/// Exact-fit buckets plus the overflow bucket.
pub const BUCKET_COUNT: usize = CLASS_COUNT + 1;

const _: () = assert!(OVERHEAD == ALIGN);
const _: () = assert!(MAX_CLASS_SIZE < MAX_REGION);
const _: () = assert!(MAX_REGION <= u32::MAX as usize >> 1);

/// Supplier of coarse memory blocks.
///
/// # SAFETY
///
/// Every pointer returned by `request_block` must be aligned to [`ALIGN`],
/// valid for reads and writes of [`BLOCK_SIZE`] bytes, disjoint from every
/// other block the source has issued, and stay valid for as long as the
/// source itself is alive. Blocks are never given back.
pub unsafe trait BlockSource {
    /// Returns a fresh block, or `None` once the source is exhausted.
    fn request_block(&mut self) -> Option<NonNull<u8>>;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("block source exhausted")]
    OutOfMemory,
    #[error("release of {0:#x}, which is not an occupied region")]
    InvalidRelease(usize),
    #[error("request of {0} bytes is not a multiple of {align} in 1..={max}", align = ALIGN, max = MAX_REGION)]
    SizeOutOfRange(usize),
}
