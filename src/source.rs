use core::{mem, ptr::NonNull};

use crate::base::{ALIGN, BLOCK_SIZE, BlockSource};

/// Hands out blocks carved from a caller-provided buffer.
///
/// Works without an operating system underneath, and counts the blocks it
/// issues, which makes it a convenient fixture.
pub struct SliceSource<'a> {
    rest: &'a mut [u8],
    issued: usize,
}

impl<'a> SliceSource<'a> {
    /// Skips up to `ALIGN - 1` leading bytes of `buf` so that every block
    /// starts aligned.
    pub fn new(buf: &'a mut [u8]) -> Self {
        let skip = buf.as_ptr().align_offset(ALIGN).min(buf.len());
        Self {
            rest: &mut buf[skip..],
            issued: 0,
        }
    }

    /// Blocks handed out so far.
    pub fn issued(&self) -> usize {
        self.issued
    }

    /// Blocks still available.
    pub fn remaining(&self) -> usize {
        self.rest.len() / BLOCK_SIZE
    }
}

// SAFETY: blocks are disjoint subslices of a buffer borrowed mutably for
// `'a`, which outlives the source, and start at `ALIGN`-aligned offsets since
// the buffer start is aligned and `BLOCK_SIZE` is a multiple of `ALIGN`.
unsafe impl BlockSource for SliceSource<'_> {
    fn request_block(&mut self) -> Option<NonNull<u8>> {
        if self.rest.len() < BLOCK_SIZE {
            return None;
        }
        let (block, rest) = mem::take(&mut self.rest).split_at_mut(BLOCK_SIZE);
        self.rest = rest;
        self.issued += 1;
        Some(NonNull::from(block).cast())
    }
}
