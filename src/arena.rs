use core::ptr::NonNull;

use log::{trace, warn};

use crate::{
    base::{BUCKET_COUNT, BlockSource, Error},
    block,
    bucket::Buckets,
    tag::{self, Region},
};

/// A single-threaded allocator instance over blocks from `S`.
///
/// Free space is tracked in segregated free lists whose nodes, like the
/// boundary tags around every region, live inside the managed blocks.
pub struct Arena<S> {
    pub(crate) buckets: Buckets,
    pub(crate) blocks: usize,
    source: S,
}

impl<S: BlockSource> Arena<S> {
    pub const fn new(source: S) -> Self {
        Self {
            buckets: Buckets::new(),
            blocks: 0,
            source,
        }
    }

    /// Empties every bucket. Free space in blocks obtained so far becomes
    /// unreachable, since blocks are never handed back: dropped regions are
    /// stamped occupied so that releasing an older allocation next to one
    /// does not merge into it.
    pub fn init(&mut self) {
        if self.buckets.is_empty() {
            return;
        }
        let mut retired = 0;
        for index in 0..BUCKET_COUNT {
            for payload in self.buckets.iter(index) {
                // SAFETY: linked payloads are free, stamped regions. Stamping
                // rewrites their tags only, never the links being walked.
                unsafe { Region::from_payload(payload).0.stamp(false) };
                retired += 1;
            }
        }
        warn!("init retires {retired} free regions in {} blocks", self.blocks);
        self.buckets.clear();
    }

    /// Allocates `size` bytes, 8-byte aligned, contents unspecified.
    ///
    /// The region granted may be up to [`OVERHEAD`](crate::OVERHEAD) bytes
    /// larger than requested when the leftover could not form a region of
    /// its own.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, Error> {
        if !tag::is_valid_size(size) {
            return Err(Error::SizeOutOfRange(size));
        }
        // SAFETY: only free, stamped regions are ever linked in the table.
        let region = match unsafe { self.buckets.take_fit(size) } {
            Some(region) => region,
            None => {
                let region = block::obtain_block(&mut self.source)?;
                self.blocks += 1;
                region
            }
        };
        // SAFETY: `take_fit` and `obtain_block` only yield regions of at
        // least `size` bytes, and the remainder lies inside the same region.
        let granted = unsafe {
            let (front, rest) = region.split(size);
            if let Some(rest) = rest {
                rest.stamp(true);
                self.buckets.push(rest);
            }
            front.stamp(false);
            front
        };
        trace!("allocate({size}) -> {:p} [{}]", granted.payload(), granted.size());
        Ok(granted.payload())
    }

    /// Returns a region to the arena, merging it with free neighbours.
    ///
    /// # SAFETY
    ///
    /// `ptr` must have been returned by `allocate` on this arena and not been
    /// released since. Debug builds check the boundary tags and panic with
    /// [`Error::InvalidRelease`] when they do not describe an occupied region.
    pub unsafe fn release(&mut self, ptr: NonNull<u8>) {
        if cfg!(debug_assertions) {
            if let Err(e) = unsafe { self.check_occupied(ptr) } {
                panic!("{}: {e}", Error::InvalidRelease(ptr.as_ptr().addr()));
            }
        }
        // SAFETY: the caller guarantees `ptr` is the payload of an occupied
        // region, so its neighbours are regions or sentinels of the same
        // block, and free neighbours are linked in the table.
        unsafe {
            let (freed, _) = Region::from_payload(ptr);
            trace!("release({ptr:p}) [{}]", freed.size());
            let mut merged = freed;

            let before = freed.prev_tag();
            if before.is_mergeable() {
                let prev = freed.prev(before);
                self.buckets.remove(prev);
                merged = prev.merge(merged);
            }

            let after = freed.next_tag();
            if after.is_mergeable() {
                let next = freed.next(after);
                self.buckets.remove(next);
                merged = merged.merge(next);
            }

            merged.stamp(true);
            self.buckets.push(merged);
        }
    }

    /// Payload size of the occupied region at `ptr`.
    ///
    /// # SAFETY
    ///
    /// `ptr` must be a live pointer returned by `allocate` on this arena.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe { Region::from_payload(ptr) }.0.size()
    }

    /// Number of blocks obtained from the source.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
