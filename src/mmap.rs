use core::{
    alloc::{Layout, LayoutError},
    ptr::{self, NonNull},
};

use log::{debug, error};
use rustix::{
    io::Errno,
    mm::{MapFlags, ProtFlags, mmap_anonymous},
};
use thiserror::Error;

use crate::base::{BLOCK_SIZE, BlockSource};

#[derive(Debug, Error)]
enum MapError {
    #[error("mmap failed with {0}")]
    Os(#[from] Errno),
    #[error("mmap returned a null mapping")]
    Null,
    #[error("overflow")]
    Overflow,
    #[error("failed to align")]
    NoAlign,
    #[error("bad layout: {0}")]
    Layout(#[from] LayoutError),
}

fn map(len: usize) -> Result<NonNull<u8>, MapError> {
    let nil = ptr::null_mut();
    let rw = ProtFlags::READ | ProtFlags::WRITE;
    // SAFETY: passing `ptr::null_mut()` means the kernel will choose a
    // page-aligned address at which to create the mapping. See mmap(2).
    let ptr = unsafe { mmap_anonymous(nil, len, rw, MapFlags::PRIVATE) }?;
    NonNull::new(ptr.cast()).ok_or(MapError::Null)
}

#[inline]
fn is_aligned_to(ptr: NonNull<u8>, align: usize) -> bool {
    ptr.as_ptr().addr() & (align - 1) == 0
}

/// Block source backed by anonymous private mappings.
///
/// Memory is mapped in chunks of `max(page size, BLOCK_SIZE)` bytes aligned
/// to `BLOCK_SIZE`, and issued one block at a time. Issued blocks are never
/// unmapped.
pub struct MmapSource {
    pagesize: usize,
    limit: Option<usize>,
    issued: usize,
    cursor: Option<NonNull<u8>>,
    left: usize,
}

impl Default for MmapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MmapSource {
    pub fn new() -> Self {
        Self {
            pagesize: rustix::param::page_size(),
            limit: None,
            issued: 0,
            cursor: None,
            left: 0,
        }
    }

    /// Stops issuing blocks once `max_blocks` have been handed out.
    pub fn with_limit(mut self, max_blocks: usize) -> Self {
        self.limit = Some(max_blocks);
        self
    }

    /// Blocks handed out so far.
    pub fn issued(&self) -> usize {
        self.issued
    }

    fn chunk_layout(&self) -> Result<Layout, MapError> {
        let len = self.pagesize.max(BLOCK_SIZE);
        Ok(Layout::from_size_align(len, BLOCK_SIZE)?
            .align_to(self.pagesize)?
            .pad_to_align())
    }

    // SAFETY: `ptr` must be aligned to `self.pagesize`.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: usize) -> Result<(), Errno> {
        debug_assert!(is_aligned_to(ptr, self.pagesize));
        debug_assert!(len % self.pagesize == 0);
        unsafe { rustix::mm::munmap(ptr.as_ptr().cast(), len) }
    }

    /// Cuts a chunk of shape `layout` from a mapping of `alloc_size` bytes
    /// starting at `alloc` and unmaps the trimmed ends.
    ///
    /// # SAFETY
    ///
    /// `alloc` must be the start of a live mapping of `alloc_size` bytes.
    unsafe fn trim(
        &self,
        alloc: NonNull<u8>,
        alloc_size: usize,
        layout: Layout,
    ) -> Result<NonNull<u8>, MapError> {
        let align_ost = alloc.align_offset(layout.align());
        let trim_end = alloc_size
            .checked_sub(align_ost)
            .and_then(|x| x.checked_sub(layout.size()))
            .ok_or(MapError::NoAlign)?;

        // SAFETY: the checked arithmetic above implies
        // `align_ost + layout.size() <= alloc_size`, so the aligned chunk lies
        // inside the mapping and inherits its provenance.
        let aligned = unsafe { alloc.add(align_ost) };
        if align_ost > 0 {
            unsafe { self.unmap(alloc, align_ost) }?;
        }
        if trim_end > 0 {
            let end = unsafe { aligned.add(layout.size()) };
            unsafe { self.unmap(end, trim_end) }?;
        }
        Ok(aligned)
    }

    // https://github.com/jemalloc/jemalloc/blob/22440a0207cd7d7c624c78723ca1eeb8a4353e79/src/pages.c#L312-L336
    fn map_chunk(&self) -> Result<(NonNull<u8>, usize), MapError> {
        let layout = self.chunk_layout()?;
        let ptr = map(layout.size())?;
        if is_aligned_to(ptr, layout.align()) {
            return Ok((ptr, layout.size()));
        }
        unsafe { self.unmap(ptr, layout.size()) }?;

        // Any mapping is page-aligned, so it is at most `align - pagesize`
        // bytes away from an aligned address. Over-map by that much.
        let pad = layout
            .align()
            .checked_sub(self.pagesize)
            .ok_or(MapError::NoAlign)?;
        let alloc_size = layout.size().checked_add(pad).ok_or(MapError::Overflow)?;
        let alloc = map(alloc_size)?;
        // SAFETY: `alloc` is the start of the fresh mapping of `alloc_size`
        // bytes.
        let ptr = unsafe { self.trim(alloc, alloc_size, layout) }?;
        Ok((ptr, layout.size()))
    }
}

// SAFETY: blocks are consecutive, disjoint `BLOCK_SIZE` slices of private
// mappings aligned to `BLOCK_SIZE`, and mappings are never unmapped once a
// block from them has been issued.
unsafe impl BlockSource for MmapSource {
    fn request_block(&mut self) -> Option<NonNull<u8>> {
        if self.limit.is_some_and(|max| self.issued >= max) {
            return None;
        }
        if self.left == 0 {
            match self.map_chunk() {
                Ok((chunk, len)) => {
                    debug!("mapped {len} bytes at {chunk:p}");
                    self.cursor = Some(chunk);
                    self.left = len / BLOCK_SIZE;
                }
                Err(e) => {
                    error!("mapping a chunk failed: {e}");
                    return None;
                }
            }
        }
        let block = self.cursor?;
        self.left -= 1;
        // SAFETY: while blocks are left the next one lies inside the chunk.
        self.cursor = (self.left > 0).then(|| unsafe { block.add(BLOCK_SIZE) });
        self.issued += 1;
        Some(block)
    }
}
