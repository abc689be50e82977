//! Read-only consistency checks over the bucket table and boundary tags.

use core::ptr::NonNull;

use thiserror::Error;

use crate::{
    arena::Arena,
    base::{ALIGN, BUCKET_COUNT, BlockSource},
    bucket::{self, index_for},
    tag::{Region, is_valid_size},
};

/// Free space accounting produced by [`Arena::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub blocks: usize,
    pub free_regions: usize,
    pub free_bytes: usize,
}

/// An inconsistency found in the arena's bookkeeping. Addresses are payload
/// addresses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    #[error("region {0:#x} is not {align}-byte aligned", align = ALIGN)]
    Misaligned(usize),
    #[error("region {at:#x} has header {header:#x} but footer {footer:#x}")]
    TagMismatch { at: usize, header: u32, footer: u32 },
    #[error("region {at:#x} has invalid size {size}")]
    BadSize { at: usize, size: usize },
    #[error("region {0:#x} is linked in a bucket but marked occupied")]
    NotFree(usize),
    #[error("region {0:#x} is marked free")]
    NotOccupied(usize),
    #[error("region {at:#x} of {size} bytes is linked in bucket {bucket}")]
    WrongBucket { at: usize, size: usize, bucket: usize },
    #[error("region {0:#x} has a broken back link")]
    BrokenLink(usize),
    #[error("region {0:#x} has a free neighbour")]
    Uncoalesced(usize),
}

impl<S: BlockSource> Arena<S> {
    /// Walks every bucket and verifies the free regions linked there.
    pub fn check(&self) -> Result<Stats, Corruption> {
        let mut stats = Stats {
            blocks: self.blocks,
            ..Stats::default()
        };
        for index in 0..BUCKET_COUNT {
            let mut prev = None;
            for payload in self.buckets.iter(index) {
                // SAFETY: linked payloads are free regions inside blocks,
                // unless the table is corrupt, which is what we are after.
                let region = unsafe { tags(payload)? };
                if !unsafe { region.header() }.is_free() {
                    return Err(Corruption::NotFree(region.addr()));
                }
                if index_for(region.size()) != index {
                    return Err(Corruption::WrongBucket {
                        at: region.addr(),
                        size: region.size(),
                        bucket: index,
                    });
                }
                if !bucket::is_singly_linked(region.size())
                    && unsafe { bucket::prev_link(payload) } != prev
                {
                    return Err(Corruption::BrokenLink(region.addr()));
                }
                if unsafe { region.prev_tag().is_mergeable() || region.next_tag().is_mergeable() } {
                    return Err(Corruption::Uncoalesced(region.addr()));
                }
                prev = Some(payload);
                stats.free_regions += 1;
                stats.free_bytes += region.size();
            }
        }
        Ok(stats)
    }

    /// Verifies the tags of the occupied region at `ptr` and returns its size.
    ///
    /// # SAFETY
    ///
    /// `ptr` must point into a block of this arena, at least `ALIGN` bytes
    /// past its start.
    pub unsafe fn check_occupied(&self, ptr: NonNull<u8>) -> Result<usize, Corruption> {
        let region = unsafe { tags(ptr)? };
        if unsafe { region.header() }.is_free() {
            return Err(Corruption::NotOccupied(region.addr()));
        }
        Ok(region.size())
    }
}

/// Reads and cross-checks the header and footer around `payload`.
unsafe fn tags(payload: NonNull<u8>) -> Result<Region, Corruption> {
    let at = payload.as_ptr().addr();
    if at % ALIGN != 0 {
        return Err(Corruption::Misaligned(at));
    }
    let (region, header) = unsafe { Region::from_payload(payload) };
    if !is_valid_size(header.size()) {
        return Err(Corruption::BadSize {
            at,
            size: header.size(),
        });
    }
    let footer = unsafe { region.footer() };
    if footer != header {
        return Err(Corruption::TagMismatch {
            at,
            header: header.raw(),
            footer: footer.raw(),
        });
    }
    Ok(region)
}
