use core::ptr::NonNull;

use log::{debug, error};

use crate::{
    base::{ALIGN, BLOCK_SIZE, BlockSource, Error, MAX_REGION, OVERHEAD, TAG_SIZE},
    tag::{self, Region, Tag},
};

/// Requests a block from `source` and formats it: sentinels at both ends and
/// one free region in between. The region is stamped but not linked.
pub(crate) fn obtain_block<S: BlockSource>(source: &mut S) -> Result<Region, Error> {
    let Some(base) = source.request_block() else {
        error!("block source exhausted");
        return Err(Error::OutOfMemory);
    };
    // SAFETY: `BlockSource` guarantees an exclusive, aligned block of
    // `BLOCK_SIZE` bytes.
    let region = unsafe { carve(base) };
    debug!("new block at {base:p}, {MAX_REGION} bytes free");
    Ok(region)
}

/// # SAFETY
///
/// `base` must be aligned to `ALIGN` and valid for `BLOCK_SIZE` bytes.
unsafe fn carve(base: NonNull<u8>) -> Region {
    debug_assert!(base.as_ptr().addr() % ALIGN == 0);
    unsafe {
        tag::write(base, Tag::SENTINEL);
        tag::write(base.add(BLOCK_SIZE - TAG_SIZE), Tag::SENTINEL);
        let region = Region::new(base.add(OVERHEAD), MAX_REGION);
        region.stamp(true);
        region
    }
}
