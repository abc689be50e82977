//! Boundary tags and the regions they bracket.
//!
//! ```text
//!            prev footer   header                         footer   next header
//!   ... ----+------------+--------+----------------------+--------+-----------+---- ...
//!           |  4 bytes   |4 bytes | payload (size bytes) |4 bytes |  4 bytes  |
//!   ... ----+------------+--------+----------------------+--------+-----------+---- ...
//!                                 ^
//!                                 payload pointer (8-byte aligned)
//! ```

use core::ptr::NonNull;

use crate::base::{ALIGN, MAX_REGION, OVERHEAD, TAG_SIZE};

/// A header or footer word: the payload size with the free flag in bit 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Tag(u32);

impl Tag {
    const FREE: u32 = 1;

    /// Start-of-block and end-of-block marker. Never free, never merged into.
    pub(crate) const SENTINEL: Tag = Tag(0);

    pub(crate) fn free(size: usize) -> Self {
        debug_assert!(is_valid_size(size));
        Self(size as u32 | Self::FREE)
    }

    pub(crate) fn occupied(size: usize) -> Self {
        debug_assert!(is_valid_size(size));
        Self(size as u32)
    }

    #[inline]
    pub(crate) fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) fn size(self) -> usize {
        (self.0 & !Self::FREE) as usize
    }

    #[inline]
    pub(crate) fn is_free(self) -> bool {
        self.0 & Self::FREE != 0
    }

    #[inline]
    pub(crate) fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }

    /// A neighbour described by this tag can be absorbed.
    #[inline]
    pub(crate) fn is_mergeable(self) -> bool {
        !self.is_sentinel() && self.is_free()
    }
}

#[inline]
pub(crate) fn is_valid_size(size: usize) -> bool {
    size != 0 && size % ALIGN == 0 && size <= MAX_REGION
}

/// Size of the free remainder left after carving `want` bytes from a region
/// of `have` bytes, or `None` when the remainder could not hold a minimal
/// region and must be absorbed into the grant.
#[inline]
pub(crate) fn split_remainder(have: usize, want: usize) -> Option<usize> {
    debug_assert!(want <= have);
    (have - want)
        .checked_sub(OVERHEAD)
        .filter(|&rest| rest >= ALIGN)
}

/// Payload size of two adjacent regions merged into one. The tag pair that
/// separated them becomes payload.
#[inline]
pub(crate) fn merged_size(front: usize, back: usize) -> usize {
    front + OVERHEAD + back
}

/// A region addressed by its payload pointer and payload size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Region {
    payload: NonNull<u8>,
    size: usize,
}

impl Region {
    #[inline]
    pub(crate) fn new(payload: NonNull<u8>, size: usize) -> Self {
        debug_assert!(payload.as_ptr().addr() % ALIGN == 0);
        Self { payload, size }
    }

    /// Reads the header in front of `payload` and returns the region it
    /// describes together with the tag.
    ///
    /// # SAFETY
    ///
    /// `payload` must be the payload pointer of a region inside a block.
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> (Self, Tag) {
        // SAFETY: every payload is preceded by its header within the block.
        let tag = unsafe { read(payload.sub(TAG_SIZE)) };
        (Self::new(payload, tag.size()), tag)
    }

    #[inline]
    pub(crate) fn payload(self) -> NonNull<u8> {
        self.payload
    }

    #[inline]
    pub(crate) fn size(self) -> usize {
        self.size
    }

    #[inline]
    pub(crate) fn addr(self) -> usize {
        self.payload.as_ptr().addr()
    }

    /// # SAFETY
    ///
    /// The region must lie inside a block.
    #[inline]
    pub(crate) unsafe fn header(self) -> Tag {
        unsafe { read(self.payload.sub(TAG_SIZE)) }
    }

    /// # SAFETY
    ///
    /// The region must lie inside a block.
    #[inline]
    pub(crate) unsafe fn footer(self) -> Tag {
        unsafe { read(self.payload.add(self.size)) }
    }

    /// Writes header and footer together.
    ///
    /// # SAFETY
    ///
    /// The region must lie inside a block and its size must be the one the
    /// caller wants recorded.
    pub(crate) unsafe fn stamp(self, free: bool) {
        let tag = if free {
            Tag::free(self.size)
        } else {
            Tag::occupied(self.size)
        };
        unsafe {
            write(self.payload.sub(TAG_SIZE), tag);
            write(self.payload.add(self.size), tag);
        }
    }

    /// Footer of the physically preceding region, or the start sentinel.
    ///
    /// # SAFETY
    ///
    /// The region must lie inside a block.
    #[inline]
    pub(crate) unsafe fn prev_tag(self) -> Tag {
        unsafe { read(self.payload.sub(OVERHEAD)) }
    }

    /// Header of the physically following region, or the end sentinel.
    ///
    /// # SAFETY
    ///
    /// The region must lie inside a block.
    #[inline]
    pub(crate) unsafe fn next_tag(self) -> Tag {
        unsafe { read(self.payload.add(self.size + TAG_SIZE)) }
    }

    /// The preceding region as described by `tag`, its footer.
    ///
    /// # SAFETY
    ///
    /// `tag` must be `self.prev_tag()` and must not be a sentinel.
    pub(crate) unsafe fn prev(self, tag: Tag) -> Self {
        debug_assert!(!tag.is_sentinel());
        let payload = unsafe { self.payload.sub(OVERHEAD + tag.size()) };
        Self::new(payload, tag.size())
    }

    /// The following region as described by `tag`, its header.
    ///
    /// # SAFETY
    ///
    /// `tag` must be `self.next_tag()` and must not be a sentinel.
    pub(crate) unsafe fn next(self, tag: Tag) -> Self {
        debug_assert!(!tag.is_sentinel());
        let payload = unsafe { self.payload.add(self.size + OVERHEAD) };
        Self::new(payload, tag.size())
    }

    /// Shrinks the region to `size` bytes and returns the free remainder
    /// behind it, if one fits. No tags are written.
    ///
    /// # SAFETY
    ///
    /// `size <= self.size()`.
    pub(crate) unsafe fn split(self, size: usize) -> (Self, Option<Self>) {
        match split_remainder(self.size, size) {
            Some(rest) => {
                let front = Self::new(self.payload, size);
                // SAFETY: `size + OVERHEAD + rest == self.size`, so the
                // remainder's payload still lies inside this region.
                let back = unsafe { Self::new(self.payload.add(size + OVERHEAD), rest) };
                (front, Some(back))
            }
            None => (self, None),
        }
    }

    /// Joins `self` with the region immediately behind it.
    pub(crate) fn merge(self, back: Self) -> Self {
        debug_assert_eq!(self.addr() + self.size + OVERHEAD, back.addr());
        Self::new(self.payload, merged_size(self.size, back.size))
    }
}

#[inline]
unsafe fn read(at: NonNull<u8>) -> Tag {
    // SAFETY: tags sit at 4-byte aligned offsets of an 8-byte aligned block.
    Tag(unsafe { at.cast::<u32>().read() })
}

#[inline]
pub(crate) unsafe fn write(at: NonNull<u8>, tag: Tag) {
    unsafe { at.cast::<u32>().write(tag.raw()) }
}
