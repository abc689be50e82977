//! Segregated free lists.
//!
//! Bucket `i < CLASS_COUNT` holds free regions of exactly `(i + 1) * ALIGN`
//! bytes, so popping its head is always an exact fit. The last bucket holds
//! everything larger. The lists are intrusive: the links live in the first
//! bytes of each free payload.

use core::{mem, ptr::NonNull};

use crate::{
    base::{ALIGN, BUCKET_COUNT, CLASS_COUNT, MAX_CLASS_SIZE},
    tag::Region,
};

pub(crate) const OVERFLOW: usize = CLASS_COUNT;

/// Free-list links stored in a free payload. `prev` only exists for regions
/// of at least `size_of::<Links>()` bytes and must not be touched otherwise,
/// it would overlap the footer.
#[repr(C)]
struct Links {
    next: Option<NonNull<u8>>,
    prev: Option<NonNull<u8>>,
}

#[inline]
pub(crate) fn index_for(size: usize) -> usize {
    debug_assert!(size != 0 && size % ALIGN == 0);
    if size > MAX_CLASS_SIZE {
        OVERFLOW
    } else {
        size / ALIGN - 1
    }
}

/// Regions of this size only have room for `next`.
#[inline]
pub(crate) fn is_singly_linked(size: usize) -> bool {
    size < mem::size_of::<Links>()
}

#[inline]
fn links(payload: NonNull<u8>) -> *mut Links {
    payload.cast::<Links>().as_ptr()
}

#[inline]
unsafe fn next_of(payload: NonNull<u8>) -> Option<NonNull<u8>> {
    unsafe { (&raw const (*links(payload)).next).read() }
}

#[inline]
unsafe fn set_next(payload: NonNull<u8>, next: Option<NonNull<u8>>) {
    unsafe { (&raw mut (*links(payload)).next).write(next) }
}

#[inline]
unsafe fn prev_of(payload: NonNull<u8>) -> Option<NonNull<u8>> {
    unsafe { (&raw const (*links(payload)).prev).read() }
}

#[inline]
unsafe fn set_prev(payload: NonNull<u8>, prev: Option<NonNull<u8>>) {
    unsafe { (&raw mut (*links(payload)).prev).write(prev) }
}

pub(crate) struct Buckets {
    heads: [Option<NonNull<u8>>; BUCKET_COUNT],
}

impl Buckets {
    pub(crate) const fn new() -> Self {
        Self {
            heads: [None; BUCKET_COUNT],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.heads = [None; BUCKET_COUNT];
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heads.iter().all(Option::is_none)
    }

    /// Links a free region at the head of its bucket.
    ///
    /// # SAFETY
    ///
    /// `region` must be free, stamped, and not linked in any bucket.
    pub(crate) unsafe fn push(&mut self, region: Region) {
        let index = index_for(region.size());
        let payload = region.payload();
        let head = self.heads[index];
        unsafe {
            set_next(payload, head);
            if !is_singly_linked(region.size()) {
                set_prev(payload, None);
                if let Some(head) = head {
                    set_prev(head, Some(payload));
                }
            }
        }
        self.heads[index] = Some(payload);
    }

    /// Unlinks the head of bucket `index`.
    ///
    /// # SAFETY
    ///
    /// Every region linked in the table must still be free and stamped.
    pub(crate) unsafe fn pop(&mut self, index: usize) -> Option<Region> {
        let payload = self.heads[index]?;
        // SAFETY: linked payloads are preceded by their header.
        let (region, _) = unsafe { Region::from_payload(payload) };
        unsafe { self.remove(region) };
        Some(region)
    }

    /// Unlinks `region` from its bucket.
    ///
    /// Doubly linked buckets splice in constant time. The singly linked class
    /// walks its list to find the predecessor.
    ///
    /// # SAFETY
    ///
    /// `region` must be linked in the bucket matching its size.
    pub(crate) unsafe fn remove(&mut self, region: Region) {
        let index = index_for(region.size());
        let payload = region.payload();
        unsafe {
            let next = next_of(payload);
            if is_singly_linked(region.size()) {
                self.unlink_singly(index, payload, next);
                return;
            }
            match prev_of(payload) {
                Some(prev) => set_next(prev, next),
                None => {
                    debug_assert_eq!(self.heads[index], Some(payload));
                    self.heads[index] = next;
                }
            }
            if let Some(next) = next {
                set_prev(next, prev_of(payload));
            }
        }
    }

    unsafe fn unlink_singly(
        &mut self,
        index: usize,
        payload: NonNull<u8>,
        next: Option<NonNull<u8>>,
    ) {
        if self.heads[index] == Some(payload) {
            self.heads[index] = next;
            return;
        }
        let mut cursor = self.heads[index];
        while let Some(node) = cursor {
            // SAFETY: every node of the list is a free payload.
            let after = unsafe { next_of(node) };
            if after == Some(payload) {
                unsafe { set_next(node, next) };
                return;
            }
            cursor = after;
        }
        debug_assert!(false, "free region {payload:p} missing from bucket {index}");
    }

    /// Takes the best region for a request of `size` bytes out of the table:
    /// the exact class, then the first non-empty larger class, then the first
    /// large enough overflow region.
    ///
    /// # SAFETY
    ///
    /// Every region linked in the table must still be free and stamped.
    pub(crate) unsafe fn take_fit(&mut self, size: usize) -> Option<Region> {
        let ideal = index_for(size);
        if ideal < OVERFLOW {
            if let Some(index) = (ideal..OVERFLOW).find(|&i| self.heads[i].is_some()) {
                return unsafe { self.pop(index) };
            }
        }
        let region = unsafe { self.first_fit(OVERFLOW, size) }?;
        unsafe { self.remove(region) };
        Some(region)
    }

    unsafe fn first_fit(&self, index: usize, size: usize) -> Option<Region> {
        self.iter(index)
            // SAFETY: linked payloads are preceded by their header.
            .map(|payload| unsafe { Region::from_payload(payload) }.0)
            .find(|region| region.size() >= size)
    }

    /// Payloads linked in bucket `index`, head first.
    pub(crate) fn iter(&self, index: usize) -> Iter<'_> {
        Iter {
            cursor: self.heads[index],
            _buckets: self,
        }
    }
}

pub(crate) struct Iter<'a> {
    cursor: Option<NonNull<u8>>,
    _buckets: &'a Buckets,
}

impl Iterator for Iter<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        // SAFETY: the borrow on the table keeps the list unchanged while
        // iterating, and every linked node is a free payload.
        self.cursor = unsafe { next_of(node) };
        Some(node)
    }
}

/// `prev` link of a doubly linked node, for consistency checks.
///
/// # SAFETY
///
/// `payload` must be linked in a doubly linked bucket.
pub(crate) unsafe fn prev_link(payload: NonNull<u8>) -> Option<NonNull<u8>> {
    unsafe { prev_of(payload) }
}
