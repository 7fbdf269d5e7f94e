use std::{mem, ptr::NonNull};

/// Header size of a fallback block. The header always sits exactly this many
/// bytes before the address we give to the user.
pub(crate) const BLOCK_HEADER_SIZE: usize = mem::size_of::<BlockHeader>();

/// Minimum alignment of every fallback block. Forcing at least word alignment
/// keeps the header itself aligned, since it lives right before the payload.
pub(crate) const MIN_BLOCK_ALIGN: usize = mem::align_of::<BlockHeader>();

/// This is the metadata of a block served by [`crate::heap::HeapAllocator`].
/// The platform allocator only gives us word aligned memory, so we request
/// more than needed, slide the user pointer forward until it is aligned and
/// keep enough information right before it to undo all of that on free.
///
/// ```text
/// base                                 user pointer
///  |                                        |
///  v                                        v
/// +------------------+---------+-----------+----------------------+
/// |     padding      |  base   | total_size|       Content        |
/// |  (0..align bytes)|         |           |         ...          |
/// +------------------+---------+-----------+----------------------+
///                    |<--- BlockHeader --->|
/// |<----------------------- total_size ------------------------->|
/// ```
///
/// The only way to reach the header is through [`BlockHeader::write`] and
/// [`BlockHeader::read`], both keyed on the user pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    /// Address returned by the platform allocator. This is what has to be
    /// given back to it.
    pub base: NonNull<u8>,
    /// Total number of bytes requested from the platform allocator.
    pub total_size: usize,
}

impl BlockHeader {
    /// Stores `self` right before `payload`.
    ///
    /// **SAFETY**: `payload` must be aligned to [`MIN_BLOCK_ALIGN`] and the
    /// [`BLOCK_HEADER_SIZE`] bytes before it must belong to the same block.
    #[inline]
    pub unsafe fn write(self, payload: NonNull<u8>) {
        unsafe { Self::slot(payload).write(self) }
    }

    /// Recovers the header of a block from its `payload` pointer.
    ///
    /// **SAFETY**: `payload` must have been produced by the fallback heap and
    /// must still be live.
    #[inline]
    pub unsafe fn read(payload: NonNull<u8>) -> Self {
        unsafe { Self::slot(payload).read() }
    }

    /// Number of bytes that are usable starting at `payload`.
    #[inline]
    pub fn usable_size(&self, payload: NonNull<u8>) -> usize {
        let padding = payload.as_ptr() as usize - self.base.as_ptr() as usize;
        self.total_size - padding
    }

    #[inline]
    unsafe fn slot(payload: NonNull<u8>) -> *mut BlockHeader {
        unsafe { payload.as_ptr().sub(BLOCK_HEADER_SIZE).cast::<BlockHeader>() }
    }
}
