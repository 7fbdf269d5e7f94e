use std::{cmp, ptr::NonNull};

use crate::{
    block::{BLOCK_HEADER_SIZE, BlockHeader, MIN_BLOCK_ALIGN},
    kernel::{PlatformMemory, SystemMemory},
    utils,
};

/// Arbitrary size and alignment allocator built over a [`PlatformMemory`].
///
/// Every block is over-allocated by `align + BLOCK_HEADER_SIZE` bytes so that
/// we can always find an aligned address with room for a [`BlockHeader`]
/// right before it. See [`BlockHeader`] for the layout.
///
/// This is used by the pool for two things: backing its pages and serving
/// every request the pool can't (too big, too aligned, pool full or inactive).
#[derive(Debug, Default)]
pub struct HeapAllocator<P = SystemMemory> {
    platform: P,
}

impl<P> HeapAllocator<P> {
    pub const fn new(platform: P) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}

impl<P: PlatformMemory> HeapAllocator<P> {
    /// Allocates `size` bytes aligned to `align`. Returns `None` if `align` is
    /// not a power of two, if the total size overflows or if the platform
    /// allocator fails.
    pub fn alloc(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !align.is_power_of_two() {
            return None;
        }

        // The header is written right before the payload so the payload
        // has to be at least as aligned as the header.
        let align = cmp::max(align, MIN_BLOCK_ALIGN);

        let total_size = size.checked_add(align)?.checked_add(BLOCK_HEADER_SIZE)?;

        unsafe {
            let base = self.platform.request_memory(total_size)?;

            // First aligned address that leaves room for the header.
            // Stays inside the block: padding never exceeds `align`.
            let addr = utils::align(base.as_ptr() as usize + BLOCK_HEADER_SIZE, align);
            let payload = base.add(addr - base.as_ptr() as usize);

            BlockHeader { base, total_size }.write(payload);

            Some(payload)
        }
    }

    /// Gives the block back to the platform allocator. Null pointers are
    /// ignored.
    ///
    /// **SAFETY**: `ptr` must be null or a live pointer returned by this
    /// allocator.
    pub unsafe fn free(&self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };

        unsafe {
            let header = BlockHeader::read(payload);
            self.platform.return_memory(header.base);
        }
    }

    /// Moves the content of `ptr` to a new block of `new_size` bytes. If `ptr`
    /// is null this is the same as [`HeapAllocator::alloc`].
    ///
    /// On failure `None` is returned and the old block is left untouched.
    ///
    /// **SAFETY**: `ptr` must be null or a live pointer returned by this
    /// allocator. On success it must not be used anymore.
    pub unsafe fn realloc(&self, ptr: *mut u8, new_size: usize, align: usize) -> Option<NonNull<u8>> {
        let Some(old) = NonNull::new(ptr) else {
            return self.alloc(new_size, align);
        };

        let new = self.alloc(new_size, align)?;

        unsafe {
            let old_size = BlockHeader::read(old).usable_size(old);
            let to_copy = cmp::min(new_size, old_size);

            old.copy_to_nonoverlapping(new, to_copy);

            self.free(old.as_ptr());
        }

        Some(new)
    }

    /// Number of bytes the caller can use behind `ptr`. This is at least the
    /// size that was requested.
    ///
    /// **SAFETY**: `ptr` must be a live pointer returned by this allocator.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        unsafe { BlockHeader::read(ptr).usable_size(ptr) }
    }
}
