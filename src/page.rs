use std::{
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
};

use parking_lot::{Mutex, MutexGuard};

use crate::{
    bitmap::ChunkBitmap,
    config::PoolConfig,
    error::{PoolError, Result},
    heap::HeapAllocator,
    kernel::PlatformMemory,
};

/// One contiguous piece of memory split into `page_size / chunk_size` chunks.
///
/// ```text
/// memory_start                                           memory_end
///      |                                                      |
///      v                                                      v
///      +-------------+-------------+-------------+------------+
///      |   chunk 0   |   chunk 1   |     ...     |  chunk n-1 |
///      +-------------+-------------+-------------+------------+
///             ^             ^
///           bit 0         bit 1      (ChunkBitmap)
/// ```
///
/// Pages start without memory and get it from the fallback heap the first
/// time they are needed. Everything mutable is only written while holding the
/// page lock (see [`Page::try_lock`]). `free_bytes` and the memory bounds are
/// atomics so the dispatcher can peek at them while scanning for a candidate
/// without taking any lock.
#[derive(Debug)]
pub struct Page {
    free_bytes: AtomicUsize,
    memory_start: AtomicPtr<u8>,
    memory_end: AtomicPtr<u8>,
    bitmap: Mutex<ChunkBitmap>,
}

impl Page {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        Self {
            free_bytes: AtomicUsize::new(0),
            memory_start: AtomicPtr::new(ptr::null_mut()),
            memory_end: AtomicPtr::new(ptr::null_mut()),
            bitmap: Mutex::new(ChunkBitmap::new(config.page_size, config.chunk_size)),
        }
    }

    /// Free bytes as last published by the lock holder. Only advisory when
    /// read without the lock.
    #[inline]
    pub fn free_bytes(&self) -> usize {
        self.free_bytes.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_backed(&self) -> bool {
        !self.memory_start.load(Ordering::Acquire).is_null()
    }

    /// Whether `addr` falls in `[memory_start, memory_end)`. Always false for
    /// pages without memory.
    #[inline]
    pub fn contains(&self, addr: *const u8) -> bool {
        let start = self.memory_start.load(Ordering::Acquire);
        let end = self.memory_end.load(Ordering::Acquire);

        !start.is_null() && addr >= start.cast_const() && addr < end.cast_const()
    }

    /// Non-blocking acquire. Fails right away if somebody else holds the page.
    #[inline]
    pub(crate) fn try_lock(&self) -> Option<PageGuard<'_>> {
        self.bitmap.try_lock().map(|bitmap| PageGuard { page: self, bitmap })
    }

    /// Blocking acquire, only used where we already know this page is the
    /// one we need (freeing a chunk, lifecycle).
    #[inline]
    pub(crate) fn lock(&self) -> PageGuard<'_> {
        PageGuard {
            page: self,
            bitmap: self.bitmap.lock(),
        }
    }
}

/// Exclusive access to a [`Page`]. The lock is released when this is dropped.
pub(crate) struct PageGuard<'a> {
    page: &'a Page,
    bitmap: MutexGuard<'a, ChunkBitmap>,
}

impl PageGuard<'_> {
    #[inline]
    pub fn is_backed(&self) -> bool {
        self.page.is_backed()
    }

    #[inline]
    pub fn has_room(&self) -> bool {
        self.page.free_bytes.load(Ordering::Relaxed) > 0
    }

    #[inline]
    pub fn memory_start(&self) -> *mut u8 {
        self.page.memory_start.load(Ordering::Relaxed)
    }

    /// Number of chunks handed out.
    #[cfg(test)]
    pub fn used_chunks(&self) -> usize {
        self.bitmap.used()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Gives this page its memory. Does nothing if it already has some.
    pub fn back<P: PlatformMemory>(&mut self, heap: &HeapAllocator<P>, config: &PoolConfig) -> Result<()> {
        if self.is_backed() {
            return Ok(());
        }

        let memory = heap
            .alloc(config.page_size, config.chunk_alignment)
            .ok_or(PoolError::OutOfMemory {
                requested: config.page_size,
            })?;

        // End first: a concurrent `contains` that sees the start also sees
        // the end.
        let end = unsafe { memory.as_ptr().add(config.page_size) };
        self.page.memory_end.store(end, Ordering::Release);
        self.page.memory_start.store(memory.as_ptr(), Ordering::Release);
        self.page.free_bytes.store(config.page_size, Ordering::Release);

        Ok(())
    }

    /// Returns the memory of this page to the heap and resets it to its
    /// initial state. Every chunk of the page becomes invalid.
    pub fn unback<P: PlatformMemory>(&mut self, heap: &HeapAllocator<P>) {
        let start = self.memory_start();

        if start.is_null() {
            return;
        }

        self.page.free_bytes.store(0, Ordering::Release);
        self.page.memory_start.store(ptr::null_mut(), Ordering::Release);
        self.page.memory_end.store(ptr::null_mut(), Ordering::Release);
        self.bitmap.clear();

        unsafe { heap.free(start) };
    }

    /// Takes the first free chunk and returns its offset from `memory_start`.
    pub fn allocate_chunk(&mut self, chunk_size: usize) -> Option<usize> {
        let chunk_index = self.bitmap.allocate()?;
        self.page.free_bytes.fetch_sub(chunk_size, Ordering::Release);

        Some(chunk_index * chunk_size)
    }

    /// Returns the chunk at `offset` to the page.
    pub fn release_chunk(&mut self, offset: usize, chunk_size: usize) {
        debug_assert_eq!(offset % chunk_size, 0, "pointer is not the start of a chunk");

        self.bitmap.release(offset / chunk_size);
        self.page.free_bytes.fetch_add(chunk_size, Ordering::Release);
    }

    /// Address of the chunk at `offset`.
    #[inline]
    pub fn chunk_at(&self, offset: usize) -> Option<NonNull<u8>> {
        NonNull::new(self.memory_start().wrapping_add(offset))
    }
}

/// Fixed set of [`Page`]s. The number of pages never changes, only whether
/// they are backed or not.
#[derive(Debug)]
pub(crate) struct PageStore {
    pages: Box<[Page]>,
}

impl PageStore {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            pages: (0..config.max_pages).map(|_| Page::new(config)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Result<&Page> {
        self.pages.get(index).ok_or(PoolError::PageIndex {
            index,
            max_pages: self.pages.len(),
        })
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }
}
