use std::{
    cmp,
    ptr::NonNull,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info, warn};

use crate::{
    config::PoolConfig,
    error::Result,
    heap::HeapAllocator,
    kernel::{PlatformMemory, SystemMemory},
    page::{Page, PageGuard, PageStore},
    stats::{Counters, Fallback, PoolCounters, UsageReport},
};

/// Fixed-chunk memory pool with a heap fallback.
///
/// Every request goes through here. Requests that fit in one chunk are
/// served from a page while the pool is active; everything
/// else (bigger or more aligned than a chunk, every page full or busy, pool
/// inactive) goes to the [`HeapAllocator`].
///
/// ```text
///                       allocate(size, align)
///                                |
///               size <= chunk && align <= chunk_alignment
///                   && active?   |
///                 +---- no ------+------ yes ----+
///                 |                              |
///                 |                  page with room / new page
///                 |                     (try-lock, in order)
///                 |                              |
///                 |                   +-- none --+-- found --+
///                 v                   v                      v
///          HeapAllocator <------------+             first free chunk
/// ```
///
/// There is no global lock, each page has its own. Scans only try-lock and
/// move on to the next page, so they never wait. At most one page lock is
/// held at a time, and never while a `tracing` event is emitted: a subscriber
/// may allocate, which re-enters the pool when it is the global allocator.
///
/// Frees and reallocations find out where a pointer came from by checking the
/// address against every backed page, so pool and heap pointers can be mixed
/// freely.
#[derive(Debug)]
pub struct Pool<P: PlatformMemory = SystemMemory> {
    config: PoolConfig,
    heap: HeapAllocator<P>,
    pages: PageStore,
    active: AtomicBool,
    counters: Counters,
}

impl Pool<SystemMemory> {
    /// Creates an inactive pool on top of the process allocator. Call
    /// [`Pool::start_up`] to begin serving chunks.
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::with_platform(config, SystemMemory)
    }
}

impl<P: PlatformMemory> Pool<P> {
    pub fn with_platform(config: PoolConfig, platform: P) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            heap: HeapAllocator::new(platform),
            pages: PageStore::new(&config),
            active: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn heap(&self) -> &HeapAllocator<P> {
        &self.heap
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Backs the first page and activates the pool. Calling it on an active
    /// pool does nothing. If the first page can't get memory the pool stays
    /// inactive.
    ///
    /// Must not race with any other call on this pool.
    pub fn start_up(&self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        self.back_page(0)?;
        self.active.store(true, Ordering::Release);

        info!(
            page_size = self.config.page_size,
            chunk_size = self.config.chunk_size,
            max_pages = self.config.max_pages,
            "memory pool started"
        );

        Ok(())
    }

    /// Deactivates the pool and gives every page back to the heap.
    ///
    /// Every chunk handed out by the pool is invalid afterwards, including for
    /// [`Pool::deallocate`]. Must not race with any other call on this pool.
    pub fn shut_down(&self) {
        self.active.store(false, Ordering::Release);

        let released = self.release_pages();

        info!(released, "memory pool shut down");
    }

    /// Gives memory to page `index` if it has none yet.
    pub fn back_page(&self, index: usize) -> Result<()> {
        let page = self.pages.get(index)?;

        let backed = page.lock().back(&self.heap, &self.config);
        backed.inspect_err(|err| {
            warn!(index, %err, "could not back pool page");
        })?;

        debug!(index, "pool page backed");

        Ok(())
    }

    /// Returns the memory of page `index` to the heap. Chunks still in use
    /// become dangling.
    pub fn unback_page(&self, index: usize) -> Result<()> {
        let page = self.pages.get(index)?;

        page.lock().unback(&self.heap);

        debug!(index, "pool page unbacked");

        Ok(())
    }

    /// Unbacks every page except the first one that has no chunk in use and
    /// isn't locked by anybody. Returns how many pages were released.
    pub fn try_shrink(&self) -> usize {
        let mut released = 0;

        for page in self.pages.iter().skip(1) {
            if !page.is_backed() {
                continue;
            }

            let Some(mut guard) = page.try_lock() else {
                continue;
            };

            if guard.is_backed() && guard.is_empty() {
                guard.unback(&self.heap);
                released += 1;
            }
        }

        if released > 0 {
            debug!(released, "pool shrunk");
        }

        released
    }

    /// Whether a request of `size` bytes can be served by a chunk right now.
    #[inline]
    pub fn is_pool_eligible(&self, size: usize) -> bool {
        self.is_active() && size <= self.config.chunk_size
    }

    /// First page, in index order, that has free chunks and isn't locked by
    /// somebody else. Falls back to backing a new page, whose index is then
    /// returned along with the guard.
    fn find_page_with_room(&self) -> Option<(PageGuard<'_>, Option<usize>)> {
        for page in self.pages.iter() {
            if page.free_bytes() == 0 {
                continue;
            }

            if let Some(guard) = page.try_lock() {
                // Someone may have taken the last chunk since we peeked.
                if guard.has_room() {
                    return Some((guard, None));
                }
            }
        }

        self.find_or_back_new_page()
    }

    /// First page without memory we can lock, backed and returned locked.
    fn find_or_back_new_page(&self) -> Option<(PageGuard<'_>, Option<usize>)> {
        for (index, page) in self.pages.iter().enumerate() {
            if page.is_backed() {
                continue;
            }

            let Some(mut guard) = page.try_lock() else {
                continue;
            };

            if guard.is_backed() {
                // Backed by somebody else between the peek and the lock.
                if guard.has_room() {
                    return Some((guard, None));
                }

                continue;
            }

            return match guard.back(&self.heap, &self.config) {
                Ok(()) => Some((guard, Some(index))),
                Err(err) => {
                    drop(guard);
                    warn!(index, %err, "could not back pool page, using heap");
                    None
                }
            };
        }

        None
    }

    /// Allocates `size` bytes aligned to `align`. `None` means the platform
    /// allocator is out of memory (or `align` is not a power of two).
    ///
    /// Pool chunks are only aligned to `chunk_alignment`, anything stricter
    /// goes to the heap.
    pub fn allocate(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        if !self.is_pool_eligible(size) || align > self.config.chunk_alignment {
            return self.fallback_alloc(size, align, self.heap_only_reason());
        }

        if !align.is_power_of_two() {
            return None;
        }

        let Some((mut page, newly_backed)) = self.find_page_with_room() else {
            return self.fallback_alloc(size, align, Fallback::Exhausted);
        };

        let chunk = page
            .allocate_chunk(self.config.chunk_size)
            .and_then(|offset| page.chunk_at(offset));
        drop(page);

        if let Some(index) = newly_backed {
            debug!(index, "pool page backed on demand");
        }

        match chunk {
            Some(chunk) => {
                self.counters.pool_alloc();
                Some(chunk)
            }
            None => self.fallback_alloc(size, align, Fallback::Exhausted),
        }
    }

    /// Why a request the pool never considers goes to the heap.
    #[inline]
    fn heap_only_reason(&self) -> Fallback {
        if self.is_active() {
            Fallback::Ineligible
        } else {
            Fallback::Inactive
        }
    }

    /// Heap allocation, counted only when it succeeds so that every counted
    /// allocation has a matching free.
    #[inline]
    fn fallback_alloc(&self, size: usize, align: usize, reason: Fallback) -> Option<NonNull<u8>> {
        let block = self.heap.alloc(size, align)?;
        self.counters.fallback_alloc(reason);

        Some(block)
    }

    /// Index of the page whose memory contains `ptr`. Always `None` while
    /// the pool is inactive.
    pub fn find_owning_page(&self, ptr: *const u8) -> Option<usize> {
        self.owner(ptr).map(|(index, _)| index)
    }

    fn owner(&self, ptr: *const u8) -> Option<(usize, &Page)> {
        if !self.is_active() || ptr.is_null() {
            return None;
        }

        self.pages.iter().enumerate().find(|(_, page)| page.contains(ptr))
    }

    /// Frees a pointer returned by [`Pool::allocate`] or
    /// [`Pool::reallocate`]. Null pointers are ignored.
    ///
    /// **SAFETY**: `ptr` must be null or live and must come from this pool.
    /// Chunks can't be freed after [`Pool::shut_down`].
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        match self.owner(ptr) {
            Some((_, page)) => self.free_chunk(page, ptr),
            None => {
                self.counters.fallback_free();
                unsafe { self.heap.free(ptr) };
            }
        }
    }

    fn free_chunk(&self, page: &Page, ptr: *mut u8) {
        let mut guard = page.lock();
        let offset = ptr as usize - guard.memory_start() as usize;

        guard.release_chunk(offset, self.config.chunk_size);
        self.counters.pool_free();
    }

    /// Resizes the block at `ptr`, keeping the first `min(old, new_size)`
    /// bytes. A null `ptr` allocates.
    ///
    /// A pool chunk is always moved to the heap, even if `new_size` would
    /// still fit in a chunk. The pool doesn't remember how much of the chunk
    /// was requested, so the whole chunk (up to `new_size`) is copied.
    ///
    /// On failure `None` is returned and `ptr` stays valid.
    ///
    /// **SAFETY**: same as [`Pool::deallocate`]. On success `ptr` must not be
    /// used anymore.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize, align: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.fallback_alloc(new_size, align, self.heap_only_reason());
        }

        let Some((_, page)) = self.owner(ptr) else {
            return unsafe { self.heap.realloc(ptr, new_size, align) };
        };

        let new = self.heap.alloc(new_size, align)?;

        unsafe {
            let to_copy = cmp::min(new_size, self.config.chunk_size);
            ptr.copy_to_nonoverlapping(new.as_ptr(), to_copy);
        }

        self.free_chunk(page, ptr);
        self.counters.migration();

        Some(new)
    }

    /// Usage of every backed page. Takes no locks.
    pub fn report_usage(&self) -> UsageReport {
        let backed = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, page)| page.is_backed())
            .map(|(index, page)| (index, page.free_bytes()));

        UsageReport::from_pages(self.config.page_size, backed)
    }

    pub fn counters(&self) -> PoolCounters {
        self.counters.snapshot()
    }

    /// Unbacks every page, returns how many had memory.
    fn release_pages(&self) -> usize {
        let mut released = 0;

        for page in self.pages.iter() {
            let mut guard = page.lock();

            if guard.is_backed() {
                guard.unback(&self.heap);
                released += 1;
            }
        }

        released
    }
}

impl<P: PlatformMemory> Drop for Pool<P> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        self.release_pages();
    }
}
