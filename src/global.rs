//! Drop-in replacement for the process allocator.
//!
//! ```no_run
//! use poolalloc::{GlobalPool, Pool, PoolConfig};
//!
//! #[global_allocator]
//! static ALLOCATOR: GlobalPool = GlobalPool::new();
//!
//! fn main() {
//!     // Until a pool is installed every request goes to the heap, including
//!     // the ones made to build the pool itself.
//!     let pool: &'static Pool = Box::leak(Box::new(Pool::new(PoolConfig::default()).unwrap()));
//!     pool.start_up().unwrap();
//!     ALLOCATOR.install(pool);
//! }
//! ```

use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, Ordering},
};

use crate::{heap::HeapAllocator, kernel::SystemMemory, pool::Pool};

/// [`GlobalAlloc`] that routes through an installed [`Pool`], or straight to
/// the [`HeapAllocator`] while there is none.
///
/// Both paths share the same heap block format, so memory allocated before
/// [`GlobalPool::install`] can be freed after it.
///
/// The installed pool must never be shut down while the program is still
/// running: chunks it handed out would then be freed as heap blocks.
pub struct GlobalPool {
    pool: AtomicPtr<Pool>,
    heap: HeapAllocator,
}

impl GlobalPool {
    pub const fn new() -> Self {
        Self {
            pool: AtomicPtr::new(ptr::null_mut()),
            heap: HeapAllocator::new(SystemMemory::new()),
        }
    }

    /// Starts routing requests through `pool`. Only the first call has any
    /// effect, it returns `false` if a pool was already installed.
    pub fn install(&self, pool: &'static Pool) -> bool {
        let pool = pool as *const Pool as *mut Pool;

        self.pool
            .compare_exchange(ptr::null_mut(), pool, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn pool(&self) -> Option<&'static Pool> {
        // SAFETY: only `&'static Pool` are ever stored.
        unsafe { self.pool.load(Ordering::Acquire).as_ref() }
    }
}

impl Default for GlobalPool {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn into_raw(ptr: Option<NonNull<u8>>) -> *mut u8 {
    ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
}

unsafe impl GlobalAlloc for GlobalPool {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = match self.pool() {
            Some(pool) => pool.allocate(layout.size(), layout.align()),
            None => self.heap.alloc(layout.size(), layout.align()),
        };

        into_raw(ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe {
            match self.pool() {
                Some(pool) => pool.deallocate(ptr),
                None => self.heap.free(ptr),
            }
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new = unsafe {
            match self.pool() {
                Some(pool) => pool.reallocate(ptr, new_size, layout.align()),
                None => self.heap.realloc(ptr, new_size, layout.align()),
            }
        };

        into_raw(new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    #[test]
    fn heap_only_until_installed() {
        let global = GlobalPool::new();
        let layout = Layout::from_size_align(24, 8).unwrap();

        unsafe {
            let early = global.alloc(layout);
            assert!(!early.is_null());
            early.write_bytes(7, 24);

            let pool: &'static Pool = Box::leak(Box::new(Pool::new(PoolConfig::default()).unwrap()));
            pool.start_up().unwrap();
            assert!(global.install(pool));
            assert!(!global.install(pool));

            let chunk = global.alloc(layout);
            assert!(pool.find_owning_page(chunk).is_some());
            assert_eq!(pool.find_owning_page(early), None);

            let grown = global.realloc(early, layout, 200);
            assert_eq!(grown.add(23).read(), 7);

            global.dealloc(grown, Layout::from_size_align(200, 8).unwrap());
            global.dealloc(chunk, layout);

            assert_eq!(pool.report_usage().used_bytes, 0);
        }
    }
}
