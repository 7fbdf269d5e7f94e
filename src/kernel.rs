use std::ptr::NonNull;

/// This trait provides an abstraction over the platform's general purpose
/// allocator. The pool itself never talks to the OS directly: pages and
/// oversized requests both end up here, through [`crate::heap::HeapAllocator`].
///
/// Implementations must be thread safe, we don't add any synchronization
/// around these calls.
pub trait PlatformMemory {
    /// Request a memory block of `len` bytes. It returns a pointer to the
    /// block or `None` if the underlying allocator fails. No alignment beyond
    /// the platform's natural word alignment is assumed.
    ///
    /// # Safety
    /// `len` must not be zero.
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>>;

    /// Returns the block starting at `addr` back to the platform.
    ///
    /// # Safety
    /// `addr` must have been returned by [`PlatformMemory::request_memory`] on
    /// this same instance and must not have been returned already.
    unsafe fn return_memory(&self, addr: NonNull<u8>);
}

/// The process allocator: `malloc`/`free` on unix and the process heap on
/// windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl SystemMemory {
    pub const fn new() -> Self {
        Self
    }
}

impl<P: PlatformMemory + ?Sized> PlatformMemory for &P {
    unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
        unsafe { (**self).request_memory(len) }
    }

    unsafe fn return_memory(&self, addr: NonNull<u8>) {
        unsafe { (**self).return_memory(addr) }
    }
}

#[cfg(unix)]
mod unix {
    use super::{PlatformMemory, SystemMemory};

    use libc::{c_void, free, malloc, size_t};

    use std::ptr::NonNull;

    impl PlatformMemory for SystemMemory {
        unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
            unsafe { NonNull::new(malloc(len as size_t).cast::<u8>()) }
        }

        unsafe fn return_memory(&self, addr: NonNull<u8>) {
            unsafe { free(addr.as_ptr().cast::<c_void>()) }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{PlatformMemory, SystemMemory};

    use std::{os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::Memory;

    impl PlatformMemory for SystemMemory {
        unsafe fn request_memory(&self, len: usize) -> Option<NonNull<u8>> {
            unsafe {
                let heap = Memory::GetProcessHeap().ok()?;
                let addr = Memory::HeapAlloc(heap, Memory::HEAP_FLAGS(0), len);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(&self, addr: NonNull<u8>) {
            unsafe {
                if let Ok(heap) = Memory::GetProcessHeap() {
                    let _ = Memory::HeapFree(
                        heap,
                        Memory::HEAP_FLAGS(0),
                        Some(addr.as_ptr() as *const c_void),
                    );
                }
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_memory_round_trip() {
        unsafe {
            let addr = SystemMemory.request_memory(64).unwrap();
            addr.as_ptr().write_bytes(0xAB, 64);
            assert_eq!(*addr.as_ptr().add(63), 0xAB);
            SystemMemory.return_memory(addr);
        }
    }

    #[test]
    fn counting_memory_tracks_live_blocks() {
        let memory = testing::CountingMemory::default();

        unsafe {
            let a = memory.request_memory(16).unwrap();
            let b = memory.request_memory(32).unwrap();
            assert_eq!(memory.live(), 2);

            memory.return_memory(a);
            memory.return_memory(b);
        }

        assert_eq!(memory.live(), 0);
        assert_eq!(memory.requests(), 2);

        memory.set_failing(true);
        assert!(unsafe { memory.request_memory(16) }.is_none());
        assert_eq!(memory.live(), 0);
    }
}
