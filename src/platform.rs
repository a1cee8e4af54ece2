//! Hosted pool discovery.
//!
//! The core allocator never talks to an operating system: every byte it
//! manages is donated through `register_pool`. On hosted platforms something
//! still has to produce those donations, so this module wraps the platform
//! virtual-memory calls behind one trait and exposes [`OsPool`], a
//! page-aligned region suitable for donation. Demos and tests use it; the
//! allocation paths do not.

use std::{
    mem,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::utils::align;

/// Cached result of the page size query, `0` until first use.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Abstraction over the platform virtual-memory syscalls. The rest of the
/// crate has nothing to do with the concrete APIs each kernel offers.
trait PlatformMemory {
    /// Requests a region of `size` bytes from the kernel. Returns `None` if
    /// the underlying syscall fails.
    unsafe fn request_memory(size: usize) -> Option<NonNull<u8>>;

    /// Returns the region of `size` bytes starting at `address` back to the
    /// kernel.
    unsafe fn return_memory(address: *mut u8, size: usize);

    /// Virtual memory page size of the machine in bytes.
    unsafe fn page_size() -> usize;
}

/// Unit type the per-platform [`PlatformMemory`] implementations hang off.
struct Os;

/// Virtual memory page size of the machine, queried once and cached.
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let queried = unsafe { Os::page_size() };
    PAGE_SIZE.store(queried, Ordering::Relaxed);

    queried
}

/// A page-aligned memory region reserved from the operating system, meant to
/// be donated to a [`crate::PoolAlloc`].
///
/// Dropping an `OsPool` returns the region to the kernel, so a region that
/// has been registered with an allocator must either outlive every use of
/// that allocator or be leaked with [`OsPool::into_raw`], which matches the
/// allocator's own contract that donated memory lives for the rest of the
/// process.
pub struct OsPool {
    address: NonNull<u8>,
    size: usize,
}

impl OsPool {
    /// Reserves a region of at least `size` bytes, rounded up to the page
    /// size. Returns `None` if the kernel refuses.
    pub fn reserve(size: usize) -> Option<Self> {
        let size = align(size.max(1), page_size());
        let address = unsafe { Os::request_memory(size)? };

        Some(Self { address, size })
    }

    /// Base address of the region.
    pub fn addr(&self) -> *mut u8 {
        self.address.as_ptr()
    }

    /// Size of the region in bytes. At least the requested size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Relinquishes ownership without returning the region to the kernel,
    /// yielding the address and size to pass to `register_pool`.
    pub fn into_raw(self) -> (*mut u8, usize) {
        let raw = (self.address.as_ptr(), self.size);
        mem::forget(self);

        raw
    }
}

impl Drop for OsPool {
    fn drop(&mut self) {
        unsafe {
            Os::return_memory(self.address.as_ptr(), self.size);
        }
    }
}

#[cfg(unix)]
mod unix {
    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    use libc::{mmap, munmap, off_t, size_t};

    use super::{Os, PlatformMemory};

    impl PlatformMemory for Os {
        unsafe fn request_memory(size: usize) -> Option<NonNull<u8>> {
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ADDR, size as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    address => Some(NonNull::new_unchecked(address).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(address: *mut u8, size: usize) {
            unsafe {
                munmap(address as *mut c_void, size as size_t);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    use super::{Os, PlatformMemory};

    impl PlatformMemory for Os {
        unsafe fn request_memory(size: usize) -> Option<NonNull<u8>> {
            // Read-write only.
            let protection = Memory::PAGE_READWRITE;
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let address = Memory::VirtualAlloc(None, size, flags, protection);

                NonNull::new(address.cast())
            }
        }

        unsafe fn return_memory(address: *mut u8, _size: usize) {
            unsafe {
                let _ = Memory::VirtualFree(address as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
