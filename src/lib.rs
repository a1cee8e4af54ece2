//! A freelist allocator for environments that have no heap of their own.
//!
//! Callers donate one or more fixed memory regions (static arrays, linker
//! sections, reserved RAM banks) at start-up; afterwards every allocation is
//! served from those regions with no operating-system involvement. Inside
//! each donated pool the allocator threads an intrusive list of blocks, and
//! one global free list (sorted by address) spans all pools:
//!
//! ```text
//!                      Next free block               Next free block
//!                +----------------------+  +--------------------------------------+
//!                |                      |  |                                      |
//! +--------------|----------------------|--|----+      +--------------------------|-------------------+
//! |        | +---|--+    +-------+    +-|--|-+  |      |        | +-------+    +--|---+    +-------+  |
//! |  Pool  | | Free | -> | Block | -> | Free |  | ---> |  Pool  | | Block | -> | Free | -> | Block |  |
//! |        | +------+    +-------+    +------+  |      |        | +-------+    +------+    +-------+  |
//! +---------------------------------------------+      +----------------------------------------------+
//! ```
//!
//! Allocation is first-fit with block splitting; deallocation coalesces the
//! freed block with both physical neighbors, so free space always flows back
//! into maximal chunks. Out of memory is an ordinary `null` result, never a
//! panic.
//!
//! # Usage
//!
//! ```
//! use poolalloc::PoolAlloc;
//!
//! static ALLOCATOR: PoolAlloc = PoolAlloc::new();
//!
//! #[repr(align(16))]
//! struct PoolStorage([u8; 64 * 1024]);
//! static mut STORAGE: PoolStorage = PoolStorage([0; 64 * 1024]);
//!
//! ALLOCATOR.initialize();
//!
//! unsafe {
//!     ALLOCATOR.register_pool((&raw mut STORAGE.0).cast(), 64 * 1024);
//!
//!     let ptr = ALLOCATOR.allocate(128);
//!     assert!(!ptr.is_null());
//!     ALLOCATOR.deallocate(ptr);
//! }
//! ```
//!
//! # Thread safety
//!
//! The engine itself never blocks, spawns or suspends. Multithreaded use is
//! enabled by supplying a pair of [`LockHooks`] that bracket every mutating
//! operation; the defaults do nothing, which is exactly right for a
//! single-threaded embedding. See [`PoolAlloc::set_lock_hooks`].

use std::{
    alloc::{GlobalAlloc, Layout},
    cell::UnsafeCell,
    ptr::{self, NonNull},
};

mod block;
mod freelist;
mod heap;
mod hooks;
mod list;
mod pool;
mod utils;

pub mod platform;

use heap::Heap;

pub use heap::AllocStats;
pub use hooks::LockHooks;
pub use platform::{OsPool, page_size};
pub use utils::MIN_ALIGN;

/// The process-wide allocator context: donated pools, the free list and the
/// lock-hook seam. `const`-constructible so it can live in a `static`,
/// including as the `#[global_allocator]`.
///
/// Call order matters: [`PoolAlloc::initialize`] first, then one or more
/// [`PoolAlloc::register_pool`] donations, then any number of
/// [`PoolAlloc::allocate`] / [`PoolAlloc::deallocate`] calls. Allocating
/// from an allocator that was never initialized or never given a pool
/// yields null, not a crash.
pub struct PoolAlloc {
    heap: UnsafeCell<Heap>,
    hooks: UnsafeCell<LockHooks>,
}

// SAFETY: every access to `heap` goes through the lock window below. With
// the default no-op hooks that window provides no exclusion, which is sound
// only in single-threaded use; concurrent embeddings must install real
// hooks before sharing the allocator, as documented on `set_lock_hooks`.
unsafe impl Sync for PoolAlloc {}

impl PoolAlloc {
    pub const fn new() -> Self {
        Self {
            heap: UnsafeCell::new(Heap::new()),
            hooks: UnsafeCell::new(LockHooks::noop()),
        }
    }

    /// Runs `operate` on the heap between the acquire and release hooks.
    /// The critical section is exactly one public operation wide and never
    /// nested.
    fn with_heap<T>(&self, operate: impl FnOnce(&mut Heap) -> T) -> T {
        unsafe {
            let hooks = *self.hooks.get();

            (hooks.acquire)();
            let result = operate(&mut *self.heap.get());
            (hooks.release)();

            result
        }
    }

    /// Installs the mutual-exclusion hooks used around every mutating
    /// operation. Must be called before the allocator is shared between
    /// threads; installing hooks while another thread is allocating is a
    /// race on the hooks themselves.
    pub fn set_lock_hooks(&self, hooks: LockHooks) {
        unsafe {
            *self.hooks.get() = hooks;
        }
    }

    /// Establishes the empty allocator state: no pools, empty free list,
    /// zeroed counters. Pool donations rejected before this call stay
    /// counted in [`AllocStats::rejected_pools`]. Must run once before any
    /// other call; later calls are no-ops and will not wipe a live heap.
    pub fn initialize(&self) {
        self.with_heap(|heap| heap.init());
    }

    /// Donates the region `[address, address + size)` to the allocator,
    /// which carves it into one maximal free block. May be called multiple
    /// times with disjoint regions; the regions need not be adjacent.
    ///
    /// Regions too small to hold the bookkeeping headers plus one minimal
    /// block are silently rejected; the rejection is visible in
    /// [`AllocStats::rejected_pools`].
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes, must not overlap any
    /// other registered region, and must remain exclusively owned by the
    /// allocator for the rest of the process lifetime.
    pub unsafe fn register_pool(&self, address: *mut u8, size: usize) {
        let Some(address) = NonNull::new(address) else {
            return;
        };

        self.with_heap(|heap| unsafe { heap.register_pool(address, size) });
    }

    /// Allocates `size` bytes, aligned to [`MIN_ALIGN`], from the first
    /// free block that fits. Returns null when no registered pool has a
    /// large enough free block; that is a reportable out-of-memory
    /// condition, not a fatal error, and the free list is left untouched.
    ///
    /// `allocate(0)` returns a distinct minimal allocation rather than
    /// null.
    ///
    /// # Safety
    ///
    /// In multithreaded embeddings, correct lock hooks must have been
    /// installed (see [`PoolAlloc::set_lock_hooks`]).
    pub unsafe fn allocate(&self, size: usize) -> *mut u8 {
        self.with_heap(|heap| match unsafe { heap.allocate(size) } {
            Some(address) => address.as_ptr(),
            None => ptr::null_mut(),
        })
    }

    /// Returns a block to the free list, merging it with any free physical
    /// neighbor before the call returns. Passing null is a documented
    /// no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by
    /// [`PoolAlloc::allocate`] on this allocator and not yet deallocated.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        self.with_heap(|heap| unsafe { heap.deallocate(ptr) });
    }

    /// Snapshot of the bookkeeping counters: total donated capacity, bytes
    /// currently in use, accepted and rejected pool registrations.
    pub fn stats(&self) -> AllocStats {
        self.with_heap(|heap| heap.stats())
    }
}

impl Default for PoolAlloc {
    fn default() -> Self {
        Self::new()
    }
}

/// Lets a `PoolAlloc` serve as the Rust global allocator. Layouts aligned
/// beyond [`MIN_ALIGN`] are refused with null; everything else maps straight
/// onto [`PoolAlloc::allocate`] / [`PoolAlloc::deallocate`]. The default
/// `realloc` and `alloc_zeroed` (allocate-copy-free and allocate-then-zero)
/// are inherited as-is.
unsafe impl GlobalAlloc for PoolAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MIN_ALIGN {
            return ptr::null_mut();
        }

        unsafe { self.allocate(layout.size()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.deallocate(ptr) }
    }
}
