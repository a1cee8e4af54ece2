use std::fmt;

fn noop() {}

/// Mutual-exclusion seam of the allocator.
///
/// The engine performs no threading of its own: it calls `acquire` before
/// mutating the free list and `release` after, and that is the entire
/// concurrency story. The defaults do nothing, which is correct for
/// single-threaded embeddings. A threaded environment supplies hooks that
/// lock and unlock a mutex of its choosing, mirroring the classic weakly
/// linked `malloc_lock`/`malloc_unlock` pair:
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// static LOCKED: AtomicBool = AtomicBool::new(false);
///
/// fn acquire() {
///     while LOCKED
///         .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
///         .is_err()
///     {
///         std::hint::spin_loop();
///     }
/// }
///
/// fn release() {
///     LOCKED.store(false, Ordering::Release);
/// }
///
/// let hooks = poolalloc::LockHooks::new(acquire, release);
/// ```
///
/// The lock is held for the duration of exactly one public operation and is
/// never re-entered by the allocator itself. Nested allocation from inside a
/// hook deadlocks unless the supplied lock is reentrant.
#[derive(Clone, Copy)]
pub struct LockHooks {
    /// Called before the critical section of every mutating operation.
    pub acquire: fn(),
    /// Called after the critical section, on every path out of it.
    pub release: fn(),
}

impl LockHooks {
    pub const fn new(acquire: fn(), release: fn()) -> Self {
        Self { acquire, release }
    }

    /// The default hooks: both callbacks do nothing.
    pub const fn noop() -> Self {
        Self {
            acquire: noop,
            release: noop,
        }
    }
}

impl Default for LockHooks {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for LockHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHooks").finish_non_exhaustive()
    }
}
