use std::{cmp, ptr::NonNull};

use crate::{
    block::{BLOCK_HEADER_SIZE, BLOCK_MAGIC, Block, MIN_BLOCK_SIZE},
    freelist::FreeList,
    list::{List, Node},
    pool::{POOL_HEADER_SIZE, Pool},
    utils::{MIN_ALIGN, align, align_down, checked_align},
};

/// Snapshot of the allocator's bookkeeping counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocStats {
    /// Sum of the usable sizes of every registered pool (block headers
    /// included, pool headers excluded).
    pub total_capacity: usize,
    /// Payload bytes currently handed out to callers.
    pub in_use: usize,
    /// Number of pools accepted by `register_pool`.
    pub registered_pools: usize,
    /// Number of donated regions rejected because they were too small to
    /// host a pool header plus one minimal block.
    pub rejected_pools: usize,
}

impl AllocStats {
    pub(crate) const fn new() -> Self {
        Self {
            total_capacity: 0,
            in_use: 0,
            registered_pools: 0,
            rejected_pools: 0,
        }
    }
}

/// The allocation engine: one free list spanning every donated pool.
///
/// This struct is not synchronized and needs `&mut` to operate; the outer
/// [`crate::PoolAlloc`] wraps it and brackets every call with the embedding
/// environment's lock hooks.
pub(crate) struct Heap {
    /// Registered pools, one [`Node<Pool>`] header at the start of each
    /// donated region.
    pools: List<Pool>,
    /// Free blocks across all pools, sorted by address.
    free_list: FreeList,
    /// Bookkeeping counters, see [`AllocStats`].
    stats: AllocStats,
    /// Set by [`Heap::init`]. Until then every operation is a graceful
    /// no-op: allocations return `None` instead of touching memory.
    initialized: bool,
}

impl Heap {
    pub const fn new() -> Self {
        Self {
            pools: List::new(),
            free_list: FreeList::new(),
            stats: AllocStats::new(),
            initialized: false,
        }
    }

    /// Establishes the empty allocator state. Must run before any pool is
    /// registered. Calling it again later is a no-op, it will not wipe a
    /// live heap.
    ///
    /// Registrations rejected before this call stay counted in
    /// [`AllocStats::rejected_pools`], so early misuse remains visible.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }

        let rejected = self.stats.rejected_pools;

        self.pools = List::new();
        self.free_list = FreeList::new();
        self.stats = AllocStats::new();
        self.stats.rejected_pools = rejected;
        self.initialized = true;
    }

    pub fn stats(&self) -> AllocStats {
        self.stats
    }

    /// Folds the donated region `[address, address + size)` into the heap as
    /// one maximal free block.
    ///
    /// The base address is aligned up and the tail trimmed down to
    /// [`MIN_ALIGN`]. Regions that cannot host the pool header, one block
    /// header and a minimal payload after that adjustment are silently
    /// rejected and only counted, per the contract that a too-small donation
    /// is not an error.
    ///
    /// # Safety
    ///
    /// The region must be valid for reads and writes, must not overlap any
    /// previously registered region, and must remain exclusively owned by
    /// the allocator for the rest of the process lifetime.
    pub unsafe fn register_pool(&mut self, address: NonNull<u8>, size: usize) {
        if !self.initialized {
            self.stats.rejected_pools += 1;
            return;
        }

        let base = align(address.as_ptr() as usize, MIN_ALIGN);
        let padding = base - address.as_ptr() as usize;

        let usable = align_down(size.saturating_sub(padding), MIN_ALIGN);

        if usable < POOL_HEADER_SIZE + BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE {
            self.stats.rejected_pools += 1;
            return;
        }

        unsafe {
            let base = NonNull::new_unchecked(base as *mut u8);

            let mut pool = self.pools.append(
                Pool {
                    size: usable - POOL_HEADER_SIZE,
                    blocks: List::new(),
                },
                base,
            );

            // One maximal block spanning the whole pool.
            let block_address = NonNull::new_unchecked(base.as_ptr().add(POOL_HEADER_SIZE));
            let block_size = pool.as_ref().data.size - BLOCK_HEADER_SIZE;

            let block = pool
                .as_mut()
                .data
                .blocks
                .append(Block::new(block_size, pool), block_address);

            self.free_list.insert(block);

            self.stats.total_capacity += pool.as_ref().data.size;
            self.stats.registered_pools += 1;
        }
    }

    /// First-fit allocation of `size` payload bytes.
    ///
    /// The requested size is rounded up to [`MIN_ALIGN`] and clamped to
    /// [`MIN_BLOCK_SIZE`], so `allocate(0)` yields a minimal valid block
    /// rather than `None`. Returns `None` when no free block fits, when the
    /// rounded size would not fit in a `usize`, or when the heap was never
    /// initialized; in every case nothing is modified.
    pub unsafe fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if !self.initialized {
            return None;
        }

        let needed = cmp::max(checked_align(size, MIN_ALIGN)?, MIN_BLOCK_SIZE);

        let block = self.free_list.find(needed)?;

        unsafe {
            self.split_if_worthwhile(block, needed);
            self.free_list.remove(block);

            self.stats.in_use += block.as_ref().size();

            Some(Node::<Block>::payload_of(block))
        }
    }

    /// Returns `ptr`'s block to the free list and coalesces it with both
    /// physical neighbors, so that no two adjacent free blocks survive the
    /// call.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`Heap::allocate`] on this heap and
    /// not deallocated since. A header that fails the plausibility check
    /// (wrong magic or already free) is refused without touching the free
    /// list; debug builds assert on it.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        if !self.initialized {
            return;
        }

        unsafe {
            let mut block = Node::<Block>::from_payload(ptr);

            let plausible = block.as_ref().data.magic == BLOCK_MAGIC && !block.as_ref().is_free();
            debug_assert!(plausible, "deallocate called with an invalid pointer");
            if !plausible {
                return;
            }

            self.stats.in_use -= block.as_ref().size();

            let mut pool = block.as_ref().data.pool;

            // Absorb the following neighbor first, then fold into the
            // preceding one; after both passes no free neighbor remains.
            pool.as_mut()
                .data
                .merge_with_next(block, &mut self.free_list);
            pool.as_mut()
                .data
                .merge_with_prev(&mut block, &mut self.free_list);

            self.free_list.insert(block);
        }
    }

    /// Splits `block` so it holds exactly `size` payload bytes, inserting
    /// the remainder right after it as a new free block. If the remainder
    /// could not host a header plus a minimal payload the block is left
    /// whole: handing out slightly more memory beats creating a fragment
    /// nothing can ever use.
    ///
    /// # Safety
    ///
    /// `block` must be a free block with `size() >= size`, and `size` must
    /// be a multiple of [`MIN_ALIGN`].
    unsafe fn split_if_worthwhile(&mut self, mut block: NonNull<Node<Block>>, size: usize) {
        unsafe {
            if block.as_ref().size() < size + BLOCK_HEADER_SIZE + MIN_BLOCK_SIZE {
                return;
            }

            let remainder_address =
                NonNull::new_unchecked(Node::<Block>::payload_of(block).as_ptr().add(size));
            let remainder_size = block.as_ref().size() - size - BLOCK_HEADER_SIZE;

            let mut pool = block.as_ref().data.pool;

            let remainder = pool.as_mut().data.blocks.insert_after(
                block,
                Block::new(remainder_size, pool),
                remainder_address,
            );

            self.free_list.insert(remainder);

            block.as_mut().data.size = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pool storage aligned like the donated regions an embedding
    /// environment would hand us.
    #[repr(align(16))]
    struct Storage<const N: usize>([u8; N]);

    impl<const N: usize> Storage<N> {
        fn new() -> Box<Self> {
            Box::new(Self([0; N]))
        }

        fn addr(&mut self) -> NonNull<u8> {
            NonNull::new(self.0.as_mut_ptr()).unwrap()
        }
    }

    fn heap_with_pool<const N: usize>(storage: &mut Storage<N>) -> Heap {
        let mut heap = Heap::new();
        heap.init();
        unsafe {
            heap.register_pool(storage.addr(), N);
        }
        heap
    }

    /// Walks every pool checking the structural invariants: block sizes add
    /// up to the pool size and no two physically adjacent blocks are both
    /// free.
    fn check_invariants(heap: &Heap) {
        for pool in &heap.pools {
            let blocks: Vec<(usize, bool)> = pool
                .blocks
                .iter()
                .map(|block| (block.size, block.is_free))
                .collect();

            let total: usize = blocks
                .iter()
                .map(|(size, _)| BLOCK_HEADER_SIZE + size)
                .sum();
            assert_eq!(total, pool.size, "capacity conservation violated");

            for pair in blocks.windows(2) {
                assert!(
                    !(pair[0].1 && pair[1].1),
                    "two adjacent free blocks left uncoalesced"
                );
            }
        }
    }

    #[test]
    fn uninitialized_heap_returns_null() {
        let mut heap = Heap::new();

        unsafe {
            assert!(heap.allocate(64).is_none());
        }
    }

    #[test]
    fn init_is_guarded_against_double_call() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        let capacity = heap.stats().total_capacity;
        assert!(capacity > 0);

        // A second init must not wipe the registered pool.
        heap.init();
        assert_eq!(heap.stats().total_capacity, capacity);
        assert_eq!(heap.pools.len(), 1);
    }

    #[test]
    fn register_rejects_undersized_region() {
        let mut storage = Storage::<32>::new();
        let mut heap = Heap::new();
        heap.init();

        unsafe {
            heap.register_pool(storage.addr(), 32);
            assert_eq!(heap.stats().rejected_pools, 1);
            assert_eq!(heap.stats().total_capacity, 0);
            assert!(heap.allocate(1).is_none());
        }
    }

    #[test]
    fn register_before_init_is_rejected() {
        let mut storage = Storage::<4096>::new();
        let mut heap = Heap::new();

        unsafe {
            heap.register_pool(storage.addr(), 4096);
        }

        heap.init();
        assert_eq!(heap.stats().registered_pools, 0);
        // The early rejection survives the init reset.
        assert_eq!(heap.stats().rejected_pools, 1);
        unsafe {
            assert!(heap.allocate(1).is_none());
        }
    }

    #[test]
    fn basic_allocation_and_write() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let addr = heap.allocate(128).unwrap();
            assert_eq!(addr.as_ptr() as usize % MIN_ALIGN, 0);

            addr.as_ptr().write_bytes(0xAB, 128);
            assert_eq!(*addr.as_ptr(), 0xAB);
            assert_eq!(*addr.as_ptr().add(127), 0xAB);

            check_invariants(&heap);

            heap.deallocate(addr);
            check_invariants(&heap);
            assert_eq!(heap.stats().in_use, 0);
        }
    }

    #[test]
    fn zero_size_allocation_is_minimal_block() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let addr = heap.allocate(0).unwrap();
            let block = Node::<Block>::from_payload(addr);
            assert_eq!(block.as_ref().size(), MIN_BLOCK_SIZE);

            heap.deallocate(addr);
            check_invariants(&heap);
        }
    }

    #[test]
    fn failed_allocation_has_no_side_effects() {
        let mut storage = Storage::<1024>::new();
        let mut heap = heap_with_pool(&mut storage);

        let before = heap.stats();
        let free_before = heap.free_list.len();

        unsafe {
            assert!(heap.allocate(4096).is_none());
        }

        assert_eq!(heap.stats(), before);
        assert_eq!(heap.free_list.len(), free_before);
        check_invariants(&heap);
    }

    #[test]
    fn huge_request_returns_null_without_overflowing() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        let before = heap.stats();

        unsafe {
            // Sizes whose rounded-up value would wrap around `usize::MAX`
            // must fail like any other unsatisfiable request.
            assert!(heap.allocate(usize::MAX).is_none());
            assert!(heap.allocate(usize::MAX - 8).is_none());
            assert!(heap.allocate(usize::MAX - (MIN_ALIGN - 1)).is_none());
        }

        assert_eq!(heap.stats(), before);
        check_invariants(&heap);
    }

    #[test]
    fn allocations_do_not_overlap() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let sizes = [16, 100, 48, 200, 32];
            let addrs: Vec<(usize, usize)> = sizes
                .iter()
                .map(|&size| (heap.allocate(size).unwrap().as_ptr() as usize, size))
                .collect();

            for (i, &(start, size)) in addrs.iter().enumerate() {
                for &(other_start, other_size) in &addrs[i + 1..] {
                    let disjoint = start + size <= other_start || other_start + other_size <= start;
                    assert!(disjoint, "allocations overlap");
                }
            }

            check_invariants(&heap);

            for &(start, _) in &addrs {
                heap.deallocate(NonNull::new(start as *mut u8).unwrap());
                check_invariants(&heap);
            }
        }
    }

    #[test]
    fn pattern_survives_unrelated_churn() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let size = 256;
            let addr = heap.allocate(size).unwrap();
            addr.as_ptr().write(0x5A);
            addr.as_ptr().add(size - 1).write(0xA5);

            // Unrelated churn elsewhere in the pool.
            for _ in 0..50 {
                let a = heap.allocate(64).unwrap();
                let b = heap.allocate(128).unwrap();
                heap.deallocate(a);
                let c = heap.allocate(32).unwrap();
                heap.deallocate(b);
                heap.deallocate(c);
            }

            assert_eq!(*addr.as_ptr(), 0x5A);
            assert_eq!(*addr.as_ptr().add(size - 1), 0xA5);

            heap.deallocate(addr);
            check_invariants(&heap);
        }
    }

    #[test]
    fn exhaustion_and_full_recovery() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        let capacity = heap.stats().total_capacity;

        unsafe {
            // Fill the pool with same-size chunks until it runs dry.
            let mut addrs = Vec::new();
            loop {
                match heap.allocate(128) {
                    Some(addr) => addrs.push(addr),
                    None => break,
                }
            }

            assert!(!addrs.is_empty());
            // Out of memory is sticky until something is freed.
            assert!(heap.allocate(128).is_none());

            // Free everything in an arbitrary (middle-out) order.
            let mut order = Vec::new();
            let mid = addrs.len() / 2;
            for i in 0..addrs.len() {
                order.push(if i % 2 == 0 { mid + i / 2 } else { mid - 1 - i / 2 });
            }
            for index in order {
                heap.deallocate(addrs[index]);
                check_invariants(&heap);
            }

            // Everything must have coalesced back into one maximal block.
            assert_eq!(heap.free_list.len(), 1);
            let whole = heap.allocate(capacity - BLOCK_HEADER_SIZE).unwrap();
            heap.deallocate(whole);
            check_invariants(&heap);
        }
    }

    #[test]
    fn first_fit_reuses_earliest_freed_block() {
        let mut storage = Storage::<1024>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let a = heap.allocate(100).unwrap();
            let b = heap.allocate(100).unwrap();
            let c = heap.allocate(100).unwrap();

            heap.deallocate(b);

            // The freed middle block sits at a lower address than the
            // untouched pool tail, so first-fit must hand it back.
            let reused = heap.allocate(100).unwrap();
            assert_eq!(reused, b);

            heap.deallocate(a);
            heap.deallocate(reused);
            heap.deallocate(c);
            check_invariants(&heap);
            assert_eq!(heap.free_list.len(), 1);
        }
    }

    #[test]
    fn whole_block_handed_out_when_remainder_too_small() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        let capacity = heap.stats().total_capacity;

        unsafe {
            // Ask for slightly less than the whole pool: the leftover cannot
            // host a header plus a minimal payload, so no split happens.
            let size = capacity - BLOCK_HEADER_SIZE - MIN_ALIGN;
            let addr = heap.allocate(size).unwrap();

            let block = Node::<Block>::from_payload(addr);
            assert_eq!(block.as_ref().size(), size + MIN_ALIGN);
            assert_eq!(heap.free_list.len(), 0);

            heap.deallocate(addr);
            check_invariants(&heap);
        }
    }

    #[test]
    fn allocation_spills_into_second_pool() {
        let mut first = Storage::<1024>::new();
        let mut second = Storage::<4096>::new();

        let mut heap = Heap::new();
        heap.init();

        unsafe {
            heap.register_pool(first.addr(), 1024);
            heap.register_pool(second.addr(), 4096);
            assert_eq!(heap.stats().registered_pools, 2);

            // Too big for the first pool, must land in the second.
            let addr = heap.allocate(2048).unwrap();

            let second_range = second.0.as_ptr() as usize..second.0.as_ptr() as usize + 4096;
            assert!(second_range.contains(&(addr.as_ptr() as usize)));

            check_invariants(&heap);
            heap.deallocate(addr);
            check_invariants(&heap);
        }
    }

    #[test]
    fn capacity_is_conserved_through_churn() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let mut live = Vec::new();

            for round in 0..20 {
                for size in [16, 80, 144, 33, 7] {
                    if let Some(addr) = heap.allocate(size) {
                        live.push(addr);
                    }
                    check_invariants(&heap);
                }

                // Free every other allocation each round.
                let mut index = 0;
                live.retain(|addr| {
                    index += 1;
                    if (index + round) % 2 == 0 {
                        heap.deallocate(*addr);
                        false
                    } else {
                        true
                    }
                });
                check_invariants(&heap);
            }

            for addr in live {
                heap.deallocate(addr);
                check_invariants(&heap);
            }

            assert_eq!(heap.stats().in_use, 0);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "invalid pointer")]
    fn double_free_is_detected_in_debug_builds() {
        let mut storage = Storage::<4096>::new();
        let mut heap = heap_with_pool(&mut storage);

        unsafe {
            let addr = heap.allocate(64).unwrap();
            heap.deallocate(addr);
            heap.deallocate(addr);
        }
    }
}
