use std::ptr::NonNull;

use crate::{
    block::{BLOCK_HEADER_SIZE, Block},
    freelist::FreeList,
    list::{List, Node},
    utils::{MIN_ALIGN, align},
};

/// Size in bytes of a pool header, rounded up to [`MIN_ALIGN`] so the first
/// block header lands on an aligned address. The complete header is a
/// [`Node<Pool>`]; the links chain every registered pool together.
pub(crate) const POOL_HEADER_SIZE: usize = align(size_of::<Node<Pool>>(), MIN_ALIGN);

/// Metadata of one donated memory region, stored in-band at the start of the
/// region. Pools need not be adjacent to each other, so they form a linked
/// list of their own, and each pool tracks its blocks in address order:
///
/// ```text
/// +-----------------------------------------------+      +-----------------------------------------------+
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// |  Pool  | | Block | -> | Block | -> | Block |  | ---> |  Pool  | | Block | -> | Block | -> | Block |  |
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// +-----------------------------------------------+      +-----------------------------------------------+
/// ```
///
/// Since the block list is built only by carving (one maximal block at
/// registration) and splitting (remainder inserted right after the block it
/// came from), list order always equals address order. That makes physical
/// neighbors reachable through `next`/`prev`, which is all coalescing needs.
pub(crate) struct Pool {
    /// Usable size of the pool in bytes, excluding this header. Invariant:
    /// the total sizes of the blocks in `blocks` always add up to it.
    pub size: usize,
    /// Blocks carved from this pool, in address order.
    pub blocks: List<Block>,
}

impl Pool {
    /// Absorbs the physically following block into `node` if that neighbor
    /// is free. The neighbor's header dissolves into the merged payload.
    ///
    /// # Safety
    ///
    /// `node` must be a block of this pool.
    pub(crate) unsafe fn merge_with_next(
        &mut self,
        mut node: NonNull<Node<Block>>,
        free_list: &mut FreeList,
    ) {
        unsafe {
            let Some(next) = node.as_ref().next else {
                return;
            };

            if !next.as_ref().is_free() {
                return;
            }

            free_list.remove(next);

            node.as_mut().data.size += next.as_ref().total_size();
            self.blocks.remove(next);
        }
    }

    /// Absorbs `node` into the physically preceding block if that neighbor
    /// is free. On merge, `node` is rewritten to point at the surviving
    /// (preceding) header.
    ///
    /// # Safety
    ///
    /// `node` must be a block of this pool and must not be in the free list
    /// yet; the preceding block, if free, must be.
    pub(crate) unsafe fn merge_with_prev(
        &mut self,
        node: &mut NonNull<Node<Block>>,
        free_list: &mut FreeList,
    ) {
        unsafe {
            let Some(mut prev) = node.as_ref().prev else {
                return;
            };

            if !prev.as_ref().is_free() {
                return;
            }

            // The previous block sits in the free list with its node stored
            // in its payload. That payload is about to grow, so take it out
            // and let the caller reinsert the merged block.
            free_list.remove(prev);

            prev.as_mut().data.size += BLOCK_HEADER_SIZE + node.as_ref().size();
            self.blocks.remove(*node);

            *node = prev;
        }
    }
}
