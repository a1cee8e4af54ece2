use std::ptr::NonNull;

use crate::{
    block::Block,
    list::{Link, List, Node},
};

/// Node of the free list. It carries a pointer back to the block header it
/// represents and lives inside that block's payload.
pub(crate) type FreeListNode = Node<NonNull<Node<Block>>>;

/// Linked list of the free blocks across every registered pool.
///
/// Free blocks need no extra storage of their own: their payload is unused
/// by definition, so the free list writes its nodes right there. Each node's
/// data is a pointer back to the block header:
///
/// ```text
/// +------------------------+ <--------+
/// |      Node<Block>       |          | -> block header
/// +------------------------+ <--------+
/// |      FreeListNode      |          |
/// |  (links + back ptr)    |          | -> payload, unused while free
/// |          ...           |          |
/// +------------------------+ <--------+
/// ```
///
/// The list is kept **sorted by block address**. First-fit traversal then
/// prefers the lowest-addressed chunk that fits, so churn near the start of
/// a pool gets reused before untouched capacity at the end is broken up.
pub(crate) struct FreeList {
    /// Free list nodes, each written into the payload of the free block it
    /// points at.
    items: List<NonNull<Node<Block>>>,
}

impl FreeList {
    pub const fn new() -> Self {
        Self { items: List::new() }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Marks `block` free and links it into the list, keeping address order.
    ///
    /// # Safety
    ///
    /// `block` must be a live block header that is not currently in the free
    /// list, and its payload must be at least `MIN_BLOCK_SIZE` bytes (always
    /// true for blocks carved by this allocator).
    pub unsafe fn insert(&mut self, mut block: NonNull<Node<Block>>) {
        unsafe {
            block.as_mut().data.is_free = true;

            // The node is written into the payload of the block itself.
            let address = Node::<Block>::payload_of(block);

            // Find the last free block with a lower address than ours.
            let mut anchor: Link<FreeListNode> = None;
            let mut current = self.items.first();

            while let Some(node) = current {
                if node.as_ref().data > block {
                    break;
                }
                anchor = current;
                current = node.as_ref().next;
            }

            match anchor {
                Some(node) => self.items.insert_after(node, block, address),
                None => self.items.push_front(block, address),
            };
        }
    }

    /// Unlinks `block` from the free list and marks it allocated. O(1):
    /// the block's list node sits at a known address, the start of its own
    /// payload, exactly where [`FreeList::insert`] wrote it.
    ///
    /// # Safety
    ///
    /// `block` must currently be in the free list.
    pub unsafe fn remove(&mut self, mut block: NonNull<Node<Block>>) {
        unsafe {
            let node = Node::<Block>::payload_of(block).cast::<FreeListNode>();

            self.items.remove(node);
            block.as_mut().data.is_free = false;
        }
    }

    /// First-fit search: returns the first (lowest-addressed) free block
    /// whose payload can hold `size` bytes, or `None` if no block fits.
    /// Nothing is modified on failure.
    pub fn find(&self, size: usize) -> Link<Node<Block>> {
        for block in &self.items {
            unsafe {
                if block.as_ref().size() >= size {
                    return Some(*block);
                }
            }
        }

        None
    }
}
