use std::ptr::NonNull;

use crate::{
    freelist::FreeListNode,
    list::Node,
    pool::Pool,
    utils::{MIN_ALIGN, align},
};

/// Size in bytes of a block header, rounded up to [`MIN_ALIGN`] so that the
/// payload that follows it stays aligned. The complete header is a
/// [`Node<Block>`]: the `next`/`prev` links thread the block into its pool's
/// address-ordered block list, which is what gives us the physical neighbors
/// during coalescing.
pub(crate) const BLOCK_HEADER_SIZE: usize = align(size_of::<Node<Block>>(), MIN_ALIGN);

/// Smallest payload a block may carry.
///
/// While a block is free, its payload stores the free list node that links
/// it to other free blocks (see [`crate::freelist`]), so no payload may ever
/// be smaller than that node. Rounded up to [`MIN_ALIGN`] like everything
/// else.
pub(crate) const MIN_BLOCK_SIZE: usize = align(size_of::<FreeListNode>(), MIN_ALIGN);

/// Tag stored in every block header. A pointer handed to `deallocate` whose
/// header does not carry this tag is obviously not one of ours.
pub(crate) const BLOCK_MAGIC: usize = 0xB10C_A110;

/// Metadata of a single chunk of memory, free or allocated. The header
/// precedes the payload in memory:
///
/// ```text
/// +--------------------+ <------+
/// |     next / prev    |        |
/// +--------------------+        |
/// |        size        |        |
/// +--------------------+        | -> Node<Block>, padded to MIN_ALIGN
/// |   is_free, magic   |        |
/// +--------------------+        |
/// |        pool        |        |
/// +--------------------+ <------+
/// |       Payload      |        |
/// |         ...        |        | -> what the caller gets
/// |         ...        |        |
/// +--------------------+ <------+
/// ```
///
/// The pointer returned to the caller points at the payload, exactly
/// [`BLOCK_HEADER_SIZE`] bytes past the start of the header.
pub(crate) struct Block {
    /// Payload size in bytes, excluding the header. Always a multiple of
    /// [`MIN_ALIGN`].
    pub size: usize,
    /// Whether the block is currently in the free list.
    pub is_free: bool,
    /// Plausibility tag checked on deallocation.
    pub magic: usize,
    /// Pool this block was carved from.
    pub pool: NonNull<Node<Pool>>,
}

impl Block {
    pub fn new(size: usize, pool: NonNull<Node<Pool>>) -> Self {
        Self {
            size,
            is_free: false,
            magic: BLOCK_MAGIC,
            pool,
        }
    }
}

impl Node<Block> {
    /// Returns the payload address of `block`, which is the pointer the
    /// allocator hands to the caller.
    ///
    /// # Safety
    ///
    /// `block` must point to a live block header.
    #[inline]
    pub unsafe fn payload_of(block: NonNull<Self>) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(block.as_ptr().cast::<u8>().add(BLOCK_HEADER_SIZE)) }
    }

    /// Recovers the block header from a payload address previously produced
    /// by [`Node::payload_of`].
    ///
    /// # Safety
    ///
    /// `payload` must be an address returned by this allocator and not yet
    /// deallocated, otherwise the resulting pointer is garbage.
    #[inline]
    pub unsafe fn from_payload(payload: NonNull<u8>) -> NonNull<Self> {
        unsafe { NonNull::new_unchecked(payload.as_ptr().sub(BLOCK_HEADER_SIZE).cast()) }
    }

    /// Payload size of this block, excluding the header.
    #[inline]
    pub fn size(&self) -> usize {
        self.data.size
    }

    /// Size of this block including its header. Summing this over every
    /// block of a pool yields the pool's usable size.
    #[inline]
    pub fn total_size(&self) -> usize {
        BLOCK_HEADER_SIZE + self.data.size
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.data.is_free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_constants_are_aligned() {
        assert_eq!(BLOCK_HEADER_SIZE % MIN_ALIGN, 0);
        assert_eq!(MIN_BLOCK_SIZE % MIN_ALIGN, 0);
        assert!(BLOCK_HEADER_SIZE >= size_of::<Node<Block>>());
        assert!(MIN_BLOCK_SIZE >= size_of::<FreeListNode>());
    }

    #[test]
    fn payload_round_trip() {
        let mut storage = [0u8; 2 * BLOCK_HEADER_SIZE];
        let header = NonNull::new(storage.as_mut_ptr().cast::<Node<Block>>()).unwrap();

        unsafe {
            let payload = Node::<Block>::payload_of(header);
            assert_eq!(
                payload.as_ptr() as usize - header.as_ptr() as usize,
                BLOCK_HEADER_SIZE
            );
            assert_eq!(Node::<Block>::from_payload(payload), header);
        }
    }
}
