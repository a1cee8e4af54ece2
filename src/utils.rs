//! Alignment helpers shared by every module. Nothing in here knows about
//! blocks or pools, it is plain integer arithmetic.

/// Minimum alignment guaranteed by the allocator, in bytes.
///
/// Every header size is rounded up to this value and every donated pool base
/// address is aligned up to it, so any payload address the allocator hands
/// out is a multiple of it as well. 16 bytes covers every primitive type on
/// the platforms we care about, including `u128` and SSE-style vectors.
pub const MIN_ALIGN: usize = 16;

/// Rounds `size` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Used for block sizes (multiples of
/// [`MIN_ALIGN`]) and for pool base addresses.
pub(crate) const fn align(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}

/// Rounds `size` up to the next multiple of `alignment`, or `None` when the
/// rounded value does not fit in a `usize`.
///
/// `alignment` must be a power of two. Used for caller-supplied allocation
/// sizes, which unlike header constants may sit anywhere in the `usize`
/// range.
pub(crate) const fn checked_align(size: usize, alignment: usize) -> Option<usize> {
    match size.checked_add(alignment - 1) {
        Some(padded) => Some(padded & !(alignment - 1)),
        None => None,
    }
}

/// Rounds `size` down to the previous multiple of `alignment`.
///
/// `alignment` must be a power of two. Used to trim the tail of a donated
/// pool so that its total size stays a multiple of [`MIN_ALIGN`].
pub(crate) const fn align_down(size: usize, alignment: usize) -> usize {
    size & !(alignment - 1)
}
