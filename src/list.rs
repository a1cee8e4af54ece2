use std::{marker::PhantomData, ptr::NonNull};

/// Optional non-null pointer to `T`.
pub(crate) type Link<T> = Option<NonNull<T>>;

/// Node of an intrusive [`List`]. The node itself lives inside donated
/// memory, never on a heap of its own.
pub(crate) struct Node<T> {
    /// Pointer to the next node of the list.
    pub next: Link<Self>,
    /// Pointer to the previous node of the list.
    pub prev: Link<Self>,
    /// Element carried by the node.
    pub data: T,
}

/// Doubly linked list threaded through memory the caller chooses.
///
/// Because this data structure belongs to the allocator itself it can never
/// allocate. Every insertion method therefore receives the exact address
/// where the new node must be written, and the list only stitches pointers
/// together. The caller guarantees that the address is valid, exclusively
/// owned and large enough for a `Node<T>`.
pub(crate) struct List<T> {
    head: Link<Node<T>>,
    tail: Link<Node<T>>,
    len: usize,
    marker: PhantomData<T>,
}

pub(crate) struct Iter<'a, T> {
    current: Link<Node<T>>,
    remaining: usize,
    marker: PhantomData<&'a T>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn first(&self) -> Link<Node<T>> {
        self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a new node holding `data` at `address` and links it as the new
    /// tail of the list.
    ///
    /// # Safety
    ///
    /// `address` must be valid for writing a `Node<T>` and must not overlap
    /// any other live node.
    pub unsafe fn append(&mut self, data: T, address: NonNull<u8>) -> NonNull<Node<T>> {
        let node = address.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: None,
                prev: self.tail,
                data,
            });

            if let Some(mut tail) = self.tail {
                tail.as_mut().next = Some(node);
            } else {
                self.head = Some(node);
            }
        }

        self.tail = Some(node);
        self.len += 1;

        node
    }

    /// Writes a new node holding `data` at `address` and links it as the new
    /// head of the list.
    ///
    /// # Safety
    ///
    /// Same contract as [`List::append`].
    pub unsafe fn push_front(&mut self, data: T, address: NonNull<u8>) -> NonNull<Node<T>> {
        let node = address.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: self.head,
                prev: None,
                data,
            });

            if let Some(mut head) = self.head {
                head.as_mut().prev = Some(node);
            } else {
                self.tail = Some(node);
            }
        }

        self.head = Some(node);
        self.len += 1;

        node
    }

    /// Writes a new node holding `data` at `address` and links it right after
    /// `node`. Needed when splitting a block: the remainder must stay next to
    /// the block it was carved from so that list order keeps matching address
    /// order.
    ///
    /// # Safety
    ///
    /// `node` must belong to this list, and `address` follows the contract of
    /// [`List::append`].
    pub unsafe fn insert_after(
        &mut self,
        mut node: NonNull<Node<T>>,
        data: T,
        address: NonNull<u8>,
    ) -> NonNull<Node<T>> {
        let new = address.cast::<Node<T>>();

        unsafe {
            new.as_ptr().write(Node {
                next: node.as_ref().next,
                prev: Some(node),
                data,
            });

            match node.as_ref().next {
                Some(mut next) => next.as_mut().prev = Some(new),
                None => self.tail = Some(new),
            }

            node.as_mut().next = Some(new);
        }

        self.len += 1;

        new
    }

    /// Unlinks `node` from the list. The node's memory is left untouched, it
    /// simply stops being reachable from the list.
    ///
    /// # Safety
    ///
    /// `node` must be a node previously linked into this list.
    pub unsafe fn remove(&mut self, node: NonNull<Node<T>>) {
        unsafe {
            match node.as_ref().prev {
                Some(mut prev) => prev.as_mut().next = node.as_ref().next,
                None => self.head = node.as_ref().next,
            }

            match node.as_ref().next {
                Some(mut next) => next.as_mut().prev = node.as_ref().prev,
                None => self.tail = node.as_ref().prev,
            }
        }

        self.len -= 1;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            remaining: self.len,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
            self.remaining -= 1;

            Some(&node.as_ref().data)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
