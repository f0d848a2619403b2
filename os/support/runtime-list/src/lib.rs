//! # Intrusive doubly-linked list
//!
//! The list never owns or allocates its elements. Every element embeds a
//! [`Link`] and an [`Adapter`] tells the list where to find it, so the same
//! element type can sit on different lists through different adapters.
//!
//! ```text
//!   head                                   tail
//!    │                                      │
//!    ▼                                      ▼
//! ┌──────┐ next ┌──────┐ next ┌──────┐
//! │ node │─────▶│ node │─────▶│ node │──▶ None
//! │ link │◀─────│ link │◀─────│ link │
//! └──────┘ prev └──────┘ prev └──────┘
//! ```
//!
//! All mutating operations are `O(1)`. The list imposes no ordering; callers
//! that need one (e.g. address order) maintain it by choosing the anchor for
//! [`IntrusiveList::insert_after`].
//!
//! ## Safety model
//!
//! A node handed to the list must stay valid and must not move until it is
//! removed again. A node may be linked into at most one list per adapter.
//! These rules cannot be checked by the list, which is why the mutating
//! operations are `unsafe`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Link field embedded in a list element.
pub struct Link<T> {
    prev: Option<NonNull<T>>,
    next: Option<NonNull<T>>,
}

impl<T> Link<T> {
    /// An unlinked link.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prev: None,
            next: None,
        }
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Locates the [`Link`] inside a node.
///
/// # Safety
/// `link` must return a pointer into the storage of `node` that stays stable
/// for as long as the node is linked, and must return the same link for the
/// same node every time.
pub unsafe trait Adapter {
    type Node;

    /// Returns the link embedded in `node`.
    ///
    /// # Safety
    /// `node` must point to a valid, live node.
    unsafe fn link(node: NonNull<Self::Node>) -> NonNull<Link<Self::Node>>;
}

/// A doubly-linked list threaded through the nodes' embedded links.
pub struct IntrusiveList<A: Adapter> {
    head: Option<NonNull<A::Node>>,
    tail: Option<NonNull<A::Node>>,
    len: usize,
    _adapter: PhantomData<A>,
}

impl<A: Adapter> Default for IntrusiveList<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Adapter> IntrusiveList<A> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _adapter: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn head(&self) -> Option<NonNull<A::Node>> {
        self.head
    }

    #[inline]
    #[must_use]
    pub const fn tail(&self) -> Option<NonNull<A::Node>> {
        self.tail
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    unsafe fn link_of(node: NonNull<A::Node>) -> *mut Link<A::Node> {
        unsafe { A::link(node).as_ptr() }
    }

    /// Link `node` in front of the current head.
    ///
    /// # Safety
    /// `node` must be valid, unlinked (for this adapter) and must outlive its
    /// membership in the list.
    pub unsafe fn insert_head(&mut self, node: NonNull<A::Node>) {
        unsafe {
            let link = Self::link_of(node);
            (*link).prev = None;
            (*link).next = self.head;
            match self.head {
                Some(old) => (*Self::link_of(old)).prev = Some(node),
                None => self.tail = Some(node),
            }
        }
        self.head = Some(node);
        self.len += 1;
    }

    /// Link `node` directly behind `anchor`.
    ///
    /// # Safety
    /// `anchor` must be a member of this list; `node` as for
    /// [`insert_head`](Self::insert_head).
    pub unsafe fn insert_after(&mut self, anchor: NonNull<A::Node>, node: NonNull<A::Node>) {
        unsafe {
            let anchor_link = Self::link_of(anchor);
            let next = (*anchor_link).next;

            let link = Self::link_of(node);
            (*link).prev = Some(anchor);
            (*link).next = next;
            (*anchor_link).next = Some(node);

            match next {
                Some(next) => (*Self::link_of(next)).prev = Some(node),
                None => self.tail = Some(node),
            }
        }
        self.len += 1;
    }

    /// Unlink `node` and reset its link.
    ///
    /// # Safety
    /// `node` must be a member of this list.
    pub unsafe fn remove(&mut self, node: NonNull<A::Node>) {
        unsafe {
            let link = Self::link_of(node);
            let (prev, next) = ((*link).prev, (*link).next);

            match prev {
                Some(prev) => (*Self::link_of(prev)).next = next,
                None => self.head = next,
            }
            match next {
                Some(next) => (*Self::link_of(next)).prev = prev,
                None => self.tail = prev,
            }

            *link = Link::new();
        }
        self.len -= 1;
    }

    /// The node following `node`, or the head when `node` is `None`.
    ///
    /// # Safety
    /// `node`, if given, must be a member of this list.
    #[must_use]
    pub unsafe fn next(&self, node: Option<NonNull<A::Node>>) -> Option<NonNull<A::Node>> {
        match node {
            None => self.head,
            Some(node) => unsafe { (*Self::link_of(node)).next },
        }
    }

    /// The node preceding `node`, or the tail when `node` is `None`.
    ///
    /// # Safety
    /// `node`, if given, must be a member of this list.
    #[must_use]
    pub unsafe fn prev(&self, node: Option<NonNull<A::Node>>) -> Option<NonNull<A::Node>> {
        match node {
            None => self.tail,
            Some(node) => unsafe { (*Self::link_of(node)).prev },
        }
    }

    /// Walk the list from head to tail.
    ///
    /// Relies on the contract of the insertion methods: every linked node is
    /// still valid.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

impl<A: Adapter> fmt::Debug for IntrusiveList<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over the node pointers of an [`IntrusiveList`].
pub struct Iter<'a, A: Adapter> {
    list: &'a IntrusiveList<A>,
    cursor: Option<NonNull<A::Node>>,
}

impl<A: Adapter> Iterator for Iter<'_, A> {
    type Item = NonNull<A::Node>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        // Safety: linked nodes stay valid while they are members.
        self.cursor = unsafe { self.list.next(Some(node)) };
        Some(node)
    }
}
