//! Area headers and the list glue that threads them onto the used and free
//! lists.
//!
//! Every block handed out by the heap is preceded by an [`AreaHeader`]:
//!
//! ```text
//! +---------------------------+---------------------------------+
//! | AreaHeader (HEADER_SIZE)  |          payload (size)         |
//! +---------------------------+---------------------------------+
//! ^ header address            ^ header address + HEADER_SIZE
//!                             (pointer returned by `malloc`)
//! ```

use core::ptr::{self, NonNull};
use runtime_list::{Adapter, Link};

/// Bookkeeping record at the start of every area.
#[repr(C)]
pub struct AreaHeader {
    /// Payload bytes following the header.
    size: usize,
    membership: Membership,
}

/// Which list currently owns a header, together with the link used there.
///
/// A header is retagged only while it is detached from both lists.
enum Membership {
    Detached,
    Used(Link<AreaHeader>),
    Free(Link<AreaHeader>),
}

/// Bytes occupied by an [`AreaHeader`]; the fixed payload offset.
pub const HEADER_SIZE: usize = size_of::<AreaHeader>();

/// Natural alignment of an [`AreaHeader`]. Every header address and payload
/// size is a multiple of this.
pub const HEADER_ALIGN: usize = align_of::<AreaHeader>();

/// Externally visible lifecycle state of an area.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AreaState {
    /// Owned by neither list; only observable mid-operation.
    Detached,
    /// Handed out by the allocator.
    Used,
    /// Waiting on the free list for reuse.
    Free,
}

/// Address and size of one area, as reported by heap inspection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AreaSpan {
    /// Address of the header.
    pub header: usize,
    /// Payload bytes.
    pub size: usize,
    pub state: AreaState,
}

impl AreaSpan {
    /// Address handed out to the caller.
    #[must_use]
    pub const fn payload(&self) -> usize {
        self.header + HEADER_SIZE
    }

    /// First address past the payload.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.payload() + self.size
    }
}

/// Handle to a live header.
///
/// An `Area` is only ever created for memory below the break point that
/// holds an initialized header, and is dropped before that header is merged
/// away or returned to the kernel. All raw address arithmetic of the heap
/// goes through this type.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(super) struct Area(NonNull<AreaHeader>);

impl Area {
    /// Write a fresh, detached header at `addr`.
    ///
    /// # Safety
    /// `[addr, addr + HEADER_SIZE + size)` must be writable heap memory not
    /// covered by any other live area, and `addr` must be aligned to
    /// [`HEADER_ALIGN`].
    pub(super) unsafe fn materialize(addr: usize, size: usize) -> Self {
        let header = ptr::with_exposed_provenance_mut::<AreaHeader>(addr);
        debug_assert!(header.is_aligned());
        unsafe {
            header.write(AreaHeader {
                size,
                membership: Membership::Detached,
            });
            Self(NonNull::new_unchecked(header))
        }
    }

    /// Recover the header in front of a payload pointer.
    ///
    /// # Safety
    /// `payload` must have been produced by [`Area::payload`] for an area that
    /// is still live.
    pub(super) const unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        unsafe { Self(payload.byte_sub(HEADER_SIZE).cast()) }
    }

    /// Wrap a header reached through one of the lists.
    ///
    /// # Safety
    /// `header` must be linked into the used or free list.
    pub(super) const unsafe fn from_header(header: NonNull<AreaHeader>) -> Self {
        Self(header)
    }

    pub(super) const fn header(self) -> NonNull<AreaHeader> {
        self.0
    }

    pub(super) fn addr(self) -> usize {
        self.0.as_ptr().addr()
    }

    pub(super) fn payload(self) -> NonNull<u8> {
        unsafe { self.0.byte_add(HEADER_SIZE).cast() }
    }

    pub(super) fn size(self) -> usize {
        unsafe { (*self.0.as_ptr()).size }
    }

    pub(super) fn set_size(self, size: usize) {
        unsafe { (*self.0.as_ptr()).size = size }
    }

    /// Header plus payload.
    pub(super) fn span(self) -> usize {
        HEADER_SIZE + self.size()
    }

    pub(super) fn end(self) -> usize {
        self.addr() + self.span()
    }

    pub(super) fn state(self) -> AreaState {
        match unsafe { &(*self.0.as_ptr()).membership } {
            Membership::Detached => AreaState::Detached,
            Membership::Used(_) => AreaState::Used,
            Membership::Free(_) => AreaState::Free,
        }
    }

    /// Retag the header. Must only be called while it is on neither list.
    pub(super) fn set_state(self, state: AreaState) {
        debug_assert_eq!(self.state(), AreaState::Detached);
        let membership = match state {
            AreaState::Detached => Membership::Detached,
            AreaState::Used => Membership::Used(Link::new()),
            AreaState::Free => Membership::Free(Link::new()),
        };
        unsafe { (*self.0.as_ptr()).membership = membership }
    }

    /// Drop the tag after the header left its list.
    pub(super) fn detach(self) {
        unsafe { (*self.0.as_ptr()).membership = Membership::Detached }
    }

    pub(super) fn span_info(self) -> AreaSpan {
        AreaSpan {
            header: self.addr(),
            size: self.size(),
            state: self.state(),
        }
    }
}

/// Adapter for the list of handed-out areas.
pub(super) struct UsedList;

/// Adapter for the address-ordered list of reusable areas.
pub(super) struct FreeList;

unsafe impl Adapter for UsedList {
    type Node = AreaHeader;

    unsafe fn link(node: NonNull<AreaHeader>) -> NonNull<Link<AreaHeader>> {
        match unsafe { &mut (*node.as_ptr()).membership } {
            Membership::Used(link) => NonNull::from(link),
            _ => unreachable!("area {:p} is not tagged as used", node),
        }
    }
}

unsafe impl Adapter for FreeList {
    type Node = AreaHeader;

    unsafe fn link(node: NonNull<AreaHeader>) -> NonNull<Link<AreaHeader>> {
        match unsafe { &mut (*node.as_ptr()).membership } {
            Membership::Free(link) => NonNull::from(link),
            _ => unreachable!("area {:p} is not tagged as free", node),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[repr(C, align(16))]
    struct Backing([u8; 256]);

    #[test]
    fn header_size_keeps_payloads_aligned() {
        assert_eq!(HEADER_SIZE % HEADER_ALIGN, 0);
        assert!(HEADER_ALIGN >= align_of::<usize>());
    }

    #[test]
    fn payload_round_trip() {
        let mut backing = Backing([0; 256]);
        let addr = backing.0.as_mut_ptr().expose_provenance();

        let area = unsafe { Area::materialize(addr, 64) };
        assert_eq!(area.addr(), addr);
        assert_eq!(area.payload().as_ptr().addr(), addr + HEADER_SIZE);
        assert_eq!(area.end(), addr + HEADER_SIZE + 64);
        assert_eq!(area.state(), AreaState::Detached);

        let back = unsafe { Area::from_payload(area.payload()) };
        assert!(back == area);
        assert_eq!(back.size(), 64);
    }

    #[test]
    fn retagging_switches_state() {
        let mut backing = Backing([0; 256]);
        let addr = backing.0.as_mut_ptr().expose_provenance();

        let area = unsafe { Area::materialize(addr, 16) };
        area.set_state(AreaState::Free);
        assert_eq!(area.span_info().state, AreaState::Free);
        area.detach();
        area.set_state(AreaState::Used);
        assert_eq!(area.state(), AreaState::Used);
    }
}
