//! Lock-free core of the heap: the two area lists, the break point and the
//! algorithms that move areas between them.
//!
//! Nothing in here synchronizes. [`Heap`](super::Heap) wraps a
//! [`HeapState`] in a spin lock and is the only way the process-wide
//! instance is reached.

use super::area::{Area, AreaSpan, AreaState, FreeList, HEADER_ALIGN, HEADER_SIZE, UsedList};
use super::break_point::BreakPointService;
use super::config::{HeapConfig, ShrinkPolicy};
use super::error::{AllocError, BreakPointError, InvariantViolation};
use core::ptr::NonNull;
use log::{debug, trace, warn};
use runtime_list::IntrusiveList;

/// Used list, free list and break point of one heap.
///
/// # Invariants
/// - Every area in either list has a non-zero, aligned payload size.
/// - The free list is sorted by address and no two of its areas touch.
/// - Every area ends at or below the break point.
/// - `[base, break_point)` is exactly covered by used and free areas, with
///   no gaps and no overlap.
pub struct HeapState<B> {
    used: IntrusiveList<UsedList>,
    free: IntrusiveList<FreeList>,
    base: usize,
    break_point: usize,
    initialized: bool,
    config: HeapConfig,
    service: B,
}

// Safety: the raw area pointers are only dereferenced through `&mut self`,
// which the owning `Heap` hands out under its lock.
unsafe impl<B: Send> Send for HeapState<B> {}

/// Snapshot of a heap's bookkeeping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub base: usize,
    pub break_point: usize,
    pub used_areas: usize,
    /// Payload bytes handed out.
    pub used_bytes: usize,
    pub free_areas: usize,
    /// Payload bytes waiting for reuse.
    pub free_bytes: usize,
}

impl HeapStats {
    /// Bytes between heap base and break point.
    #[must_use]
    pub const fn heap_bytes(&self) -> usize {
        self.break_point - self.base
    }
}

/// Round a request up to whole alignment units; zero becomes one unit.
fn round_request(size: usize) -> Result<usize, AllocError> {
    let rounded = size
        .max(1)
        .checked_next_multiple_of(HEADER_ALIGN)
        .ok_or(AllocError::SizeOverflow(size))?;
    // The kernel call takes a signed delta.
    match HEADER_SIZE.checked_add(rounded) {
        Some(total) if isize::try_from(total).is_ok() => Ok(rounded),
        _ => Err(AllocError::SizeOverflow(size)),
    }
}

impl<B> HeapState<B> {
    /// An empty heap. The break point is queried on the first allocation.
    #[must_use]
    pub const fn new(service: B, config: HeapConfig) -> Self {
        Self {
            used: IntrusiveList::new(),
            free: IntrusiveList::new(),
            base: 0,
            break_point: 0,
            initialized: false,
            config,
            service,
        }
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Break point at initialization time; zero before.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Break point as last reported by the service; zero before
    /// initialization.
    #[must_use]
    pub const fn break_point(&self) -> usize {
        self.break_point
    }

    #[must_use]
    pub const fn config(&self) -> &HeapConfig {
        &self.config
    }

    #[must_use]
    pub const fn service(&self) -> &B {
        &self.service
    }

    /// Free areas in ascending address order.
    pub fn free_areas(&self) -> impl Iterator<Item = AreaSpan> + '_ {
        // Safety: list members are live headers.
        self.free
            .iter()
            .map(|node| unsafe { Area::from_header(node) }.span_info())
    }

    /// Used areas, most recently allocated first.
    pub fn used_areas(&self) -> impl Iterator<Item = AreaSpan> + '_ {
        self.used
            .iter()
            .map(|node| unsafe { Area::from_header(node) }.span_info())
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let (used_areas, used_bytes) = self
            .used_areas()
            .fold((0, 0), |(n, bytes), a| (n + 1, bytes + a.size));
        let (free_areas, free_bytes) = self
            .free_areas()
            .fold((0, 0), |(n, bytes), a| (n + 1, bytes + a.size));
        HeapStats {
            base: self.base,
            break_point: self.break_point,
            used_areas,
            used_bytes,
            free_areas,
            free_bytes,
        }
    }

    /// Walk both lists and report the first broken invariant.
    ///
    /// # Errors
    /// Returns the [`InvariantViolation`] found first.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let mut spanned = 0usize;
        for area in self.used_areas().chain(self.free_areas()) {
            self.check_area(&area)?;
            spanned += HEADER_SIZE + area.size;
        }

        let capacity = self.break_point - self.base;
        if spanned > capacity {
            return Err(InvariantViolation::Overcommitted { spanned, capacity });
        }
        if spanned < capacity {
            return Err(InvariantViolation::Uncovered { spanned, capacity });
        }

        let mut prev: Option<AreaSpan> = None;
        for area in self.free_areas() {
            if let Some(prev) = prev {
                if prev.header >= area.header {
                    return Err(InvariantViolation::Unsorted {
                        first: prev.header,
                        second: area.header,
                    });
                }
                if prev.end() >= area.header {
                    return Err(InvariantViolation::Uncoalesced {
                        first: prev.header,
                        second: area.header,
                    });
                }
            }
            prev = Some(area);
        }

        Ok(())
    }

    fn check_area(&self, area: &AreaSpan) -> Result<(), InvariantViolation> {
        if area.size == 0 {
            return Err(InvariantViolation::EmptyArea {
                header: area.header,
            });
        }
        if area.header % HEADER_ALIGN != 0 || area.size % HEADER_ALIGN != 0 {
            return Err(InvariantViolation::Misaligned {
                header: area.header,
                size: area.size,
            });
        }
        if area.header < self.base || area.end() > self.break_point {
            return Err(InvariantViolation::OutOfBounds {
                header: area.header,
                end: area.end(),
                base: self.base,
                break_point: self.break_point,
            });
        }
        Ok(())
    }
}

impl<B: BreakPointService> HeapState<B> {
    /// Query the initial break point and align it for headers.
    fn ensure_init(&mut self) -> Result<(), AllocError> {
        if self.initialized {
            return Ok(());
        }

        let current = self.service.current().map_err(AllocError::Init)?;
        let aligned = current
            .checked_next_multiple_of(HEADER_ALIGN)
            .ok_or(AllocError::Init(BreakPointError::Overflow { delta: 0 }))?;

        let base = if aligned == current {
            current
        } else {
            let padding = (aligned - current).cast_signed();
            self.service.adjust(padding).map_err(AllocError::Init)?
        };

        debug!("heap initialized at {base:#x}");
        self.base = base;
        self.break_point = base;
        self.initialized = true;
        Ok(())
    }

    /// Hand out an area of at least `size` payload bytes.
    ///
    /// The first free area large enough is reused; otherwise the break point
    /// grows by one header plus the rounded request. On error nothing has
    /// changed.
    ///
    /// # Errors
    /// [`AllocError::SizeOverflow`] for requests that cannot be represented,
    /// [`AllocError::Init`] or [`AllocError::Exhausted`] when the break point
    /// service refuses.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = round_request(size)?;
        self.ensure_init()?;

        let area = match self.take_free(size) {
            Some(area) => area,
            None => self.grow(size)?,
        };

        area.set_state(AreaState::Used);
        unsafe { self.used.insert_head(area.header()) };
        Ok(area.payload())
    }

    /// Unlink the first free area with room for `size` bytes, splitting off
    /// the tail when it is big enough to be useful on its own.
    fn take_free(&mut self, size: usize) -> Option<Area> {
        let node = self
            .free
            .iter()
            .find(|&node| unsafe { Area::from_header(node) }.size() >= size)?;
        let area = unsafe { Area::from_header(node) };

        let remainder = area.size() - size;
        if remainder >= HEADER_SIZE.saturating_add(self.config.min_split_payload()) {
            // The tail takes over the split area's position in the free list.
            let tail = unsafe {
                Area::materialize(
                    area.payload().as_ptr().addr() + size,
                    remainder - HEADER_SIZE,
                )
            };
            tail.set_state(AreaState::Free);
            area.set_size(size);
            unsafe { self.free.insert_after(node, tail.header()) };
            trace!(
                "split area {:#x}: {size} bytes used, {} bytes left at {:#x}",
                area.addr(),
                tail.size(),
                tail.addr()
            );
        }

        unsafe { self.free.remove(node) };
        area.detach();
        Some(area)
    }

    /// Materialize a fresh area at the current break point.
    fn grow(&mut self, size: usize) -> Result<Area, AllocError> {
        let span = HEADER_SIZE + size;
        let delta = isize::try_from(span).map_err(|_| AllocError::SizeOverflow(size))?;

        let old = self.break_point;
        self.move_break_point(delta).inspect_err(|err| {
            warn!("cannot grow heap by {span} bytes: {err}");
        })?;
        Ok(unsafe { Area::materialize(old, size) })
    }

    /// Move the break point by `delta` and require the service to land where
    /// the cached break point says it must. On error the cached break point
    /// is unchanged.
    fn move_break_point(&mut self, delta: isize) -> Result<(), BreakPointError> {
        let old = self.break_point;
        let expected = old
            .checked_add_signed(delta)
            .ok_or(BreakPointError::Overflow { delta })?;

        let reported = self.service.adjust(delta)?;
        if reported != expected {
            // Undo the move so the kernel and the lists agree again.
            if let Err(err) = self.service.adjust(delta.saturating_neg()) {
                warn!("cannot undo break point move by {delta} bytes: {err}");
            }
            return Err(BreakPointError::Mismatch { expected, reported });
        }

        trace!("break point {old:#x} -> {reported:#x}");
        self.break_point = reported;
        Ok(())
    }

    /// Return an area obtained from [`allocate`](Self::allocate).
    ///
    /// The area either goes back to the kernel (when it is the top-most one)
    /// or onto the free list, merging with adjacent free areas.
    ///
    /// # Safety
    /// `payload` must have been returned by `allocate` on this heap and not
    /// been released since.
    pub unsafe fn release(&mut self, payload: NonNull<u8>) {
        let area = unsafe { Area::from_payload(payload) };
        unsafe { self.used.remove(area.header()) };
        area.detach();

        if area.end() == self.break_point {
            match self.shrink(area) {
                Ok(()) => {
                    if self.config.shrink_policy() == ShrinkPolicy::Cascade {
                        self.reclaim_trailing();
                    }
                }
                Err(err) => {
                    warn!("keeping top area {:#x} on the free list: {err}", area.addr());
                    self.insert_free(area);
                }
            }
            return;
        }

        self.insert_free(area);
        // A merge may have grown a free area that a refused shrink left on top.
        if self.config.shrink_policy() == ShrinkPolicy::Cascade {
            self.reclaim_trailing();
        }
    }

    /// Give a detached top-most area back to the kernel.
    ///
    /// The header is gone once this returns `Ok`.
    fn shrink(&mut self, area: Area) -> Result<(), BreakPointError> {
        debug_assert!(area.end() == self.break_point);
        let span = area.span();
        let delta = isize::try_from(span)
            .map(|span| -span)
            .map_err(|_| BreakPointError::Overflow { delta: isize::MIN })?;
        self.move_break_point(delta)
    }

    /// Release free areas that ended up directly below the break point.
    fn reclaim_trailing(&mut self) {
        while let Some(node) = self.free.tail() {
            let area = unsafe { Area::from_header(node) };
            if area.end() != self.break_point {
                break;
            }

            let prev = unsafe { self.free.prev(Some(node)) };
            unsafe { self.free.remove(node) };
            area.detach();

            if let Err(err) = self.shrink(area) {
                warn!("keeping trailing area {:#x} on the free list: {err}", area.addr());
                area.set_state(AreaState::Free);
                match prev {
                    Some(prev) => unsafe { self.free.insert_after(prev, area.header()) },
                    None => unsafe { self.free.insert_head(area.header()) },
                }
                break;
            }
        }
    }

    /// Put a detached area onto the free list at its address position and
    /// merge it with touching neighbours: the successor is absorbed first,
    /// then the predecessor absorbs the result.
    fn insert_free(&mut self, area: Area) {
        let mut prev = None;
        let mut next = self.free.head();
        while let Some(node) = next {
            if node.as_ptr().addr() > area.addr() {
                break;
            }
            prev = Some(node);
            next = unsafe { self.free.next(Some(node)) };
        }

        if let Some(node) = next {
            let successor = unsafe { Area::from_header(node) };
            if area.end() == successor.addr() {
                trace!("merge {:#x} into {:#x}", successor.addr(), area.addr());
                area.set_size(area.size() + successor.span());
                unsafe { self.free.remove(node) };
            }
        }

        area.set_state(AreaState::Free);
        match prev {
            Some(node) => {
                let predecessor = unsafe { Area::from_header(node) };
                if predecessor.end() == area.addr() {
                    trace!("merge {:#x} into {:#x}", area.addr(), predecessor.addr());
                    predecessor.set_size(predecessor.size() + area.span());
                    return;
                }
                unsafe { self.free.insert_after(node, area.header()) };
            }
            None => unsafe { self.free.insert_head(area.header()) },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::malloc::ArenaBreakPoint;

    #[test]
    fn requests_round_to_alignment() {
        assert_eq!(round_request(0), Ok(HEADER_ALIGN));
        assert_eq!(round_request(1), Ok(HEADER_ALIGN));
        assert_eq!(round_request(HEADER_ALIGN), Ok(HEADER_ALIGN));
        assert_eq!(round_request(HEADER_ALIGN + 1), Ok(2 * HEADER_ALIGN));
    }

    #[test]
    fn unrepresentable_requests_are_rejected() {
        assert_eq!(round_request(usize::MAX), Err(AllocError::SizeOverflow(usize::MAX)));
        let too_big = isize::MAX.cast_unsigned();
        assert_eq!(round_request(too_big), Err(AllocError::SizeOverflow(too_big)));
    }

    #[test]
    fn empty_heap_holds_invariants() {
        let state = HeapState::new((), HeapConfig::DEFAULT);
        assert!(!state.is_initialized());
        assert_eq!(state.stats(), HeapStats::default());
        assert_eq!(state.check_invariants(), Ok(()));
    }

    fn arena_state() -> HeapState<ArenaBreakPoint> {
        let region = Box::leak(vec![0u8; 512].into_boxed_slice());
        HeapState::new(ArenaBreakPoint::from_static(region), HeapConfig::DEFAULT)
    }

    #[test]
    fn space_outside_every_area_is_reported() {
        let mut state = arena_state();
        let p = state.allocate(32).unwrap();
        assert_eq!(state.check_invariants(), Ok(()));
        assert_eq!(state.service().used(), state.break_point() - state.service().base());

        // Pretend the break point moved without an area covering the gap.
        state.break_point += HEADER_ALIGN;
        assert_eq!(
            state.check_invariants(),
            Err(InvariantViolation::Uncovered {
                spanned: HEADER_SIZE + 32,
                capacity: HEADER_SIZE + 32 + HEADER_ALIGN,
            })
        );

        state.break_point -= 2 * HEADER_ALIGN;
        assert!(matches!(
            state.check_invariants(),
            Err(InvariantViolation::OutOfBounds { .. })
        ));

        state.break_point += HEADER_ALIGN;
        unsafe { state.release(p) };
        assert_eq!(state.break_point(), state.base());
        assert_eq!(state.config(), &HeapConfig::DEFAULT);
    }
}
