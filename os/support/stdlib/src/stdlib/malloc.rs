//! # Break-point heap
//!
//! `malloc`/`free` for userland programs. The heap is a single region that
//! starts at the process break point and grows or shrinks only through a
//! [`BreakPointService`]:
//!
//! ```text
//!  base                                                      break point
//!   │                                                             │
//!   ▼                                                             ▼
//!   ┌────┬────────┬────┬──────┬────┬────────────┬────┬───────────┐
//!   │ hdr│  used  │ hdr│ free │ hdr│    used    │ hdr│   used    │
//!   └────┴────────┴────┴──────┴────┴────────────┴────┴───────────┘
//! ```
//!
//! ## Design outline
//! - **Areas**: every block starts with an [`AreaHeader`]; `malloc` returns
//!   the address right behind it.
//! - **Two lists**: handed-out areas sit on the used list, reusable areas on
//!   the free list, which is kept in address order.
//! - **Allocation**: first fit over the free list. An area that is much
//!   larger than the request is split; the tail stays free. If nothing fits,
//!   the break point grows by exactly one header plus the request.
//! - **Deallocation**: the top-most area goes straight back to the kernel;
//!   any other area is inserted into the free list and merged with touching
//!   neighbours right away.
//! - **Synchronization**: one [`SpinLock`] around the whole [`HeapState`],
//!   including the break point calls.
//!
//! ## Caveats
//! - Not reentrant. Calling `malloc`/`free` while the heap lock is held (for
//!   example from a signal handler that interrupted `malloc`) deadlocks.
//! - Pointers passed to `free` are trusted. Foreign pointers and double frees
//!   corrupt the heap.
//! - Alignment is that of [`AreaHeader`] ([`HEADER_ALIGN`]), nothing more.

#![allow(unsafe_code)]

mod area;
mod break_point;
mod config;
mod error;
mod heap;

pub use area::{AreaHeader, AreaSpan, AreaState, HEADER_ALIGN, HEADER_SIZE};
pub use break_point::{ArenaBreakPoint, BreakPointService, SyscallBreakPoint};
pub use config::{HeapConfig, ShrinkPolicy};
pub use error::{AllocError, BreakPointError, InvariantViolation};
pub use heap::{HeapState, HeapStats};

use core::alloc::{GlobalAlloc, Layout};
use core::ffi::c_void;
use core::ptr::{self, NonNull};
use log::warn;
use runtime_sync::SpinLock;

/// A heap guarded by its lock.
pub struct Heap<B> {
    state: SpinLock<HeapState<B>>,
}

impl<B> Heap<B> {
    #[must_use]
    pub const fn new(service: B, config: HeapConfig) -> Self {
        Self {
            state: SpinLock::new(HeapState::new(service, config)),
        }
    }

    /// Run `f` on the state while holding the lock.
    ///
    /// `f` must not call back into this heap.
    pub fn inspect<R>(&self, f: impl FnOnce(&HeapState<B>) -> R) -> R {
        let state = self.state.lock();
        f(&*state)
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.inspect(HeapState::stats)
    }

    /// Whether some caller is inside the heap right now.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.is_locked()
    }
}

impl<B: BreakPointService> Heap<B> {
    /// Allocate `size` bytes.
    ///
    /// # Errors
    /// See [`HeapState::allocate`].
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.state.with_lock(|state| state.allocate(size))
    }

    /// Allocate `size` bytes; `None` when the heap cannot grow.
    #[must_use]
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.try_allocate(size)
            .inspect_err(|err| warn!("malloc({size}) failed: {err}"))
            .ok()
    }

    /// Allocate `count * size` zeroed bytes; `None` on overflow or exhaustion.
    #[must_use]
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let Some(bytes) = count.checked_mul(size) else {
            warn!("calloc({count}, {size}) overflows");
            return None;
        };
        let p = self.allocate(bytes)?;
        // Reused areas carry stale data.
        unsafe { ptr::write_bytes(p.as_ptr(), 0, bytes) };
        Some(p)
    }

    /// Return memory obtained from [`allocate`](Self::allocate). Null is
    /// ignored without touching the lock.
    ///
    /// # Safety
    /// A non-null `ptr` must come from this heap and must not have been
    /// released already.
    pub unsafe fn release(&self, ptr: *mut u8) {
        let Some(payload) = NonNull::new(ptr) else {
            return;
        };
        self.state
            .with_lock(|state| unsafe { state.release(payload) });
    }
}

/// The heap of this process, grown through the `SetBreakPoint` syscall.
static PROCESS_HEAP: Heap<SyscallBreakPoint> =
    Heap::new(SyscallBreakPoint, HeapConfig::DEFAULT);

/// Access point for the process-wide heap.
#[inline]
#[must_use]
pub fn process_heap() -> &'static Heap<SyscallBreakPoint> {
    &PROCESS_HEAP
}

/// C `malloc`: at least `size` bytes, or null.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub extern "C" fn malloc(size: usize) -> *mut c_void {
    process_heap()
        .allocate(size)
        .map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

/// C `calloc`: zeroed `count * size` bytes, or null.
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
    process_heap()
        .allocate_zeroed(count, size)
        .map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

/// C `free`.
///
/// # Safety
/// `ptr` must be null or a live pointer returned by [`malloc`]/[`calloc`].
#[cfg_attr(feature = "c-abi", unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { process_heap().release(ptr.cast()) }
}

/// [`GlobalAlloc`] on top of a [`Heap`].
///
/// Layouts stricter than [`HEADER_ALIGN`] cannot be served and yield null.
pub struct HeapAlloc<B: 'static> {
    heap: &'static Heap<B>,
}

impl<B: 'static> HeapAlloc<B> {
    #[must_use]
    pub const fn new(heap: &'static Heap<B>) -> Self {
        Self { heap }
    }
}

unsafe impl<B: BreakPointService + 'static> GlobalAlloc for HeapAlloc<B> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEADER_ALIGN {
            return ptr::null_mut();
        }
        self.heap.allocate(layout.size()).map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.heap.release(ptr) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEADER_ALIGN {
            return ptr::null_mut();
        }
        self.heap
            .allocate_zeroed(1, layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

/// Routes Rust allocations of the program through the process heap.
#[cfg(feature = "global-allocator")]
#[global_allocator]
static GLOBAL_ALLOCATOR: HeapAlloc<SyscallBreakPoint> = HeapAlloc::new(&PROCESS_HEAP);
