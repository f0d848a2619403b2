//! # Break point services
//!
//! The heap never maps memory itself. It asks a [`BreakPointService`] to move
//! the upper end of the process heap ("break point") up or down by a signed
//! number of bytes.
//!
//! * [`SyscallBreakPoint`] issues the `SetBreakPoint` system call; this is the
//!   service behind the process-wide heap.
//! * [`ArenaBreakPoint`] simulates the kernel over a region the caller owns,
//!   refusing to move the break point past either end of it.

use super::error::BreakPointError;
use crate::syscall::sys_set_break_point;
use crate::syscall_abi::BREAK_POINT_REFUSED;

/// Moves the heap's break point.
pub trait BreakPointService {
    /// Move the break point by `delta` bytes (negative shrinks) and return the
    /// new break point.
    ///
    /// On error the break point must be unchanged.
    ///
    /// # Errors
    /// Returns a [`BreakPointError`] if the request cannot be satisfied.
    fn adjust(&mut self, delta: isize) -> Result<usize, BreakPointError>;

    /// Current break point, i.e. [`adjust`](Self::adjust) by zero.
    ///
    /// # Errors
    /// As for [`adjust`](Self::adjust).
    fn current(&mut self) -> Result<usize, BreakPointError> {
        self.adjust(0)
    }
}

/// Break point owned by the kernel, moved through the `SetBreakPoint` syscall.
#[derive(Debug, Default, Copy, Clone)]
pub struct SyscallBreakPoint;

impl BreakPointService for SyscallBreakPoint {
    fn adjust(&mut self, delta: isize) -> Result<usize, BreakPointError> {
        let ret = sys_set_break_point(delta);
        if ret == BREAK_POINT_REFUSED {
            return Err(BreakPointError::Denied { delta });
        }
        usize::try_from(ret).map_err(|_| BreakPointError::Denied { delta })
    }
}

/// Break point over a caller-provided memory region.
///
/// The break point starts at the region's first byte and may move anywhere
/// inside `[base, limit]`.
#[derive(Debug)]
pub struct ArenaBreakPoint {
    base: usize,
    current: usize,
    limit: usize,
}

impl ArenaBreakPoint {
    /// Manage `len` bytes starting at `start`.
    ///
    /// # Safety
    /// The range must be valid for reads and writes and must not be accessed
    /// through any other path while the arena (or a heap built on it) is in
    /// use.
    #[must_use]
    pub unsafe fn from_raw_parts(start: *mut u8, len: usize) -> Self {
        let base = start.expose_provenance();
        Self {
            base,
            current: base,
            limit: base.saturating_add(len),
        }
    }

    /// Manage a region that lives for the rest of the program.
    #[must_use]
    pub fn from_static(region: &'static mut [u8]) -> Self {
        // Safety: the exclusive 'static borrow is moved into the arena.
        unsafe { Self::from_raw_parts(region.as_mut_ptr(), region.len()) }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes between the base and the break point.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.current - self.base
    }

    /// Bytes the break point can still grow by.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.limit - self.current
    }
}

impl BreakPointService for ArenaBreakPoint {
    fn adjust(&mut self, delta: isize) -> Result<usize, BreakPointError> {
        let requested = self
            .current
            .checked_add_signed(delta)
            .ok_or(BreakPointError::Overflow { delta })?;

        if requested < self.base || requested > self.limit {
            return Err(BreakPointError::OutOfRange {
                requested,
                base: self.base,
                limit: self.limit,
            });
        }

        self.current = requested;
        Ok(requested)
    }

    fn current(&mut self) -> Result<usize, BreakPointError> {
        Ok(self.current)
    }
}
