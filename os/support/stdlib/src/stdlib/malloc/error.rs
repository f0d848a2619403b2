/// Refusal to move the break point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakPointError {
    #[error("kernel refused to move the break point by {delta} bytes")]
    Denied { delta: isize },
    #[error("break point {requested:#x} would leave the heap region [{base:#x}, {limit:#x}]")]
    OutOfRange {
        requested: usize,
        base: usize,
        limit: usize,
    },
    #[error("moving the break point by {delta} bytes overflows the address space")]
    Overflow { delta: isize },
    #[error("kernel moved the break point to {reported:#x} instead of {expected:#x}")]
    Mismatch { expected: usize, reported: usize },
}

/// Reasons an allocation request could not be served.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("heap exhausted: {0}")]
    Exhausted(#[from] BreakPointError),
    #[error("request of {0} bytes is too large")]
    SizeOverflow(usize),
    #[error("heap initialization failed: {0}")]
    Init(BreakPointError),
}

/// First broken heap invariant found by
/// [`HeapState::check_invariants`](super::HeapState::check_invariants).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("area at {header:#x} has an empty payload")]
    EmptyArea { header: usize },
    #[error("area at {header:#x} of {size} bytes is not aligned")]
    Misaligned { header: usize, size: usize },
    #[error("area at {header:#x}..{end:#x} lies outside the heap [{base:#x}, {break_point:#x})")]
    OutOfBounds {
        header: usize,
        end: usize,
        base: usize,
        break_point: usize,
    },
    #[error("free areas at {first:#x} and {second:#x} are out of address order")]
    Unsorted { first: usize, second: usize },
    #[error("free areas at {first:#x} and {second:#x} are adjacent but were not coalesced")]
    Uncoalesced { first: usize, second: usize },
    #[error("areas span {spanned} bytes but the heap only holds {capacity}")]
    Overcommitted { spanned: usize, capacity: usize },
    #[error("areas span {spanned} bytes but the heap holds {capacity}; the rest is unaccounted for")]
    Uncovered { spanned: usize, capacity: usize },
}
