use super::area::HEADER_ALIGN;

/// What `free` does once the top-most area went back to the kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ShrinkPolicy {
    /// Shrink by exactly the released area. A free area that now ends at the
    /// lowered break point stays on the free list.
    Exact,
    /// Keep shrinking while the highest free area ends at the break point,
    /// so no reclaimable space is left directly below it.
    #[default]
    Cascade,
}

/// Tunables of a [`Heap`](super::Heap).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    min_split_payload: usize,
    shrink_policy: ShrinkPolicy,
}

impl HeapConfig {
    /// Split a free area when at least 16 payload bytes would remain, and
    /// cascade break-point shrinks.
    pub const DEFAULT: Self = Self {
        min_split_payload: 16,
        shrink_policy: ShrinkPolicy::Cascade,
    };

    /// Smallest payload a split-off remainder must be able to hold.
    ///
    /// Rounded up to the header alignment; never below one alignment unit.
    #[must_use]
    pub const fn with_min_split_payload(mut self, bytes: usize) -> Self {
        let bytes = if bytes < HEADER_ALIGN {
            HEADER_ALIGN
        } else {
            bytes
        };
        self.min_split_payload = match bytes.checked_next_multiple_of(HEADER_ALIGN) {
            Some(rounded) => rounded,
            None => usize::MAX - (usize::MAX % HEADER_ALIGN),
        };
        self
    }

    #[must_use]
    pub const fn with_shrink_policy(mut self, policy: ShrinkPolicy) -> Self {
        self.shrink_policy = policy;
        self
    }

    #[must_use]
    pub const fn min_split_payload(&self) -> usize {
        self.min_split_payload
    }

    #[must_use]
    pub const fn shrink_policy(&self) -> ShrinkPolicy {
        self.shrink_policy
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
