use stdlib::malloc::{ArenaBreakPoint, BreakPointError, BreakPointService};

fn arena(len: usize) -> ArenaBreakPoint {
    ArenaBreakPoint::from_static(Box::leak(vec![0u8; len].into_boxed_slice()))
}

#[test]
fn starts_at_the_region_base() {
    let mut arena = arena(64);
    let base = arena.base();
    assert_eq!(arena.limit(), base + 64);
    assert_eq!(arena.current(), Ok(base));
    assert_eq!(arena.adjust(0), Ok(base));
    assert_eq!(arena.used(), 0);
    assert_eq!(arena.remaining(), 64);
}

#[test]
fn grows_and_shrinks_inside_the_region() {
    let mut arena = arena(64);
    let base = arena.base();

    assert_eq!(arena.adjust(48), Ok(base + 48));
    assert_eq!(arena.adjust(16), Ok(base + 64));
    assert_eq!(arena.remaining(), 0);
    assert_eq!(arena.adjust(-40), Ok(base + 24));
    assert_eq!(arena.used(), 24);
}

#[test]
fn refuses_to_leave_the_region() {
    let mut arena = arena(64);
    let base = arena.base();
    arena.adjust(32).unwrap();

    assert_eq!(
        arena.adjust(33),
        Err(BreakPointError::OutOfRange {
            requested: base + 65,
            base,
            limit: base + 64,
        })
    );
    assert_eq!(
        arena.adjust(-33),
        Err(BreakPointError::OutOfRange {
            requested: base - 1,
            base,
            limit: base + 64,
        })
    );
    // Refusals leave the break point where it was.
    assert_eq!(arena.current(), Ok(base + 32));
}

#[test]
fn reports_address_space_overflow() {
    let mut arena = arena(16);
    let base = arena.base();

    // Heap addresses sit in the lower half, so this wraps below zero.
    assert_eq!(
        arena.adjust(isize::MIN),
        Err(BreakPointError::Overflow { delta: isize::MIN })
    );
    assert!(arena.adjust(isize::MAX).is_err());
    assert_eq!(arena.current(), Ok(base));
}

#[test]
fn errors_render_the_offending_values() {
    let err = BreakPointError::Denied { delta: -32 };
    assert_eq!(
        err.to_string(),
        "kernel refused to move the break point by -32 bytes"
    );
}
