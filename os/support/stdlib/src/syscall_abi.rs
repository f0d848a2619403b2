/// System call numbers understood by the kernel's `syscall` entry.
#[repr(u64)]
pub enum Sysno {
    /// Write a single byte to a kernel-chosen “debug” sink.
    DebugWriteByte = 1,
    /// Move the process break point by a signed delta (`rdi`); returns the new
    /// break point in `rax`.
    SetBreakPoint = 3,
}

/// `SetBreakPoint` return value when the kernel refuses to move the break
/// point.
pub const BREAK_POINT_REFUSED: u64 = u64::MAX;
