use crate::syscall_abi::Sysno;

#[inline(always)]
#[allow(clippy::inline_always)]
pub fn debug_byte(b: u8) {
    unsafe {
        core::arch::asm!(
            "syscall",
            inlateout("rax") Sysno::DebugWriteByte as u64 => _,
            in("rdi") u64::from(b),
            lateout("rcx") _, // clobbered by SYSCALL
            lateout("r11") _, // clobbered by SYSCALL
            options(nostack)
        );
    }
}

/// Move the break point by `delta` bytes.
///
/// Returns the new break point, or
/// [`BREAK_POINT_REFUSED`](crate::syscall_abi::BREAK_POINT_REFUSED).
#[inline]
#[must_use]
pub fn sys_set_break_point(delta: isize) -> u64 {
    let mut ret: u64;
    unsafe {
        core::arch::asm!(
            "syscall",
            inlateout("rax") Sysno::SetBreakPoint as u64 => ret,
            in("rdi") delta,
            lateout("rcx") _,
            lateout("r11") _,
            options(nostack)
        );
    }
    ret
}
