//! Formatted output over the debug-byte syscall.
//!
//! Nothing here allocates, so printing is safe from inside the heap's
//! critical section.

use crate::syscall::debug_byte;
use core::fmt::{self, Write};

/// [`Write`] sink that emits every byte through [`debug_byte`].
pub struct SyscallSink;

impl Write for SyscallSink {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(debug_byte);
        Ok(())
    }
}

#[doc(hidden)]
#[inline(always)]
#[allow(clippy::inline_always)]
pub fn syscall_write(args: fmt::Arguments) {
    // Best-effort debug output; the sink itself cannot fail.
    SyscallSink.write_fmt(args).ok();
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::stdlib::fmt::syscall_write(core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! println {
    ($($arg:tt)*) => {{
        $crate::stdlib::fmt::syscall_write(core::format_args!($($arg)*));
        $crate::syscall::debug_byte(b'\n');
    }};
}
