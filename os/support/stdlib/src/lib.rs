//! # Userland runtime support
//!
//! The pieces of a C-style runtime that userland programs link against:
//!
//! * [`syscall_abi`]: system call numbers shared with the kernel.
//! * [`syscall`]: raw `syscall` wrappers.
//! * [`fmt`]: `print!`/`println!` over the debug-byte syscall.
//! * [`logger`]: a `log` backend on the same sink.
//! * [`malloc`]: the break-point heap behind `malloc`, `calloc` and `free`.
//!
//! ## Features
//!
//! * `userland` (default): everything a program needs.
//! * `kernel`: only the syscall ABI, for the kernel side of the interface.
//! * `panic-handler`: install a spinning `#[panic_handler]` for `no_std`
//!   binaries.
//! * `c-abi`: export `malloc`, `calloc` and `free` under their C names.
//! * `global-allocator`: route Rust's `alloc` through the process heap.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![cfg_attr(not(feature = "syscall"), forbid(unsafe_code))]
#![cfg_attr(feature = "syscall", allow(unsafe_code))]

#[cfg(feature = "stdlib")]
#[macro_use]
pub mod stdlib;

#[cfg(feature = "syscall")]
pub mod syscall;

#[cfg(feature = "syscall-abi")]
pub mod syscall_abi;

#[cfg(feature = "stdlib")]
pub use stdlib::*;

#[cfg(feature = "panic-handler")]
mod panic {
    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        crate::println!("panic: {info}");
        loop {
            core::hint::spin_loop();
        }
    }
}
