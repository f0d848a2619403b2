//! # Runtime synchronization primitives
//!
//! Busy-wait locking for the userland C runtime. There is no scheduler
//! integration: a contended caller spins until the holder releases.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
