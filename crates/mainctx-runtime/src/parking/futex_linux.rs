//! Linux futex-based context parking
//!
//! Futex word semantics:
//! - 0 = no wakeup latched
//! - 1 = wakeup latched (the iterating thread must re-check sources)
//!
//! `park()` consumes a latched wakeup without sleeping; otherwise it
//! FUTEX_WAITs on the word while it is still 0.

use super::ContextParking;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: 0 = idle, 1 = wakeup latched
    futex: AtomicU32,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(0, Ordering::AcqRel) != 0 {
            return true;
        }

        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // FUTEX_WAIT: sleep only while the word is still 0
        // Safety: the futex word lives as long as self; all other
        // arguments are plain values or null.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }

        // ETIMEDOUT, EAGAIN and EINTR all land here; the word decides
        self.futex.swap(0, Ordering::AcqRel) != 0
    }

    fn wake(&self) {
        if self.futex.swap(1, Ordering::AcqRel) != 0 {
            return; // already latched, the sleeper is (being) woken
        }

        // Safety: see park()
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                i32::MAX,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn wake_pending(&self) -> bool {
        self.futex.load(Ordering::Acquire) != 0
    }
}
