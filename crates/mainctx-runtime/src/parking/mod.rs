//! Context wakeup mechanism
//!
//! The thread iterating a context parks here when no source is ready.
//! Any thread that makes a source ready (or queues a callback) wakes it.
//!
//! Unlike worker parking, a wakeup is never lost: it is latched until
//! the next `park()` consumes it, so a wake that races with the
//! iterating thread's "anything ready?" check still ends the park.

use std::time::Duration;

/// Platform-specific park/wake primitive owned by one context
pub trait ContextParking: Send + Sync {
    /// Park the calling thread until woken or until `timeout` elapses.
    ///
    /// Returns `true` if a wakeup was consumed, `false` on timeout or
    /// spurious return. Callers re-check their sources either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Latch a wakeup and wake the parked thread, if any.
    fn wake(&self);

    /// Whether a wakeup is latched and not yet consumed (hint)
    fn wake_pending(&self) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::CondvarParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn ContextParking> {
    Box::new(PlatformParking::new())
}
