//! Monotonic clock in microseconds
//!
//! Source ready times are expressed on this clock.

use std::time::Duration;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use nix::time::{clock_gettime, ClockId};

        /// Microseconds on the monotonic clock
        pub fn monotonic_time() -> i64 {
            match clock_gettime(ClockId::CLOCK_MONOTONIC) {
                Ok(ts) => ts.tv_sec() as i64 * 1_000_000 + ts.tv_nsec() as i64 / 1_000,
                Err(_) => fallback_monotonic_time(),
            }
        }
    } else {
        /// Microseconds on the monotonic clock
        pub fn monotonic_time() -> i64 {
            fallback_monotonic_time()
        }
    }
}

fn fallback_monotonic_time() -> i64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    // Offset by one second so a real reading is never READY_NOW (0)
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as i64 + 1_000_000
}

/// Ready time `delay` from now
pub fn deadline_after(delay: Duration) -> i64 {
    monotonic_time().saturating_add(delay.as_micros().min(i64::MAX as u128) as i64)
}

/// Time left until `ready_time`, zero if already due
pub fn until(ready_time: i64) -> Duration {
    let now = monotonic_time();
    if ready_time <= now {
        Duration::ZERO
    } else {
        Duration::from_micros((ready_time - now) as u64)
    }
}
