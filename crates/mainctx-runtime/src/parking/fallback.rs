//! Fallback context parking using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::ContextParking;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Condvar-based parking
pub struct CondvarParking {
    /// true = wakeup latched
    latched: Mutex<bool>,
    condvar: Condvar,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            latched: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextParking for CondvarParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.latched.lock().unwrap_or_else(PoisonError::into_inner);

        if !*guard {
            guard = match timeout {
                Some(t) => {
                    self.condvar
                        .wait_timeout(guard, t)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
            };
        }

        std::mem::replace(&mut *guard, false)
    }

    fn wake(&self) {
        {
            let mut guard = self.latched.lock().unwrap_or_else(PoisonError::into_inner);
            *guard = true;
        }
        self.condvar.notify_all();
    }

    fn wake_pending(&self) -> bool {
        *self.latched.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
