//! Start/stop state machine of a group
//!
//! `requested` is what callers asked for, `effective` is what the last
//! completed transition produced. `(false, false)` is idle and
//! `(true, true)` is running; the mixed states mean a transition job is
//! queued on the worker context or has just finished.
//!
//! The pending hook is the source of truth for "a job has work to do".
//! Reversing a request before its job runs clears the hook, and the job
//! then finds nothing to do.

use mainctx_core::kdebug;

/// Zero-argument transition hook
pub type GroupHook = fn();

/// What a state request requires of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Already requested; nothing to schedule
    Unchanged,
    /// A transition job must be queued on the worker context
    Schedule,
    /// The queued transition was reversed before it ran
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupState {
    requested: bool,
    effective: bool,
    hook: Option<GroupHook>,
}

impl GroupState {
    pub const fn new() -> Self {
        Self { requested: false, effective: false, hook: None }
    }

    #[inline]
    pub fn requested(&self) -> bool {
        self.requested
    }

    #[inline]
    pub fn effective(&self) -> bool {
        self.effective
    }

    /// Whether requested and effective agree
    #[inline]
    pub fn is_stable(&self) -> bool {
        self.requested == self.effective
    }

    /// Record a request for `next`, with `hook` to run on the worker
    pub fn request(&mut self, next: bool, hook: GroupHook) -> Request {
        if next == self.requested {
            return Request::Unchanged;
        }

        if self.effective != self.requested {
            // only a reversal of the queued transition gets here
            debug_assert_eq!(self.effective, next);
            kdebug!("group state: transition to {} cancelled", self.requested);
            self.requested = next;
            self.hook = None;
            return Request::Cancelled;
        }

        kdebug!("group state: transition {} -> {} requested", self.effective, next);
        self.requested = next;
        self.hook = Some(hook);
        Request::Schedule
    }

    /// The hook a transition job should run now, if any
    pub fn begin(&self) -> Option<GroupHook> {
        if self.requested != self.effective {
            self.hook
        } else {
            None
        }
    }

    /// Mark the running transition complete
    pub fn finish(&mut self) {
        self.effective = self.requested;
        self.hook = None;
    }
}

impl Default for GroupState {
    fn default() -> Self {
        Self::new()
    }
}
