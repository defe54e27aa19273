//! Event sources
//!
//! A source is dispatched on the thread iterating the context it is
//! attached to, once its ready time has passed. The ready time is a
//! monotonic timestamp in microseconds, `READY_NOW` (0) for "on the next
//! iteration" or `READY_NEVER` (-1).
//!
//! Sources are reference counted. The context keeps one reference while
//! the source is attached; `destroy()` drops it. `SourceFuncs::finalize`
//! runs when the last reference goes away, which can never overlap a
//! dispatch because the iterating thread holds its own reference for the
//! duration of the call.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use mainctx_core::constants::{READY_NEVER, READY_NOW};
use mainctx_core::{kcritical, SourceId};

use crate::context::{ContextInner, MainContext};
use crate::time;

/// Behaviour of a source
pub trait SourceFuncs: Send + Sync + 'static {
    /// Called on the context's thread once the ready time has passed.
    ///
    /// Return `false` to destroy the source.
    fn dispatch(&self, source: &Source) -> bool;

    /// Called exactly once, when the last reference to the source drops.
    fn finalize(&self) {}
}

/// Reference-counted handle to a source
#[derive(Clone)]
pub struct Source {
    inner: Arc<SourceInner>,
}

struct SourceInner {
    id: SourceId,
    name: String,
    ready_time: AtomicI64,
    destroyed: AtomicBool,
    context: OnceLock<Weak<ContextInner>>,
    funcs: Box<dyn SourceFuncs>,
}

impl Drop for SourceInner {
    fn drop(&mut self) {
        self.funcs.finalize();
    }
}

impl Source {
    /// Create an unattached source that is never ready
    pub fn new(name: impl Into<String>, funcs: impl SourceFuncs) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id: SourceId::next(),
                name: name.into(),
                ready_time: AtomicI64::new(READY_NEVER),
                destroyed: AtomicBool::new(false),
                context: OnceLock::new(),
                funcs: Box::new(funcs),
            }),
        }
    }

    /// A source that runs `f` on every iteration until it returns `false`
    pub fn idle<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let source = Self::new(name, CallbackFuncs { callback: Mutex::new(f), interval: None });
        source.set_ready_time(READY_NOW);
        source
    }

    /// A source that runs `f` every `interval` until it returns `false`
    pub fn timeout<F>(name: impl Into<String>, interval: Duration, f: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let source = Self::new(
            name,
            CallbackFuncs { callback: Mutex::new(f), interval: Some(interval) },
        );
        source.set_ready_time(time::deadline_after(interval));
        source
    }

    #[inline]
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn ready_time(&self) -> i64 {
        self.inner.ready_time.load(Ordering::Acquire)
    }

    /// Set the ready time and wake the owning context if the source may
    /// now be due earlier than before.
    pub fn set_ready_time(&self, ready_time: i64) {
        let old = self.inner.ready_time.swap(ready_time, Ordering::AcqRel);
        if old == ready_time || ready_time == READY_NEVER {
            return;
        }
        if let Some(context) = self.live_context() {
            context.wake();
        }
    }

    /// Attach to `context`. A source can be attached once.
    pub fn attach(&self, context: &MainContext) -> SourceId {
        if self.is_destroyed() {
            kcritical!("attach: source '{}' was already destroyed", self.name());
            return self.id();
        }
        if self.inner.context.set(Arc::downgrade(context.inner())).is_err() {
            kcritical!("attach: source '{}' is already attached", self.name());
            return self.id();
        }
        context.inner().add_source(self.clone());
        if self.ready_time() != READY_NEVER {
            context.inner().wake();
        }
        self.id()
    }

    /// Detach from the context. No dispatch starts after this returns.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(context) = self.live_context() {
            // the removed reference is dropped outside the context lock
            let removed = context.remove_source(self.id());
            drop(removed);
        }
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// The context this source is attached to, if it is still alive
    pub fn context(&self) -> Option<MainContext> {
        self.live_context().map(MainContext::from_inner)
    }

    /// Number of strong references (including the context's)
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(a: &Source, b: &Source) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn live_context(&self) -> Option<Arc<ContextInner>> {
        self.inner.context.get().and_then(Weak::upgrade)
    }

    /// `None` when never ready, otherwise whether due at `now`
    pub(crate) fn due(&self, now: i64) -> Option<bool> {
        match self.ready_time() {
            READY_NEVER => None,
            t => Some(t <= now),
        }
    }

    pub(crate) fn dispatch(&self) -> bool {
        self.inner.funcs.dispatch(self)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("ready_time", &self.ready_time())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct CallbackFuncs<F> {
    callback: Mutex<F>,
    interval: Option<Duration>,
}

impl<F> SourceFuncs for CallbackFuncs<F>
where
    F: FnMut() -> bool + Send + 'static,
{
    fn dispatch(&self, source: &Source) -> bool {
        let keep = {
            let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)()
        };
        if keep {
            if let Some(interval) = self.interval {
                source.set_ready_time(time::deadline_after(interval));
            }
        }
        keep
    }
}
