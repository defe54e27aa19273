//! Main contexts
//!
//! A `MainContext` is a set of attached sources plus a queue of one-shot
//! callbacks, iterated by whichever thread owns it. Only the owner may
//! iterate; ownership is taken with `acquire()` (re-entrant on the same
//! thread) or implicitly for the duration of `iteration()`.
//!
//! One iteration:
//!
//! 1. Run every queued `invoke()` callback.
//! 2. Collect the sources whose ready time has passed, at most
//!    `max_dispatch` of them, in attach order.
//! 3. Dispatch them outside the context lock. A source destroyed after
//!    collection is skipped; a dispatch returning `false` destroys it.
//! 4. If nothing ran and the caller may block, park until the earliest
//!    ready time, a wakeup, or the park timeout, then start over.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use mainctx_core::{kcritical, ktrace, ContextId, SourceId};

use crate::config;
use crate::parking::{new_parking, ContextParking};
use crate::source::Source;
use crate::time;
use crate::tls;

type Invoke = Box<dyn FnOnce() + Send + 'static>;

/// Reference-counted handle to an event loop context
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    /// Attached sources, attach order
    sources: Mutex<Vec<Source>>,
    invokes: SegQueue<Invoke>,
    parking: Box<dyn ContextParking>,
    owner: Mutex<Owner>,
}

#[derive(Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

impl ContextInner {
    fn lock_sources(&self) -> MutexGuard<'_, Vec<Source>> {
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_source(&self, source: Source) {
        self.lock_sources().push(source);
    }

    pub(crate) fn remove_source(&self, id: SourceId) -> Option<Source> {
        let mut sources = self.lock_sources();
        let pos = sources.iter().position(|s| s.id() == id)?;
        Some(sources.remove(pos))
    }

    #[inline]
    pub(crate) fn wake(&self) {
        self.parking.wake();
    }
}

impl MainContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                sources: Mutex::new(Vec::new()),
                invokes: SegQueue::new(),
                parking: new_parking(),
                owner: Mutex::new(Owner::default()),
            }),
        }
    }

    /// The process-wide default context
    pub fn default_context() -> &'static MainContext {
        static DEFAULT: OnceLock<MainContext> = OnceLock::new();
        DEFAULT.get_or_init(MainContext::new)
    }

    /// The calling thread's default context, if one was pushed
    pub fn thread_default() -> Option<MainContext> {
        tls::thread_default()
    }

    /// The calling thread's default context, falling back to the global one
    pub fn ref_thread_default() -> MainContext {
        tls::ref_thread_default()
    }

    /// Make this the calling thread's default context until the matching pop
    pub fn push_thread_default(&self) {
        tls::push_thread_default(self);
    }

    pub fn pop_thread_default(&self) {
        tls::pop_thread_default(self);
    }

    pub(crate) fn inner(&self) -> &Arc<ContextInner> {
        &self.inner
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    /// Identity of this context, stable for its lifetime
    #[inline]
    pub fn id(&self) -> ContextId {
        ContextId::from_ptr(Arc::as_ptr(&self.inner))
    }

    #[inline]
    pub fn ptr_eq(a: &MainContext, b: &MainContext) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn is_default(&self) -> bool {
        Self::ptr_eq(self, Self::default_context())
    }

    fn lock_owner(&self) -> MutexGuard<'_, Owner> {
        self.inner.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to become the owner. Re-entrant on the owning thread.
    pub fn acquire(&self) -> bool {
        let me = thread::current().id();
        let mut owner = self.lock_owner();
        match owner.thread {
            None => {
                owner.thread = Some(me);
                owner.depth = 1;
                true
            }
            Some(t) if t == me => {
                owner.depth += 1;
                true
            }
            Some(_) => false,
        }
    }

    pub fn release(&self) {
        let me = thread::current().id();
        let mut owner = self.lock_owner();
        if owner.thread != Some(me) {
            drop(owner);
            kcritical!("release: context {:?} is not owned by this thread", self.id());
            return;
        }
        owner.depth -= 1;
        if owner.depth == 0 {
            owner.thread = None;
        }
    }

    pub fn is_owner(&self) -> bool {
        self.lock_owner().thread == Some(thread::current().id())
    }

    /// Whether a callback is queued or a source is due
    pub fn pending(&self) -> bool {
        if !self.inner.invokes.is_empty() {
            return true;
        }
        let now = time::monotonic_time();
        self.inner.lock_sources().iter().any(|s| s.due(now) == Some(true))
    }

    /// Wake the thread iterating this context
    pub fn wakeup(&self) {
        self.inner.wake();
    }

    /// Run `f` on the thread iterating this context.
    ///
    /// The callback is always queued, never run inline, even when the
    /// caller owns the context.
    pub fn invoke<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.invokes.push(Box::new(f));
        self.inner.wake();
    }

    /// Add a source running `f` every iteration until it returns `false`
    pub fn idle_add<F>(&self, f: F) -> SourceId
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Source::idle("idle", f).attach(self)
    }

    /// Add a source running `f` every `interval` until it returns `false`
    pub fn timeout_add<F>(&self, interval: Duration, f: F) -> SourceId
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Source::timeout("timeout", interval, f).attach(self)
    }

    /// Look up an attached source
    pub fn find_source(&self, id: SourceId) -> Option<Source> {
        self.inner.lock_sources().iter().find(|s| s.id() == id).cloned()
    }

    /// Number of attached sources
    pub fn n_sources(&self) -> usize {
        self.inner.lock_sources().len()
    }

    /// Run one iteration. Returns `true` if anything was dispatched.
    ///
    /// Returns `false` immediately when another thread owns the context.
    pub fn iteration(&self, may_block: bool) -> bool {
        if !self.acquire() {
            ktrace!("iteration: context {:?} is owned by another thread", self.id());
            return false;
        }
        let dispatched = self.iterate(may_block);
        self.release();
        dispatched
    }

    fn iterate(&self, may_block: bool) -> bool {
        let config = config::global();
        loop {
            let mut dispatched = self.run_invokes();

            let (ready, next_deadline) = self.collect_ready(config.max_dispatch);
            for source in ready {
                if source.is_destroyed() {
                    continue;
                }
                ktrace!("dispatch source '{}' ({:?})", source.name(), source.id());
                if !source.dispatch() {
                    source.destroy();
                }
                dispatched = true;
            }

            if dispatched || !may_block {
                return dispatched;
            }

            let timeout = match next_deadline {
                Some(deadline) => time::until(deadline).min(config.park_timeout),
                None => config.park_timeout,
            };
            self.inner.parking.park(Some(timeout));
        }
    }

    fn run_invokes(&self) -> bool {
        let mut ran = false;
        while let Some(f) = self.inner.invokes.pop() {
            f();
            ran = true;
        }
        ran
    }

    /// Due sources (cloned) plus the earliest future ready time
    fn collect_ready(&self, max: usize) -> (Vec<Source>, Option<i64>) {
        let now = time::monotonic_time();
        let sources = self.inner.lock_sources();
        let mut ready = Vec::new();
        let mut next: Option<i64> = None;
        for source in sources.iter() {
            match source.due(now) {
                Some(true) if ready.len() < max => ready.push(source.clone()),
                Some(true) => next = Some(now),
                Some(false) => {
                    let t = source.ready_time();
                    next = Some(next.map_or(t, |n| n.min(t)));
                }
                None => {}
            }
        }
        (ready, next)
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for MainContext {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for MainContext {}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("id", &self.id())
            .field("n_sources", &self.n_sources())
            .finish()
    }
}
