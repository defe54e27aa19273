//! Context-specific group
//!
//! A process-wide registry that hands out one instance of a service type
//! per main context and fans broadcasts out to every registered context.
//! Broadcasts are delivered on each context's own thread, so handlers
//! never run on the publisher's thread.
//!
//! The group also drives a start/stop pair of hooks: the start hook runs
//! on the worker context before the first `get` returns, the stop hook
//! runs there after the last instance is removed.
//!
//! # Usage
//!
//! ```ignore
//! static MONITORS: ContextSpecificGroup = ContextSpecificGroup::new();
//!
//! let tag = ObjectType::builder("AppInfoMonitor")
//!     .signal("changed")
//!     .finalize(|core| MONITORS.remove(core.context(), core.id(), Some(stop_watching)))
//!     .register()?;
//!
//! // on any thread, delivered to that thread's default context
//! let monitor = MONITORS.get(tag, Some(start_watching))?;
//!
//! // from the watcher
//! MONITORS.emit(changed);
//! ```
//!
//! # Locking
//!
//! The group mutex guards the table, the state and the retired list.
//! Each source's queue mutex nests strictly inside it. Transition hooks
//! run on the worker context with the group mutex held.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mainctx_core::{kcritical, kdebug, kerror, ktrace, ContextId, CoreResult, ObjectId, SignalId, TypeTag};
use mainctx_runtime::{worker_context, MainContext, Object};

use crate::source::ContextSource;
use crate::state::{GroupHook, GroupState, Request};

struct GroupInner {
    /// Allocated on first `get`
    table: Option<HashMap<ContextId, ContextSource>>,
    state: GroupState,
    /// Instances whose entry was replaced while they were finalizing, at
    /// most one per context. Evicted when that context's entry is
    /// replaced again or removed.
    retired: Vec<(ContextId, ObjectId)>,
}

pub struct ContextSpecificGroup {
    inner: Mutex<GroupInner>,
    cond: Condvar,
}

impl ContextSpecificGroup {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(GroupInner {
                table: None,
                state: GroupState::new(),
                retired: Vec::new(),
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GroupInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instance of `type_tag` for the calling thread's default context.
    ///
    /// The first call for a context constructs the instance, records the
    /// context in its slot and attaches a delivery source to the context.
    /// Later calls return a new reference to the same instance.
    ///
    /// With a `start_fn`, returns only once the group is running.
    pub fn get(&'static self, type_tag: TypeTag, start_fn: Option<GroupHook>) -> CoreResult<Object> {
        let context = MainContext::ref_thread_default();
        let mut inner = self.lock();

        let instance = self.lookup_or_insert(&mut inner, type_tag, &context)?;

        if let Some(start_fn) = start_fn {
            inner = self.request_state(inner, true, start_fn);
        }
        drop(inner);
        Ok(instance)
    }

    fn lookup_or_insert(
        &self,
        inner: &mut GroupInner,
        type_tag: TypeTag,
        context: &MainContext,
    ) -> CoreResult<Object> {
        let key = context.id();
        let table = inner.table.get_or_insert_with(HashMap::new);

        if let Some(entry) = table.get(&key) {
            if let Some(instance) = entry.instance() {
                return Ok(instance);
            }
            // last ref dropped elsewhere, remove() not yet run
            if let Some(dead) = table.remove(&key) {
                kdebug!("group: replacing finalizing instance {} for {:?}", dead.instance_id(), key);
                inner.retired.retain(|(context, _)| *context != key);
                inner.retired.push((key, dead.instance_id()));
                dead.destroy();
            }
        }

        inner.table.get_or_insert_with(HashMap::new).try_reserve(1)?;

        let instance = Object::new(type_tag)?;
        instance.set_context(context.clone());
        let source = ContextSource::new(&instance, context);
        kdebug!("group: new instance {} of {} for {:?}", instance.id(), instance.type_name(), key);

        inner.table.get_or_insert_with(HashMap::new).insert(key, source);
        Ok(instance)
    }

    /// Unregister `instance`, normally from its type's finalize hook.
    ///
    /// `context` is the instance's context slot. A missing context means
    /// the instance was not constructed by `get`; that is reported and
    /// ignored. Removing an instance that is not the one registered for
    /// `context` is a contract violation: reported, then a panic in debug
    /// builds and a no-op otherwise. With a `stop_fn`, removing the last
    /// instance queues the stop transition without waiting for it.
    pub fn remove(&'static self, context: Option<&MainContext>, instance: ObjectId, stop_fn: Option<GroupHook>) {
        let Some(context) = context else {
            kcritical!("group: remove of instance {} without a context, not created by get()?", instance);
            return;
        };

        let key = context.id();
        let mut inner = self.lock();
        if let Some(pos) = inner.retired.iter().position(|retired| *retired == (key, instance)) {
            inner.retired.swap_remove(pos);
            return;
        }

        let Some(table) = inner.table.as_mut() else {
            drop(inner);
            contract_violation(format_args!("remove of instance {} before any get()", instance));
            return;
        };
        let registered = table.get(&key).map(ContextSource::instance_id);
        let source = match registered {
            Some(id) if id == instance => table.remove(&key),
            Some(other) => {
                drop(inner);
                contract_violation(format_args!(
                    "remove of instance {} but {:?} maps to instance {}",
                    instance, key, other
                ));
                return;
            }
            None => {
                drop(inner);
                contract_violation(format_args!("remove of instance {} for unregistered {:?}", instance, key));
                return;
            }
        };
        let Some(source) = source else {
            return;
        };

        let now_empty = table.is_empty();
        inner.retired.retain(|(context, _)| *context != key);
        if let (Some(stop_fn), true) = (stop_fn, now_empty) {
            inner = self.request_state(inner, false, stop_fn);
        }
        drop(inner);

        kdebug!("group: removed instance {} for {:?}", instance, key);
        source.destroy();
    }

    /// Queue `signal` on every registered instance
    pub fn emit(&self, signal: SignalId) {
        let inner = self.lock();
        let Some(table) = inner.table.as_ref() else {
            ktrace!("group: emit {} before any get()", signal);
            return;
        };
        for source in table.values() {
            source.arm(signal);
        }
    }

    fn request_state<'a>(
        &'static self,
        mut inner: MutexGuard<'a, GroupInner>,
        requested: bool,
        hook: GroupHook,
    ) -> MutexGuard<'a, GroupInner> {
        if inner.state.request(requested, hook) == Request::Schedule {
            worker_context().invoke(move || self.change_state());
        }

        if requested {
            while !inner.state.is_stable() {
                inner = self.cond.wait(inner).unwrap_or_else(PoisonError::into_inner);
            }
        }
        inner
    }

    /// Transition job, runs on the worker context
    fn change_state(&self) {
        let mut inner = self.lock();
        let Some(hook) = inner.state.begin() else {
            ktrace!("group: transition job found nothing to do");
            return;
        };

        let target = inner.state.requested();
        kdebug!("group: running {} hook", if target { "start" } else { "stop" });
        if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
            kerror!("group: {} hook panicked", if target { "start" } else { "stop" });
            std::process::abort();
        }

        inner.state.finish();
        self.cond.notify_all();
    }

    /// Whether the service has been asked to run
    pub fn is_running(&self) -> bool {
        self.lock().state.requested()
    }

    /// State produced by the last completed transition
    pub fn effective_state(&self) -> bool {
        self.lock().state.effective()
    }

    /// Wait until the effective state equals `state`.
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_state(&self, state: bool, timeout: Duration) -> bool {
        let inner = self.lock();
        let (inner, _) = self
            .cond
            .wait_timeout_while(inner, timeout, |inner| inner.state.effective() != state)
            .unwrap_or_else(PoisonError::into_inner);
        inner.state.effective() == state
    }

    /// Number of registered contexts
    pub fn len(&self) -> usize {
        self.lock().table.as_ref().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `context` has a registered instance
    pub fn contains(&self, context: &MainContext) -> bool {
        self.lock()
            .table
            .as_ref()
            .is_some_and(|table| table.contains_key(&context.id()))
    }

    #[cfg(test)]
    fn n_retired(&self) -> usize {
        self.lock().retired.len()
    }
}

/// Report a caller's contract violation; fatal in debug builds
fn contract_violation(args: std::fmt::Arguments<'_>) {
    kcritical!("group: {}", args);
    if cfg!(debug_assertions) {
        panic!("group: {}", args);
    }
}

impl Default for ContextSpecificGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mainctx_core::kprint::critical_count;
    use mainctx_runtime::object::registry::registry;
    use mainctx_runtime::ObjectType;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier, OnceLock};
    use std::thread;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(10);

    /// Per-test service: its own group, type and hook counters
    macro_rules! service {
        ($module:ident, $type_name:literal) => {
            service!($module, $type_name, true);
        };
        // the type's finalize does not remove; the test does it by hand
        ($module:ident, $type_name:literal, manual) => {
            service!($module, $type_name, false);
        };
        ($module:ident, $type_name:literal, $auto_remove:expr) => {
            #[allow(dead_code)]
            mod $module {
                use super::*;

                pub static GROUP: ContextSpecificGroup = ContextSpecificGroup::new();
                pub static STARTS: AtomicUsize = AtomicUsize::new(0);
                pub static STOPS: AtomicUsize = AtomicUsize::new(0);

                pub fn start() {
                    STARTS.fetch_add(1, Ordering::SeqCst);
                }

                pub fn stop() {
                    STOPS.fetch_add(1, Ordering::SeqCst);
                }

                pub fn tag() -> TypeTag {
                    static TAG: OnceLock<TypeTag> = OnceLock::new();
                    *TAG.get_or_init(|| {
                        let builder = ObjectType::builder($type_name).signal("changed");
                        let builder = if $auto_remove {
                            builder.finalize(|core| GROUP.remove(core.context(), core.id(), Some(stop)))
                        } else {
                            builder
                        };
                        builder.register().unwrap()
                    })
                }

                pub fn changed() -> SignalId {
                    registry().signal_lookup("changed", tag()).unwrap()
                }

                pub fn get() -> Object {
                    GROUP.get(tag(), Some(start)).unwrap()
                }
            }
        };
    }

    service!(identity, "GroupTestIdentity");
    service!(regets, "GroupTestRegets");
    service!(broadcast, "GroupTestBroadcast");
    service!(emit_unref, "GroupTestEmitUnref");
    service!(no_context, "GroupTestNoContext");
    service!(concurrent, "GroupTestConcurrent");
    service!(churn, "GroupTestChurn");
    service!(lazy_stop, "GroupTestLazyStop", manual);
    service!(fallback, "GroupTestFallback");
    service!(hookless, "GroupTestHookless", manual);
    service!(mismatch, "GroupTestMismatch", manual);
    service!(unregistered, "GroupTestUnregistered", manual);
    service!(orphan, "GroupTestOrphan", manual);

    #[test]
    fn test_one_instance_per_context() {
        const THREADS: usize = 10;
        let barrier = Arc::new(Barrier::new(THREADS));
        let firsts = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = barrier.clone();
                let firsts = firsts.clone();
                thread::spawn(move || {
                    let context = MainContext::new();
                    context.push_thread_default();

                    let first = identity::get();
                    assert!(identity::GROUP.effective_state());
                    assert_eq!(first.context(), Some(&context));
                    let mut refs = Vec::with_capacity(100);
                    for _ in 0..100 {
                        let again = identity::get();
                        assert_eq!(again, first);
                        refs.push(again);
                    }
                    firsts.lock().unwrap().push(first.id());

                    // everyone holds their instance here
                    barrier.wait();
                    assert_eq!(identity::GROUP.len(), THREADS);
                    barrier.wait();

                    drop(refs);
                    drop(first);
                    assert!(!identity::GROUP.contains(&context));
                    context.pop_thread_default();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut ids = firsts.lock().unwrap().clone();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), THREADS);

        assert!(identity::GROUP.is_empty());
        assert!(identity::GROUP.wait_for_state(false, WAIT));
        assert_eq!(identity::STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(identity::STOPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_get_after_release_yields_fresh_instance() {
        const THREADS: usize = 4;
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                thread::spawn(move || {
                    let context = MainContext::new();
                    context.push_thread_default();

                    let mut seen = Vec::new();
                    for _ in 0..5 {
                        let instance = regets::get();
                        assert_eq!(regets::get(), instance);
                        assert!(!seen.contains(&instance.id()));
                        seen.push(instance.id());
                        drop(instance);
                        assert!(!regets::GROUP.contains(&context));
                    }
                    context.pop_thread_default();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(regets::GROUP.is_empty());
        assert!(regets::GROUP.wait_for_state(false, WAIT));
        assert_eq!(regets::STARTS.load(Ordering::SeqCst), regets::STOPS.load(Ordering::SeqCst));
    }

    #[test]
    fn test_broadcast_converges_to_latest_value() {
        const THREADS: usize = 10;
        const TICKS: usize = 1000;
        static CURRENT: AtomicUsize = AtomicUsize::new(usize::MAX);
        static SHUTDOWN: AtomicBool = AtomicBool::new(false);

        let ready = Arc::new(Barrier::new(THREADS + 1));
        let observed: Vec<Arc<AtomicUsize>> =
            (0..THREADS).map(|_| Arc::new(AtomicUsize::new(usize::MAX))).collect();

        let handles: Vec<_> = observed
            .iter()
            .cloned()
            .map(|slot| {
                let ready = ready.clone();
                thread::spawn(move || {
                    let context = MainContext::new();
                    context.push_thread_default();

                    let monitor = broadcast::get();
                    monitor.connect(broadcast::changed(), move |_| {
                        slot.store(CURRENT.load(Ordering::SeqCst), Ordering::SeqCst);
                    });
                    ready.wait();

                    while !SHUTDOWN.load(Ordering::SeqCst) {
                        context.iteration(true);
                    }

                    drop(monitor);
                    context.pop_thread_default();
                })
            })
            .collect();

        ready.wait();
        for n in 0..TICKS {
            CURRENT.store(n, Ordering::SeqCst);
            for _ in 0..(n % 4) + 1 {
                broadcast::GROUP.emit(broadcast::changed());
            }
            let deadline = Instant::now() + WAIT;
            while observed.iter().any(|slot| slot.load(Ordering::SeqCst) != n) {
                assert!(Instant::now() < deadline, "receivers stuck before tick {}", n);
                thread::yield_now();
            }
        }

        // wake the receivers so they notice the flag
        SHUTDOWN.store(true, Ordering::SeqCst);
        broadcast::GROUP.emit(SignalId::NOTIFY);

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(broadcast::GROUP.wait_for_state(false, WAIT));
        assert_eq!(broadcast::STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(broadcast::STOPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_then_unref_emits_nothing() {
        let context = MainContext::new();
        context.push_thread_default();

        let hits = Arc::new(AtomicUsize::new(0));
        let monitor = emit_unref::get();
        let h = hits.clone();
        monitor.connect(emit_unref::changed(), move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        emit_unref::GROUP.emit(emit_unref::changed());
        drop(monitor);
        assert_eq!(context.n_sources(), 0);

        while context.iteration(false) {}
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(emit_unref::GROUP.is_empty());
        context.pop_thread_default();
    }

    #[test]
    fn test_remove_without_context_is_reported() {
        let context = MainContext::new();
        context.push_thread_default();
        let monitor = no_context::get();

        let before = critical_count();
        no_context::GROUP.remove(None, monitor.id(), Some(no_context::stop));
        assert!(critical_count() > before);
        assert_eq!(no_context::GROUP.len(), 1);
        assert!(no_context::GROUP.is_running());
        assert_eq!(no_context::STOPS.load(Ordering::SeqCst), 0);

        drop(monitor);
        context.pop_thread_default();
    }

    #[test]
    fn test_concurrent_first_get_starts_once() {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let context = MainContext::new();
                    context.push_thread_default();
                    barrier.wait();
                    let monitor = concurrent::get();
                    assert!(concurrent::GROUP.effective_state());
                    // both hold theirs before either releases
                    barrier.wait();
                    drop(monitor);
                    context.pop_thread_default();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(concurrent::GROUP.wait_for_state(false, WAIT));
        assert_eq!(concurrent::STARTS.load(Ordering::SeqCst), 1);
        assert_eq!(concurrent::STOPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_stop_symmetry_under_churn() {
        let context = MainContext::new();
        context.push_thread_default();

        for _ in 0..50 {
            let monitor = churn::get();
            assert!(churn::GROUP.effective_state());
            // stop is queued; the next get may cancel it
            drop(monitor);
        }
        assert!(churn::GROUP.wait_for_state(false, WAIT));
        assert_eq!(churn::STARTS.load(Ordering::SeqCst), churn::STOPS.load(Ordering::SeqCst));

        let held = churn::get();
        assert!(churn::GROUP.wait_for_state(true, WAIT));
        assert_eq!(churn::STARTS.load(Ordering::SeqCst), churn::STOPS.load(Ordering::SeqCst) + 1);
        drop(held);
        context.pop_thread_default();
    }

    #[test]
    fn test_remove_does_not_wait_for_stop() {
        static STOPPED: AtomicUsize = AtomicUsize::new(0);
        fn slow_stop() {
            thread::sleep(Duration::from_millis(100));
            STOPPED.fetch_add(1, Ordering::SeqCst);
        }

        let context = MainContext::new();
        context.push_thread_default();
        let monitor = lazy_stop::get();
        assert!(lazy_stop::GROUP.effective_state());

        // remove directly with the slow hook; the entry goes away at once
        lazy_stop::GROUP.remove(Some(&context), monitor.id(), Some(slow_stop));
        assert_eq!(STOPPED.load(Ordering::SeqCst), 0);
        assert!(!lazy_stop::GROUP.is_running());
        assert!(lazy_stop::GROUP.is_empty());

        assert!(lazy_stop::GROUP.wait_for_state(false, WAIT));
        assert_eq!(STOPPED.load(Ordering::SeqCst), 1);

        drop(monitor);
        context.pop_thread_default();
    }

    #[test]
    fn test_without_thread_default_uses_default_context() {
        thread::spawn(|| {
            let monitor = fallback::get();
            assert_eq!(monitor.context(), Some(MainContext::default_context()));
            assert!(fallback::GROUP.contains(MainContext::default_context()));
        })
        .join()
        .unwrap();
        assert!(fallback::GROUP.is_empty());
        assert!(fallback::GROUP.wait_for_state(false, WAIT));
    }

    #[test]
    fn test_hookless_get_leaves_state_alone() {
        let context = MainContext::new();
        context.push_thread_default();

        let monitor = hookless::GROUP.get(hookless::tag(), None).unwrap();
        assert!(!hookless::GROUP.is_running());
        assert_eq!(hookless::GROUP.len(), 1);

        hookless::GROUP.emit(hookless::changed());
        assert!(context.pending());
        assert!(context.iteration(false));

        hookless::GROUP.remove(Some(&context), monitor.id(), None);
        assert!(hookless::GROUP.is_empty());
        assert!(!hookless::GROUP.effective_state());
        assert_eq!(hookless::STARTS.load(Ordering::SeqCst), 0);

        drop(monitor);
        context.pop_thread_default();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "maps to instance")]
    fn test_remove_of_other_instance_panics_in_debug() {
        let context = MainContext::new();
        context.push_thread_default();
        let registered = mismatch::GROUP.get(mismatch::tag(), None).unwrap();
        let other = Object::new(mismatch::tag()).unwrap();
        assert_ne!(registered.id(), other.id());

        mismatch::GROUP.remove(Some(&context), other.id(), None);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "for unregistered")]
    fn test_remove_for_unregistered_context_panics_in_debug() {
        let registered_on = MainContext::new();
        registered_on.push_thread_default();
        let registered = unregistered::GROUP.get(unregistered::tag(), None).unwrap();
        registered_on.pop_thread_default();

        let elsewhere = MainContext::new();
        unregistered::GROUP.remove(Some(&elsewhere), registered.id(), None);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_mismatched_remove_is_reported_noop() {
        let context = MainContext::new();
        context.push_thread_default();
        let registered = mismatch::GROUP.get(mismatch::tag(), None).unwrap();
        let other = Object::new(mismatch::tag()).unwrap();

        let before = critical_count();
        mismatch::GROUP.remove(Some(&context), other.id(), None);
        mismatch::GROUP.remove(Some(&MainContext::new()), registered.id(), None);
        assert!(critical_count() >= before + 2);
        assert!(mismatch::GROUP.contains(&context));

        mismatch::GROUP.remove(Some(&context), registered.id(), None);
        assert!(mismatch::GROUP.is_empty());
        context.pop_thread_default();
    }

    #[test]
    fn test_retired_ids_do_not_accumulate() {
        let context = MainContext::new();
        context.push_thread_default();

        // finalize never removes, so every get after a drop replaces a dead entry
        let first = orphan::GROUP.get(orphan::tag(), None).unwrap();
        drop(first);
        for _ in 0..10 {
            let next = orphan::GROUP.get(orphan::tag(), None).unwrap();
            assert_eq!(orphan::GROUP.n_retired(), 1);
            assert_eq!(context.n_sources(), 1);
            drop(next);
        }

        let last = orphan::GROUP.get(orphan::tag(), None).unwrap();
        orphan::GROUP.remove(Some(&context), last.id(), None);
        assert_eq!(orphan::GROUP.n_retired(), 0);
        assert!(orphan::GROUP.is_empty());
        assert_eq!(context.n_sources(), 0);
        context.pop_thread_default();
    }

    #[test]
    fn test_emit_before_first_get_is_noop() {
        static UNUSED: ContextSpecificGroup = ContextSpecificGroup::new();
        UNUSED.emit(SignalId::NOTIFY);
        assert!(UNUSED.is_empty());
        assert!(!UNUSED.is_running());
    }

    mod replaced {
        use super::*;

        pub static GROUP: ContextSpecificGroup = ContextSpecificGroup::new();
        pub static ENTERED: AtomicBool = AtomicBool::new(false);
        pub static RELEASE: AtomicBool = AtomicBool::new(false);

        pub fn tag() -> TypeTag {
            static TAG: OnceLock<TypeTag> = OnceLock::new();
            *TAG.get_or_init(|| {
                ObjectType::builder("GroupTestReplaced")
                    .finalize(|core| {
                        ENTERED.store(true, Ordering::SeqCst);
                        while !RELEASE.load(Ordering::SeqCst) {
                            thread::sleep(Duration::from_millis(1));
                        }
                        GROUP.remove(core.context(), core.id(), None);
                    })
                    .register()
                    .unwrap()
            })
        }
    }

    #[test]
    fn test_finalizing_entry_is_replaced() {
        let context = MainContext::new();
        context.push_thread_default();
        let old = replaced::GROUP.get(replaced::tag(), None).unwrap();
        let old_id = old.id();

        // finalize blocks before its remove
        let dropper = thread::spawn(move || drop(old));
        while !replaced::ENTERED.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }

        let fresh = replaced::GROUP.get(replaced::tag(), None).unwrap();
        assert_ne!(fresh.id(), old_id);
        assert_eq!(replaced::GROUP.len(), 1);
        assert_eq!(context.n_sources(), 1);

        // the late remove is swallowed and the fresh entry survives
        replaced::RELEASE.store(true, Ordering::SeqCst);
        dropper.join().unwrap();
        assert!(replaced::GROUP.contains(&context));

        drop(fresh);
        assert!(replaced::GROUP.is_empty());
        context.pop_thread_default();
    }
}
