//! Per-context delivery source
//!
//! One `ContextSource` per registered instance. Publishers arm it from
//! any thread; the thread iterating the instance's context pops one
//! signal id per dispatch and emits it on the instance.
//!
//! The source only holds a weak reference to the instance. The instance
//! owner removes the entry (and destroys the source) when the instance
//! is finalized, so a queued emission never outlives the instance.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mainctx_core::constants::{READY_NEVER, READY_NOW};
use mainctx_core::{kcritical, ktrace, ObjectId, SignalId};
use mainctx_runtime::{MainContext, Object, Source, SourceFuncs, WeakObject};

use crate::pending::PendingQueue;

struct Shared {
    pending: Mutex<PendingQueue>,
    instance: WeakObject,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PendingQueue> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Dispatcher {
    shared: Arc<Shared>,
}

impl SourceFuncs for Dispatcher {
    fn dispatch(&self, source: &Source) -> bool {
        let signal = {
            let mut pending = self.shared.lock();
            let Some(signal) = pending.pop_front() else {
                kcritical!("context source '{}' dispatched with nothing queued", source.name());
                source.set_ready_time(READY_NEVER);
                return true;
            };
            if pending.is_empty() {
                source.set_ready_time(READY_NEVER);
            }
            signal
        };

        // emission may re-enter the group or drop the last instance ref
        match self.shared.instance.upgrade() {
            Some(instance) => {
                ktrace!("emit signal {} on {:?}", signal, instance.id());
                instance.emit(signal);
            }
            None => ktrace!("instance {} gone, signal {} dropped", self.shared.instance.id(), signal),
        }
        true
    }
}

pub(crate) struct ContextSource {
    source: Source,
    shared: Arc<Shared>,
}

impl ContextSource {
    /// Create the source for `instance` and attach it to `context`
    pub(crate) fn new(instance: &Object, context: &MainContext) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingQueue::new()),
            instance: instance.downgrade(),
        });
        let source = Source::new(instance.type_name(), Dispatcher { shared: shared.clone() });
        source.attach(context);
        Self { source, shared }
    }

    /// Queue `signal` for emission on the context's thread
    pub(crate) fn arm(&self, signal: SignalId) {
        let mut pending = self.shared.lock();
        if pending.push(signal) {
            self.source.set_ready_time(READY_NOW);
        }
    }

    #[inline]
    pub(crate) fn instance_id(&self) -> ObjectId {
        self.shared.instance.id()
    }

    pub(crate) fn instance(&self) -> Option<Object> {
        self.shared.instance.upgrade()
    }

    /// Detach from the context and drop this reference. No dispatch
    /// starts after this returns.
    pub(crate) fn destroy(self) {
        self.source.destroy();
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &Source {
        &self.source
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> Vec<SignalId> {
        self.shared.lock().iter().collect()
    }
}
