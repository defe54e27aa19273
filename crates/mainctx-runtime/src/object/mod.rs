//! Instance kit
//!
//! Reference-counted instances of registered types with signal handlers
//! and a write-once context slot. The slot records the context an
//! instance was created for; services shared per context use it to find
//! their way back to the right table entry when the instance goes away.
//!
//! ```ignore
//! let tag = ObjectType::builder("Monitor").signal("changed").register()?;
//! let changed = registry().signal_lookup("changed", tag).unwrap();
//!
//! let monitor = Object::new(tag)?;
//! monitor.connect(changed, |m| kinfo!("{:?} changed", m.id()));
//! monitor.emit(changed);
//! ```

pub mod registry;

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use mainctx_core::{kcritical, CoreResult, HandlerId, ObjectId, SignalId, TypeTag};

use crate::context::MainContext;
use registry::{registry, TypeEntry};

pub use registry::{ObjectType, ObjectTypeBuilder, TypeHook, TypeRegistry};

/// Signal handler
pub type Handler = Arc<dyn Fn(&Object) + Send + Sync>;

struct HandlerEntry {
    id: HandlerId,
    signal: SignalId,
    /// Only run for emissions with this detail (e.g. a property name)
    detail: Option<String>,
    handler: Handler,
}

/// Shared state of one instance
pub struct ObjectCore {
    id: ObjectId,
    type_tag: TypeTag,
    class: Arc<TypeEntry>,
    context: OnceLock<MainContext>,
    handlers: Mutex<Vec<HandlerEntry>>,
}

impl ObjectCore {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn type_name(&self) -> &str {
        &self.class.name
    }

    /// The context recorded in the slot, if set
    pub fn context(&self) -> Option<&MainContext> {
        self.context.get()
    }

    /// Record the instance's context. The slot is write-once; returns
    /// `false` if it was already set.
    pub fn set_context(&self, context: MainContext) -> bool {
        self.context.set(context).is_ok()
    }

    fn lock_handlers(&self) -> MutexGuard<'_, Vec<HandlerEntry>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of connected handlers
    pub fn n_handlers(&self) -> usize {
        self.lock_handlers().len()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        if let Some(finalize) = self.class.finalize.clone() {
            finalize(self);
        }
    }
}

/// Strong reference to an instance
#[derive(Clone)]
pub struct Object {
    core: Arc<ObjectCore>,
}

impl Deref for Object {
    type Target = ObjectCore;

    fn deref(&self) -> &ObjectCore {
        &self.core
    }
}

impl Object {
    /// Construct an instance of a registered type
    pub fn new(type_tag: TypeTag) -> CoreResult<Object> {
        let class = registry().entry(type_tag)?;
        if class.is_abstract {
            return Err(mainctx_core::CoreError::TypeNotConstructible(class.name.clone()));
        }
        let object = Object {
            core: Arc::new(ObjectCore {
                id: ObjectId::next(),
                type_tag,
                class,
                context: OnceLock::new(),
                handlers: Mutex::new(Vec::new()),
            }),
        };
        if let Some(init) = object.class.init.clone() {
            init(&object.core);
        }
        Ok(object)
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject { core: Arc::downgrade(&self.core), id: self.id }
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.core)
    }

    pub fn ptr_eq(a: &Object, b: &Object) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }

    /// Connect a handler. `None` if the type does not carry `signal`.
    pub fn connect<F>(&self, signal: SignalId, f: F) -> Option<HandlerId>
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        self.connect_detailed(signal, None, f)
    }

    /// Connect a handler that only runs for emissions carrying `detail`
    pub fn connect_detailed<F>(&self, signal: SignalId, detail: Option<&str>, f: F) -> Option<HandlerId>
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        if !self.class.signals.contains(&signal) {
            kcritical!("connect: type '{}' has no signal {}", self.type_name(), signal);
            return None;
        }
        let id = HandlerId::next();
        self.lock_handlers().push(HandlerEntry {
            id,
            signal,
            detail: detail.map(str::to_string),
            handler: Arc::new(f),
        });
        Some(id)
    }

    /// Connect by signal name
    pub fn connect_by_name<F>(&self, name: &str, f: F) -> Option<HandlerId>
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        let signal = registry().signal_lookup(name, self.type_tag)?;
        self.connect(signal, f)
    }

    /// Watch changes of one property (or all of them with `None`)
    pub fn connect_notify<F>(&self, property: Option<&str>, f: F) -> Option<HandlerId>
    where
        F: Fn(&Object) + Send + Sync + 'static,
    {
        self.connect_detailed(SignalId::NOTIFY, property, f)
    }

    pub fn disconnect(&self, id: HandlerId) -> bool {
        let mut handlers = self.lock_handlers();
        match handlers.iter().position(|h| h.id == id) {
            Some(pos) => {
                // dropped after the lock is released
                let entry = handlers.remove(pos);
                drop(handlers);
                drop(entry);
                true
            }
            None => false,
        }
    }

    /// Run every handler connected to `signal`, in connection order
    pub fn emit(&self, signal: SignalId) {
        self.emit_detailed(signal, None);
    }

    /// Run the handlers for `signal`. Handlers connected with a detail
    /// only run when `detail` matches.
    pub fn emit_detailed(&self, signal: SignalId, detail: Option<&str>) {
        let handlers: Vec<Handler> = self
            .lock_handlers()
            .iter()
            .filter(|h| h.signal == signal)
            .filter(|h| h.detail.is_none() || h.detail.as_deref() == detail)
            .map(|h| h.handler.clone())
            .collect();
        for handler in handlers {
            handler(self);
        }
    }

    /// Emit `notify` for a property change
    pub fn notify(&self, property: &str) {
        self.emit_detailed(SignalId::NOTIFY, Some(property));
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("type", &self.class.name)
            .finish()
    }
}

/// Weak reference to an instance, remembers its id after finalization
#[derive(Clone)]
pub struct WeakObject {
    core: Weak<ObjectCore>,
    id: ObjectId,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.core.upgrade().map(|core| Object { core })
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.core.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
