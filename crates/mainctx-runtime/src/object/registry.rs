//! Type and signal registry
//!
//! Types are registered once per process and never unregistered. Every
//! type carries the base `notify` signal plus the signals it declares.
//! Signal ids are process-wide and start at `NOTIFY_SIGNAL`.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use mainctx_core::constants::NOTIFY_SIGNAL_NAME;
use mainctx_core::{kdebug, CoreError, CoreResult, SignalId, TypeTag};

use super::ObjectCore;

/// Hook run with the instance being constructed or finalized
pub type TypeHook = Arc<dyn Fn(&ObjectCore) + Send + Sync>;

pub(crate) struct TypeEntry {
    pub(crate) name: String,
    pub(crate) signals: Vec<SignalId>,
    pub(crate) init: Option<TypeHook>,
    pub(crate) finalize: Option<TypeHook>,
    pub(crate) is_abstract: bool,
}

struct SignalEntry {
    name: String,
    /// `None` for signals every type carries
    owner: Option<TypeTag>,
}

#[derive(Default)]
struct RegistryInner {
    types: Vec<Arc<TypeEntry>>,
    by_name: HashMap<String, TypeTag>,
    /// Indexed by signal id - 1
    signals: Vec<SignalEntry>,
}

/// Process-wide registry of instance types
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

pub fn registry() -> &'static TypeRegistry {
    static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let inner = RegistryInner {
            signals: vec![SignalEntry { name: NOTIFY_SIGNAL_NAME.to_string(), owner: None }],
            ..Default::default()
        };
        TypeRegistry { inner: RwLock::new(inner) }
    })
}

impl TypeRegistry {
    fn register(&self, ty: ObjectType) -> CoreResult<TypeTag> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_name.contains_key(&ty.name) {
            return Err(CoreError::TypeAlreadyRegistered(ty.name));
        }

        for (i, signal) in ty.signals.iter().enumerate() {
            if signal == NOTIFY_SIGNAL_NAME || ty.signals[..i].contains(signal) {
                return Err(CoreError::SignalAlreadyRegistered {
                    type_name: ty.name.clone(),
                    signal: signal.clone(),
                });
            }
        }

        let tag = TypeTag::new(inner.types.len() as u32);
        let mut signals = Vec::with_capacity(ty.signals.len() + 1);
        signals.push(SignalId::NOTIFY);
        for signal in &ty.signals {
            inner.signals.push(SignalEntry { name: signal.clone(), owner: Some(tag) });
            let raw = inner.signals.len() as u32;
            signals.extend(SignalId::new(raw));
        }

        kdebug!("registered type '{}' as {} with {} signals", ty.name, tag, signals.len());
        inner.by_name.insert(ty.name.clone(), tag);
        inner.types.push(Arc::new(TypeEntry {
            name: ty.name,
            signals,
            init: ty.init,
            finalize: ty.finalize,
            is_abstract: ty.is_abstract,
        }));
        Ok(tag)
    }

    pub(crate) fn entry(&self, tag: TypeTag) -> CoreResult<Arc<TypeEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .types
            .get(tag.as_usize())
            .cloned()
            .ok_or(CoreError::UnknownType(tag.as_u32()))
    }

    /// Tag of the type registered as `name`
    pub fn lookup(&self, name: &str) -> Option<TypeTag> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.get(name).copied()
    }

    pub fn type_name(&self, tag: TypeTag) -> Option<String> {
        self.entry(tag).ok().map(|e| e.name.clone())
    }

    /// Id of signal `name` on type `tag`, if the type carries it
    pub fn signal_lookup(&self, name: &str, tag: TypeTag) -> Option<SignalId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if tag.as_usize() >= inner.types.len() {
            return None;
        }
        inner
            .signals
            .iter()
            .position(|s| s.name == name && (s.owner.is_none() || s.owner == Some(tag)))
            .and_then(|i| SignalId::new(i as u32 + 1))
    }

    pub fn signal_name(&self, signal: SignalId) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.signals.get(signal.as_u32() as usize - 1).map(|s| s.name.clone())
    }

    /// Whether instances of `tag` can receive `signal`
    pub fn type_has_signal(&self, tag: TypeTag, signal: SignalId) -> bool {
        self.entry(tag).map(|e| e.signals.contains(&signal)).unwrap_or(false)
    }

    pub fn n_types(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).types.len()
    }
}

/// Description of an instance type, registered with `ObjectType::builder`
pub struct ObjectType {
    name: String,
    signals: Vec<String>,
    init: Option<TypeHook>,
    finalize: Option<TypeHook>,
    is_abstract: bool,
}

impl ObjectType {
    pub fn builder(name: impl Into<String>) -> ObjectTypeBuilder {
        ObjectTypeBuilder {
            ty: ObjectType {
                name: name.into(),
                signals: Vec::new(),
                init: None,
                finalize: None,
                is_abstract: false,
            },
        }
    }
}

pub struct ObjectTypeBuilder {
    ty: ObjectType,
}

impl ObjectTypeBuilder {
    /// Declare a signal carried by instances of this type
    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.ty.signals.push(name.into());
        self
    }

    /// Run `f` on every new instance
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&ObjectCore) + Send + Sync + 'static,
    {
        self.ty.init = Some(Arc::new(f));
        self
    }

    /// Run `f` when an instance's last reference drops
    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&ObjectCore) + Send + Sync + 'static,
    {
        self.ty.finalize = Some(Arc::new(f));
        self
    }

    /// Instances of this type cannot be constructed
    pub fn abstract_type(mut self) -> Self {
        self.ty.is_abstract = true;
        self
    }

    pub fn register(self) -> CoreResult<TypeTag> {
        registry().register(self.ty)
    }
}
