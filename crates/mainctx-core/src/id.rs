//! Identifier types
//!
//! Contexts are compared by pointer identity, everything else by a
//! process-unique counter value.

use core::fmt;
use core::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a main context
///
/// Derived from the address of the context's shared allocation, so two
/// handles to the same context always compare equal and a context that
/// is still referenced can never share its id with another one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ContextId(usize);

impl ContextId {
    /// Build from the address of a context allocation
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        ContextId(ptr as usize)
    }

    /// Raw address value
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({:#x})", self.0)
    }
}

/// Identifier of a signal registered on a type
///
/// Zero is never a legal signal id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SignalId(NonZeroU32);

impl SignalId {
    /// The base `notify` signal
    pub const NOTIFY: SignalId = match NonZeroU32::new(crate::constants::NOTIFY_SIGNAL) {
        Some(id) => SignalId(id),
        None => panic!("notify signal id must be non-zero"),
    };

    /// Create from a raw value, `None` for zero
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(id) => Some(SignalId(id)),
            None => None,
        }
    }

    /// Raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalId({})", self.0)
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag of a registered object type
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct TypeTag(u32);

impl TypeTag {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        TypeTag(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

macro_rules! counter_id {
    ($(#[$meta:meta])* $name:ident, $counter:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        #[repr(transparent)]
        pub struct $name(u64);

        static $counter: AtomicU64 = AtomicU64::new(1);

        impl $name {
            /// Allocate the next process-unique id
            #[inline]
            pub fn next() -> Self {
                $name($counter.fetch_add(1, Ordering::Relaxed))
            }

            #[inline]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

counter_id!(
    /// Identity of an object instance, stable for its whole lifetime
    ObjectId,
    NEXT_OBJECT_ID
);

counter_id!(
    /// Identifier of a source attached to a context
    SourceId,
    NEXT_SOURCE_ID
);

counter_id!(
    /// Identifier of a connected signal handler
    HandlerId,
    NEXT_HANDLER_ID
);
