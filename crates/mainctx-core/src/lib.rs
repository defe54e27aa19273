//! # mainctx-core
//!
//! Core types shared by every mainctx crate.
//!
//! This crate has no dependencies and no OS-specific code. The event
//! loop, the instance kit and the worker context live in
//! `mainctx-runtime`.
//!
//! ## Modules
//!
//! - `id` - Identifier newtypes (contexts, sources, signals, objects, types)
//! - `error` - Error types
//! - `kprint` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{ContextId, HandlerId, ObjectId, SignalId, SourceId, TypeTag};
pub use error::{CoreError, CoreResult};
pub use env::{env_get, env_get_bool, env_get_duration_ms, env_get_opt, env_get_str, env_is_set};

/// Constants shared across crates
pub mod constants {
    /// Ready time meaning "never dispatch"
    pub const READY_NEVER: i64 = -1;

    /// Ready time meaning "dispatch on the next iteration"
    pub const READY_NOW: i64 = 0;

    /// Signal id of the base `notify` signal every type carries
    pub const NOTIFY_SIGNAL: u32 = 1;

    /// Name of the base property-change signal
    pub const NOTIFY_SIGNAL_NAME: &str = "notify";
}
