//! # mainctx-runtime
//!
//! Event loop runtime for mainctx.
//!
//! This crate provides:
//! - Main contexts with per-thread defaults and a process default
//! - Sources with monotonic ready times
//! - The worker context, iterated by a dedicated thread
//! - The instance kit: registered types, signals, context slots
//! - Platform parking (futex on Linux, condvar elsewhere)

pub mod config;
pub mod context;
pub mod object;
pub mod parking;
pub mod source;
pub mod time;
pub mod tls;
pub mod worker;

// Re-exports
pub use config::RuntimeConfig;
pub use context::MainContext;
pub use object::registry::{registry, ObjectType, TypeRegistry};
pub use object::{Handler, Object, ObjectCore, WeakObject};
pub use parking::{new_parking, ContextParking};
pub use source::{Source, SourceFuncs};
pub use time::monotonic_time;
pub use worker::{worker_context, worker_stats, WorkerStats};
