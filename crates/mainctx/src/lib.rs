//! # mainctx - Per-context services on GLib-style main contexts
//!
//! A service type that watches something process-wide (a file, a bus,
//! the clock) wants one instance per event loop, with change
//! notifications delivered on the loop that owns the instance.
//! `ContextSpecificGroup` provides exactly that.
//!
//! ## Features
//!
//! - **Main contexts**: per-thread default stack, process default, sources
//!   with monotonic ready times
//! - **Worker context**: a dedicated thread that runs start/stop hooks
//! - **Context-specific groups**: one instance per context, broadcast with
//!   per-context deduplication
//! - **Variant type info**: interned alignment, size and offset tables
//!
//! ## Quick Start
//!
//! ```ignore
//! use mainctx::{ContextSpecificGroup, MainContext, ObjectType};
//!
//! static CLOCKS: ContextSpecificGroup = ContextSpecificGroup::new();
//!
//! fn start_ticking() { /* arm the process-wide timer */ }
//! fn stop_ticking() { /* disarm it */ }
//!
//! fn main() -> mainctx::CoreResult<()> {
//!     let tag = ObjectType::builder("Clock")
//!         .signal("tick")
//!         .finalize(|core| CLOCKS.remove(core.context(), core.id(), Some(stop_ticking)))
//!         .register()?;
//!     let tick = mainctx::registry().signal_lookup("tick", tag).expect("registered above");
//!
//!     let context = MainContext::new();
//!     context.push_thread_default();
//!     let clock = CLOCKS.get(tag, Some(start_ticking))?;
//!     clock.connect(tick, |_| println!("tick"));
//!
//!     CLOCKS.emit(tick);
//!     context.iteration(false);
//!
//!     drop(clock);
//!     context.pop_thread_default();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Service code                        │
//! │         get(), emit(), finalize -> remove()              │
//! └──────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                 ContextSpecificGroup                     │
//! │    context -> source table, start/stop state machine     │
//! └──────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//!    ┌────────────────┐                ┌────────────────┐
//!    │ Context source │  one per       │ Worker context │
//!    │ pending queue  │  context       │ start / stop   │
//!    └────────────────┘                └────────────────┘
//!          │
//!          ▼
//!    ┌──────────────────────────────────────────────────────┐
//!    │         MainContext iteration on its own thread      │
//!    └──────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use mainctx_core::{
    ContextId,
    CoreError,
    CoreResult,
    HandlerId,
    ObjectId,
    SignalId,
    SourceId,
    TypeTag,
};
pub use mainctx_core::constants;

// Re-export kprint macros for debug logging
pub use mainctx_core::{kprint, kprintln, kerror, kcritical, kwarn, kinfo, kdebug, ktrace};
pub use mainctx_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use mainctx_core::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use mainctx_runtime::{
    monotonic_time,
    registry,
    worker_context,
    worker_stats,
    MainContext,
    Object,
    ObjectCore,
    ObjectType,
    RuntimeConfig,
    Source,
    SourceFuncs,
    WeakObject,
    WorkerStats,
};
pub use mainctx_runtime::config::install as install_config;

// Re-export groups
pub use mainctx_group::{ContextSpecificGroup, GroupHook};

// Re-export variant type info
pub use mainctx_variant::{info as type_info, type_string, Layout, MemberEnding, TypeInfo, VariantTypeError};

/// Run `context` until `done` returns true or `timeout` passes.
///
/// The context must be acquirable by the calling thread. Returns whether
/// `done` was satisfied.
pub fn iterate_until<F>(context: &MainContext, timeout: std::time::Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + timeout;
    while !done() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        context.iteration(false);
        std::thread::yield_now();
    }
    true
}
