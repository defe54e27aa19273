//! # mainctx-group
//!
//! Context-specific groups: one instance of a service type per main
//! context, with broadcasts delivered on each context's own thread and a
//! start/stop hook pair driven through the worker context.
//!
//! ## Modules
//!
//! - `group` - The group itself
//! - `source` - Per-context delivery source
//! - `pending` - Deduplicating signal queue
//! - `state` - Start/stop state machine

pub mod group;
pub mod pending;
mod source;
pub mod state;

pub use group::ContextSpecificGroup;
pub use pending::PendingQueue;
pub use state::{GroupHook, GroupState};
