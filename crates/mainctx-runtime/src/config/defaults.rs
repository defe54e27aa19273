//! Library defaults for `RuntimeConfig`
//!
//! Environment variables override these at `RuntimeConfig::from_env()`.

/// Name of the thread that iterates the worker context
pub const WORKER_THREAD_NAME: &str = "mainctx-worker";

/// Worker thread stack size in bytes (0 = system default)
pub const WORKER_STACK_SIZE: usize = 0;

/// Upper bound of a single blocking park inside `iteration(true)`
pub const PARK_TIMEOUT_MS: u64 = 1000;

/// Maximum number of sources dispatched by one iteration
pub const MAX_DISPATCH: usize = 64;

/// Smallest stack we accept for the worker thread when one is given
pub const MIN_WORKER_STACK_SIZE: usize = 64 * 1024;
