//! The worker context
//!
//! A process-wide context iterated forever by a dedicated thread, started
//! on first use. Work that must run off every caller's thread (starting
//! and stopping shared services, for one) is queued here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;

use mainctx_core::kinfo;

use crate::config;
use crate::context::MainContext;

/// Counters for the worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    iterations: AtomicU64,
    dispatching: AtomicU64,
}

impl WorkerStats {
    /// Blocking iterations completed
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Iterations that dispatched at least one callback or source
    pub fn dispatching(&self) -> u64 {
        self.dispatching.load(Ordering::Relaxed)
    }
}

struct Worker {
    context: MainContext,
    stats: WorkerStats,
}

static WORKER: OnceLock<Worker> = OnceLock::new();

fn worker() -> &'static Worker {
    WORKER.get_or_init(|| {
        let context = MainContext::new();
        spawn_worker_thread(context.clone());
        Worker { context, stats: WorkerStats::default() }
    })
}

fn spawn_worker_thread(context: MainContext) {
    let config = config::global();
    let mut builder = thread::Builder::new().name(config.worker_thread_name.clone());

    if let Some(stack_size) = config.worker_stack_size {
        builder = builder.stack_size(stack_size);
    }

    builder
        .spawn(move || worker_loop(context))
        .expect("failed to spawn worker context thread");
}

fn worker_loop(context: MainContext) -> ! {
    kinfo!("worker context {:?} running", context.id());
    // wait for the OnceLock to publish the stats
    let stats = loop {
        if let Some(worker) = WORKER.get() {
            break &worker.stats;
        }
        thread::yield_now();
    };
    loop {
        if context.iteration(true) {
            stats.dispatching.fetch_add(1, Ordering::Relaxed);
        }
        stats.iterations.fetch_add(1, Ordering::Relaxed);
    }
}

/// The shared worker context, started on first call
pub fn worker_context() -> &'static MainContext {
    &worker().context
}

pub fn worker_stats() -> &'static WorkerStats {
    &worker().stats
}

/// Whether the worker thread has been started
pub fn worker_started() -> bool {
    WORKER.get().is_some()
}
