//! Monitor demo - broadcast to one service instance per thread
//!
//! Every listener thread runs its own main context and holds the
//! process's "app-info monitor" for that context. The monitor's start
//! hook launches a publisher that bumps a generation counter and fires
//! `changed` on the group; the stop hook halts it once the last listener
//! lets go. Each listener reports what it observed and on which thread.

use mainctx::{
    init_logging, kinfo, registry, ContextSpecificGroup, MainContext, ObjectType, SignalId, TypeTag,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

static MONITORS: ContextSpecificGroup = ContextSpecificGroup::new();
static GENERATION: AtomicU64 = AtomicU64::new(0);
static STOP: AtomicBool = AtomicBool::new(false);
static PUBLISHER: Mutex<Option<JoinHandle<u64>>> = Mutex::new(None);
static CHANGED: OnceLock<SignalId> = OnceLock::new();

/// Publisher tick
const TICK: Duration = Duration::from_millis(5);

fn publish() -> u64 {
    let mut fired = 0;
    while !STOP.load(Ordering::Acquire) {
        GENERATION.fetch_add(1, Ordering::Release);
        if let Some(changed) = CHANGED.get() {
            MONITORS.emit(*changed);
            fired += 1;
        }
        thread::sleep(TICK);
    }
    fired
}

fn start_watching() {
    STOP.store(false, Ordering::Release);
    let handle = thread::Builder::new()
        .name("monitor-publisher".into())
        .spawn(publish)
        .expect("failed to spawn publisher thread");
    kinfo!("monitor: watching");
    *PUBLISHER.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
}

fn stop_watching() {
    STOP.store(true, Ordering::Release);
    kinfo!("monitor: stopped watching");
}

struct Report {
    thread: String,
    deliveries: usize,
    foreign: usize,
    last_generation: u64,
}

fn listen(tag: TypeTag, changed: SignalId, duration: Duration) -> Report {
    let me = thread::current().name().unwrap_or("?").to_string();
    let context = MainContext::new();
    context.push_thread_default();

    let deliveries = Arc::new(AtomicUsize::new(0));
    let foreign = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(AtomicU64::new(0));

    let monitor = match MONITORS.get(tag, Some(start_watching)) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("{}: get failed: {}", me, e);
            context.pop_thread_default();
            return Report { thread: me, deliveries: 0, foreign: 0, last_generation: 0 };
        }
    };

    {
        let deliveries = deliveries.clone();
        let foreign = foreign.clone();
        let last = last.clone();
        let owner = me.clone();
        monitor.connect(changed, move |_| {
            deliveries.fetch_add(1, Ordering::Relaxed);
            if thread::current().name() != Some(owner.as_str()) {
                foreign.fetch_add(1, Ordering::Relaxed);
            }
            last.store(GENERATION.load(Ordering::Acquire), Ordering::Relaxed);
        });
    }

    let done = Arc::new(AtomicBool::new(false));
    let flag = done.clone();
    context.timeout_add(duration, move || {
        flag.store(true, Ordering::Release);
        false
    });

    let deadline = Instant::now() + duration * 2;
    while !done.load(Ordering::Acquire) && Instant::now() < deadline {
        context.iteration(true);
    }

    drop(monitor);
    context.pop_thread_default();

    Report {
        thread: me,
        deliveries: deliveries.load(Ordering::Relaxed),
        foreign: foreign.load(Ordering::Relaxed),
        last_generation: last.load(Ordering::Relaxed),
    }
}

fn main() {
    init_logging();
    println!("=== App-Info Monitor Demo ===\n");

    let num_listeners: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let duration_ms: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(500);
    let duration = Duration::from_millis(duration_ms);

    let tag = match ObjectType::builder("AppInfoMonitor")
        .signal("changed")
        .finalize(|core| MONITORS.remove(core.context(), core.id(), Some(stop_watching)))
        .register()
    {
        Ok(tag) => tag,
        Err(e) => {
            eprintln!("type registration failed: {}", e);
            std::process::exit(1);
        }
    };
    let Some(changed) = registry().signal_lookup("changed", tag) else {
        eprintln!("signal 'changed' missing");
        std::process::exit(1);
    };
    let _ = CHANGED.set(changed);

    println!("Listeners: {}, duration: {:?}, tick: {:?}", num_listeners, duration, TICK);

    let handles: Vec<_> = (0..num_listeners)
        .map(|i| {
            thread::Builder::new()
                .name(format!("listener-{}", i))
                .spawn(move || listen(tag, changed, duration))
                .expect("failed to spawn listener thread")
        })
        .collect();

    let reports: Vec<Report> = handles.into_iter().filter_map(|h| h.join().ok()).collect();

    let stopped = MONITORS.wait_for_state(false, Duration::from_secs(10));
    let fired = PUBLISHER
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .and_then(|h| h.join().ok())
        .unwrap_or(0);

    println!("\n=== Results ===");
    println!("Broadcasts fired: {}", fired);
    println!("Final generation: {}", GENERATION.load(Ordering::Acquire));
    for r in &reports {
        println!(
            "{:<12} deliveries: {:>5}  last generation: {:>5}  off-thread: {}",
            r.thread, r.deliveries, r.last_generation, r.foreign
        );
    }
    println!("Monitor stopped:  {}", stopped);

    let ok = stopped
        && reports.len() == num_listeners
        && reports.iter().all(|r| r.foreign == 0 && r.deliveries > 0);
    println!("\n=== Monitor {} ===", if ok { "OK" } else { "FAILED" });
    if !ok {
        std::process::exit(1);
    }
}
