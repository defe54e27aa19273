//! Identity check - one instance per context
//!
//! Each thread pushes its own context, fetches the service many times and
//! checks it always gets the same instance. Start and stop hook counts
//! are printed at the end; they must match.

use mainctx::{init_logging, registry, ContextSpecificGroup, MainContext, ObjectType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

static SERVICES: ContextSpecificGroup = ContextSpecificGroup::new();
static STARTS: AtomicUsize = AtomicUsize::new(0);
static STOPS: AtomicUsize = AtomicUsize::new(0);

fn start() {
    STARTS.fetch_add(1, Ordering::SeqCst);
}

fn stop() {
    STOPS.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    init_logging();
    println!("=== Context-Specific Group Identity ===\n");

    let num_threads: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    let gets_per_thread: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let tag = match ObjectType::builder("IdentityService")
        .signal("changed")
        .finalize(|core| SERVICES.remove(core.context(), core.id(), Some(stop)))
        .register()
    {
        Ok(tag) => tag,
        Err(e) => {
            eprintln!("type registration failed: {}", e);
            std::process::exit(1);
        }
    };
    println!(
        "Type {}, changed signal {:?}",
        registry().type_name(tag).unwrap_or_default(),
        registry().signal_lookup("changed", tag)
    );
    println!("Threads: {}, gets per thread: {}", num_threads, gets_per_thread);

    let barrier = Arc::new(Barrier::new(num_threads));
    let mismatches = Arc::new(AtomicUsize::new(0));
    let start_time = Instant::now();

    let handles: Vec<_> = (0..num_threads)
        .map(|i| {
            let barrier = barrier.clone();
            let mismatches = mismatches.clone();
            thread::Builder::new()
                .name(format!("identity-{}", i))
                .spawn(move || {
                    let context = MainContext::new();
                    context.push_thread_default();

                    let first = SERVICES.get(tag, Some(start)).ok();
                    for _ in 0..gets_per_thread {
                        let again = SERVICES.get(tag, Some(start)).ok();
                        if first.is_none() || again != first {
                            mismatches.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    barrier.wait();
                    drop(first);
                    context.pop_thread_default();
                })
                .expect("failed to spawn identity thread")
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            mismatches.fetch_add(1, Ordering::Relaxed);
        }
    }
    let elapsed = start_time.elapsed();

    let stopped = SERVICES.wait_for_state(false, Duration::from_secs(10));

    println!("\n=== Results ===");
    println!("Elapsed:        {:?}", elapsed);
    println!("Mismatches:     {}", mismatches.load(Ordering::Relaxed));
    println!("Registered now: {}", SERVICES.len());
    println!("Stopped:        {}", stopped);
    println!("Start hooks:    {}", STARTS.load(Ordering::SeqCst));
    println!("Stop hooks:     {}", STOPS.load(Ordering::SeqCst));

    let ok = stopped
        && mismatches.load(Ordering::Relaxed) == 0
        && STARTS.load(Ordering::SeqCst) == STOPS.load(Ordering::SeqCst);
    println!("\n=== Identity {} ===", if ok { "OK" } else { "FAILED" });
    if !ok {
        std::process::exit(1);
    }
}
