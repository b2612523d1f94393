//! Skillmatch - load simulator
//!
//! Runs a server node and a set of mock clients that keep adding and
//! cancelling players at random, then reports what came back.
//!
//! Engine settings come from `MATCH_*` (see [`skillmatch::config`]); the
//! simulation reads:
//! - `SIM_CLIENTS` (default: 8)
//! - `SIM_DURATION_SECS` (default: 10)
//! - `SIM_INTERVAL_MS` (default: 100, each client sleeps 100-120% of it)

use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skillmatch::{
    ChannelNotifier, MatchEvent, MatchmakingConfig, MatchmakingEngine, NodeError, PlayerId,
    ServerNode, SystemClock,
};

/// Scores are drawn from `0..MAX_POINT`.
const MAX_POINT: i64 = 20_000;

#[derive(Debug, Default)]
struct ClientCounters {
    adds: AtomicU64,
    add_failures: AtomicU64,
    cancels: AtomicU64,
    cancel_failures: AtomicU64,
}

fn main() -> Result<(), NodeError> {
    init_tracing();

    let config = MatchmakingConfig::from_env()?;
    let clients: usize = env_or("SIM_CLIENTS", 8);
    let duration = Duration::from_secs(env_or("SIM_DURATION_SECS", 10));
    let interval_ms = env_or::<u64>("SIM_INTERVAL_MS", 100).max(1);

    let (notifier, events) = ChannelNotifier::new();
    let node = ServerNode::new(config, Arc::new(SystemClock), Arc::new(notifier))?;

    let collector = thread::Builder::new()
        .name("collector".into())
        .spawn(move || {
            let (mut rooms, mut players, mut cancels) = (0u64, 0u64, 0u64);
            for event in events {
                match event {
                    MatchEvent::Matched(room) => {
                        rooms += 1;
                        players += room.len() as u64;
                    }
                    MatchEvent::CancelCompleted(_) => cancels += 1,
                }
            }
            (rooms, players, cancels)
        })
        .map_err(spawn_error)?;

    node.start()?;

    let stop = Arc::new(AtomicBool::new(false));
    let counters = Arc::new(ClientCounters::default());
    let mut handles = Vec::with_capacity(clients);
    for idx in 0..clients {
        let engine = Arc::clone(node.engine());
        let stop = Arc::clone(&stop);
        let counters = Arc::clone(&counters);
        let handle = thread::Builder::new()
            .name(format!("client-{}", idx))
            .spawn(move || run_client(idx, clients, interval_ms, &engine, &stop, &counters))
            .map_err(spawn_error)?;
        handles.push(handle);
    }

    tracing::info!(clients, secs = duration.as_secs(), "simulation running");
    thread::sleep(duration);

    stop.store(true, Ordering::Release);
    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("client thread panicked");
        }
    }

    node.stop();
    let stats = node.engine().stats();
    drop(node);

    let (rooms, players, cancels) = match collector.join() {
        Ok(totals) => totals,
        Err(_) => {
            tracing::error!("collector thread panicked");
            (0, 0, 0)
        }
    };

    tracing::info!(
        adds = counters.adds.load(Ordering::Relaxed),
        add_failures = counters.add_failures.load(Ordering::Relaxed),
        cancels = counters.cancels.load(Ordering::Relaxed),
        cancel_failures = counters.cancel_failures.load(Ordering::Relaxed),
        "client totals"
    );
    tracing::info!(rooms, players, cancels, "notifications received");
    tracing::info!(?stats, "final engine stats");
    Ok(())
}

/// One mock client: every interval, either cancel its last player (1 in 4)
/// or add a fresh one with a random score.
fn run_client(
    idx: usize,
    clients: usize,
    interval_ms: u64,
    engine: &MatchmakingEngine,
    stop: &AtomicBool,
    counters: &ClientCounters,
) {
    let mut rng = StdRng::seed_from_u64(idx as u64);
    let mut seq: u64 = 0;
    let mut last_added: Option<PlayerId> = None;

    while !stop.load(Ordering::Acquire) {
        let sleep_ms = rng.gen_range(interval_ms..=interval_ms + interval_ms / 5);
        thread::sleep(Duration::from_millis(sleep_ms));

        match last_added {
            Some(id) if rng.gen_range(0..4) == 0 => match engine.cancel(id) {
                Ok(_) => {
                    counters.cancels.fetch_add(1, Ordering::Relaxed);
                    last_added = None;
                }
                Err(_) => {
                    counters.cancel_failures.fetch_add(1, Ordering::Relaxed);
                }
            },
            _ => {
                seq += 1;
                let id = (seq * clients as u64 + idx as u64) as PlayerId;
                let point = rng.gen_range(0..MAX_POINT);
                match engine.add(id, point) {
                    Ok(()) => {
                        counters.adds.fetch_add(1, Ordering::Relaxed);
                        last_added = Some(id);
                    }
                    Err(_) => {
                        counters.add_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn spawn_error(err: std::io::Error) -> NodeError {
    NodeError::Timer(err.into())
}

/// `RUST_LOG` overrides the default `info,skillmatch=info`.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skillmatch=info".into()),
        )
        .init();
}
