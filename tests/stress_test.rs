//! Stress tests for the matchmaking engine.
//!
//! These tests verify:
//! 1. Concurrent intake stays consistent while ticks run
//! 2. Every room is full and pairwise compatible, and no player is placed twice
//! 3. Determinism is preserved across runs
//! 4. Registrations don't accumulate under steady churn
//!
//! ## Running Stress Tests
//!
//! ```bash
//! # Run all stress tests (release mode recommended)
//! cargo test --release --test stress_test -- --nocapture
//!
//! # Run specific test
//! cargo test --release --test stress_test stress_concurrent_intake -- --nocapture
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use skillmatch::{
    CancelOutcome, ChannelNotifier, ManualClock, MatchEvent, MatchmakingConfig,
    MatchmakingEngine, NoopNotifier, PlayerId, Service,
};

// ============================================================================
// TEST CONSTANTS
// ============================================================================

/// Client threads in the concurrent test
const CLIENT_THREADS: usize = 8;

/// Requests issued by each client thread
const REQUESTS_PER_CLIENT: usize = 20_000;

/// Scores are drawn from `0..MAX_POINT`
const MAX_POINT: i64 = 20_000;

/// Share of requests that cancel instead of add
const CANCEL_RATE: f64 = 0.25;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn running_engine(
    config: MatchmakingConfig,
    clock: Arc<ManualClock>,
) -> (MatchmakingEngine, Receiver<MatchEvent>) {
    let (notifier, events) = ChannelNotifier::new();
    let engine = MatchmakingEngine::new(config, clock, Arc::new(notifier)).unwrap();
    engine.start();
    engine.started();
    (engine, events)
}

/// Tick until a tick neither forms rooms nor retires anyone, then once more.
fn settle(engine: &MatchmakingEngine) {
    loop {
        let summary = engine.tick();
        let quiet = summary.rooms_formed == 0
            && summary.cancels_completed == 0
            && summary.players_added == 0;
        if quiet {
            break;
        }
    }
    engine.tick();
}

/// Run a seeded single-threaded sequence and return the final board digest.
fn run_deterministic_sequence(seed: u64, rounds: usize) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let clock = Arc::new(ManualClock::at_secs(0));
    let config = MatchmakingConfig::default().with_room_size(4);
    let engine = MatchmakingEngine::new(config, clock.clone(), Arc::new(NoopNotifier)).unwrap();
    engine.start();
    engine.started();

    let mut next_id: PlayerId = 1;
    let mut live: Vec<PlayerId> = Vec::new();
    for _ in 0..rounds {
        for _ in 0..50 {
            if !live.is_empty() && rng.gen_bool(CANCEL_RATE) {
                let idx = rng.gen_range(0..live.len());
                let _ = engine.cancel(live.swap_remove(idx));
            } else {
                engine.add(next_id, rng.gen_range(0..MAX_POINT)).unwrap();
                live.push(next_id);
                next_id += 1;
            }
        }
        clock.advance_secs(rng.gen_range(0..4));
        engine.tick();
    }

    engine.board_digest_hex()
}

// ============================================================================
// STRESS TESTS
// ============================================================================

/// Many client threads add and cancel while a ticker thread runs the engine.
///
/// # Verification
/// - Every room has `room_size` members, pairwise compatible
/// - No player is placed twice, and no cancelled player is placed at all
/// - Every accepted add is accounted for once everything settles
#[test]
fn stress_concurrent_intake() {
    println!("\n=== STRESS TEST: Concurrent Intake ===\n");

    let clock = Arc::new(ManualClock::at_secs(0));
    let config = MatchmakingConfig::default().with_shard_count(16);
    let room_size = config.room_size;
    let (engine, events) = running_engine(config, clock.clone());

    let adds_ok = AtomicU64::new(0);
    let removed_direct = AtomicU64::new(0);
    let done = AtomicBool::new(false);

    let start = Instant::now();
    let ticks = thread::scope(|s| {
        let clients: Vec<_> = (0..CLIENT_THREADS)
            .map(|idx| {
                let engine = &engine;
                let adds_ok = &adds_ok;
                let removed_direct = &removed_direct;
                s.spawn(move || {
                    let mut rng = ChaCha8Rng::seed_from_u64(idx as u64);
                    let mut live: Vec<PlayerId> = Vec::new();
                    for seq in 0..REQUESTS_PER_CLIENT {
                        if !live.is_empty() && rng.gen_bool(CANCEL_RATE) {
                            let pick = rng.gen_range(0..live.len());
                            let outcome = engine.cancel(live.swap_remove(pick));
                            if let Ok(CancelOutcome::Removed) = outcome {
                                removed_direct.fetch_add(1, Ordering::Relaxed);
                            }
                        } else {
                            let id = (seq * CLIENT_THREADS + idx + 1) as PlayerId;
                            if engine.add(id, rng.gen_range(0..MAX_POINT)).is_ok() {
                                adds_ok.fetch_add(1, Ordering::Relaxed);
                                live.push(id);
                            }
                        }
                    }
                })
            })
            .collect();

        let ticker = s.spawn(|| {
            let mut ticks = 0u64;
            while !done.load(Ordering::Acquire) {
                engine.tick();
                clock.advance_secs(1);
                ticks += 1;
                thread::sleep(Duration::from_micros(200));
            }
            ticks
        });

        for client in clients {
            client.join().unwrap();
        }
        done.store(true, Ordering::Release);
        ticker.join().unwrap()
    });
    let elapsed = start.elapsed();

    settle(&engine);

    // Collect notifications
    let mut rooms = 0u64;
    let mut matched = HashSet::new();
    let mut cancelled = HashSet::new();
    for event in events.try_iter() {
        match event {
            MatchEvent::Matched(room) => {
                rooms += 1;
                assert_eq!(room.len(), room_size);
                assert!(room.is_mutually_compatible(), "room {} incompatible", room.id);
                for id in room.member_ids() {
                    assert!(matched.insert(id), "player {} placed twice", id);
                }
            }
            MatchEvent::CancelCompleted(id) => {
                assert!(cancelled.insert(id), "player {} cancelled twice", id);
            }
        }
    }
    assert!(matched.is_disjoint(&cancelled), "cancelled player was placed in a room");

    let stats = engine.stats();
    let adds_ok = adds_ok.load(Ordering::Relaxed);
    let removed_direct = removed_direct.load(Ordering::Relaxed);

    println!("=== RESULTS ===");
    println!("  Adds accepted:     {:>12}", adds_ok);
    println!("  Direct removals:   {:>12}", removed_direct);
    println!("  Cancels completed: {:>12}", stats.cancels_completed);
    println!("  Rooms formed:      {:>12}", stats.rooms_formed);
    println!("  Players matched:   {:>12}", stats.players_matched);
    println!("  Still waiting:     {:>12}", stats.active_players);
    println!("  Ticks (concurrent):{:>12}", ticks);
    println!("  Elapsed time:      {:>12.2?}", elapsed);

    assert_eq!(rooms, stats.rooms_formed);
    assert_eq!(matched.len() as u64, stats.players_matched);
    assert_eq!(cancelled.len() as u64, stats.cancels_completed);
    assert_eq!(
        adds_ok,
        removed_direct + stats.cancels_completed + stats.players_matched + stats.active_players,
        "accepted adds not accounted for"
    );
    assert_eq!(engine.registered_players() as u64, stats.active_players);
    assert_eq!(engine.verify_board(), Ok(()));
    assert!(stats.rooms_formed > 0);

    engine.stop_requested();
    engine.stopped();

    println!("\n=== STRESS TEST PASSED ===\n");
}

/// Verify determinism: Same sequence produces identical board digest.
#[test]
fn verify_determinism() {
    println!("\n=== DETERMINISM TEST ===\n");

    const ROUNDS: usize = 200;
    const SEED: u64 = 12345;

    println!("Running {} rounds (seed={})...", ROUNDS, SEED);

    let digest1 = run_deterministic_sequence(SEED, ROUNDS);
    let digest2 = run_deterministic_sequence(SEED, ROUNDS);

    println!("  Run 1 digest:     {}", digest1);
    println!("  Run 2 digest:     {}", digest2);

    assert_eq!(digest1, digest2, "Board digests must match for determinism");

    let digest3 = run_deterministic_sequence(SEED + 1, ROUNDS);
    println!("  Different seed:   {}", digest3);
    assert_ne!(digest1, digest3, "Different seeds should produce different digests");

    println!("\n=== DETERMINISM VERIFIED ===\n");
}

/// Tick cost for growing boards.
#[test]
fn stress_scaling() {
    println!("\n=== SCALING TEST ===\n");

    let test_sizes = [1_000, 10_000, 50_000];

    println!("{:>12} {:>12} {:>12} {:>12}", "Players", "Merge tick", "Idle tick", "Rooms");
    println!("{:-<12} {:-<12} {:-<12} {:-<12}", "", "", "", "");

    for &size in &test_sizes {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let clock = Arc::new(ManualClock::at_secs(0));
        let config = MatchmakingConfig::default().with_shard_count(16);
        let engine = MatchmakingEngine::new(config, clock.clone(), Arc::new(NoopNotifier)).unwrap();
        engine.start();
        engine.started();

        for id in 1..=size as PlayerId {
            engine.add(id, rng.gen_range(0..MAX_POINT * 50)).unwrap();
        }

        let start = Instant::now();
        let summary = engine.tick();
        let merge = start.elapsed();

        // Retire this tick's rooms so the next one is truly idle
        settle(&engine);
        let start = Instant::now();
        let idle = engine.tick();
        let idle_time = start.elapsed();
        assert!(!idle.rebuilt);

        println!("{:>12} {:>12.2?} {:>12.2?} {:>12}", size, merge, idle_time, summary.rooms_formed);
        assert_eq!(summary.players_added, size);
        assert_eq!(engine.verify_board(), Ok(()));
    }

    println!("\n=== SCALING TEST COMPLETE ===\n");
}

/// Registrations stay bounded when players keep matching and leaving.
#[test]
fn stress_memory_stability() {
    println!("\n=== MEMORY STABILITY TEST ===\n");

    const ROUNDS: usize = 500;
    const ADDS_PER_ROUND: usize = 64;
    const MAX_REGISTERED: usize = 2_000;

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let clock = Arc::new(ManualClock::at_secs(0));
    let (engine, _events) = running_engine(MatchmakingConfig::default(), clock.clone());

    let mut next_id: PlayerId = 1;
    let mut max_seen = 0;
    for _ in 0..ROUNDS {
        for _ in 0..ADDS_PER_ROUND {
            // Narrow score band so rooms form steadily
            engine.add(next_id, rng.gen_range(0..2_000)).unwrap();
            next_id += 1;
        }
        clock.advance_secs(1);
        engine.tick();
        max_seen = max_seen.max(engine.registered_players());
    }

    let stats = engine.stats();
    println!("  Rounds:            {:>12}", ROUNDS);
    println!("  Players added:     {:>12}", next_id - 1);
    println!("  Max registered:    {:>12}", max_seen);
    println!("  Rooms formed:      {:>12}", stats.rooms_formed);
    println!("  Registrations bounded: {}",
        if max_seen < MAX_REGISTERED { "YES ✓" } else { "NO ✗" });

    assert!(max_seen < MAX_REGISTERED,
        "Registrations grew too large: {} (max {})", max_seen, MAX_REGISTERED);

    println!("\n=== MEMORY STABILITY PASSED ===\n");
}
