//! Integration tests for the edge capture engine
//!
//! Driven through the simulated backend: edges are injected from another
//! thread with explicit ticks while the engine polls wall-clock time.
//! Timing-bound tests run serially to keep scheduler jitter out of the
//! tolerances.

use irrecord::backend::sim::{pulse_train, SimBackend};
use irrecord::backend::EdgeEvent;
use irrecord::capture::{normalize_pulses, CaptureConfig, EdgeCaptureEngine, StopReason};
use irrecord::error::CaptureError;
use irrecord::pin::{Level, Pin, PinConfig, PinMode, Pull};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn gpio17() -> Pin {
    Pin::new(17).unwrap()
}

fn sim_engine() -> (SimBackend, EdgeCaptureEngine<SimBackend>) {
    let sim = SimBackend::new();
    let engine = EdgeCaptureEngine::new(sim.clone(), PinConfig::new(gpio17(), true));
    (sim, engine)
}

#[test]
fn test_interval_across_tick_wraparound() {
    let (sim, engine) = sim_engine();
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0xFFFF_FFF0, &[0x20]));

    let pulses = engine.record_single(1.0, 0.05).unwrap();
    assert_eq!(pulses, vec![32]);
}

#[test]
fn test_first_edge_never_emits_duration() {
    for edges in 1..=6usize {
        let (sim, engine) = sim_engine();
        let durations: Vec<u32> = (1..edges as u32).map(|i| i * 100).collect();
        let train = pulse_train(Level::Low, 5_000, &durations);
        assert_eq!(train.len(), edges);
        sim.queue_train(gpio17(), train);

        let pulses = engine.record_single(1.0, 0.03).unwrap();
        assert_eq!(pulses.len(), edges - 1);
        assert_eq!(pulses, durations);
    }
}

#[test]
#[serial]
fn test_empty_on_timeout() {
    let (_sim, engine) = sim_engine();

    let start = Instant::now();
    let pulses = engine.record_single(0.2, 0.15).unwrap();
    let elapsed = start.elapsed();

    assert!(pulses.is_empty());
    assert!(elapsed >= Duration::from_millis(200), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(400), "returned late: {:?}", elapsed);
}

#[test]
#[serial]
fn test_gap_terminates_burst() {
    let (sim, engine) = sim_engine();
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0, &[1000, 1000]));

    let start = Instant::now();
    let burst = engine
        .record(&CaptureConfig::from_secs(5.0, 0.15).unwrap())
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(burst.durations, vec![1000, 1000]);
    assert_eq!(burst.stop, StopReason::GapReached);
    assert!(elapsed >= Duration::from_millis(150), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(600), "waited for timeout: {:?}", elapsed);
}

#[test]
#[serial]
fn test_safety_ceiling_under_continuous_activity() {
    let (sim, engine) = sim_engine();
    let stop = AtomicBool::new(false);

    let burst = thread::scope(|s| {
        s.spawn(|| {
            assert!(sim.wait_for_watch(gpio17(), Duration::from_secs(1)));
            let mut tick = 0u32;
            let mut level = Level::Low;
            while !stop.load(Ordering::Relaxed) {
                sim.inject(gpio17(), level, tick);
                tick = tick.wrapping_add(1000);
                level = level.toggled();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let start = Instant::now();
        let burst = engine
            .record(&CaptureConfig::from_secs(1.0, 0.15).unwrap())
            .unwrap();
        let elapsed = start.elapsed();
        stop.store(true, Ordering::Relaxed);

        assert!(elapsed >= Duration::from_secs(1), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1300), "ran past ceiling: {:?}", elapsed);
        burst
    });

    assert_eq!(burst.stop, StopReason::Ceiling);
    assert!(!burst.durations.is_empty());
    assert!(burst.durations.iter().all(|&d| d == 1000));
}

#[test]
fn test_watchdog_events_are_not_edges() {
    let (sim, engine) = sim_engine();
    sim.queue_train(gpio17(), vec![EdgeEvent::watchdog(10), EdgeEvent::watchdog(20)]);

    let burst = engine
        .record(&CaptureConfig::from_secs(0.15, 0.05).unwrap())
        .unwrap();
    assert!(burst.durations.is_empty());
    assert_eq!(burst.stop, StopReason::NoSignal);
}

#[test]
fn test_watchdog_inside_burst_adds_nothing() {
    let (sim, engine) = sim_engine();
    let mut train = pulse_train(Level::Low, 0, &[9000, 4500]);
    train.insert(2, EdgeEvent::watchdog(9500));
    sim.queue_train(gpio17(), train);

    assert_eq!(engine.record_single(1.0, 0.05).unwrap(), vec![9000, 4500]);
}

#[test]
fn test_pin_reconfigured_as_floating_input() {
    let (sim, engine) = sim_engine();
    engine.record_single(0.05, 0.05).unwrap();

    assert_eq!(sim.mode(gpio17()), Some(PinMode::Input));
    assert_eq!(sim.pull(gpio17()), Some(Pull::Off));
}

#[test]
fn test_anchor_level_recorded() {
    let (sim, engine) = sim_engine();
    sim.queue_train(gpio17(), pulse_train(Level::High, 0, &[300]));

    let burst = engine
        .record(&CaptureConfig::from_secs(1.0, 0.05).unwrap())
        .unwrap();
    // durations are kept as-is whichever way the first edge went
    assert_eq!(burst.anchor_level, Some(Level::High));
    assert_eq!(burst.durations, vec![300]);
}

#[test]
fn test_invalid_config_fails_before_touching_pin() {
    let (sim, engine) = sim_engine();

    for (timeout, gap) in [(0.0, 0.15), (1.0, -0.1), (f64::NAN, 0.15)] {
        let err = engine.record_single(timeout, gap).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidConfig(_)));
    }
    assert_eq!(sim.mode(gpio17()), None);
    assert_eq!(sim.active_watches(gpio17()), 0);
}

#[test]
fn test_backend_unavailable_propagates() {
    let (sim, engine) = sim_engine();
    sim.set_available(false);

    let err = engine.record_single(1.0, 0.1).unwrap_err();
    assert!(err.is_backend_unavailable());
}

#[test]
fn test_registration_released_on_every_exit_path() {
    let (sim, engine) = sim_engine();

    // timeout
    engine.record_single(0.05, 0.05).unwrap();
    assert_eq!(sim.active_watches(gpio17()), 0);

    // gap
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0, &[500]));
    assert_eq!(engine.record_single(1.0, 0.03).unwrap(), vec![500]);
    assert_eq!(sim.active_watches(gpio17()), 0);

    // ceiling
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0, &[500]));
    let burst = engine
        .record(&CaptureConfig::from_secs(0.1, 1.0).unwrap())
        .unwrap();
    assert_eq!(burst.stop, StopReason::Ceiling);
    assert_eq!(sim.active_watches(gpio17()), 0);

    // fault during capture
    thread::scope(|s| {
        s.spawn(|| {
            assert!(sim.wait_for_watch(gpio17(), Duration::from_secs(1)));
            sim.break_watches(gpio17());
        });
        let err = engine.record_single(5.0, 0.1).unwrap_err();
        assert!(matches!(err, CaptureError::StreamClosed(_)));
    });
    assert_eq!(sim.active_watches(gpio17()), 0);

    // the pin is usable again afterwards
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0, &[700, 800]));
    assert_eq!(engine.record_single(1.0, 0.03).unwrap(), vec![700, 800]);
}

#[test]
fn test_edges_after_release_are_dropped() {
    let (sim, engine) = sim_engine();
    engine.record_single(0.02, 0.02).unwrap();
    assert_eq!(sim.inject(gpio17(), Level::Low, 0), 0);
}

#[test]
fn test_normalize_idempotent_on_capture() {
    let (sim, engine) = sim_engine();
    sim.queue_train(gpio17(), pulse_train(Level::Low, 0, &[9000, 4500, 560, 1690]));

    let pulses = engine.record_single(1.0, 0.05).unwrap();
    let once = normalize_pulses(&pulses);
    assert_eq!(normalize_pulses(&once), once);
    assert_eq!(once, pulses);
}
