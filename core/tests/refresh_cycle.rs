//! Refresh coordinator tests.
//!
//! Tests cover: a full cycle, freshness caching, atomic abort on
//! validation errors and ingestion timeouts, degraded views, the
//! ad-hoc filter, and concurrent callers.

use chrono::{Duration, TimeZone, Utc};
use riskwindow_core::{
    config::WindowConfig,
    event::AMOUNT_MAX,
    filter::{self, EventFilter},
    generator::{EventSource, ReplaySource},
    types::Timestamp,
    CyclePhase, FraudType, RefreshCoordinator, TxEvent, TxStatus, WindowError, WindowResult,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};

fn base() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn ev(id: &str, status: TxStatus, amount: u64, risk: u32, ts: Timestamp) -> TxEvent {
    TxEvent {
        transaction_id: id.to_string(),
        account_id:     format!("AC{id}"),
        merchant:       "Vodafone Cash".into(),
        city:           "Cairo".into(),
        amount,
        risk_score:     risk,
        fraud_type:     FraudType::CardTesting,
        status,
        timestamp:      ts,
    }
}

fn replay(config: WindowConfig, batches: Vec<Vec<TxEvent>>) -> RefreshCoordinator {
    RefreshCoordinator::new(config, Box::new(ReplaySource::new(batches))).expect("coordinator")
}

/// A source that never answers within any sane budget.
struct StalledSource;

impl EventSource for StalledSource {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn next_batch(&mut self, _now: Timestamp) -> WindowResult<Vec<TxEvent>> {
        thread::sleep(std::time::Duration::from_millis(500));
        Ok(Vec::new())
    }
}

/// A slow source that counts how often it is asked for a batch.
struct CountingSlowSource {
    calls: Arc<AtomicUsize>,
    delay: std::time::Duration,
}

impl EventSource for CountingSlowSource {
    fn name(&self) -> &'static str {
        "counting-slow"
    }

    fn next_batch(&mut self, _now: Timestamp) -> WindowResult<Vec<TxEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        Ok(Vec::new())
    }
}

#[test]
fn cycle_publishes_bundle() {
    let now = base();
    let coord = replay(
        WindowConfig::default_test(),
        vec![vec![
            ev("a", TxStatus::Blocked, 100, 900, now),
            ev("b", TxStatus::Blocked, 200, 870, now),
            ev("c", TxStatus::Approved, 50, 600, now),
        ]],
    );

    let bundle = coord.refresh_at(now).unwrap();

    assert_eq!(bundle.cycle, 1);
    assert_eq!(bundle.ingested, 3);
    assert_eq!(bundle.window_len, 3);
    assert_eq!(bundle.totals.blocked_count, 2);
    assert_eq!(bundle.totals.blocked_amount_sum, 300);
    assert_eq!(bundle.top_risky[0].transaction_id, "a");
    assert_eq!(bundle.graph.edges.len(), 2);
    assert!(bundle.warnings.is_empty());
    assert_eq!(coord.phase(), CyclePhase::Idle);
    assert_eq!(coord.committed_snapshot().len(), 3);
}

/// An empty batch on an empty window yields a zeroed bundle.
#[test]
fn empty_window_bundle() {
    let coord = replay(WindowConfig::default_test(), vec![vec![]]);

    let bundle = coord.refresh_at(base()).unwrap();

    assert_eq!(bundle.totals.total_count, 0);
    assert_eq!(bundle.totals.detection_rate, 0.0);
    assert!(bundle.top_risky.is_empty());
    assert!(bundle.risk_histogram.is_empty());
    assert!(bundle.graph.is_empty());
    assert!(bundle.warnings.is_empty());
}

/// Within the freshness interval the same bundle is re-served.
#[test]
fn fresh_bundle_is_reused() {
    let now = base();
    let config = WindowConfig { freshness_secs: 60, ..WindowConfig::default_test() };
    let coord = replay(
        config,
        vec![
            vec![ev("a", TxStatus::Review, 10, 600, now)],
            vec![ev("b", TxStatus::Review, 10, 600, now + Duration::seconds(61))],
        ],
    );

    let first = coord.refresh_at(now).unwrap();
    let again = coord.refresh_at(now + Duration::seconds(30)).unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let later = coord.refresh_at(now + Duration::seconds(61)).unwrap();
    assert_eq!(later.cycle, 2);
    assert_eq!(later.window_len, 2);
}

#[test]
fn oversized_horizon_is_rejected_up_front() {
    let config = WindowConfig { horizon_secs: 10_000_000_000_000, ..WindowConfig::default_test() };
    let result = RefreshCoordinator::new(config, Box::new(ReplaySource::new(vec![])));
    assert!(matches!(result, Err(WindowError::Config(_))));
}

/// A batch with an invalid event aborts the cycle; the window and the
/// previous bundle are left as they were.
#[test]
fn validation_error_aborts_cycle() {
    let now = base();
    let coord = replay(
        WindowConfig::default_test(),
        vec![
            vec![ev("a", TxStatus::Blocked, 100, 900, now)],
            vec![
                ev("b", TxStatus::Blocked, 100, 900, now),
                ev("c", TxStatus::Blocked, 0, 900, now),
            ],
        ],
    );

    let first = coord.refresh_at(now).unwrap();
    let err = coord.refresh_at(now + Duration::seconds(10)).unwrap_err();

    assert!(matches!(err, WindowError::Validation { .. }));
    assert_eq!(coord.window_len(), 1);
    assert_eq!(coord.committed_snapshot().len(), 1);
    assert!(Arc::ptr_eq(&first, &coord.latest().unwrap()));
    assert_eq!(coord.failed_cycles(), 1);
}

#[test]
fn ingestion_timeout_fails_cycle() {
    let config = WindowConfig { ingestion_timeout_ms: 50, ..WindowConfig::default_test() };
    let coord = RefreshCoordinator::new(config, Box::new(StalledSource)).unwrap();

    let err = coord.refresh_at(base()).unwrap_err();

    assert!(matches!(err, WindowError::IngestionTimeout { budget_ms: 50 }));
    assert!(err.is_ingestion_failure());
    assert_eq!(coord.window_len(), 0);
    assert!(coord.latest().is_none());
    assert_eq!(coord.phase(), CyclePhase::Idle);
}

/// While a timed-out pull is still running, later cycles fail fast and
/// the source is not asked again. Once it finishes, pulls resume.
#[test]
fn stalled_source_is_not_pulled_again_while_busy() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source = CountingSlowSource {
        calls: Arc::clone(&calls),
        delay: std::time::Duration::from_millis(300),
    };
    let config = WindowConfig { ingestion_timeout_ms: 20, ..WindowConfig::default_test() };
    let coord = RefreshCoordinator::new(config, Box::new(source)).unwrap();

    let first = coord.refresh_at(base()).unwrap_err();
    assert!(matches!(first, WindowError::IngestionTimeout { budget_ms: 20 }));
    for i in 1..6 {
        let err = coord.refresh_at(base() + Duration::seconds(i)).unwrap_err();
        assert!(matches!(err, WindowError::Source(_)), "unexpected error: {err}");
        assert!(err.is_ingestion_failure());
    }
    assert_eq!(coord.failed_cycles(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(coord.phase(), CyclePhase::Idle);

    thread::sleep(std::time::Duration::from_millis(600));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let _ = coord.refresh_at(base() + Duration::seconds(10));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Amounts at the declared ceiling aggregate exactly; one above it
/// aborts the cycle like any other invalid event.
#[test]
fn amount_ceiling_is_enforced_and_sums_stay_exact() {
    let now = base();
    let coord = replay(
        WindowConfig::default_test(),
        vec![
            vec![
                ev("a", TxStatus::Blocked, AMOUNT_MAX, 900, now),
                ev("b", TxStatus::Blocked, AMOUNT_MAX, 910, now),
            ],
            vec![ev("c", TxStatus::Blocked, AMOUNT_MAX + 1, 900, now)],
        ],
    );

    let bundle = coord.refresh_at(now).unwrap();
    assert!(bundle.warnings.is_empty());
    assert_eq!(bundle.totals.blocked_count, 2);
    assert_eq!(bundle.totals.blocked_amount_sum, 2 * AMOUNT_MAX);
    assert_eq!(bundle.kpi_delta.blocked_amount, 0);

    let err = coord.refresh_at(now + Duration::seconds(1)).unwrap_err();
    assert!(matches!(err, WindowError::Validation { .. }));
    assert_eq!(coord.window_len(), 2);
    assert_eq!(coord.phase(), CyclePhase::Idle);
}

/// serve_at falls back to the last good bundle when a cycle fails.
#[test]
fn failed_cycle_reserves_previous_bundle() {
    let now = base();
    let coord = replay(
        WindowConfig::default_test(),
        vec![vec![ev("a", TxStatus::Review, 10, 600, now)]],
    );

    let first = coord.serve_at(now).unwrap();
    // The replay source is exhausted now, so the next cycle fails.
    let served = coord.serve_at(now + Duration::seconds(5)).unwrap();

    assert!(Arc::ptr_eq(&first, &served));
    assert_eq!(coord.failed_cycles(), 1);
}

/// A failing view is served empty with a warning; the rest still works.
#[test]
fn failing_view_degrades_only_itself() {
    let now = base();
    let config = WindowConfig { histogram_buckets: 0, ..WindowConfig::default_test() };
    let coord = replay(
        config,
        vec![vec![
            ev("a", TxStatus::Blocked, 100, 900, now),
            ev("b", TxStatus::Review, 100, 700, now),
        ]],
    );

    let bundle = coord.refresh_at(now).unwrap();

    assert!(bundle.is_degraded());
    assert_eq!(bundle.warnings.len(), 1);
    assert!(bundle.risk_histogram.is_empty());
    assert_eq!(bundle.totals.total_count, 2);
    assert_eq!(bundle.graph.edges.len(), 1);
}

#[test]
fn eviction_uses_cycle_start_time() {
    let now = base();
    let later = now + Duration::hours(25);
    let coord = replay(
        WindowConfig::default_test(),
        vec![
            vec![
                ev("old-1", TxStatus::Review, 10, 600, now),
                ev("old-2", TxStatus::Review, 10, 600, now),
            ],
            vec![ev("new", TxStatus::Review, 10, 600, later)],
        ],
    );

    coord.refresh_at(now).unwrap();
    let bundle = coord.refresh_at(later).unwrap();

    assert_eq!(bundle.evicted, 2);
    assert_eq!(bundle.window_len, 1);
    assert_eq!(coord.committed_snapshot()[0].transaction_id, "new");
}

#[test]
fn size_cap_holds_across_cycles() {
    let config = WindowConfig { size_cap: 100, ..WindowConfig::default_test() };
    let coord = RefreshCoordinator::with_synthetic(config).unwrap();
    let mut now = base();
    let mut trimmed = 0;

    for _ in 0..15 {
        now += Duration::minutes(1);
        let bundle = coord.refresh_at(now).unwrap();
        assert!(bundle.window_len <= 100);
        trimmed += bundle.trimmed;
    }
    assert!(trimmed > 0);
}

#[test]
fn kpi_delta_tracks_previous_bundle() {
    let now = base();
    let coord = replay(
        WindowConfig::default_test(),
        vec![
            vec![ev("a", TxStatus::Blocked, 100, 900, now)],
            vec![
                ev("b", TxStatus::Blocked, 250, 900, now),
                ev("c", TxStatus::Approved, 40, 500, now),
            ],
        ],
    );

    let first = coord.refresh_at(now).unwrap();
    let second = coord.refresh_at(now + Duration::seconds(1)).unwrap();

    assert_eq!(first.kpi_delta.blocked_count, 0);
    assert_eq!(second.kpi_delta.blocked_count, 1);
    assert_eq!(second.kpi_delta.blocked_amount, 250);
}

#[test]
fn filter_queries_committed_snapshot() {
    let now = base();
    let mut uber = ev("u", TxStatus::Blocked, 90, 910, now - Duration::minutes(3));
    uber.merchant = "Uber".into();
    uber.city = "Giza".into();
    let coord = replay(
        WindowConfig::default_test(),
        vec![vec![
            ev("a", TxStatus::Blocked, 100, 900, now - Duration::minutes(10)),
            ev("b", TxStatus::Review, 100, 650, now - Duration::minutes(1)),
            uber,
        ]],
    );
    coord.refresh_at(now).unwrap();

    assert_eq!(coord.filter(&EventFilter::default()).len(), 3);

    let blocked = EventFilter { status: Some(TxStatus::Blocked), ..Default::default() };
    assert_eq!(coord.filter(&blocked).len(), 2);

    let giza_risky = EventFilter {
        city: Some("Giza".into()),
        min_risk_score: 900,
        ..Default::default()
    };
    let hits = coord.filter(&giza_risky);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].merchant, "Uber");

    let none = EventFilter { merchant: Some("Amazon".into()), ..Default::default() };
    assert!(coord.filter(&none).is_empty());

    let newest: Vec<String> = coord
        .explore(&EventFilter::default(), 2)
        .into_iter()
        .map(|e| e.transaction_id)
        .collect();
    assert_eq!(newest, vec!["b", "u"]);

    let snapshot = coord.committed_snapshot();
    assert_eq!(filter::distinct_cities(&snapshot), vec!["Cairo", "Giza"]);
    assert_eq!(filter::distinct_merchants(&snapshot), vec!["Uber", "Vodafone Cash"]);
}

/// Many callers cycling and reading at once never observe a window
/// outside its horizon or over its cap.
#[test]
fn concurrent_callers_see_committed_state() {
    let config = WindowConfig { size_cap: 200, ..WindowConfig::default_test() };
    let horizon = config.horizon();
    let coord = Arc::new(RefreshCoordinator::with_synthetic(config).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let coord = Arc::clone(&coord);
            thread::spawn(move || {
                for i in 0..8 {
                    let now = base() + Duration::minutes(i * 4 + w);
                    coord.refresh_at(now).unwrap();
                    let snap = coord.committed_snapshot();
                    assert!(snap.len() <= 200);
                    assert!(snap.iter().all(|e| e.timestamp >= snap.taken_at - horizon));
                }
            })
        })
        .collect();

    for w in workers {
        w.join().expect("worker panicked");
    }

    let latest = coord.latest().expect("bundle published");
    assert_eq!(latest.cycle, 32);
    assert_eq!(coord.phase(), CyclePhase::Idle);
}
