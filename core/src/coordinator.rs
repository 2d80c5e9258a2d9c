//! The refresh coordinator: one ingest, evict, derive, publish cycle.
//!
//! CYCLE ORDER (fixed, documented, never reordered):
//!   1. Re-serve the last bundle if it is still fresh.
//!   2. Pull a batch from the event source under the ingestion budget.
//!   3. Append the batch (all-or-nothing).
//!   4. Evict against the cycle's start time, then enforce the size cap.
//!   5. Snapshot the window.
//!   6. Derive aggregates and the graph from that one snapshot.
//!   7. Publish snapshot and bundle together.
//!
//! RULES:
//!   - Cycles are serialized by the window lock.
//!   - Readers only ever see the last committed snapshot and bundle.
//!   - A failure in steps 2-3 leaves the window and bundle untouched.
//!   - A failure in step 6 degrades that view only.
//!   - At most one source pull is in flight. While a timed-out pull is
//!     still running, later cycles fail fast instead of queueing.

use crate::{
    bundle::{self, KpiDelta, ViewBundle},
    config::WindowConfig,
    error::{WindowError, WindowResult},
    event::TxEvent,
    filter::{self, EventFilter},
    generator::{EventSource, SyntheticSource},
    snapshot::WindowSnapshot,
    store::WindowStore,
    types::{CycleId, Timestamp},
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Cycling,
}

/// What readers are allowed to see: the output of the last good cycle.
struct Published {
    snapshot: WindowSnapshot,
    bundle:   Option<Arc<ViewBundle>>,
}

pub struct RefreshCoordinator {
    config:    WindowConfig,
    source:    Arc<Mutex<Box<dyn EventSource>>>,
    window:    Mutex<WindowStore>,
    published: RwLock<Published>,
    cycling:   AtomicBool,
    pulling:   Arc<AtomicBool>,
    failures:  AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(config: WindowConfig, source: Box<dyn EventSource>) -> WindowResult<Self> {
        config.validate()?;
        let window = WindowStore::new(config.risk_bounds());
        Ok(Self {
            source: Arc::new(Mutex::new(source)),
            window: Mutex::new(window),
            published: RwLock::new(Published {
                snapshot: WindowSnapshot::empty(Utc::now()),
                bundle:   None,
            }),
            cycling: AtomicBool::new(false),
            pulling: Arc::new(AtomicBool::new(false)),
            failures: AtomicU64::new(0),
            config,
        })
    }

    /// Coordinator fed by the seeded synthetic source from `config.generator`.
    pub fn with_synthetic(config: WindowConfig) -> WindowResult<Self> {
        let source = SyntheticSource::new(config.generator.clone())?;
        Self::new(config, Box::new(source))
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn phase(&self) -> CyclePhase {
        if self.cycling.load(Ordering::Acquire) {
            CyclePhase::Cycling
        } else {
            CyclePhase::Idle
        }
    }

    /// Run a cycle against the wall clock.
    pub fn refresh(&self) -> WindowResult<Arc<ViewBundle>> {
        self.refresh_at(Utc::now())
    }

    /// Run a cycle as of `now`, or re-serve the last bundle if it is
    /// younger than the freshness interval.
    pub fn refresh_at(&self, now: Timestamp) -> WindowResult<Arc<ViewBundle>> {
        if let Some(bundle) = self.fresh_bundle(now) {
            log::debug!("cycle {}: still fresh, re-serving", bundle.cycle);
            return Ok(bundle);
        }

        let mut window = self.window.lock();
        // Another caller may have completed a cycle while we waited.
        if let Some(bundle) = self.fresh_bundle(now) {
            return Ok(bundle);
        }

        let outcome = {
            let _phase = CycleGuard::enter(&self.cycling);
            self.run_cycle(&mut window, now)
        };

        match outcome {
            Ok(bundle) => Ok(bundle),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("cycle aborted, previous window retained: {e}");
                Err(e)
            }
        }
    }

    /// Refresh for a presentation caller. A failed cycle is reported in
    /// the log and the previous bundle is served instead.
    pub fn serve_at(&self, now: Timestamp) -> Option<Arc<ViewBundle>> {
        match self.refresh_at(now) {
            Ok(bundle) => Some(bundle),
            Err(_) => self.latest(),
        }
    }

    /// The last published bundle, if any cycle has succeeded.
    pub fn latest(&self) -> Option<Arc<ViewBundle>> {
        self.published.read().bundle.clone()
    }

    /// The snapshot the last published bundle was derived from.
    pub fn committed_snapshot(&self) -> WindowSnapshot {
        self.published.read().snapshot.clone()
    }

    /// Ad-hoc query over the last committed snapshot.
    pub fn filter(&self, f: &EventFilter) -> Vec<TxEvent> {
        filter::filter(&self.committed_snapshot(), f)
    }

    /// Filtered events, newest first, at most `limit` rows.
    pub fn explore(&self, f: &EventFilter, limit: usize) -> Vec<TxEvent> {
        filter::newest_first(self.filter(f), limit)
    }

    /// Current number of events in the live window.
    pub fn window_len(&self) -> usize {
        self.window.lock().len()
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn fresh_bundle(&self, now: Timestamp) -> Option<Arc<ViewBundle>> {
        let bundle = self.latest()?;
        let age = now - bundle.generated_at;
        if age >= chrono::Duration::zero() && age < self.config.freshness() {
            Some(bundle)
        } else {
            None
        }
    }

    fn run_cycle(&self, window: &mut WindowStore, now: Timestamp) -> WindowResult<Arc<ViewBundle>> {
        let batch = self.pull_batch(now)?;
        let ingested = window.append(batch, now)?;
        let evicted = window.evict(now, self.config.horizon());
        let trimmed = window.enforce_cap(self.config.size_cap);
        let snapshot = window.snapshot(now);

        let views = bundle::derive(&snapshot, &self.config);
        let previous = self.latest();
        let cycle: CycleId = previous.as_ref().map_or(1, |b| b.cycle + 1);

        let bundle = Arc::new(ViewBundle {
            cycle,
            generated_at: now,
            window_len: snapshot.len(),
            ingested,
            evicted,
            trimmed,
            kpi_delta: KpiDelta::between(previous.as_ref().map(|b| &b.totals), &views.totals),
            totals: views.totals,
            blocked_by_city: views.blocked_by_city,
            by_merchant: views.by_merchant,
            merchant_ranking: views.merchant_ranking,
            by_hour: views.by_hour,
            top_risky: views.top_risky,
            risk_histogram: views.risk_histogram,
            graph: views.graph,
            warnings: views.warnings,
        });

        {
            let mut published = self.published.write();
            published.snapshot = snapshot;
            published.bundle = Some(Arc::clone(&bundle));
        }

        log::info!(
            "cycle {cycle}: +{ingested} -{evicted} evicted -{trimmed} trimmed, window={} blocked={} rate={:.2}%",
            bundle.window_len,
            bundle.totals.blocked_count,
            bundle.totals.detection_rate
        );
        Ok(bundle)
    }

    /// Call the source on its own thread and wait at most the ingestion
    /// budget. A late batch is dropped with its channel.
    fn pull_batch(&self, now: Timestamp) -> WindowResult<Vec<TxEvent>> {
        let Some(slot) = PullSlot::claim(&self.pulling) else {
            return Err(WindowError::Source("previous pull still running".into()));
        };
        let budget = self.config.ingestion_timeout();
        let source = Arc::clone(&self.source);
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("event-source".into())
            .spawn(move || {
                let result = source.lock().next_batch(now);
                // Free the slot before replying so the next cycle can pull.
                drop(slot);
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(WindowError::IngestionTimeout {
                budget_ms: self.config.ingestion_timeout_ms,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(WindowError::Source("event source thread panicked".into()))
            }
        }
    }
}

/// Holds the coordinator in `Cycling` until dropped, including on unwind.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The single in-flight source pull. Released when the pulling thread
/// is done with the source, or if it never starts.
struct PullSlot(Arc<AtomicBool>);

impl PullSlot {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self(Arc::clone(flag)))
    }
}

impl Drop for PullSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
