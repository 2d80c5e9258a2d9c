//! ViewBundle: everything one refresh cycle publishes.
//!
//! A bundle is a plain value. It holds no references into the store and
//! can be handed to any number of readers without synchronization.

use crate::{
    aggregate::{self, GroupStats, HistogramBucket, RankedGroup, Totals},
    config::WindowConfig,
    event::TxEvent,
    graph::{self, RelationshipGraph},
    snapshot::WindowSnapshot,
    types::{CycleId, Timestamp},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, thread};

/// Number of merchants kept in the "most targeted" ranking.
pub const MERCHANT_RANKING_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBundle {
    pub cycle:        CycleId,
    pub generated_at: Timestamp,
    pub window_len:   usize,
    pub ingested:     usize,
    pub evicted:      usize,
    pub trimmed:      usize,
    pub totals:       Totals,
    pub kpi_delta:    KpiDelta,
    pub blocked_by_city:  BTreeMap<String, GroupStats>,
    pub by_merchant:      BTreeMap<String, GroupStats>,
    pub merchant_ranking: Vec<RankedGroup>,
    pub by_hour:          BTreeMap<Timestamp, GroupStats>,
    pub top_risky:        Vec<TxEvent>,
    pub risk_histogram:   Vec<HistogramBucket>,
    pub graph:            RelationshipGraph,
    /// Derived views that failed this cycle and were served empty.
    pub warnings: Vec<String>,
}

impl ViewBundle {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Change of the headline blocking KPIs since the previous bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub blocked_count:  i64,
    pub blocked_amount: i64,
}

impl KpiDelta {
    /// Zero when there is no previous bundle. Deltas clamp to the `i64` range.
    pub fn between(previous: Option<&Totals>, current: &Totals) -> Self {
        match previous {
            Some(prev) => Self {
                blocked_count:  clamped_delta(
                    prev.blocked_count as u128,
                    current.blocked_count as u128,
                ),
                blocked_amount: clamped_delta(
                    u128::from(prev.blocked_amount_sum),
                    u128::from(current.blocked_amount_sum),
                ),
            },
            None => Self::default(),
        }
    }
}

fn clamped_delta(previous: u128, current: u128) -> i64 {
    let delta = current as i128 - previous as i128;
    delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// The derived views of one snapshot, before cycle metadata is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedViews {
    pub totals:           Totals,
    pub blocked_by_city:  BTreeMap<String, GroupStats>,
    pub by_merchant:      BTreeMap<String, GroupStats>,
    pub merchant_ranking: Vec<RankedGroup>,
    pub by_hour:          BTreeMap<Timestamp, GroupStats>,
    pub top_risky:        Vec<TxEvent>,
    pub risk_histogram:   Vec<HistogramBucket>,
    pub graph:            RelationshipGraph,
    pub warnings:         Vec<String>,
}

#[derive(Default)]
struct AggregateViews {
    totals:           Totals,
    blocked_by_city:  BTreeMap<String, GroupStats>,
    by_merchant:      BTreeMap<String, GroupStats>,
    merchant_ranking: Vec<RankedGroup>,
    by_hour:          BTreeMap<Timestamp, GroupStats>,
    top_risky:        Vec<TxEvent>,
    risk_histogram:   Vec<HistogramBucket>,
    warnings:         Vec<String>,
}

fn aggregate_views(events: &[TxEvent], config: &WindowConfig) -> AggregateViews {
    let mut warnings = Vec::new();
    let by_merchant = aggregate::by_merchant(events);
    let merchant_ranking = aggregate::rank_by_mean_risk(&by_merchant, MERCHANT_RANKING_LIMIT);
    let risk_histogram = aggregate::histogram(events, config.histogram_buckets).unwrap_or_else(|e| {
        warnings.push(e.to_string());
        Vec::new()
    });
    AggregateViews {
        totals: aggregate::totals(events),
        blocked_by_city: aggregate::blocked_by_city(events),
        by_merchant,
        merchant_ranking,
        by_hour: aggregate::by_hour(events),
        top_risky: aggregate::top_k(events, config.top_k),
        risk_histogram,
        warnings,
    }
}

/// Compute every derived view of `snapshot`.
///
/// Aggregates and the graph run on separate scoped threads over the same
/// immutable snapshot. A view that fails or panics is replaced by its
/// empty default and reported in `warnings`; the others are unaffected.
pub fn derive(snapshot: &WindowSnapshot, config: &WindowConfig) -> DerivedViews {
    let events = snapshot.events();
    let (aggregates, graph_result) = thread::scope(|s| {
        let graph_handle = s.spawn(|| graph::build(events, &config.graph, config.graph_seed));
        let agg_handle = s.spawn(|| aggregate_views(events, config));
        (agg_handle.join(), graph_handle.join())
    });

    let mut warnings = Vec::new();
    let aggregates = aggregates.unwrap_or_else(|_| {
        warnings.push("aggregation panicked; aggregates served empty".to_string());
        AggregateViews::default()
    });
    warnings.extend(aggregates.warnings.iter().cloned());

    let graph = match graph_result {
        Ok(Ok(graph)) => graph,
        Ok(Err(e)) => {
            warnings.push(e.to_string());
            RelationshipGraph::default()
        }
        Err(_) => {
            warnings.push("graph build panicked; graph served empty".to_string());
            RelationshipGraph::default()
        }
    };

    for w in &warnings {
        log::warn!("derived view degraded: {w}");
    }

    DerivedViews {
        totals: aggregates.totals,
        blocked_by_city: aggregates.blocked_by_city,
        by_merchant: aggregates.by_merchant,
        merchant_ranking: aggregates.merchant_ranking,
        by_hour: aggregates.by_hour,
        top_risky: aggregates.top_risky,
        risk_histogram: aggregates.risk_histogram,
        graph,
        warnings,
    }
}
