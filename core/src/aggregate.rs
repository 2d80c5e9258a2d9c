//! Aggregation engine: grouped statistics and rankings over a snapshot.
//!
//! Every function here is pure: same events in, same result out.
//! No state is kept between calls and no randomness is used.

use crate::{
    error::{ViewError, ViewResult},
    event::TxEvent,
    types::Timestamp,
};
use chrono::DurationRound;
use serde::{Deserialize, Serialize};
use std::{cmp::Reverse, collections::BTreeMap};

// ── Totals ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub total_count:        usize,
    pub blocked_count:      usize,
    /// Saturates at `u64::MAX` rather than wrapping.
    pub blocked_amount_sum: u64,
    /// Percentage of events that were blocked, rounded to two decimals.
    /// Zero for an empty window.
    pub detection_rate:     f64,
}

pub fn totals<'a, I>(events: I) -> Totals
where
    I: IntoIterator<Item = &'a TxEvent>,
{
    let mut out = Totals::default();
    for e in events {
        out.total_count += 1;
        if e.is_blocked() {
            out.blocked_count += 1;
            out.blocked_amount_sum = out.blocked_amount_sum.saturating_add(e.amount);
        }
    }
    out.detection_rate = if out.total_count > 0 {
        round2(out.blocked_count as f64 / out.total_count as f64 * 100.0)
    } else {
        0.0
    };
    out
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ── Grouping ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count:           usize,
    pub amount_sum:      u64,
    pub mean_risk_score: f64,
}

#[derive(Default)]
struct GroupAcc {
    count:      usize,
    amount_sum: u64,
    risk_sum:   u64,
}

/// Group events by an arbitrary key. Keys come back in ascending order.
pub fn group_by<'a, K, I, F>(events: I, key_fn: F) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    I: IntoIterator<Item = &'a TxEvent>,
    F: Fn(&TxEvent) -> K,
{
    let mut acc: BTreeMap<K, GroupAcc> = BTreeMap::new();
    for e in events {
        let slot = acc.entry(key_fn(e)).or_default();
        slot.count += 1;
        slot.amount_sum = slot.amount_sum.saturating_add(e.amount);
        slot.risk_sum = slot.risk_sum.saturating_add(u64::from(e.risk_score));
    }
    acc.into_iter()
        .map(|(k, a)| {
            let mean = if a.count > 0 { a.risk_sum as f64 / a.count as f64 } else { 0.0 };
            (
                k,
                GroupStats {
                    count:           a.count,
                    amount_sum:      a.amount_sum,
                    mean_risk_score: mean,
                },
            )
        })
        .collect()
}

/// Floor a timestamp to the start of its hour.
pub fn hour_bucket(ts: Timestamp) -> Timestamp {
    ts.duration_trunc(chrono::Duration::hours(1)).unwrap_or(ts)
}

/// Blocked events per city.
pub fn blocked_by_city(events: &[TxEvent]) -> BTreeMap<String, GroupStats> {
    group_by(events.iter().filter(|e| e.is_blocked()), |e| e.city.clone())
}

pub fn by_merchant(events: &[TxEvent]) -> BTreeMap<String, GroupStats> {
    group_by(events, |e| e.merchant.clone())
}

/// All events per hour bucket, oldest hour first.
pub fn by_hour(events: &[TxEvent]) -> BTreeMap<Timestamp, GroupStats> {
    group_by(events, |e| hour_bucket(e.timestamp))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGroup {
    pub key:   String,
    pub stats: GroupStats,
}

/// Groups ordered by mean risk score, highest first. Ties keep key order.
pub fn rank_by_mean_risk(groups: &BTreeMap<String, GroupStats>, limit: usize) -> Vec<RankedGroup> {
    let mut ranked: Vec<RankedGroup> = groups
        .iter()
        .map(|(k, s)| RankedGroup { key: k.clone(), stats: s.clone() })
        .collect();
    ranked.sort_by(|a, b| b.stats.mean_risk_score.total_cmp(&a.stats.mean_risk_score));
    ranked.truncate(limit);
    ranked
}

// ── Rankings ─────────────────────────────────────────────────────────────────

/// The `k` events with the highest risk score. The sort is stable, so
/// equal scores keep their snapshot order.
pub fn top_k(events: &[TxEvent], k: usize) -> Vec<TxEvent> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|i| Reverse(events[*i].risk_score));
    order.into_iter().take(k).map(|i| events[i].clone()).collect()
}

// ── Histogram ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram of `risk_score` over the observed min/max.
///
/// An empty input yields an empty histogram. When every score is equal
/// the span is zero and a single bucket holds everything.
pub fn histogram(events: &[TxEvent], bucket_count: usize) -> ViewResult<Vec<HistogramBucket>> {
    if bucket_count == 0 {
        return Err(ViewError::InvalidParameter {
            view:   "histogram",
            reason: "bucket_count must be > 0".into(),
        });
    }
    let (min, max) = match (
        events.iter().map(|e| e.risk_score).min(),
        events.iter().map(|e| e.risk_score).max(),
    ) {
        (Some(lo), Some(hi)) => (f64::from(lo), f64::from(hi)),
        _ => return Ok(Vec::new()),
    };

    let span = max - min;
    if span == 0.0 {
        return Ok(vec![HistogramBucket { lower: min, upper: max, count: events.len() }]);
    }

    let width = span / bucket_count as f64;
    let mut buckets: Vec<HistogramBucket> = (0..bucket_count)
        .map(|i| HistogramBucket {
            lower: min + width * i as f64,
            upper: if i + 1 == bucket_count { max } else { min + width * (i + 1) as f64 },
            count: 0,
        })
        .collect();

    for e in events {
        let offset = (f64::from(e.risk_score) - min) / width;
        let idx = (offset.floor() as usize).min(bucket_count - 1);
        buckets[idx].count += 1;
    }
    Ok(buckets)
}
