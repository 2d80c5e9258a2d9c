//! Ad-hoc exploration queries over a committed snapshot.
//!
//! Read-only. A filter field left as `None` matches everything.

use crate::event::{TxEvent, TxStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Default row limit for the explorer table.
pub const EXPLORER_ROW_LIMIT: usize = 300;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilter {
    pub city:           Option<String>,
    pub merchant:       Option<String>,
    pub status:         Option<TxStatus>,
    pub min_risk_score: u32,
}

impl EventFilter {
    pub fn matches(&self, e: &TxEvent) -> bool {
        self.city.as_deref().is_none_or(|c| e.city == c)
            && self.merchant.as_deref().is_none_or(|m| e.merchant == m)
            && self.status.is_none_or(|s| e.status == s)
            && e.risk_score >= self.min_risk_score
    }
}

/// Events matching `filter`, in snapshot order.
pub fn filter(events: &[TxEvent], filter: &EventFilter) -> Vec<TxEvent> {
    events.iter().filter(|e| filter.matches(e)).cloned().collect()
}

/// Newest events first, at most `limit` of them.
pub fn newest_first(mut events: Vec<TxEvent>, limit: usize) -> Vec<TxEvent> {
    events.sort_by_key(|e| Reverse(e.timestamp));
    events.truncate(limit);
    events
}

/// Distinct cities present in the events, sorted. Feeds filter pickers.
pub fn distinct_cities(events: &[TxEvent]) -> Vec<String> {
    distinct(events.iter().map(|e| e.city.as_str()))
}

/// Distinct merchants present in the events, sorted.
pub fn distinct_merchants(events: &[TxEvent]) -> Vec<String> {
    distinct(events.iter().map(|e| e.merchant.as_str()))
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let set: std::collections::BTreeSet<&str> = values.collect();
    set.into_iter().map(String::from).collect()
}
