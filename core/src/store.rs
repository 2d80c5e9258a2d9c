//! The windowed event store.
//!
//! RULE: Only append(), evict() and enforce_cap() mutate the window.
//! Readers get a WindowSnapshot; they never see the live buffer.
//!
//! Order is insertion order (batch by batch), not time order. The size
//! cap trims from the oldest end of insertion order.

use crate::{
    error::{WindowError, WindowResult},
    event::TxEvent,
    snapshot::WindowSnapshot,
    types::{Timestamp, TransactionId},
};
use std::{collections::HashSet, sync::Arc};

pub struct WindowStore {
    events:      Arc<Vec<TxEvent>>,
    ids:         HashSet<TransactionId>,
    risk_bounds: (u32, u32),
}

impl WindowStore {
    /// Create an empty window that accepts risk scores within `risk_bounds`.
    pub fn new(risk_bounds: (u32, u32)) -> Self {
        Self {
            events: Arc::new(Vec::new()),
            ids: HashSet::new(),
            risk_bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.ids.contains(transaction_id)
    }

    /// Append a batch. All-or-nothing: if any event is invalid or reuses a
    /// live transaction id, nothing is applied.
    /// Returns the number of events appended.
    pub fn append(&mut self, batch: Vec<TxEvent>, now: Timestamp) -> WindowResult<usize> {
        {
            let mut batch_ids: HashSet<&str> = HashSet::with_capacity(batch.len());
            for event in &batch {
                event.validate(now, self.risk_bounds)?;
                let id = event.transaction_id.as_str();
                if self.ids.contains(id) || !batch_ids.insert(id) {
                    return Err(WindowError::validation(id, "duplicate transaction_id"));
                }
            }
        }

        let added = batch.len();
        if added == 0 {
            return Ok(0);
        }
        self.ids.extend(batch.iter().map(|e| e.transaction_id.clone()));
        Arc::make_mut(&mut self.events).extend(batch);
        log::debug!("window: appended {added} events, size now {}", self.len());
        Ok(added)
    }

    /// Remove every event with `timestamp < now - horizon`.
    /// Returns the number of events removed. A cutoff before the earliest
    /// representable instant evicts nothing.
    pub fn evict(&mut self, now: Timestamp, horizon: chrono::Duration) -> usize {
        let Some(cutoff) = now.checked_sub_signed(horizon) else {
            return 0;
        };
        if !self.events.iter().any(|e| e.timestamp < cutoff) {
            return 0;
        }

        let before = self.events.len();
        let ids = &mut self.ids;
        Arc::make_mut(&mut self.events).retain(|e| {
            let keep = e.timestamp >= cutoff;
            if !keep {
                ids.remove(&e.transaction_id);
            }
            keep
        });
        let removed = before - self.events.len();
        log::debug!("window: evicted {removed} events older than {cutoff}");
        removed
    }

    /// Trim the oldest insertion-order events until `len <= cap`.
    /// Returns the number of events removed.
    pub fn enforce_cap(&mut self, cap: usize) -> usize {
        let excess = self.events.len().saturating_sub(cap);
        if excess == 0 {
            return 0;
        }
        let trimmed: Vec<TxEvent> = Arc::make_mut(&mut self.events).drain(..excess).collect();
        for e in &trimmed {
            self.ids.remove(&e.transaction_id);
        }
        log::debug!("window: trimmed {excess} events over cap {cap}");
        excess
    }

    /// Read-only point-in-time copy of the window.
    pub fn snapshot(&self, taken_at: Timestamp) -> WindowSnapshot {
        WindowSnapshot::new(taken_at, Arc::clone(&self.events))
    }
}
