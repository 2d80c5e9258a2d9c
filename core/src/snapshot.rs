//! Point-in-time, read-only view of the window.
//!
//! A snapshot shares the store's event buffer through an `Arc`. The
//! store copies on write, so later appends and evictions are never
//! visible through a snapshot that has already been handed out.

use crate::{event::TxEvent, types::Timestamp};
use std::{ops::Deref, sync::Arc};

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub taken_at: Timestamp,
    events:       Arc<Vec<TxEvent>>,
}

impl WindowSnapshot {
    pub(crate) fn new(taken_at: Timestamp, events: Arc<Vec<TxEvent>>) -> Self {
        Self { taken_at, events }
    }

    /// A snapshot with no events, used before the first cycle commits.
    pub fn empty(taken_at: Timestamp) -> Self {
        Self::new(taken_at, Arc::new(Vec::new()))
    }

    /// Build a detached snapshot from owned events (tests, replay tooling).
    pub fn from_events(taken_at: Timestamp, events: Vec<TxEvent>) -> Self {
        Self::new(taken_at, Arc::new(events))
    }

    /// Events in insertion order.
    pub fn events(&self) -> &[TxEvent] {
        &self.events
    }

    pub fn to_vec(&self) -> Vec<TxEvent> {
        self.events.as_ref().clone()
    }
}

impl Deref for WindowSnapshot {
    type Target = [TxEvent];

    fn deref(&self) -> &[TxEvent] {
        &self.events
    }
}
