//! Shared primitive types used across the whole window pipeline.

use chrono::{DateTime, Utc};

/// A point in time. Every timestamp in the window is UTC.
pub type Timestamp = DateTime<Utc>;

/// Unique identifier of a single transaction event.
pub type TransactionId = String;

/// Identifier of the originating account.
pub type AccountId = String;

/// Monotonic refresh-cycle counter. Cycle 0 means "no cycle has run".
pub type CycleId = u64;
