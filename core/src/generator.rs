//! Event sources: where each cycle's batch comes from.
//!
//! The coordinator only knows the EventSource trait. SyntheticSource
//! produces the live-demo traffic; a real feed can replace it without
//! touching the window or the derived views.

use crate::{
    config::GeneratorConfig,
    error::{WindowError, WindowResult},
    event::{TxEvent, TxStatus},
    rng::{RngStream, SeededRng},
    types::Timestamp,
};

/// The contract every event source must fulfill.
pub trait EventSource: Send {
    /// Unique stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Produce the next batch. Called once per refresh cycle with the
    /// cycle's start time. Events must not be timestamped after `now`.
    fn next_batch(&mut self, now: Timestamp) -> WindowResult<Vec<TxEvent>>;
}

/// Seeded synthetic traffic with a bimodal risk distribution.
pub struct SyntheticSource {
    config: GeneratorConfig,
    rng:    SeededRng,
}

impl SyntheticSource {
    pub fn new(config: GeneratorConfig) -> WindowResult<Self> {
        config.validate()?;
        let rng = SeededRng::new(config.seed, RngStream::Generator);
        Ok(Self { config, rng })
    }

    fn risk_score(&mut self) -> u32 {
        let (lo, hi) = if self.rng.chance(self.config.high_risk_probability) {
            self.config.high_risk_band
        } else {
            self.config.low_risk_band
        };
        self.rng.range_inclusive(u64::from(lo), u64::from(hi)) as u32
    }

    fn status(&mut self) -> TxStatus {
        let weights: Vec<f64> = self.config.status_weights.iter().map(|w| w.weight).collect();
        let idx = self.rng.weighted_index(&weights);
        self.config.status_weights[idx].value
    }

    fn generate_one(&mut self, now: Timestamp) -> TxEvent {
        let transaction_id = uuid::Builder::from_random_bytes(self.rng.next_bytes16())
            .into_uuid()
            .to_string();
        let account_id = format!(
            "AC{}",
            self.rng.range_inclusive(self.config.account_id_min, self.config.account_id_max)
        );
        let merchant_idx = self.rng.next_u64_below(self.config.merchants.len() as u64) as usize;
        let merchant = self.config.merchants[merchant_idx].clone();
        let city_idx = self.rng.next_u64_below(self.config.cities.len() as u64) as usize;
        let city = self.config.cities[city_idx].clone();
        let amount = self.rng.range_inclusive(self.config.amount_min, self.config.amount_max);
        let risk_score = self.risk_score();

        let fraud_weights: Vec<f64> =
            self.config.fraud_type_weights.iter().map(|w| w.weight).collect();
        let fraud_type = self.config.fraud_type_weights[self.rng.weighted_index(&fraud_weights)].value;
        let status = self.status();

        // Backdate to simulate network and processing delay.
        let jitter = self.rng.next_u64_below(self.config.max_jitter_secs + 1) as i64;
        let timestamp = now
            .checked_sub_signed(chrono::Duration::seconds(jitter))
            .unwrap_or(now);

        TxEvent {
            transaction_id,
            account_id,
            merchant,
            city,
            amount,
            risk_score,
            fraud_type,
            status,
            timestamp,
        }
    }
}

impl EventSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn next_batch(&mut self, now: Timestamp) -> WindowResult<Vec<TxEvent>> {
        let count = self.rng.range_inclusive(self.config.batch_min, self.config.batch_max);
        let batch: Vec<TxEvent> = (0..count).map(|_| self.generate_one(now)).collect();
        log::debug!("source={} generated {} events", self.name(), batch.len());
        Ok(batch)
    }
}

/// A fixed queue of batches, replayed in order. Used by replay tooling
/// and tests that need exact control over what each cycle ingests.
pub struct ReplaySource {
    batches: std::collections::VecDeque<Vec<TxEvent>>,
}

impl ReplaySource {
    pub fn new(batches: Vec<Vec<TxEvent>>) -> Self {
        Self { batches: batches.into() }
    }

    pub fn remaining(&self) -> usize {
        self.batches.len()
    }
}

impl EventSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn next_batch(&mut self, _now: Timestamp) -> WindowResult<Vec<TxEvent>> {
        self.batches
            .pop_front()
            .ok_or_else(|| WindowError::Source("replay source exhausted".into()))
    }
}
