use crate::{
    error::{WindowError, WindowResult},
    event::{AMOUNT_MAX, RISK_SCORE_MAX, RISK_SCORE_MIN},
};
use serde::{Deserialize, Serialize};

/// Longest accepted span for any configured duration (one century).
/// Comfortably inside chrono's date range in either direction.
pub const MAX_SPAN_SECS: u64 = 100 * 365 * 24 * 60 * 60;

// ── Window ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Retention horizon. Events older than `now - horizon` are evicted.
    pub horizon_secs: u64,
    /// Soft cap on retained events, applied after time-based eviction.
    pub size_cap: usize,
    /// A bundle younger than this is re-served instead of recomputed.
    pub freshness_secs: u64,
    /// Time budget for one call into the event source.
    pub ingestion_timeout_ms: u64,
    /// Declared inclusive bounds for `risk_score`.
    pub risk_score_min: u32,
    pub risk_score_max: u32,
    pub top_k: usize,
    pub histogram_buckets: usize,
    /// Seed for graph sampling and layout.
    pub graph_seed: u64,
    pub graph: GraphParams,
    pub generator: GeneratorConfig,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon_secs:         24 * 60 * 60,
            size_cap:             10_000,
            freshness_secs:       60,
            ingestion_timeout_ms: 5_000,
            risk_score_min:       RISK_SCORE_MIN,
            risk_score_max:       RISK_SCORE_MAX,
            top_k:                10,
            histogram_buckets:    25,
            graph_seed:           42,
            graph:                GraphParams::default(),
            generator:            GeneratorConfig::default(),
        }
    }
}

impl WindowConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: WindowConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for unit and integration tests: no caching, small cap,
    /// short ingestion budget.
    pub fn default_test() -> Self {
        Self {
            size_cap:             500,
            freshness_secs:       0,
            ingestion_timeout_ms: 1_000,
            ..Self::default()
        }
    }

    pub fn horizon(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.horizon_secs as i64)
    }

    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_secs as i64)
    }

    pub fn ingestion_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ingestion_timeout_ms)
    }

    pub fn risk_bounds(&self) -> (u32, u32) {
        (self.risk_score_min, self.risk_score_max)
    }

    pub fn validate(&self) -> WindowResult<()> {
        if self.horizon_secs == 0 {
            return Err(WindowError::Config("horizon_secs must be > 0".into()));
        }
        check_span("horizon_secs", self.horizon_secs)?;
        check_span("freshness_secs", self.freshness_secs)?;
        if self.ingestion_timeout_ms == 0 {
            return Err(WindowError::Config("ingestion_timeout_ms must be > 0".into()));
        }
        if self.size_cap == 0 {
            return Err(WindowError::Config("size_cap must be > 0".into()));
        }
        if self.risk_score_min > self.risk_score_max {
            return Err(WindowError::Config(format!(
                "risk_score_min {} > risk_score_max {}",
                self.risk_score_min, self.risk_score_max
            )));
        }
        self.generator.validate()
    }
}

fn check_span(field: &str, secs: u64) -> WindowResult<()> {
    if secs > MAX_SPAN_SECS {
        return Err(WindowError::Config(format!(
            "{field} {secs} exceeds the maximum of {MAX_SPAN_SECS}"
        )));
    }
    Ok(())
}

// ── Relationship graph ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    /// Events with `risk_score >= risk_threshold` are graph candidates.
    pub risk_threshold: u32,
    /// Upper bound on sampled events, to bound layout cost.
    pub max_sample: usize,
    pub layout_iterations: u32,
    /// Optimal node distance for the spring layout.
    pub spring_k: f64,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            risk_threshold:    850,
            max_sample:        50,
            layout_iterations: 50,
            spring_k:          1.0,
        }
    }
}

// ── Synthetic event source ─────────────────────────────────────────

/// A labelled value with a relative sampling weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weighted<T> {
    pub value:  T,
    pub weight: f64,
}

impl<T> Weighted<T> {
    pub fn new(value: T, weight: f64) -> Self {
        Self { value, weight }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub batch_min: u64,
    pub batch_max: u64,
    pub amount_min: u64,
    pub amount_max: u64,
    /// Low band of the bimodal risk distribution.
    pub low_risk_band: (u32, u32),
    /// High band of the bimodal risk distribution.
    pub high_risk_band: (u32, u32),
    /// Probability that an event's score is drawn from the high band.
    pub high_risk_probability: f64,
    /// Maximum backdating applied to a generated event's timestamp.
    pub max_jitter_secs: u64,
    pub account_id_min: u64,
    pub account_id_max: u64,
    pub cities: Vec<String>,
    pub merchants: Vec<String>,
    pub fraud_type_weights: Vec<Weighted<crate::event::FraudType>>,
    pub status_weights: Vec<Weighted<crate::event::TxStatus>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        use crate::event::{FraudType, TxStatus};
        Self {
            seed:                  42,
            batch_min:             15,
            batch_max:             45,
            amount_min:            80,
            amount_max:            28_000,
            low_risk_band:         (500, 750),
            high_risk_band:        (820, 1000),
            high_risk_probability: 0.32,
            max_jitter_secs:       1_800,
            account_id_min:        20_000,
            account_id_max:        99_999,
            cities: [
                "Cairo", "Giza", "Alexandria", "Dakahlia", "Sharqia",
                "Qalyubia", "Beheira", "Monufia", "Asyut", "Sohag",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            merchants: [
                "Amazon", "Noon", "Talabat", "Uber", "Careem",
                "Vodafone Cash", "Fawry", "InstaPay", "Booking.com", "Souq",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            fraud_type_weights: vec![
                Weighted::new(FraudType::CardTesting, 0.28),
                Weighted::new(FraudType::AccountTakeover, 0.18),
                Weighted::new(FraudType::FriendlyFraud, 0.22),
                Weighted::new(FraudType::BotAttack, 0.20),
                Weighted::new(FraudType::MerchantCompromise, 0.12),
            ],
            status_weights: vec![
                Weighted::new(TxStatus::Blocked, 0.24),
                Weighted::new(TxStatus::Review, 0.26),
                Weighted::new(TxStatus::Approved, 0.50),
            ],
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> WindowResult<()> {
        if self.batch_min > self.batch_max {
            return Err(WindowError::Config("generator batch_min > batch_max".into()));
        }
        if self.amount_min == 0 || self.amount_min > self.amount_max {
            return Err(WindowError::Config(
                "generator amount range must be positive and ordered".into(),
            ));
        }
        if self.amount_max > AMOUNT_MAX {
            return Err(WindowError::Config(format!(
                "generator amount_max {} exceeds {AMOUNT_MAX}",
                self.amount_max
            )));
        }
        if self.low_risk_band.0 > self.low_risk_band.1
            || self.high_risk_band.0 > self.high_risk_band.1
        {
            return Err(WindowError::Config("generator risk band is inverted".into()));
        }
        check_span("generator max_jitter_secs", self.max_jitter_secs)?;
        if self.account_id_min > self.account_id_max {
            return Err(WindowError::Config("generator account id range is inverted".into()));
        }
        if self.cities.is_empty() || self.merchants.is_empty() {
            return Err(WindowError::Config("generator needs at least one city and merchant".into()));
        }
        if self.fraud_type_weights.is_empty() || self.status_weights.is_empty() {
            return Err(WindowError::Config("generator weight tables must not be empty".into()));
        }
        Ok(())
    }
}
