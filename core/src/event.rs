//! Transaction-risk events: the only thing the window stores.
//!
//! RULE: An event is immutable once created.
//! The store validates events on append; nothing else mutates them.

use crate::{
    error::{WindowError, WindowResult},
    types::{AccountId, Timestamp, TransactionId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive bounds every `risk_score` must fall within.
pub const RISK_SCORE_MIN: u32 = 0;
pub const RISK_SCORE_MAX: u32 = 1000;

/// Largest accepted `amount`. Keeps window-wide sums far from `u64::MAX`.
pub const AMOUNT_MAX: u64 = 1_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    pub transaction_id: TransactionId,
    pub account_id:     AccountId,
    pub merchant:       String,
    pub city:           String,
    pub amount:         u64,
    pub risk_score:     u32,
    pub fraud_type:     FraudType,
    pub status:         TxStatus,
    pub timestamp:      Timestamp,
}

impl TxEvent {
    pub fn is_blocked(&self) -> bool {
        self.status == TxStatus::Blocked
    }

    /// Check the data-model invariants that can be decided from the event
    /// alone plus the ingestion instant. Id uniqueness is the store's job.
    pub fn validate(&self, now: Timestamp, risk_bounds: (u32, u32)) -> WindowResult<()> {
        let id = self.transaction_id.as_str();
        if id.trim().is_empty() {
            return Err(WindowError::validation(id, "empty transaction_id"));
        }
        if self.account_id.trim().is_empty() {
            return Err(WindowError::validation(id, "empty account_id"));
        }
        if self.merchant.trim().is_empty() {
            return Err(WindowError::validation(id, "empty merchant"));
        }
        if self.city.trim().is_empty() {
            return Err(WindowError::validation(id, "empty city"));
        }
        if self.amount == 0 {
            return Err(WindowError::validation(id, "amount must be positive"));
        }
        if self.amount > AMOUNT_MAX {
            return Err(WindowError::validation(
                id,
                format!("amount {} exceeds {AMOUNT_MAX}", self.amount),
            ));
        }
        let (lo, hi) = risk_bounds;
        if self.risk_score < lo || self.risk_score > hi {
            return Err(WindowError::validation(
                id,
                format!("risk_score {} outside [{lo}, {hi}]", self.risk_score),
            ));
        }
        if self.timestamp > now {
            return Err(WindowError::validation(
                id,
                format!("timestamp {} is after ingestion time {now}", self.timestamp),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Blocked,
    Review,
    Approved,
}

impl TxStatus {
    pub const ALL: [TxStatus; 3] = [Self::Blocked, Self::Review, Self::Approved];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked  => "BLOCKED",
            Self::Review   => "REVIEW",
            Self::Approved => "APPROVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudType {
    CardTesting,
    AccountTakeover,
    FriendlyFraud,
    BotAttack,
    MerchantCompromise,
}

impl FraudType {
    pub const ALL: [FraudType; 5] = [
        Self::CardTesting,
        Self::AccountTakeover,
        Self::FriendlyFraud,
        Self::BotAttack,
        Self::MerchantCompromise,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::CardTesting        => "Card Testing",
            Self::AccountTakeover    => "Account Takeover",
            Self::FriendlyFraud      => "Friendly Fraud",
            Self::BotAttack          => "Bot Attack",
            Self::MerchantCompromise => "Merchant Compromise",
        }
    }
}

impl fmt::Display for FraudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}
