//! Funding attempt records and outcomes

use chrono::{DateTime, Utc};
use drip_common::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Terminal outcome of a funding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingStatus {
    Success,
    Failed,
}

impl fmt::Display for FundingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FundingStatus::Success => write!(f, "success"),
            FundingStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One evaluated funding request. Written once, never updated.
///
/// Fields are private so that the only ways to build one are
/// [`FundingAttempt::success`] and [`FundingAttempt::failed`]: a transaction id
/// and a positive amount exist exactly when the status is `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAttempt {
    wallet_address: String,
    transaction_id: Option<String>,
    /// Amount transferred (in wei)
    amount: u128,
    status: FundingStatus,
    ip_address: String,
    created_at: DateTime<Utc>,
}

impl FundingAttempt {
    pub fn success(
        wallet_address: impl Into<String>,
        transaction_id: impl Into<String>,
        amount: u128,
        ip_address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(amount > 0, "successful payouts carry a positive amount");
        Self {
            wallet_address: wallet_address.into(),
            transaction_id: Some(transaction_id.into()),
            amount,
            status: FundingStatus::Success,
            ip_address: ip_address.into(),
            created_at,
        }
    }

    pub fn failed(
        wallet_address: impl Into<String>,
        ip_address: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            transaction_id: None,
            amount: 0,
            status: FundingStatus::Failed,
            ip_address: ip_address.into(),
            created_at,
        }
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn amount(&self) -> u128 {
        self.amount
    }

    pub fn status(&self) -> FundingStatus {
        self.status
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Checks the status / transaction id / amount coupling.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            FundingStatus::Success => self.transaction_id.is_some() && self.amount > 0,
            FundingStatus::Failed => self.transaction_id.is_none() && self.amount == 0,
        }
    }
}

/// What the orchestrator hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingResult {
    Funded { transaction_id: String, amount: u128 },
    /// Wallet is inside its cooldown; `retry_after` is the time left.
    RateLimited { retry_after: Duration },
    ChainError(String),
}

/// Key used for cooldown lookups and persisted records.
///
/// Hex addresses collapse to lowercase `0x` form so checksummed and plain
/// spellings of one account share a cooldown. Anything else is kept as typed.
pub fn normalize_wallet(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<Address>() {
        Ok(address) => address.to_string(),
        Err(_) => trimmed.to_string(),
    }
}
