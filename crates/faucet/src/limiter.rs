//! Cooldown check over the attempt log

use crate::clock::Clock;
use crate::database::TransactionStore;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// True while `now - last_success` is shorter than `cooldown`.
pub fn within_cooldown(last_success: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    match (now - last_success).to_std() {
        Ok(elapsed) => elapsed < cooldown,
        // Record is from the future (clock skew); treat it as just paid.
        Err(_) => !cooldown.is_zero(),
    }
}

/// Read-only cooldown decision. Only successful payouts start a cooldown.
pub struct RateLimiter {
    store: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TransactionStore>, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            store,
            clock,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn is_rate_limited(&self, wallet: &str) -> Result<bool, StoreError> {
        Ok(self.remaining_cooldown(wallet).await?.is_some())
    }

    /// Time left before the wallet may be funded again, `None` if it may be
    /// funded now.
    pub async fn remaining_cooldown(&self, wallet: &str) -> Result<Option<Duration>, StoreError> {
        let Some(last) = self.store.most_recent_success(wallet).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        let limited = within_cooldown(last.created_at(), now, self.cooldown);
        debug!(
            "Wallet {} last funded at {}, limited: {}",
            wallet,
            last.created_at().to_rfc3339(),
            limited
        );
        if !limited {
            return Ok(None);
        }

        let elapsed = (now - last.created_at()).to_std().unwrap_or(Duration::ZERO);
        Ok(Some(self.cooldown.saturating_sub(elapsed)))
    }
}
