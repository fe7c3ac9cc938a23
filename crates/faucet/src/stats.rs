//! Read-side counts over the attempt log

use crate::clock::Clock;
use crate::database::TransactionStore;
use crate::error::StoreError;
use crate::model::FundingStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Success and failure counts for one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingStats {
    pub num_success: usize,
    pub num_failed: usize,
}

pub struct StatsAggregator {
    store: Arc<dyn TransactionStore>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn TransactionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Attempts with `status` and `window_start <= created_at <= window_end`.
    pub async fn count_by_status(
        &self,
        status: FundingStatus,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.store
            .count_in_range(window_start, window_end, Some(status))
            .await
    }

    /// Counts for the 24 hours ending now.
    pub async fn last_24_hours(&self) -> Result<FundingStats, StoreError> {
        let end = self.clock.now();
        let start = end - Duration::hours(24);

        Ok(FundingStats {
            num_success: self.count_by_status(FundingStatus::Success, start, end).await?,
            num_failed: self.count_by_status(FundingStatus::Failed, start, end).await?,
        })
    }
}
