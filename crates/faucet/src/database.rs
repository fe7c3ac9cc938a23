//! Durable log of funding attempts

use crate::error::StoreError;
use crate::model::{FundingAttempt, FundingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::transaction::{TransactionError, TransactionResult};
use sled::{Db, Transactional, Tree};
use tracing::{debug, info};

const ATTEMPTS_TREE: &str = "funding_attempts";
const SUCCESS_INDEX_TREE: &str = "wallet_successes";

/// Append-only store of [`FundingAttempt`] records.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Durably append one attempt.
    async fn record(&self, attempt: &FundingAttempt) -> Result<(), StoreError>;

    /// Latest `Success` attempt for the wallet, by `created_at`.
    async fn most_recent_success(&self, wallet: &str) -> Result<Option<FundingAttempt>, StoreError>;

    /// Attempts with `start <= created_at <= end`, optionally of one status.
    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<FundingStatus>,
    ) -> Result<Vec<FundingAttempt>, StoreError>;

    async fn count_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<FundingStatus>,
    ) -> Result<usize, StoreError> {
        Ok(self.find_in_range(start, end, status).await?.len())
    }
}

fn micros(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_micros().max(0) as u64
}

/// Primary key: created_at micros ++ sled id, both big-endian so that
/// lexicographic order is time order.
fn attempt_key(created_at: DateTime<Utc>, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&micros(created_at).to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Length-prefixed wallet, so one wallet's prefix never matches another's.
fn wallet_prefix(wallet: &str) -> Vec<u8> {
    let bytes = wallet.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    let mut prefix = Vec::with_capacity(2 + len + 16);
    prefix.extend_from_slice(&(len as u16).to_be_bytes());
    prefix.extend_from_slice(&bytes[..len]);
    prefix
}

fn success_index_key(wallet: &str, primary: &[u8; 16]) -> Vec<u8> {
    let mut key = wallet_prefix(wallet);
    key.extend_from_slice(primary);
    key
}

/// sled-backed attempt log
pub struct SledTransactionStore {
    db: Db,
    /// All attempts, keyed by time
    attempts: Tree,
    /// wallet -> primary key, successful attempts only
    success_index: Tree,
}

impl SledTransactionStore {
    /// Create or open the attempt log
    pub fn open(path: &str) -> Result<Self, StoreError> {
        info!("Opening faucet database at: {}", path);

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .open()?;

        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, StoreError> {
        let attempts = db.open_tree(ATTEMPTS_TREE)?;
        let success_index = db.open_tree(SUCCESS_INDEX_TREE)?;

        Ok(Self {
            db,
            attempts,
            success_index,
        })
    }

    /// Number of attempts ever recorded
    pub fn total_records(&self) -> usize {
        self.attempts.len()
    }
}

#[async_trait]
impl TransactionStore for SledTransactionStore {
    async fn record(&self, attempt: &FundingAttempt) -> Result<(), StoreError> {
        let value = bincode::serialize(attempt)?;
        let created_at = attempt.created_at();
        let indexed_wallet = match attempt.status() {
            FundingStatus::Success => Some(attempt.wallet_address().to_string()),
            FundingStatus::Failed => None,
        };

        let db = self.db.clone();
        let attempts = self.attempts.clone();
        let index = self.success_index.clone();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let key = attempt_key(created_at, db.generate_id()?);
            let index_key = indexed_wallet.map(|wallet| success_index_key(&wallet, &key));

            let outcome: TransactionResult<(), ()> =
                (&attempts, &index).transaction(|(attempts, index)| {
                    attempts.insert(&key[..], value.as_slice())?;
                    if let Some(index_key) = &index_key {
                        index.insert(index_key.as_slice(), &key[..])?;
                    }
                    Ok(())
                });

            match outcome {
                Ok(()) => {}
                Err(TransactionError::Storage(e)) => return Err(StoreError::Database(e)),
                Err(TransactionError::Abort(())) => {
                    return Err(StoreError::Transaction("attempt write aborted".to_string()))
                }
            }

            db.flush()?;
            Ok(())
        })
        .await??;

        debug!(
            "Recorded {} attempt for wallet: {}",
            attempt.status(),
            attempt.wallet_address()
        );
        Ok(())
    }

    async fn most_recent_success(&self, wallet: &str) -> Result<Option<FundingAttempt>, StoreError> {
        let prefix = wallet_prefix(wallet);
        let attempts = self.attempts.clone();
        let index = self.success_index.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<FundingAttempt>, StoreError> {
            let Some(entry) = index.scan_prefix(&prefix).next_back() else {
                return Ok(None);
            };
            let (_, primary) = entry?;

            match attempts.get(&primary)? {
                Some(value) => Ok(Some(bincode::deserialize::<FundingAttempt>(&value)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<FundingStatus>,
    ) -> Result<Vec<FundingAttempt>, StoreError> {
        if start > end {
            return Ok(Vec::new());
        }

        let attempts = self.attempts.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<FundingAttempt>, StoreError> {
            let lower = attempt_key(start, 0);
            let upper = attempt_key(end, u64::MAX);
            let mut records = Vec::new();

            for item in attempts.range(lower..=upper) {
                let (_, value) = item?;
                let record: FundingAttempt = bincode::deserialize(&value)?;

                // Keys carry micros; compare the exact timestamps at the edges.
                if record.created_at() < start || record.created_at() > end {
                    continue;
                }
                if status.map_or(true, |s| record.status() == s) {
                    records.push(record);
                }
            }

            Ok(records)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store() -> (SledTransactionStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledTransactionStore::open(temp_dir.path().to_str().unwrap()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_most_recent_success_ignores_failures() {
        let (store, _temp_dir) = open_store();
        let now = Utc::now();
        let wallet = "0x00000000000000000000000000000000000000aa";

        assert!(store.most_recent_success(wallet).await.unwrap().is_none());

        store
            .record(&FundingAttempt::success(wallet, "0x01", 10, "1.1.1.1", now - Duration::hours(3)))
            .await
            .unwrap();
        store
            .record(&FundingAttempt::success(wallet, "0x02", 10, "1.1.1.1", now - Duration::hours(2)))
            .await
            .unwrap();
        store
            .record(&FundingAttempt::failed(wallet, "1.1.1.1", now))
            .await
            .unwrap();

        let latest = store.most_recent_success(wallet).await.unwrap().unwrap();
        assert_eq!(latest.transaction_id(), Some("0x02"));
        assert_eq!(latest.created_at(), now - Duration::hours(2));
    }

    #[tokio::test]
    async fn test_most_recent_success_is_per_wallet() {
        let (store, _temp_dir) = open_store();
        let now = Utc::now();

        store
            .record(&FundingAttempt::success("ab", "0x01", 10, "ip", now))
            .await
            .unwrap();

        assert!(store.most_recent_success("a").await.unwrap().is_none());
        assert!(store.most_recent_success("abc").await.unwrap().is_none());
        assert!(store.most_recent_success("ab").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_in_range_is_inclusive_and_filters_status() {
        let (store, _temp_dir) = open_store();
        let end = Utc::now();
        let start = end - Duration::hours(24);

        store.record(&FundingAttempt::success("w1", "0x01", 1, "ip", start)).await.unwrap();
        store.record(&FundingAttempt::failed("w2", "ip", end)).await.unwrap();
        store
            .record(&FundingAttempt::success("w3", "0x03", 1, "ip", start - Duration::seconds(1)))
            .await
            .unwrap();
        store
            .record(&FundingAttempt::failed("w4", "ip", end + Duration::microseconds(1)))
            .await
            .unwrap();

        let all = store.find_in_range(start, end, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let successes = store
            .find_in_range(start, end, Some(FundingStatus::Success))
            .await
            .unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].wallet_address(), "w1");

        assert_eq!(
            store.count_in_range(start, end, Some(FundingStatus::Failed)).await.unwrap(),
            1
        );
        assert!(store.find_in_range(end, start, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_str().unwrap().to_string();
        let now = Utc::now();

        {
            let store = SledTransactionStore::open(&path).unwrap();
            store.record(&FundingAttempt::success("w", "0x01", 7, "ip", now)).await.unwrap();
            store.record(&FundingAttempt::success("w", "0x02", 7, "ip", now)).await.unwrap();
            assert_eq!(store.total_records(), 2);
        }

        let store = SledTransactionStore::open(&path).unwrap();
        assert_eq!(store.total_records(), 2);
        let latest = store.most_recent_success("w").await.unwrap().unwrap();
        assert_eq!(latest.transaction_id(), Some("0x02"));
    }
}
