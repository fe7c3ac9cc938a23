//! Per-wallet leases
//!
//! A funding attempt holds its wallet's lease from the cooldown read until the
//! outcome is recorded, so one wallet never has two attempts in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Drop entries only the table still references: released leases, and
/// waiters that were cancelled after their holder left.
fn sweep(table: &mut HashMap<String, Arc<AsyncMutex<()>>>) {
    table.retain(|_, lock| Arc::strong_count(lock) > 1);
}

#[derive(Default, Clone)]
pub struct WalletLocks {
    table: LockTable,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease on `wallet`.
    pub async fn acquire(&self, wallet: &str) -> WalletLease {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            sweep(&mut table);
            table
                .entry(wallet.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        WalletLease {
            wallet: wallet.to_string(),
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    /// Wallets with a holder or waiter.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held lease; released on drop.
pub struct WalletLease {
    wallet: String,
    table: LockTable,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WalletLease {
    pub fn wallet(&self) -> &str {
        &self.wallet
    }
}

impl Drop for WalletLease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        sweep(&mut table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_wallet_is_serialized() {
        let locks = WalletLocks::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _lease = locks.acquire("0xaaa").await;
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_wallets_do_not_block() {
        let locks = WalletLocks::new();
        let first = locks.acquire("0xaaa").await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("0xbbb")).await;
        assert!(second.is_ok());
        assert_eq!(locks.active(), 2);

        drop(first);
        drop(second);
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_pending() {
        let locks = WalletLocks::new();
        let lease = locks.acquire("0xaaa").await;
        assert_eq!(lease.wallet(), "0xaaa");

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _lease = locks.acquire("0xaaa").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(lease);
        assert_eq!(locks.active(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_entry_is_swept() {
        let locks = WalletLocks::new();
        let lease = locks.acquire("0xaaa").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _lease = locks.acquire("0xaaa").await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Holder leaves while the waiter is queued, then the waiter is cancelled.
        drop(lease);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        let other = locks.acquire("0xbbb").await;
        assert_eq!(locks.active(), 1);
        drop(other);
        assert_eq!(locks.active(), 0);
    }
}
