//! Shared fixtures for faucet integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{Address, TxHash};
use drip_faucet::{
    ChainError, ChainGateway, Clock, FaucetMetrics, FaucetService, FundingAttempt, FundingOrchestrator,
    FundingSettings, FundingStatus, ManualClock, OperatorWallet, SledTransactionStore,
    StatsAggregator, StoreError, TransactionStore, TransferRequest,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const OPERATOR_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const WALLET: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const PAYOUT: u128 = 50_000_000_000_000_000;
pub const GAS_PRICE: u128 = 20_000_000_000;

/// Hash whose hex starts with `deadbeef`.
pub fn deadbeef_hash() -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    TxHash(bytes)
}

pub enum ChainReply {
    Hash(TxHash),
    Fail(String),
    Hang,
}

/// Scripted chain. Replies are consumed in order; with none queued it
/// signs for real and returns the local hash.
///
/// Behaves like a node's pending pool: `get_nonce` reports the count of
/// accepted transfers, and a transfer reusing an older nonce is rejected.
pub struct FakeChain {
    replies: Mutex<VecDeque<ChainReply>>,
    sent: Mutex<Vec<TransferRequest>>,
    pending_nonce: Mutex<u64>,
    nonce_calls: AtomicUsize,
    pub delay: Mutex<Duration>,
    pub balance: u128,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            pending_nonce: Mutex::new(0),
            nonce_calls: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            balance: 10_000_000_000_000_000_000,
        }
    }

    pub fn push(&self, reply: ChainReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn sent(&self) -> Vec<TransferRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainGateway for FakeChain {
    async fn get_nonce(&self, _address: &Address) -> Result<u64, ChainError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.pending_nonce.lock().unwrap())
    }

    async fn sign_and_send(
        &self,
        transfer: &TransferRequest,
        operator: &OperatorWallet,
    ) -> Result<TxHash, ChainError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        let hash = match reply {
            Some(ChainReply::Fail(message)) => return Err(ChainError::Transport(message)),
            Some(ChainReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Err(ChainError::Transport("unreachable".to_string()));
            }
            Some(ChainReply::Hash(hash)) => hash,
            None => operator.sign_transfer(transfer, 11_155_111)?.hash,
        };

        let mut pending = self.pending_nonce.lock().unwrap();
        if transfer.nonce < *pending {
            return Err(ChainError::Rpc("nonce too low".to_string()));
        }
        *pending = transfer.nonce + 1;
        self.sent.lock().unwrap().push(transfer.clone());
        Ok(hash)
    }

    async fn get_balance(&self, _address: &Address) -> Result<u128, ChainError> {
        Ok(self.balance)
    }
}

/// Sled store whose writes can be switched off.
pub struct FlakyStore {
    pub inner: SledTransactionStore,
    pub fail_success_writes: AtomicBool,
    pub fail_failed_writes: AtomicBool,
}

#[async_trait]
impl TransactionStore for FlakyStore {
    async fn record(&self, attempt: &FundingAttempt) -> Result<(), StoreError> {
        let fail = match attempt.status() {
            FundingStatus::Success => self.fail_success_writes.load(Ordering::SeqCst),
            FundingStatus::Failed => self.fail_failed_writes.load(Ordering::SeqCst),
        };
        if fail {
            return Err(StoreError::Transaction("disk full".to_string()));
        }
        self.inner.record(attempt).await
    }

    async fn most_recent_success(&self, wallet: &str) -> Result<Option<FundingAttempt>, StoreError> {
        self.inner.most_recent_success(wallet).await
    }

    async fn find_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: Option<FundingStatus>,
    ) -> Result<Vec<FundingAttempt>, StoreError> {
        self.inner.find_in_range(start, end, status).await
    }
}

pub struct Harness {
    pub orchestrator: Arc<FundingOrchestrator>,
    pub stats: StatsAggregator,
    pub store: Arc<FlakyStore>,
    pub chain: Arc<FakeChain>,
    pub clock: Arc<ManualClock>,
    pub metrics: FaucetMetrics,
    _temp_dir: TempDir,
}

impl Harness {
    pub fn new(cooldown_secs: u64) -> Self {
        Self::with_timeout(cooldown_secs, Duration::from_secs(5))
    }

    pub fn with_timeout(cooldown_secs: u64, chain_timeout: Duration) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyStore {
            inner: SledTransactionStore::open(temp_dir.path().to_str().unwrap()).unwrap(),
            fail_success_writes: AtomicBool::new(false),
            fail_failed_writes: AtomicBool::new(false),
        });
        let chain = Arc::new(FakeChain::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let metrics = FaucetMetrics::new().unwrap();
        let operator = Arc::new(OperatorWallet::from_private_key(OPERATOR_KEY).unwrap());

        let settings = FundingSettings {
            payout_amount: PAYOUT,
            gas_price: GAS_PRICE,
            gas_limit: 21000,
            cooldown: Duration::from_secs(cooldown_secs),
            chain_timeout,
        };

        let orchestrator = Arc::new(FundingOrchestrator::new(
            store.clone(),
            chain.clone(),
            operator,
            clock.clone(),
            settings,
            metrics.clone(),
        ));
        let stats = StatsAggregator::new(store.clone(), clock.clone());

        Self {
            orchestrator,
            stats,
            store,
            chain,
            clock,
            metrics,
            _temp_dir: temp_dir,
        }
    }

    /// Every record ever written.
    pub async fn all_records(&self) -> Vec<FundingAttempt> {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let end = self.clock.now() + chrono::Duration::days(365);
        self.store.find_in_range(start, end, None).await.unwrap()
    }

    /// Service over a fresh set of the same fixtures, for router tests.
    pub fn into_service(self) -> (Arc<FaucetService>, Arc<FakeChain>, TempDir) {
        let Harness {
            orchestrator,
            stats,
            chain,
            metrics,
            _temp_dir,
            ..
        } = self;
        let service = FaucetService::new(orchestrator, stats, chain.clone(), metrics);
        (Arc::new(service), chain, _temp_dir)
    }
}
