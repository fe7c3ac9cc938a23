//! Funding pipeline: cooldown check, chain submission, audit record
//!
//! Every call to [`FundingOrchestrator::fund`] that gets past the cooldown
//! read leaves exactly one [`FundingAttempt`] behind:
//!
//! - cooldown active: `Failed`, no chain call
//! - chain submission ok: `Success` with the transaction hash
//! - chain submission failed or timed out: `Failed`
//!
//! A successful broadcast cannot be undone, so if its record fails to persist
//! the caller still gets `Funded` and the failure is logged and counted.
//! Nothing is retried here; a retried submission could pay twice.
//!
//! The pipeline runs on its own task, so a caller that goes away (client
//! disconnect, handler timeout) cannot stop it between the chain call and the
//! record. Nonce lookup and broadcast are serialized per operator account.

use crate::chain::ChainGateway;
use crate::clock::Clock;
use crate::database::TransactionStore;
use crate::error::{ChainError, FaucetError, FaucetResult};
use crate::lease::WalletLocks;
use crate::limiter::RateLimiter;
use crate::metrics::FaucetMetrics;
use crate::model::{normalize_wallet, FundingAttempt, FundingResult};
use crate::wallet::{OperatorWallet, TransferRequest};
use drip_common::{Address, TxHash};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Fixed parameters of every payout.
#[derive(Debug, Clone)]
pub struct FundingSettings {
    /// Payout in wei
    pub payout_amount: u128,
    /// Gas price in wei
    pub gas_price: u128,
    pub gas_limit: u64,
    pub cooldown: Duration,
    pub chain_timeout: Duration,
}

pub struct FundingOrchestrator {
    store: Arc<dyn TransactionStore>,
    chain: Arc<dyn ChainGateway>,
    operator: Arc<OperatorWallet>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    locks: WalletLocks,
    /// Held across nonce lookup, signing and broadcast.
    submission: Mutex<()>,
    settings: FundingSettings,
    metrics: FaucetMetrics,
}

impl FundingOrchestrator {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        chain: Arc<dyn ChainGateway>,
        operator: Arc<OperatorWallet>,
        clock: Arc<dyn Clock>,
        settings: FundingSettings,
        metrics: FaucetMetrics,
    ) -> Self {
        let limiter = RateLimiter::new(store.clone(), clock.clone(), settings.cooldown);
        Self {
            store,
            chain,
            operator,
            clock,
            limiter,
            locks: WalletLocks::new(),
            submission: Mutex::new(()),
            settings,
            metrics,
        }
    }

    pub fn settings(&self) -> &FundingSettings {
        &self.settings
    }

    pub fn operator_address(&self) -> Address {
        self.operator.address()
    }

    /// Fund `wallet_address` on behalf of a request from `ip_address`.
    ///
    /// Returns `Err` only when the cooldown read fails or a `Failed` record
    /// cannot be written. Dropping the returned future does not cancel the
    /// attempt; it runs to completion and is recorded.
    pub async fn fund(self: &Arc<Self>, wallet_address: &str, ip_address: &str) -> FaucetResult<FundingResult> {
        let this = Arc::clone(self);
        let wallet = wallet_address.to_string();
        let ip = ip_address.to_string();

        tokio::spawn(async move { this.run(&wallet, &ip).await })
            .await
            .map_err(|e| FaucetError::Internal(format!("funding task failed: {}", e)))?
    }

    async fn run(&self, wallet_address: &str, ip_address: &str) -> FaucetResult<FundingResult> {
        let wallet = normalize_wallet(wallet_address);
        info!("Fund request for wallet: {}, IP: {}", wallet, ip_address);

        let _lease = self.locks.acquire(&wallet).await;

        if let Some(retry_after) = self.limiter.remaining_cooldown(&wallet).await? {
            self.persist(FundingAttempt::failed(&wallet, ip_address, self.clock.now()))
                .await?;
            warn!(
                "Rate limit exceeded for wallet: {}, IP: {}, retry after {}s",
                wallet,
                ip_address,
                retry_after.as_secs()
            );
            self.metrics.record_outcome("rate_limited");
            return Ok(FundingResult::RateLimited { retry_after });
        }

        let outcome = match self.recipient(&wallet) {
            Ok(to) => self.submit(to).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(tx_hash) => {
                let transaction_id = tx_hash.to_string();
                let amount = self.settings.payout_amount;
                let attempt = FundingAttempt::success(
                    &wallet,
                    &transaction_id,
                    amount,
                    ip_address,
                    self.clock.now(),
                );

                if let Err(e) = self.store.record(&attempt).await {
                    self.metrics.record_store_failure();
                    error!(
                        "Funded wallet {} with tx {} but could not record it: {}",
                        wallet, transaction_id, e
                    );
                }

                info!("Transaction successful. ID: {}", transaction_id);
                self.metrics.record_outcome("funded");
                Ok(FundingResult::Funded {
                    transaction_id,
                    amount,
                })
            }
            Err(e) => {
                error!("Transaction failed for wallet: {}. Error: {}", wallet, e);
                self.persist(FundingAttempt::failed(&wallet, ip_address, self.clock.now()))
                    .await?;
                self.metrics.record_outcome("chain_error");
                Ok(FundingResult::ChainError(e.to_string()))
            }
        }
    }

    /// Parse and sanity-check the destination.
    fn recipient(&self, wallet: &str) -> Result<Address, ChainError> {
        let to: Address = wallet
            .parse()
            .map_err(|e| ChainError::InvalidAddress(format!("{:?}: {}", wallet, e)))?;

        if to.is_zero() {
            return Err(ChainError::InvalidAddress("Zero address not allowed".to_string()));
        }
        if to == self.operator.address() {
            return Err(ChainError::InvalidAddress("Cannot send to faucet address".to_string()));
        }
        Ok(to)
    }

    /// Nonce lookup, signing and broadcast under one timeout. Waiting for
    /// the operator's submission slot counts against the same budget.
    async fn submit(&self, to: Address) -> Result<TxHash, ChainError> {
        let started = Instant::now();
        let timeout = self.settings.chain_timeout;

        let result = tokio::time::timeout(timeout, async {
            let _slot = self.submission.lock().await;
            let nonce = self.chain.get_nonce(&self.operator.address()).await?;
            let transfer = TransferRequest {
                nonce,
                to,
                value: self.settings.payout_amount,
                gas_price: self.settings.gas_price,
                gas_limit: self.settings.gas_limit,
            };
            self.chain.sign_and_send(&transfer, &self.operator).await
        })
        .await
        .unwrap_or_else(|_| Err(ChainError::Timeout(timeout)));

        self.metrics.observe_chain_latency(started.elapsed().as_secs_f64());
        result
    }

    async fn persist(&self, attempt: FundingAttempt) -> FaucetResult<()> {
        if let Err(e) = self.store.record(&attempt).await {
            self.metrics.record_store_failure();
            error!(
                "Failed to record {} attempt for wallet {}: {}",
                attempt.status(),
                attempt.wallet_address(),
                e
            );
            return Err(e.into());
        }
        Ok(())
    }
}
