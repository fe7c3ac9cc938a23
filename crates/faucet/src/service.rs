//! Faucet service wiring

use crate::chain::{ChainGateway, RpcChainGateway};
use crate::clock::{Clock, SystemClock};
use crate::config::FaucetConfig;
use crate::database::TransactionStore;
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::FaucetMetrics;
use crate::model::FundingResult;
use crate::orchestrator::{FundingOrchestrator, FundingSettings};
use crate::stats::{FundingStats, StatsAggregator};
use crate::wallet::OperatorWallet;
use drip_common::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Everything the HTTP layer talks to.
pub struct FaucetService {
    orchestrator: Arc<FundingOrchestrator>,
    stats: StatsAggregator,
    chain: Arc<dyn ChainGateway>,
    metrics: FaucetMetrics,
}

impl FaucetService {
    pub fn new(
        orchestrator: Arc<FundingOrchestrator>,
        stats: StatsAggregator,
        chain: Arc<dyn ChainGateway>,
        metrics: FaucetMetrics,
    ) -> Self {
        Self {
            orchestrator,
            stats,
            chain,
            metrics,
        }
    }

    /// Build the production service: JSON-RPC gateway, wall clock, the given store.
    pub fn from_config(config: &FaucetConfig, store: Arc<dyn TransactionStore>) -> FaucetResult<Self> {
        config.validate()?;

        let operator = OperatorWallet::from_private_key(&config.private_key)
            .map_err(|e| FaucetError::Config(e.to_string()))?;

        if let Some(expected) = &config.operator_address {
            let expected: Address = expected
                .parse()
                .map_err(|e| FaucetError::Config(format!("operator_address: {}", e)))?;
            if expected != operator.address() {
                return Err(FaucetError::Config(format!(
                    "private key controls {} but operator_address is {}",
                    operator.address().to_checksum(),
                    expected.to_checksum()
                )));
            }
        }

        info!("Faucet address: {}", operator.address().to_checksum());

        let chain: Arc<dyn ChainGateway> = Arc::new(RpcChainGateway::new(
            config.rpc_url.clone(),
            config.chain_id,
            config.chain_timeout(),
        )?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let metrics = FaucetMetrics::new().map_err(|e| FaucetError::Internal(e.to_string()))?;

        let settings = FundingSettings {
            payout_amount: config.payout_wei()?,
            gas_price: config.gas_price_wei()?,
            gas_limit: config.gas_limit,
            cooldown: config.funding_cooldown(),
            chain_timeout: config.chain_timeout(),
        };

        let orchestrator = Arc::new(FundingOrchestrator::new(
            store.clone(),
            chain.clone(),
            Arc::new(operator),
            clock.clone(),
            settings,
            metrics.clone(),
        ));
        let stats = StatsAggregator::new(store, clock);

        Ok(Self::new(orchestrator, stats, chain, metrics))
    }

    pub async fn fund(&self, wallet_address: &str, ip_address: &str) -> FaucetResult<FundingResult> {
        self.orchestrator.fund(wallet_address, ip_address).await
    }

    /// Success / failure counts for the trailing 24 hours.
    pub async fn stats(&self) -> FaucetResult<FundingStats> {
        let stats = self.stats.last_24_hours().await?;
        info!(
            "Stats fetched successfully. Success count: {}, Failed count: {}",
            stats.num_success, stats.num_failed
        );
        Ok(stats)
    }

    /// Operator balance and payout parameters.
    pub async fn status(&self) -> FaucetResult<FaucetStatus> {
        let address = self.orchestrator.operator_address();
        let balance = self.chain.get_balance(&address).await?;
        let settings = self.orchestrator.settings();

        Ok(FaucetStatus {
            address: address.to_checksum(),
            balance: balance.to_string(),
            payout_amount: settings.payout_amount.to_string(),
            cooldown_secs: settings.cooldown.as_secs(),
        })
    }

    pub fn metrics(&self) -> &FaucetMetrics {
        &self.metrics
    }
}

/// Faucet status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub address: String,
    /// Operator balance (in wei)
    pub balance: String,
    /// Payout per request (in wei)
    pub payout_amount: String,
    pub cooldown_secs: u64,
}
