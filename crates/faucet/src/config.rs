//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use config::{Config, Environment, File};
use drip_common::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Faucet service configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// RPC endpoint for blockchain
    pub rpc_url: String,

    /// Expected operator wallet address; checked against the key when set
    pub operator_address: Option<String>,

    /// Operator private key (hex)
    pub private_key: String,

    /// Amount to send per successful request (in wei)
    pub payout_amount: String,

    /// Gas price to use (in wei)
    pub gas_price: String,

    /// Gas limit for transactions
    pub gas_limit: u64,

    /// Chain id for EIP-155 signing; queried from the node when unset
    pub chain_id: Option<u64>,

    /// Minimum time between successful payouts to the same wallet (seconds)
    pub funding_cooldown_secs: u64,

    /// Upper bound on nonce lookup plus submission (seconds)
    pub chain_timeout_secs: u64,

    /// Database path
    pub db_path: String,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Enable metrics
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for FaucetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaucetConfig")
            .field("server_addr", &self.server_addr)
            .field("rpc_url", &self.rpc_url)
            .field("operator_address", &self.operator_address)
            .field("private_key", &"<redacted>")
            .field("payout_amount", &self.payout_amount)
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("chain_id", &self.chain_id)
            .field("funding_cooldown_secs", &self.funding_cooldown_secs)
            .field("chain_timeout_secs", &self.chain_timeout_secs)
            .field("db_path", &self.db_path)
            .field("cors_enabled", &self.cors_enabled)
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            operator_address: None,
            private_key: String::new(),
            payout_amount: "50000000000000000".to_string(), // 0.05 ETH
            gas_price: "20000000000".to_string(),           // 20 Gwei
            gas_limit: 21000,
            chain_id: None,
            funding_cooldown_secs: 3600,
            chain_timeout_secs: 30,
            db_path: "./faucet_data".to_string(),
            cors_enabled: true,
            metrics_enabled: true,
        }
    }
}

impl FaucetConfig {
    /// Layer defaults, an optional config file and `FAUCET_*` environment variables.
    pub fn load(path: Option<&Path>) -> FaucetResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("FAUCET"))
            .build()?
            .try_deserialize::<Self>()?;

        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> FaucetResult<()> {
        if self.private_key.trim().is_empty() {
            return Err(FaucetError::Config("private_key is required".to_string()));
        }
        if self.payout_wei()? == 0 {
            return Err(FaucetError::Config("payout_amount must be positive".to_string()));
        }
        self.gas_price_wei()?;
        if self.gas_limit == 0 {
            return Err(FaucetError::Config("gas_limit must be positive".to_string()));
        }
        if self.chain_timeout_secs == 0 {
            return Err(FaucetError::Config("chain_timeout_secs must be positive".to_string()));
        }
        if let Some(addr) = &self.operator_address {
            addr.parse::<Address>()
                .map_err(|e| FaucetError::Config(format!("operator_address: {}", e)))?;
        }
        Ok(())
    }

    /// Payout in wei
    pub fn payout_wei(&self) -> FaucetResult<u128> {
        self.payout_amount
            .trim()
            .parse::<u128>()
            .map_err(|e| FaucetError::Config(format!("payout_amount: {}", e)))
    }

    /// Gas price in wei
    pub fn gas_price_wei(&self) -> FaucetResult<u128> {
        self.gas_price
            .trim()
            .parse::<u128>()
            .map_err(|e| FaucetError::Config(format!("gas_price: {}", e)))
    }

    pub fn funding_cooldown(&self) -> Duration {
        Duration::from_secs(self.funding_cooldown_secs)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }
}
