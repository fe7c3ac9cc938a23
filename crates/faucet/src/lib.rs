//! Testnet faucet service
//!
//! Sends a fixed amount of native currency from an operator wallet to
//! requesting addresses, with:
//! - Per-wallet cooldown derived from the attempt log
//! - One in-flight attempt per wallet
//! - An append-only record of every attempt, funded or not
//! - Trailing 24h success / failure counts
//! - Prometheus metrics

pub mod api;
pub mod chain;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod lease;
pub mod limiter;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod service;
pub mod stats;
pub mod wallet;

pub use chain::{ChainGateway, RpcChainGateway};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::FaucetConfig;
pub use database::{SledTransactionStore, TransactionStore};
pub use error::{ChainError, FaucetError, FaucetResult, StoreError};
pub use limiter::RateLimiter;
pub use metrics::FaucetMetrics;
pub use model::{FundingAttempt, FundingResult, FundingStatus};
pub use orchestrator::{FundingOrchestrator, FundingSettings};
pub use service::{FaucetService, FaucetStatus};
pub use stats::{FundingStats, StatsAggregator};
pub use wallet::{OperatorWallet, SignedTransfer, TransferRequest};
