//! Blockchain access over JSON-RPC

use crate::error::ChainError;
use crate::wallet::{OperatorWallet, TransferRequest};
use async_trait::async_trait;
use drip_common::{Address, TxHash};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// What the orchestrator needs from the chain.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Next nonce for `address`, counting pending transactions.
    async fn get_nonce(&self, address: &Address) -> Result<u64, ChainError>;

    /// Sign `transfer` with the operator key and broadcast it.
    async fn sign_and_send(
        &self,
        transfer: &TransferRequest,
        operator: &OperatorWallet,
    ) -> Result<TxHash, ChainError>;

    /// Latest balance of `address` in wei.
    async fn get_balance(&self, address: &Address) -> Result<u128, ChainError>;
}

fn parse_quantity(value: &serde_json::Value) -> Result<u128, ChainError> {
    let text = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("expected hex quantity, got {}", value)))?;
    let digits = text.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| ChainError::InvalidResponse(format!("bad quantity {}: {}", text, e)))
}

/// RPC client for interacting with blockchain
pub struct RpcChainGateway {
    rpc_url: String,
    client: reqwest::Client,
    configured_chain_id: Option<u64>,
    chain_id: OnceCell<u64>,
}

impl RpcChainGateway {
    pub fn new(rpc_url: String, chain_id: Option<u64>, request_timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        Ok(Self {
            rpc_url,
            client,
            configured_chain_id: chain_id,
            chain_id: OnceCell::new(),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, ChainError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        debug!("RPC call: {}", method);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Transport(format!("{} request failed: {}", method, e)))?;

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ChainError::Rpc(message));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse(format!("{}: missing result", method)))
    }

    /// Configured chain id, else `eth_chainId` queried once.
    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        if let Some(id) = self.configured_chain_id {
            return Ok(id);
        }

        self.chain_id
            .get_or_try_init(|| async {
                let result = self.call("eth_chainId", serde_json::json!([])).await?;
                let id = u64::try_from(parse_quantity(&result)?)
                    .map_err(|_| ChainError::InvalidResponse("chain id overflows u64".to_string()))?;
                info!("Chain id: {}", id);
                Ok::<u64, ChainError>(id)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    async fn get_nonce(&self, address: &Address) -> Result<u64, ChainError> {
        let result = self
            .call(
                "eth_getTransactionCount",
                serde_json::json!([address.to_string(), "pending"]),
            )
            .await?;

        u64::try_from(parse_quantity(&result)?)
            .map_err(|_| ChainError::InvalidResponse("nonce overflows u64".to_string()))
    }

    async fn sign_and_send(
        &self,
        transfer: &TransferRequest,
        operator: &OperatorWallet,
    ) -> Result<TxHash, ChainError> {
        let chain_id = self.chain_id().await?;
        let signed = operator.sign_transfer(transfer, chain_id)?;

        let result = self
            .call("eth_sendRawTransaction", serde_json::json!([signed.raw_hex()]))
            .await?;

        let reported = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected tx hash, got {}", result)))?
            .parse::<TxHash>()
            .map_err(|e| ChainError::InvalidResponse(format!("bad tx hash: {}", e)))?;

        if reported != signed.hash {
            warn!(
                "Node reported tx hash {} but local hash is {}",
                reported, signed.hash
            );
        }

        info!("Transaction sent: {}", reported);
        Ok(reported)
    }

    async fn get_balance(&self, address: &Address) -> Result<u128, ChainError> {
        let result = self
            .call("eth_getBalance", serde_json::json!([address.to_string(), "latest"]))
            .await?;
        parse_quantity(&result)
    }
}
