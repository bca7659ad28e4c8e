use crate::errors::{AppError, Result};
use crate::models::TransactionRecord;
use crate::utils::{normalize_address, wei_hex_to_eth};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Fetches the full transaction behind a notified hash.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn get_transaction(&self, hash: &str) -> Result<TransactionRecord>;
}

/// Shape of an `eth_getTransactionByHash` result, every field optional so a
/// partial answer still yields a (degraded) record.
#[derive(Debug, Default, Deserialize)]
struct RpcTransaction {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Build a record from the `result` object of `eth_getTransactionByHash`.
/// `to` is lower-cased; an undecodable `value` leaves `eth_value` empty.
pub fn record_from_rpc(result: &serde_json::Value) -> Result<TransactionRecord> {
    let tx: RpcTransaction = serde_json::from_value(result.clone())?;
    let eth_value = tx.value.as_deref().and_then(wei_hex_to_eth);
    Ok(TransactionRecord {
        hash: tx.hash,
        from: tx.from,
        to: tx.to.as_deref().map(normalize_address),
        input_data: tx.input,
        raw_value: tx.value,
        eth_value,
    })
}

/// HTTP JSON-RPC client built on the `ethers` provider.
#[derive(Clone)]
pub struct EthersRpcClient {
    provider: Arc<Provider<Http>>,
    timeout: Duration,
}

impl EthersRpcClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| AppError::Config(format!("RPC_URL {rpc_url:?} is invalid: {e}")))?;
        Ok(Self {
            provider: Arc::new(provider),
            timeout,
        })
    }

    /// Current gas price in gwei, handy for startup diagnostics.
    pub async fn gas_price_gwei(&self) -> Result<f64> {
        let wei = tokio::time::timeout(self.timeout, self.provider.get_gas_price())
            .await
            .map_err(|_| AppError::Data("eth_gasPrice timed out".into()))??;
        Ok(wei.low_u128() as f64 / 1_000_000_000.0)
    }
}

#[async_trait]
impl TransactionSource for EthersRpcClient {
    async fn get_transaction(&self, hash: &str) -> Result<TransactionRecord> {
        let call = self
            .provider
            .request::<_, Option<serde_json::Value>>("eth_getTransactionByHash", [hash]);
        let result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AppError::Data(format!("lookup of {hash} timed out")))?
            .map_err(|e| AppError::Data(format!("lookup of {hash} failed: {e}")))?;
        match result {
            Some(value) if !value.is_null() => record_from_rpc(&value),
            _ => Err(AppError::Data(format!("node does not know {hash}"))),
        }
    }
}
