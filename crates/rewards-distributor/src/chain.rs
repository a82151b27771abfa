//! Minimal Ethereum JSON-RPC client
//!
//! Only block timestamps are needed: the campaign is defined in blocks, the
//! replay runs on timestamps.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{DistributorError, DistributorResult};
use crate::transport::{with_retry, JsonTransport};

/// RPC response wrapper
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// RPC error structure
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    timestamp: String,
}

pub struct EthRpcClient {
    url: String,
    transport: Arc<dyn JsonTransport>,
    retry: RetryConfig,
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>, transport: Arc<dyn JsonTransport>, retry: RetryConfig) -> Self {
        Self {
            url: url.into(),
            transport,
            retry,
        }
    }

    /// Unix timestamp of a block
    pub async fn block_timestamp(&self, block: u64) -> DistributorResult<u64> {
        let header: BlockHeader = self
            .call("eth_getBlockByNumber", json!([format!("0x{block:x}"), false]))
            .await?
            .ok_or_else(|| DistributorError::Rpc(format!("block {block} not found")))?;

        let timestamp = parse_hex_u64(&header.timestamp)?;
        debug!("Block {} has timestamp {}", block, timestamp);
        Ok(timestamp)
    }

    /// Make a JSON-RPC call
    async fn call<T>(&self, method: &str, params: Value) -> DistributorResult<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = with_retry(&self.retry, &format!("RPC {method}"), || {
            self.transport.post_json(&self.url, &request_body)
        })
        .await?;

        let response: RpcResponse<T> = serde_json::from_value(response)
            .map_err(|e| DistributorError::Rpc(format!("malformed {method} response: {e}")))?;

        if let Some(error) = response.error {
            return Err(DistributorError::Rpc(format!(
                "{method} failed with code {}: {}",
                error.code, error.message
            )));
        }

        Ok(response.result)
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(value: &str) -> DistributorResult<u64> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| DistributorError::parse(format!("hex quantity without 0x prefix: {value}")))?;

    u64::from_str_radix(digits, 16).map_err(|e| DistributorError::parse(format!("invalid hex quantity {value}: {e}")))
}
