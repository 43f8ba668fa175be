#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! JSON-RPC client for an Ethereum-compatible wallet provider.
//!
//! The engine depends only on `eth_getTransactionCount(address, "latest")`;
//! `eth_chainId` and `eth_call` exist for the startup network probe and
//! basename reverse resolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod names;

pub use names::{
    format_display_address, warn_if_unexpected_chain, BasenameResolver, BasenameResolverConfig,
};

/// Base mainnet chain id.
pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;

/// Configuration for the wallet RPC client.
#[derive(Debug, Clone)]
pub struct WalletRpcConfig {
    pub rpc_url: String,
    pub timeout_ms: u64,
}

impl WalletRpcConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Result<Self, WalletRpcError> {
        let rpc_url = std::env::var("BASEFLOW_WALLET_RPC_URL")
            .map_err(|_| WalletRpcError::Config("BASEFLOW_WALLET_RPC_URL is not set".into()))?;
        if rpc_url.trim().is_empty() {
            return Err(WalletRpcError::Config(
                "BASEFLOW_WALLET_RPC_URL is empty".into(),
            ));
        }
        let timeout_ms = std::env::var("BASEFLOW_WALLET_RPC_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::DEFAULT_TIMEOUT_MS);
        Ok(Self { rpc_url, timeout_ms })
    }
}

#[derive(Debug, Error)]
pub enum WalletRpcError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {status} body={body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("provider rejected request: code {code}, {message}")]
    Rpc { code: i64, message: String },
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Clone)]
pub struct WalletRpcClient {
    cfg: WalletRpcConfig,
    client: reqwest::Client,
}

impl WalletRpcClient {
    pub fn new(cfg: WalletRpcConfig) -> Result<Self, WalletRpcError> {
        if cfg.rpc_url.trim().is_empty() {
            return Err(WalletRpcError::Config("rpc_url is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| WalletRpcError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { cfg, client })
    }

    /// Current transaction count ("nonce") of an address, latest block.
    pub async fn transaction_count(&self, address: &str) -> Result<u64, WalletRpcError> {
        let result = self
            .call(
                "eth_getTransactionCount",
                serde_json::json!([address, "latest"]),
            )
            .await?;
        decode_quantity(&result)
    }

    /// Provider chain id.
    pub async fn chain_id(&self) -> Result<u64, WalletRpcError> {
        let result = self.call("eth_chainId", serde_json::json!([])).await?;
        decode_quantity(&result)
    }

    /// Raw `eth_call` against a contract, returning the hex result string.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, WalletRpcError> {
        let result = self
            .call(
                "eth_call",
                serde_json::json!([{ "to": to, "data": data }, "latest"]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WalletRpcError::Decode("eth_call result is not a string".into()))
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WalletRpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        debug!(method, "sending wallet rpc request");
        let resp = self
            .client
            .post(&self.cfg.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletRpcError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| WalletRpcError::Network(e.to_string()))?;
        if !status.is_success() {
            warn!(method, status = status.as_u16(), "wallet rpc non-success status");
            return Err(WalletRpcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RpcResponse =
            serde_json::from_str(&body).map_err(|e| WalletRpcError::Decode(e.to_string()))?;
        if let Some(err) = parsed.error {
            warn!(method, code = err.code, message = %err.message, "wallet rpc error object");
            return Err(WalletRpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| WalletRpcError::Decode("response has neither result nor error".into()))
    }
}

/// Decode a JSON-RPC hex quantity (`"0x2a"`) into a u64.
fn decode_quantity(value: &serde_json::Value) -> Result<u64, WalletRpcError> {
    let raw = value
        .as_str()
        .ok_or_else(|| WalletRpcError::Decode("quantity is not a string".into()))?;
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| WalletRpcError::Decode(format!("quantity missing 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Err(WalletRpcError::Decode("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| WalletRpcError::Decode(format!("invalid quantity {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> WalletRpcClient {
        WalletRpcClient::new(WalletRpcConfig {
            rpc_url: server.uri(),
            timeout_ms: 1_000,
        })
        .expect("client")
    }

    #[tokio::test]
    async fn transaction_count_decodes_hex_quantity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(
                serde_json::json!({"method": "eth_getTransactionCount"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "0x2a"}),
            ))
            .mount(&server)
            .await;

        let nonce = client_for(&server)
            .transaction_count("0xabc")
            .await
            .unwrap();
        assert_eq!(nonce, 42);
    }

    #[tokio::test]
    async fn chain_id_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "eth_chainId"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "0x2105"}),
            ))
            .mount(&server)
            .await;

        let id = client_for(&server).chain_id().await.unwrap();
        assert_eq!(id, BASE_MAINNET_CHAIN_ID);
    }

    #[tokio::test]
    async fn provider_rejection_is_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "header not found"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .transaction_count("0xabc")
            .await
            .unwrap_err();
        match err {
            WalletRpcError::Rpc { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("expected Rpc, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_quantity_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "not-hex"}),
            ))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .transaction_count("0xabc")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletRpcError::Decode(_)));
    }

    #[tokio::test]
    async fn http_failure_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).chain_id().await.unwrap_err();
        assert!(matches!(err, WalletRpcError::HttpStatus { status: 502, .. }));
    }

    #[test]
    fn quantity_edge_cases() {
        assert_eq!(decode_quantity(&serde_json::json!("0x0")).unwrap(), 0);
        assert_eq!(decode_quantity(&serde_json::json!("0x10")).unwrap(), 16);
        assert!(decode_quantity(&serde_json::json!("0x")).is_err());
        assert!(decode_quantity(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn empty_url_is_config_error() {
        let result = WalletRpcClient::new(WalletRpcConfig {
            rpc_url: String::new(),
            timeout_ms: 1_000,
        });
        assert!(matches!(result, Err(WalletRpcError::Config(_))));
    }
}
