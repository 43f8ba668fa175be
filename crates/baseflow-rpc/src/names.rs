//! Basename reverse resolution.
//!
//! Resolves a wallet address to a human-readable basename
//! (`alice.base.eth`). Two lookup paths, both best-effort:
//!
//! 1. The public resolver API (`GET /v1/addresses/{addr}`)
//! 2. A raw `eth_call` against the reverse registrar contract
//!
//! Failures degrade silently to `None`; hits and misses are both cached
//! with a TTL so repeated renders do not hammer either backend.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{WalletRpcClient, WalletRpcError};

/// Base ENS reverse registrar.
const REVERSE_REGISTRAR: &str = "0xC6d566A56A1aFf6508b41f6c90ff131615583BCD";
/// Function selector for `name(bytes32)`.
const NAME_SELECTOR: &str = "0x691f3431";

#[derive(Debug, Clone)]
pub struct BasenameResolverConfig {
    pub resolver_api_url: String,
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
}

impl BasenameResolverConfig {
    pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;
    pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;

    pub fn new(resolver_api_url: impl Into<String>) -> Self {
        Self {
            resolver_api_url: resolver_api_url.into(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
            cache_ttl_ms: Self::DEFAULT_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolverApiResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    basename: Option<String>,
}

struct CacheEntry {
    name: Option<String>,
    at: Instant,
}

pub struct BasenameResolver {
    cfg: BasenameResolverConfig,
    http: reqwest::Client,
    rpc: WalletRpcClient,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl BasenameResolver {
    pub fn new(cfg: BasenameResolverConfig, rpc: WalletRpcClient) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            cfg,
            http,
            rpc,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve an address to a basename. `None` means "no name", whether
    /// because the address has none or because both lookup paths failed.
    pub async fn resolve(&self, address: &str) -> Option<String> {
        let key = address.trim().to_lowercase();
        let ttl = Duration::from_millis(self.cfg.cache_ttl_ms);

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&key) {
                if entry.at.elapsed() < ttl {
                    return entry.name.clone();
                }
            }
        }

        let name = match self.resolve_via_api(&key).await {
            Some(name) => Some(name),
            None => self.resolve_via_rpc(&key).await,
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            key,
            CacheEntry {
                name: name.clone(),
                at: Instant::now(),
            },
        );
        name
    }

    async fn resolve_via_api(&self, address: &str) -> Option<String> {
        let base = self.cfg.resolver_api_url.trim_end_matches('/');
        let url = format!("{base}/v1/addresses/{address}");
        let resp = self.http.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let parsed: ResolverApiResponse = resp.json().await.ok()?;
        parsed.name.or(parsed.basename)
    }

    async fn resolve_via_rpc(&self, address: &str) -> Option<String> {
        let reverse_name = format!("{}.addr.reverse", address.trim_start_matches("0x"));
        let data = format!("{NAME_SELECTOR}{}", hex::encode(reverse_name.as_bytes()));
        match self.rpc.eth_call(REVERSE_REGISTRAR, &data).await {
            Ok(result) if result != "0x" => decode_abi_string(&result),
            Ok(_) => None,
            Err(err) => {
                debug!(error = %err, "reverse registrar lookup failed");
                None
            }
        }
    }
}

/// Decode an ABI-encoded string return value, keeping only values that look
/// like a name (contain a dot).
fn decode_abi_string(hex_result: &str) -> Option<String> {
    let digits = hex_result.strip_prefix("0x")?;
    // 64 chars of offset plus 64 chars of length precede the data.
    if digits.len() <= 128 {
        return None;
    }
    let bytes = hex::decode(&digits[128..]).ok()?;
    let decoded: String = String::from_utf8_lossy(&bytes)
        .trim_matches('\0')
        .trim()
        .to_string();
    if !decoded.is_empty() && decoded.contains('.') {
        Some(decoded)
    } else {
        None
    }
}

/// Shortened display form of an address: `0x71C7...976F`.
///
/// Cuts on char boundaries, so arbitrary (non-hex) input never panics;
/// inputs of ten or fewer chars are returned unchanged.
pub fn format_display_address(address: &str) -> String {
    let head_end = address.char_indices().nth(6).map(|(i, _)| i);
    let tail_start = address.char_indices().rev().nth(3).map(|(i, _)| i);
    match (head_end, tail_start) {
        (Some(head), Some(tail)) if head < tail => {
            format!("{}...{}", &address[..head], &address[tail..])
        }
        _ => address.to_string(),
    }
}

/// Probe the provider chain id and warn when it is not the expected one.
/// Never fails: the dashboard works against any chain, just noisier.
pub async fn warn_if_unexpected_chain(rpc: &WalletRpcClient, expected: u64) {
    match rpc.chain_id().await {
        Ok(id) if id == expected => {
            tracing::info!(chain_id = id, "wallet provider chain verified");
        }
        Ok(id) => {
            tracing::warn!(
                chain_id = id,
                expected,
                "wallet provider is on an unexpected chain"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "wallet provider chain probe failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WalletRpcConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn abi_string(s: &str) -> String {
        let mut out = String::from("0x");
        out.push_str(&format!("{:064x}", 32));
        out.push_str(&format!("{:064x}", s.len()));
        out.push_str(&hex::encode(s.as_bytes()));
        let pad = (64 - (s.len() * 2) % 64) % 64;
        out.push_str(&"0".repeat(pad));
        out
    }

    fn resolver_for(api: &MockServer, rpc: &MockServer) -> BasenameResolver {
        let rpc_client = WalletRpcClient::new(WalletRpcConfig {
            rpc_url: rpc.uri(),
            timeout_ms: 1_000,
        })
        .expect("rpc client");
        BasenameResolver::new(
            BasenameResolverConfig {
                resolver_api_url: api.uri(),
                timeout_ms: 1_000,
                cache_ttl_ms: 60_000,
            },
            rpc_client,
        )
    }

    #[tokio::test]
    async fn resolves_via_api() {
        let api = MockServer::start().await;
        let rpc = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/addresses/0xabc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"name": "alice.base.eth"})),
            )
            .mount(&api)
            .await;

        let resolver = resolver_for(&api, &rpc);
        assert_eq!(
            resolver.resolve("0xABC").await.as_deref(),
            Some("alice.base.eth")
        );
    }

    #[tokio::test]
    async fn falls_back_to_rpc_reverse_lookup() {
        let api = MockServer::start().await;
        let rpc = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&api)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "eth_call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": abi_string("bob.base.eth")
            })))
            .mount(&rpc)
            .await;

        let resolver = resolver_for(&api, &rpc);
        assert_eq!(
            resolver.resolve("0xdef").await.as_deref(),
            Some("bob.base.eth")
        );
    }

    #[tokio::test]
    async fn miss_is_cached() {
        let api = MockServer::start().await;
        let rpc = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&api)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "0x"}),
            ))
            .expect(1)
            .mount(&rpc)
            .await;

        let resolver = resolver_for(&api, &rpc);
        assert_eq!(resolver.resolve("0x123").await, None);
        // Second call is served from cache; the mocks' expect(1) enforce it.
        assert_eq!(resolver.resolve("0x123").await, None);
    }

    #[test]
    fn decode_abi_string_rejects_short_and_nameless() {
        assert_eq!(decode_abi_string("0x"), None);
        assert_eq!(decode_abi_string(&abi_string("nodots")), None);
        assert_eq!(
            decode_abi_string(&abi_string("carol.base.eth")).as_deref(),
            Some("carol.base.eth")
        );
    }

    #[test]
    fn display_address_is_shortened() {
        assert_eq!(
            format_display_address("0x71C7656EC7ab88b098defB751B7401B5f6d8976F"),
            "0x71C7...976F"
        );
        assert_eq!(format_display_address("0xshort"), "0xshort");
        assert_eq!(format_display_address("0123456789"), "0123456789");
        assert_eq!(format_display_address("0123456789a"), "012345...789a");
    }

    #[test]
    fn display_address_handles_multibyte_input() {
        // Path parameters are arbitrary strings; cuts must not land inside
        // a multibyte char.
        assert_eq!(format_display_address("aa€€€€"), "aa€€€€");
        assert_eq!(format_display_address("€€€€€€€€€€€€"), "€€€€€€...€€€€");
        assert_eq!(format_display_address("0x41€€€€€€41"), "0x41€€...€€41");
    }
}
