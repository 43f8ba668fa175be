#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! AI text-analysis client.
//!
//! Sends wallet stats to a `generateContent`-style endpoint and parses the
//! narrative JSON it returns. The analysis is decoration, not a dependency:
//! any failure (missing key, network, status, malformed body) degrades to a
//! static placeholder, and the outcome says which path produced it.

use std::time::Duration;

use baseflow_core::{ReputationScore, WalletProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration for the analysis client.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_ms: u64,
}

impl AnalysisConfig {
    pub const DEFAULT_MODEL: &'static str = "gemini-3-flash-preview";
    pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

    pub fn new(api_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key,
            model: Self::DEFAULT_MODEL.to_string(),
            timeout_ms: Self::DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
enum AnalysisError {
    #[error("no api key configured")]
    MissingKey,
    #[error("network error: {0}")]
    Network(String),
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Narrative analysis document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub sybil_assessment: String,
}

impl AiAnalysis {
    /// Static result returned when the remote analysis is unavailable.
    pub fn placeholder() -> Self {
        Self {
            summary: "Analysis failed due to network or API limits.".to_string(),
            strengths: vec!["N/A".to_string()],
            weaknesses: vec!["N/A".to_string()],
            sybil_assessment: "Unknown".to_string(),
        }
    }
}

/// Which path produced the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisSource {
    Remote,
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub analysis: AiAnalysis,
    pub source: AnalysisSource,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Clone)]
pub struct AnalysisClient {
    cfg: AnalysisConfig,
    client: reqwest::Client,
}

impl AnalysisClient {
    pub fn new(cfg: AnalysisConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { cfg, client }
    }

    /// Analyze a wallet. Infallible by contract: worst case is the
    /// placeholder document.
    pub async fn analyze(
        &self,
        profile: &WalletProfile,
        score: &ReputationScore,
    ) -> AnalysisOutcome {
        match self.analyze_remote(profile, score).await {
            Ok(analysis) => AnalysisOutcome {
                analysis,
                source: AnalysisSource::Remote,
            },
            Err(err) => {
                warn!(address = %profile.address, error = %err, "analysis degraded to placeholder");
                AnalysisOutcome {
                    analysis: AiAnalysis::placeholder(),
                    source: AnalysisSource::Placeholder,
                }
            }
        }
    }

    async fn analyze_remote(
        &self,
        profile: &WalletProfile,
        score: &ReputationScore,
    ) -> Result<AiAnalysis, AnalysisError> {
        let key = self
            .cfg
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AnalysisError::MissingKey)?;

        let base = self.cfg.api_url.trim_end_matches('/');
        let url = format!(
            "{base}/v1/models/{}:generateContent?key={key}",
            self.cfg.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": build_prompt(profile, score) }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        debug!(address = %profile.address, "requesting remote analysis");
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AnalysisError::HttpStatus(status.as_u16()));
        }
        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| AnalysisError::Decode(e.to_string()))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AnalysisError::Decode("no text in response".into()))?;

        serde_json::from_str(text).map_err(|e| AnalysisError::Decode(e.to_string()))
    }
}

fn build_prompt(profile: &WalletProfile, score: &ReputationScore) -> String {
    format!(
        "You are BaseFlow's on-chain reputation engine. Analyze the following \
         wallet on the Base (L2) network and provide a proof-of-humanity \
         assessment.\n\
         Wallet Data:\n\
         - Age: since {first_tx}\n\
         - Transactions: {txs}\n\
         - Unique Contracts: {contracts}\n\
         - Gas Spent: {gas} ETH\n\
         - Current Score: {total}/1000\n\
         - Calculated Risk: {risk}\n\
         Respond with a JSON object: {{\"summary\": \"two sentences\", \
         \"strengths\": [3 items], \"weaknesses\": [2 items], \
         \"sybil_assessment\": \"one statement\"}}",
        first_tx = profile.first_tx_date,
        txs = profile.tx_count,
        contracts = profile.unique_contracts,
        gas = profile.gas_spent_display,
        total = score.total,
        risk = score.risk_level,
    )
}
