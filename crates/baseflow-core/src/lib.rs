#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! Core types and primitives for the BaseFlow reputation dashboard.
//!
//! This crate defines the shared domain model (wallet profile, reputation
//! score, check-in state) and the deterministic score generator. Everything
//! here is pure: no I/O, no clocks, no randomness beyond what the address
//! string itself encodes.

use serde::{Deserialize, Serialize};

pub mod credentials;
pub mod score;

pub use credentials::{earned_credentials, Credential, CredentialStatus, CREDENTIALS};
pub use score::{generate, seed_for};

/// Sybil-risk classification derived from the total reputation score.
///
/// The mapping is a step function, exact at the boundaries:
/// `total < 300` is High, `total < 600` is Medium, everything else Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify a total score.
    pub fn from_total(total: u64) -> Self {
        if total < 300 {
            RiskLevel::High
        } else if total < 600 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Canonical string form used in API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Synthetic wallet statistics, fully determined by the address string.
///
/// Balances and gas figures are pre-rendered display strings; they exist for
/// presentation only and never feed back into arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: String,
    pub tx_count: u64,
    /// First transaction date, `YYYY-MM-DD`.
    pub first_tx_date: String,
    pub eth_balance_display: String,
    pub gas_spent_display: String,
    pub unique_contracts: u64,
    pub badge_count: u64,
}

/// Per-component reputation sub-scores, each clamped to its ceiling.
///
/// Ceilings: longevity 250, activity 300, diversity 250, identity 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub longevity: u64,
    pub activity: u64,
    pub diversity: u64,
    pub identity: u64,
}

impl ScoreBreakdown {
    /// Sum of all components, before the total clamp.
    pub fn sum(&self) -> u64 {
        self.longevity
            .saturating_add(self.activity)
            .saturating_add(self.diversity)
            .saturating_add(self.identity)
    }
}

/// Reputation score for a wallet.
///
/// Invariant: `total == min(breakdown.sum(), 1000)` and `risk_level`
/// matches [`RiskLevel::from_total`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationScore {
    pub total: u64,
    pub breakdown: ScoreBreakdown,
    pub risk_level: RiskLevel,
}

/// Persisted per-address check-in state.
///
/// Created lazily on first access (all-zero default), mutated only by the
/// reconciliation engine, removed only on explicit disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckInState {
    pub current_streak: u64,
    pub total_check_ins: u64,
    /// Wallet transaction count at the time of the last verify. Used as an
    /// on-chain activity proxy, never for ordering.
    pub last_known_nonce: u64,
}

/// Fixed check-in milestone ladder.
pub const MILESTONES: [u64; 7] = [1, 5, 10, 15, 30, 50, 100];

/// First milestone strictly greater than `streak`, saturating at the top.
pub fn next_milestone(streak: u64) -> u64 {
    MILESTONES
        .iter()
        .copied()
        .find(|m| *m > streak)
        .unwrap_or(100)
}
