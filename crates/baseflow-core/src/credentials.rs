//! Static credential catalog.
//!
//! Each credential unlocks at a fixed total-score threshold. The catalog is
//! configuration, not state: it never changes at runtime.

use serde::{Deserialize, Serialize};

/// A credential definition: display name, category, unlock threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub name: &'static str,
    pub category: &'static str,
    pub threshold: u64,
}

/// All credentials, in display order.
pub const CREDENTIALS: [Credential; 6] = [
    Credential {
        name: "Base OG",
        category: "Longevity",
        threshold: 700,
    },
    Credential {
        name: "DeFi Power User",
        category: "Volume",
        threshold: 500,
    },
    Credential {
        name: "NFT Collector",
        category: "Holding",
        threshold: 400,
    },
    Credential {
        name: "Gitcoin Donor",
        category: "Public Goods",
        threshold: 300,
    },
    Credential {
        name: "Governance Voter",
        category: "DAO",
        threshold: 600,
    },
    Credential {
        name: "Liquidity Provider",
        category: "DeFi",
        threshold: 800,
    },
];

/// A credential together with its unlock state for a given score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub name: String,
    pub category: String,
    pub threshold: u64,
    pub unlocked: bool,
}

/// Evaluate the full catalog against a total score.
pub fn earned_credentials(total: u64) -> Vec<CredentialStatus> {
    CREDENTIALS
        .iter()
        .map(|c| CredentialStatus {
            name: c.name.to_string(),
            category: c.category.to_string(),
            threshold: c.threshold,
            unlocked: total >= c.threshold,
        })
        .collect()
}
