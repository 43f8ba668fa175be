//! Deterministic score generator.
//!
//! Maps an address string to a stable pseudo-random wallet profile and
//! reputation score. The address is the entire key: the same input always
//! produces bit-identical output, within a session and across sessions,
//! with no persisted state involved.

use crate::{ReputationScore, RiskLevel, ScoreBreakdown, WalletProfile};

const LONGEVITY_CEILING: u64 = 250;
const ACTIVITY_CEILING: u64 = 300;
const DIVERSITY_CEILING: u64 = 250;
const TOTAL_CEILING: u64 = 1000;

/// Fold the UTF-8 bytes of `input` into a non-negative 32-bit seed.
///
/// Rolling multiply-by-31-and-add with machine-word overflow semantics
/// (`h = (h << 5) - h + byte` in wrapping i32 arithmetic), then the
/// absolute value.
pub fn seed_for(input: &str) -> u64 {
    let mut h: i32 = 0;
    for b in input.bytes() {
        h = h
            .wrapping_shl(5)
            .wrapping_sub(h)
            .wrapping_add(i32::from(b));
    }
    u64::from(h.unsigned_abs())
}

/// Generate the synthetic profile and reputation score for an address.
///
/// Pure and total: no I/O, no failure mode. Every field is a distinct
/// arithmetic projection of the same seed, clamped to its documented
/// ceiling before summation; the total is clamped to 1000.
pub fn generate(address: &str) -> (WalletProfile, ReputationScore) {
    let seed = seed_for(address);

    let tx_count = seed % 500 + 20;
    let unique_contracts = tx_count * 3 / 10 + seed % 10;

    let longevity = (seed % 250 + 50).min(LONGEVITY_CEILING);
    let activity = tx_count.min(ACTIVITY_CEILING);
    let diversity = (unique_contracts * 5).min(DIVERSITY_CEILING);
    let identity = seed % 200;

    let breakdown = ScoreBreakdown {
        longevity,
        activity,
        diversity,
        identity,
    };
    let total = breakdown.sum().min(TOTAL_CEILING);

    let profile = WalletProfile {
        address: address.to_string(),
        tx_count,
        first_tx_date: first_tx_date(seed),
        eth_balance_display: format_eth_balance(seed),
        gas_spent_display: format_gas_spent(seed),
        unique_contracts,
        badge_count: total / 150,
    };
    let score = ReputationScore {
        total,
        breakdown,
        risk_level: RiskLevel::from_total(total),
    };
    (profile, score)
}

/// `(seed % 1000) / 100` ETH rendered with two decimals, in integer math.
fn format_eth_balance(seed: u64) -> String {
    let cents = seed % 1000;
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// `(seed % 100) / 20` ETH rendered with three decimals, in integer math.
fn format_gas_spent(seed: u64) -> String {
    let millis = (seed % 100) * 50;
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

fn first_tx_date(seed: u64) -> String {
    let year = 2021 + seed % 3;
    let month = seed % 12 + 1;
    let day = seed % 28 + 1;
    format!("{year:04}-{month:02}-{day:02}")
}
