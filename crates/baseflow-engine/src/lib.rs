#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! Streak fetch policy and reconciliation engine.
//!
//! ## Fetch policy
//!
//! A single remote attempt; any failure falls through to the local store.
//! A nonzero remote streak is authoritative and overwrites local state; a
//! zero remote streak never regresses nonzero local progress.
//!
//! ## Verify (reconciliation)
//!
//! Ordered, short-circuiting:
//! 1. remote wins when it strictly exceeds the stored streak;
//! 2. otherwise the wallet nonce is read as an activity proxy;
//! 3. a nonce increase (or on-chain activity with a never-credited streak)
//!    earns exactly one optimistic local credit;
//! 4. otherwise the fetched state is returned unchanged with an advisory.
//!
//! Every external failure is absorbed into a typed outcome; the only error
//! that propagates is storage I/O. The stored streak never decreases here.

use std::sync::Arc;

use async_trait::async_trait;
use baseflow_checkin::{CheckInApiClient, CheckInApiError, RemoteCheckIn};
use baseflow_core::CheckInState;
use baseflow_rpc::{WalletRpcClient, WalletRpcError};
use baseflow_storage::{StorageError, StreakStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Advisory shown when a verify detects no forward progress.
pub const ADVISORY_NOT_CONFIRMED: &str = "not yet confirmed on-chain";

/// Remote half of the fetch policy.
#[async_trait]
pub trait CheckInRemote: Send + Sync {
    async fn fetch_remote(&self, address: &str) -> Result<RemoteCheckIn, CheckInApiError>;
}

#[async_trait]
impl CheckInRemote for CheckInApiClient {
    async fn fetch_remote(&self, address: &str) -> Result<RemoteCheckIn, CheckInApiError> {
        self.fetch(address).await
    }
}

/// On-chain activity proxy.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn transaction_count(&self, address: &str) -> Result<u64, WalletRpcError>;
}

#[async_trait]
impl NonceSource for WalletRpcClient {
    async fn transaction_count(&self, address: &str) -> Result<u64, WalletRpcError> {
        WalletRpcClient::transaction_count(self, address).await
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum lead of the local streak over the last remote-reported streak
    /// before optimistic credits are withheld. Bounds how far local state
    /// can drift from the remote source of truth.
    pub max_optimistic_drift: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_optimistic_drift: 30,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let max_optimistic_drift = std::env::var("BASEFLOW_MAX_OPTIMISTIC_DRIFT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| Self::default().max_optimistic_drift);
        Self {
            max_optimistic_drift,
        }
    }
}

/// Which path produced the fetched state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchSource {
    /// Remote responded and its value was accepted.
    Remote,
    /// Remote responded with zero but nonzero local progress was kept.
    RemoteZeroIgnored,
    /// Remote was unavailable; last known local value used.
    LocalFallback,
}

/// Result of one fetch, with the decision made explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub state: CheckInState,
    pub source: FetchSource,
    /// Raw remote report when the remote responded at all.
    pub remote: Option<RemoteCheckIn>,
}

/// Decision taken by one verify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyDecision {
    /// Remote reported strictly more progress than stored locally.
    RemoteAdvanced,
    /// A local credit was issued against a nonce delta.
    OptimisticCredit,
    /// Nothing moved; the fetched state was returned unchanged.
    NoProgress,
}

impl VerifyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyDecision::RemoteAdvanced => "remote_advanced",
            VerifyDecision::OptimisticCredit => "optimistic_credit",
            VerifyDecision::NoProgress => "no_progress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub state: CheckInState,
    pub decision: VerifyDecision,
    pub advisory: Option<String>,
}

/// Combines remote reports, local cache, and nonce deltas into the
/// authoritative per-address check-in state.
pub struct ReconciliationEngine {
    store: Arc<StreakStore>,
    remote: Arc<dyn CheckInRemote>,
    nonce: Arc<dyn NonceSource>,
    cfg: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<StreakStore>,
        remote: Arc<dyn CheckInRemote>,
        nonce: Arc<dyn NonceSource>,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            store,
            remote,
            nonce,
            cfg,
        }
    }

    /// Best-effort fetch of the current check-in state for an address.
    pub async fn fetch(&self, address: &str) -> Result<FetchOutcome, StorageError> {
        let local = self.store.get(address)?.unwrap_or_default();
        match self.remote.fetch_remote(address).await {
            Ok(report) if report.streak > 0 => {
                // Nonzero remote is authoritative, even below local.
                let state = self.store.update(address, |prev| CheckInState {
                    current_streak: report.streak,
                    total_check_ins: report.total.max(report.streak),
                    last_known_nonce: prev.last_known_nonce,
                })?;
                debug!(%address, streak = state.current_streak, "remote streak persisted");
                Ok(FetchOutcome {
                    state,
                    source: FetchSource::Remote,
                    remote: Some(report),
                })
            }
            Ok(report) if local.current_streak > 0 => {
                // Zero from remote never regresses local optimistic progress.
                debug!(%address, local = local.current_streak, "remote zero ignored");
                Ok(FetchOutcome {
                    state: local,
                    source: FetchSource::RemoteZeroIgnored,
                    remote: Some(report),
                })
            }
            Ok(report) => {
                // Zero streak both sides: surface the remote lifetime total
                // without persisting anything.
                Ok(FetchOutcome {
                    state: CheckInState {
                        total_check_ins: report.total,
                        ..local
                    },
                    source: FetchSource::Remote,
                    remote: Some(report),
                })
            }
            Err(err) => {
                warn!(%address, error = %err, "remote unavailable; using local state");
                Ok(FetchOutcome {
                    state: local,
                    source: FetchSource::LocalFallback,
                    remote: None,
                })
            }
        }
    }

    /// User-triggered reconciliation. Always returns some state; the only
    /// propagated failure is local storage I/O.
    pub async fn verify(&self, address: &str) -> Result<VerifyOutcome, StorageError> {
        let before = self.store.get(address)?.unwrap_or_default();
        let fetched = self.fetch(address).await?;

        if fetched.state.current_streak > before.current_streak {
            info!(
                %address,
                from = before.current_streak,
                to = fetched.state.current_streak,
                "remote advanced streak"
            );
            return Ok(VerifyOutcome {
                state: fetched.state,
                decision: VerifyDecision::RemoteAdvanced,
                advisory: None,
            });
        }

        let nonce = match self.nonce.transaction_count(address).await {
            Ok(n) => Some(n),
            Err(err) => {
                warn!(%address, error = %err, "nonce read failed; keeping fetched state");
                None
            }
        };

        if let Some(nonce) = nonce {
            let local = fetched.state;
            let nonce_advanced = nonce > local.last_known_nonce;
            let never_credited = nonce > 0 && local.current_streak == 0;
            if (nonce_advanced || never_credited)
                && self.within_drift(&local, fetched.remote.as_ref())
            {
                let updated = self.store.update(address, |prev| {
                    let mut next = prev;
                    // Re-checked inside the CAS closure so a concurrent
                    // verify cannot claim the same nonce delta twice.
                    if nonce > next.last_known_nonce || (nonce > 0 && next.current_streak == 0) {
                        next.current_streak = next.current_streak.saturating_add(1);
                        next.total_check_ins = next.total_check_ins.saturating_add(1);
                        next.last_known_nonce = nonce;
                    }
                    next
                })?;
                if updated.current_streak > local.current_streak {
                    info!(%address, streak = updated.current_streak, nonce, "optimistic credit issued");
                    return Ok(VerifyOutcome {
                        state: updated,
                        decision: VerifyDecision::OptimisticCredit,
                        advisory: None,
                    });
                }
                return Ok(VerifyOutcome {
                    state: updated,
                    decision: VerifyDecision::NoProgress,
                    advisory: Some(ADVISORY_NOT_CONFIRMED.to_string()),
                });
            }
        }

        Ok(VerifyOutcome {
            state: fetched.state,
            decision: VerifyDecision::NoProgress,
            advisory: Some(ADVISORY_NOT_CONFIRMED.to_string()),
        })
    }

    /// Drift guard: with a remote report in hand, stop crediting once the
    /// local streak leads it by the configured maximum. Without a report
    /// there is nothing to measure against and the credit stands.
    fn within_drift(&self, local: &CheckInState, remote: Option<&RemoteCheckIn>) -> bool {
        match remote {
            Some(report) => {
                let lead = local.current_streak.saturating_sub(report.streak);
                if lead >= self.cfg.max_optimistic_drift {
                    warn!(
                        lead,
                        cap = self.cfg.max_optimistic_drift,
                        "optimistic drift cap reached; credit withheld"
                    );
                    false
                } else {
                    true
                }
            }
            None => true,
        }
    }
}
