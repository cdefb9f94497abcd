//! Settlement engine: drives a verified authorization through its strategy
//! exactly once.
//!
//! The atomic replay claim in step 1 is the sole exactly-once enforcement
//! point. Everything after it either ends in a settled receipt (the hold is
//! kept past the authorization window) or a terminal failure (the hold is
//! released so a legitimate retry is not blocked by a transient fault).

use std::cmp;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FacilitatorError;
use crate::registry::{SchemeRegistry, StrategyError};
use crate::replay::ReplayGuard;
use crate::types::{SettleRequest, SettlementFailure, SettlementReceipt};
use crate::verify::unix_now;

/// How much of an overpaying authorization to settle. The x402 protocol
/// leaves this open, so it is an explicit policy rather than a hidden
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverpaymentPolicy {
    /// Settle the full authorized amount.
    #[default]
    SettleAuthorized,
    /// Settle only the resource server's minimum.
    SettleMinimum,
}

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Upper bound on one strategy settlement call.
    pub timeout: Duration,
    /// How long past `validBefore` a settled nonce stays held, so a late
    /// duplicate attempt still finds the record.
    pub replay_grace_secs: u64,
    pub overpayment: OverpaymentPolicy,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            replay_grace_secs: 300,
            overpayment: OverpaymentPolicy::default(),
        }
    }
}

pub struct SettlementEngine {
    registry: Arc<SchemeRegistry>,
    replay: Arc<dyn ReplayGuard>,
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(
        registry: Arc<SchemeRegistry>,
        replay: Arc<dyn ReplayGuard>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            registry,
            replay,
            config,
        }
    }

    /// Settle a previously verified authorization.
    ///
    /// Callers are expected to verify immediately beforehand - the temporal
    /// window and replay status can change between verification and
    /// settlement. The engine performs no automatic retry: retrying a
    /// possibly-broadcast transaction is unsafe without network-specific
    /// idempotency, which belongs inside the strategy.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let auth = &request.authorization;
        debug_assert!(
            auth.check_invariants().is_ok(),
            "settle called with a structurally malformed authorization"
        );

        let now = unix_now()?;

        // 1. Claim the nonce. The in-flight hold must outlive the network
        //    call so a concurrent duplicate still observes it.
        let in_flight_hold = cmp::max(
            auth.valid_before,
            now.saturating_add(self.config.timeout.as_secs().saturating_add(1)),
        );
        if !self
            .replay
            .try_claim(&auth.payer, &auth.nonce, now, in_flight_hold)
        {
            tracing::warn!(
                payer = %auth.payer,
                nonce = %auth.nonce,
                "duplicate settlement attempt rejected"
            );
            return Ok(failed(SettlementFailure::AlreadySettled));
        }

        // 2. Re-resolved rather than cached: registry contents may have
        //    changed since verification in a long-lived process.
        let Some(strategy) = self.registry.resolve(&auth.scheme, &auth.network) else {
            self.replay.release(&auth.payer, &auth.nonce);
            return Ok(failed(SettlementFailure::StrategyError {
                detail: format!("no strategy for ({}, {})", auth.scheme, auth.network),
            }));
        };

        let amount = match self.config.overpayment {
            OverpaymentPolicy::SettleAuthorized => auth.amount,
            OverpaymentPolicy::SettleMinimum => request.terms.min_amount,
        };

        // 3. One bounded network call, then a terminal receipt either way.
        match tokio::time::timeout(self.config.timeout, strategy.settle(auth, amount)).await {
            Ok(Ok(transaction)) => {
                let hold = cmp::max(
                    in_flight_hold,
                    auth.valid_before
                        .saturating_add(self.config.replay_grace_secs),
                );
                self.replay.extend(&auth.payer, &auth.nonce, hold);
                tracing::info!(
                    payer = %auth.payer,
                    amount,
                    nonce = %auth.nonce,
                    tx = %transaction,
                    "payment settled"
                );
                Ok(SettlementReceipt::Settled {
                    transaction,
                    network: auth.network.clone(),
                    amount,
                })
            }
            Ok(Err(StrategyError::Rejected(detail))) => {
                self.replay.release(&auth.payer, &auth.nonce);
                tracing::warn!(payer = %auth.payer, %detail, "settlement rejected by network");
                Ok(failed(SettlementFailure::NetworkRejected { detail }))
            }
            Ok(Err(StrategyError::Internal(detail))) => {
                self.replay.release(&auth.payer, &auth.nonce);
                tracing::error!(payer = %auth.payer, %detail, "settlement strategy failed");
                Ok(failed(SettlementFailure::StrategyError { detail }))
            }
            Err(_elapsed) => {
                // Only genuinely-settled or in-flight settlements may hold the
                // nonce; a stall must not brick it.
                self.replay.release(&auth.payer, &auth.nonce);
                tracing::warn!(
                    payer = %auth.payer,
                    timeout_secs = self.config.timeout.as_secs(),
                    "settlement timed out"
                );
                Ok(failed(SettlementFailure::Timeout))
            }
        }
    }
}

fn failed(reason: SettlementFailure) -> SettlementReceipt {
    SettlementReceipt::Failed { reason }
}
