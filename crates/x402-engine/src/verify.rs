//! Verification engine: ordered, short-circuiting checks producing a
//! [`VerificationResult`].
//!
//! Verification is side-effect-free and idempotent - it reads the replay
//! guard but never writes it, so a client may legitimately re-verify any
//! number of times before settling.

use std::sync::Arc;

use crate::error::FacilitatorError;
use crate::registry::SchemeRegistry;
use crate::replay::ReplayGuard;
use crate::types::{InvalidReason, VerificationResult, VerifyRequest};

/// Current unix time in seconds. Fails only if the clock is before the epoch.
pub fn unix_now() -> Result<u64, FacilitatorError> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| FacilitatorError::Clock(format!("system time before epoch: {e}")))
}

pub struct VerificationEngine {
    registry: Arc<SchemeRegistry>,
    replay: Arc<dyn ReplayGuard>,
    clock_skew_secs: u64,
}

impl VerificationEngine {
    pub fn new(
        registry: Arc<SchemeRegistry>,
        replay: Arc<dyn ReplayGuard>,
        clock_skew_secs: u64,
    ) -> Self {
        Self {
            registry,
            replay,
            clock_skew_secs,
        }
    }

    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerificationResult, FacilitatorError> {
        let now = unix_now()?;
        self.verify_at(request, now).await
    }

    /// Verify against an explicit timestamp.
    ///
    /// Checks run in cost order and short-circuit on the first failure, so
    /// the signature check - usually the expensive step - only runs once
    /// everything cheaper has passed.
    pub async fn verify_at(
        &self,
        request: &VerifyRequest,
        now: u64,
    ) -> Result<VerificationResult, FacilitatorError> {
        let auth = &request.authorization;
        let terms = &request.terms;

        // 1. Terms: exact identifier equality; amount is a sufficiency check,
        //    an overpaying authorization still satisfies the terms.
        if auth.network != terms.network
            || auth.asset != terms.asset
            || auth.pay_to != terms.pay_to
            || auth.amount < terms.min_amount
        {
            tracing::debug!(payer = %auth.payer, "authorization does not meet the payment terms");
            return Ok(invalid(InvalidReason::TermsMismatch));
        }

        // 2. Temporal: closed-open [validAfter, validBefore), each bound
        //    widened symmetrically by the configured skew tolerance.
        let skew = self.clock_skew_secs;
        if now.saturating_add(skew) < auth.valid_after {
            return Ok(invalid(InvalidReason::NotYetValid));
        }
        if now >= auth.valid_before.saturating_add(skew) {
            return Ok(invalid(InvalidReason::Expired));
        }

        // 3. Replay: a live hold means the nonce is settled or mid-settlement.
        if self.replay.is_held(&auth.payer, &auth.nonce, now) {
            tracing::warn!(payer = %auth.payer, nonce = %auth.nonce, "replayed nonce rejected");
            return Ok(invalid(InvalidReason::AlreadySettled));
        }

        // 4. Scheme resolution.
        let Some(strategy) = self.registry.resolve(&auth.scheme, &auth.network) else {
            tracing::debug!(
                scheme = %auth.scheme,
                network = %auth.network,
                "no strategy registered for pair"
            );
            return Ok(invalid(InvalidReason::UnsupportedScheme));
        };

        // 5. Signature, delegated to the strategy.
        if !strategy.verify_signature(auth, terms).await? {
            tracing::warn!(payer = %auth.payer, "signature verification failed");
            return Ok(invalid(InvalidReason::BadSignature));
        }

        tracing::debug!(
            payer = %auth.payer,
            amount = auth.amount,
            "payment verification succeeded"
        );
        Ok(VerificationResult::Valid {
            authorization: auth.clone(),
        })
    }
}

fn invalid(reason: InvalidReason) -> VerificationResult {
    VerificationResult::Invalid { reason }
}
