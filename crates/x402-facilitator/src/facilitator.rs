//! The facilitator service: a thin façade over the verification and
//! settlement engines.

use std::sync::Arc;

use x402_engine::codec;
use x402_engine::error::{DecodeError, FacilitatorError};
use x402_engine::registry::SchemeRegistry;
use x402_engine::replay::ReplayGuard;
use x402_engine::settle::SettlementEngine;
use x402_engine::types::{
    InvalidReason, PaymentEnvelope, SettleRequest, SettlementReceipt, VerificationResult,
    VerifyRequest,
};
use x402_engine::verify::{unix_now, VerificationEngine};

use crate::config::FacilitatorConfig;
use crate::metrics;

/// Outcome of the verify-then-settle convenience flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyAndSettleOutcome {
    /// Verification failed; settlement never ran and the replay guard was
    /// never written.
    Invalid { reason: InvalidReason },
    /// Verification passed and settlement ran to a terminal receipt.
    Receipt(SettlementReceipt),
}

pub struct Facilitator {
    verifier: VerificationEngine,
    settler: SettlementEngine,
    registry: Arc<SchemeRegistry>,
    replay: Arc<dyn ReplayGuard>,
    config: FacilitatorConfig,
}

impl Facilitator {
    /// Build a facilitator over an already-populated registry. The registry
    /// is configuration-time state; the engines treat it as immutable.
    pub fn new(
        registry: Arc<SchemeRegistry>,
        replay: Arc<dyn ReplayGuard>,
        config: FacilitatorConfig,
    ) -> Self {
        let verifier = VerificationEngine::new(
            Arc::clone(&registry),
            Arc::clone(&replay),
            config.clock_skew_secs,
        );
        let settler = SettlementEngine::new(
            Arc::clone(&registry),
            Arc::clone(&replay),
            config.settlement(),
        );
        Self {
            verifier,
            settler,
            registry,
            replay,
            config,
        }
    }

    pub fn config(&self) -> &FacilitatorConfig {
        &self.config
    }

    /// Decode a raw payment payload as received in a request header,
    /// enforcing the configured size ceiling.
    pub fn decode_payment(&self, raw: &[u8]) -> Result<PaymentEnvelope, DecodeError> {
        codec::decode_payment(raw, self.config.max_payload_bytes)
    }

    /// Verify an authorization against the resource server's terms.
    /// Side-effect-free; may be called any number of times.
    pub async fn verify(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerificationResult, FacilitatorError> {
        let result = self.verifier.verify(request).await?;
        let label = if result.is_valid() { "valid" } else { "invalid" };
        metrics::VERIFY_REQUESTS.with_label_values(&[label]).inc();
        Ok(result)
    }

    /// Settle a verified authorization exactly once.
    pub async fn settle(
        &self,
        request: &SettleRequest,
    ) -> Result<SettlementReceipt, FacilitatorError> {
        let start = std::time::Instant::now();
        let outcome = self.settler.settle(request).await;
        let label = match &outcome {
            Ok(receipt) if receipt.is_settled() => "settled",
            Ok(_) => "failed",
            Err(_) => "error",
        };
        metrics::SETTLE_REQUESTS.with_label_values(&[label]).inc();
        metrics::SETTLE_LATENCY
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        outcome
    }

    /// `verify` followed by `settle` only on a `Valid` verdict. An `Invalid`
    /// verdict is returned unchanged without touching settlement state.
    pub async fn verify_then_settle(
        &self,
        request: &VerifyRequest,
    ) -> Result<VerifyAndSettleOutcome, FacilitatorError> {
        match self.verify(request).await? {
            VerificationResult::Invalid { reason } => {
                Ok(VerifyAndSettleOutcome::Invalid { reason })
            }
            VerificationResult::Valid { authorization } => {
                let settle_request = SettleRequest {
                    authorization,
                    terms: request.terms.clone(),
                };
                let receipt = self.settle(&settle_request).await?;
                Ok(VerifyAndSettleOutcome::Receipt(receipt))
            }
        }
    }

    /// The (scheme, network) pairs this facilitator can serve.
    pub fn supported(&self) -> Vec<(String, String)> {
        self.registry.supported()
    }

    /// Spawn a background task purging lapsed replay records on the
    /// configured interval.
    pub fn start_replay_purge(&self) {
        let guard = Arc::clone(&self.replay);
        let every = self.config.purge_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Ok(now) = unix_now() {
                    let purged = guard.purge_expired(now);
                    if purged > 0 {
                        tracing::info!(purged, "purged expired replay records");
                    }
                }
            }
        });
    }
}
