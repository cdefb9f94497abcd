//! x402 facilitator - the façade combining verification and settlement.
//!
//! A resource server's middleware hands this crate a raw payment payload and
//! its payment terms; it gets back a [`VerificationResult`] or a
//! [`SettlementReceipt`] to translate into its own HTTP response (402 vs
//! 200). The translation, routing, and authentication are the caller's job;
//! the engine semantics live in [`x402_engine`].
//!
//! # Modules
//!
//! - [`facilitator`] - the [`Facilitator`](facilitator::Facilitator) service
//! - [`config`] - explicit knobs, no implicit global defaults
//! - [`metrics`] - Prometheus counters and latency histograms

pub mod config;
pub mod facilitator;
pub mod metrics;

pub use config::FacilitatorConfig;
pub use facilitator::{Facilitator, VerifyAndSettleOutcome};

pub use x402_engine::{
    DecodeError, FacilitatorError, InMemoryReplayGuard, InvalidReason, OverpaymentPolicy,
    PaymentAuthorization, PaymentEnvelope, PaymentTerms, ReplayGuard, SchemeRegistry,
    SchemeStrategy, SettleRequest, SettlementFailure, SettlementReceipt, SqliteReplayGuard,
    StrategyError, VerificationResult, VerifyRequest,
};
