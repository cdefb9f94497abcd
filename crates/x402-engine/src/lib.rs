//! Core verification and settlement engine for the x402 micropayment
//! protocol.
//!
//! A facilitator sits between a resource server demanding payment over HTTP
//! 402 and a payer's client: it validates signed payment authorizations
//! against protocol, signature, and double-spend rules, and drives accepted
//! ones through a network-specific settlement strategy exactly once. This
//! crate is the engine only - HTTP surfaces, middleware, and wallet key
//! management belong to the callers.
//!
//! # Modules
//!
//! - [`types`] - authorizations, terms, verdicts, receipts
//! - [`codec`] - base64/JSON payload codec with size and invariant enforcement
//! - [`registry`] - (scheme, network) → [`SchemeStrategy`](registry::SchemeStrategy) lookup
//! - [`replay`] - atomic (payer, nonce) replay guard, in-memory and SQLite
//! - [`verify`] - ordered, side-effect-free verification checks
//! - [`settle`] - exactly-once settlement with timeout and hold release
//! - [`error`] - decode and engine fault taxonomy

pub mod codec;
pub mod error;
pub mod registry;
pub mod replay;
pub mod settle;
pub mod types;
pub mod verify;

pub use codec::{decode_payment, encode_payment, DEFAULT_MAX_PAYLOAD_BYTES};
pub use error::{DecodeError, FacilitatorError};
pub use registry::{SchemeRegistry, SchemeStrategy, StrategyError};
pub use replay::{InMemoryReplayGuard, ReplayGuard, SqliteReplayGuard};
pub use settle::{OverpaymentPolicy, SettlementConfig, SettlementEngine};
pub use types::{
    InvalidReason, PaymentAuthorization, PaymentEnvelope, PaymentTerms, SettleRequest,
    SettlementFailure, SettlementReceipt, VerificationResult, VerifyRequest,
};
pub use verify::{unix_now, VerificationEngine};
