//! Wire codec for payment payloads: base64-encoded JSON, as carried in the
//! x402 payment header.
//!
//! The codec enforces size and structural invariants only. An unknown
//! `scheme` or `network` is not a decode error - resolution is the scheme
//! registry's job, so new schemes never require codec changes.

use base64::Engine;

use crate::error::DecodeError;
use crate::types::PaymentEnvelope;

/// Default ceiling for an encoded payment payload.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 65_536;

/// Decode a raw payment payload as received from a payer.
///
/// The size limit is checked before any parsing so oversized input is
/// rejected without allocation proportional to its content.
pub fn decode_payment(raw: &[u8], max_bytes: usize) -> Result<PaymentEnvelope, DecodeError> {
    if raw.len() > max_bytes {
        return Err(DecodeError::TooLarge {
            size: raw.len(),
            limit: max_bytes,
        });
    }
    let json = base64::engine::general_purpose::STANDARD.decode(raw)?;
    let envelope: PaymentEnvelope = serde_json::from_slice(&json)?;
    envelope.payload.check_invariants()?;
    Ok(envelope)
}

/// Base64-encode a payment envelope for the payment header.
pub fn encode_payment(envelope: &PaymentEnvelope) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(envelope)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&json))
}
