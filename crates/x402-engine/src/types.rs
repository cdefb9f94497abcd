//! Wire and domain types for payment authorizations, terms, and verdicts.
//!
//! Amounts are fixed-point integers in the asset's minor unit, carried as
//! decimal strings on the wire. JSON numbers lose precision past 2^53 and
//! token amounts routinely exceed that.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub(crate) mod amount_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(de)?;
        raw.parse::<u128>()
            .map_err(|_| de::Error::custom(format!("invalid amount: {raw:?}")))
    }
}

/// A signed payment claim presented by a payer.
///
/// `payer`, `pay_to`, `asset`, `nonce`, and `signature` are opaque to the
/// engine; their format belongs to the (scheme, network) strategy. The
/// validity window is `[valid_after, valid_before)` in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    pub scheme: String,
    pub network: String,
    pub payer: String,
    pub pay_to: String,
    #[serde(with = "amount_string")]
    pub amount: u128,
    pub asset: String,
    /// Unique-per-payer token; consumed exactly once at settlement.
    pub nonce: String,
    pub valid_after: u64,
    pub valid_before: u64,
    pub signature: String,
}

impl PaymentAuthorization {
    /// Structural invariants, enforced at the codec boundary.
    pub fn check_invariants(&self) -> Result<(), DecodeError> {
        if self.amount == 0 {
            return Err(DecodeError::Structural("amount must be positive".into()));
        }
        if self.valid_after >= self.valid_before {
            return Err(DecodeError::Structural(format!(
                "validAfter {} must precede validBefore {}",
                self.valid_after, self.valid_before
            )));
        }
        for (name, value) in [
            ("scheme", &self.scheme),
            ("network", &self.network),
            ("payer", &self.payer),
            ("payTo", &self.pay_to),
            ("asset", &self.asset),
            ("nonce", &self.nonce),
            ("signature", &self.signature),
        ] {
            if value.is_empty() {
                return Err(DecodeError::Structural(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// The resource server's expected payment terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    pub pay_to: String,
    #[serde(with = "amount_string")]
    pub min_amount: u128,
    pub asset: String,
    pub network: String,
}

/// An authorization plus the terms it must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub authorization: PaymentAuthorization,
    pub terms: PaymentTerms,
}

/// A previously verified authorization submitted for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub authorization: PaymentAuthorization,
    pub terms: PaymentTerms,
}

/// Why a verification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvalidReason {
    TermsMismatch,
    NotYetValid,
    Expired,
    AlreadySettled,
    UnsupportedScheme,
    BadSignature,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TermsMismatch => "authorization does not satisfy the payment terms",
            Self::NotYetValid => "authorization not yet valid",
            Self::Expired => "authorization expired",
            Self::AlreadySettled => "authorization already settled",
            Self::UnsupportedScheme => "unsupported scheme or network",
            Self::BadSignature => "invalid signature",
        })
    }
}

/// Outcome of verification. Exactly one variant, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VerificationResult {
    Valid { authorization: PaymentAuthorization },
    Invalid { reason: InvalidReason },
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Invalid { reason } => Some(*reason),
            Self::Valid { .. } => None,
        }
    }
}

/// Terminal settlement failure reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SettlementFailure {
    /// The (payer, nonce) pair is already settled or mid-settlement.
    AlreadySettled,
    /// The network reached a terminal "no" (rejected broadcast, reverted).
    NetworkRejected { detail: String },
    /// The strategy did not reach a terminal state within the configured bound.
    Timeout,
    /// The strategy failed before the network gave a terminal answer.
    StrategyError { detail: String },
}

impl std::fmt::Display for SettlementFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySettled => f.write_str("already settled"),
            Self::NetworkRejected { detail } => write!(f, "network rejected: {detail}"),
            Self::Timeout => f.write_str("settlement timed out"),
            Self::StrategyError { detail } => write!(f, "strategy error: {detail}"),
        }
    }
}

/// Immutable evidence of a settlement outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SettlementReceipt {
    Settled {
        /// Network-specific transaction reference.
        transaction: String,
        network: String,
        #[serde(with = "amount_string")]
        amount: u128,
    },
    Failed { reason: SettlementFailure },
}

impl SettlementReceipt {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Wire envelope carried in the payment header, base64-encoded JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEnvelope {
    pub x402_version: u32,
    pub payload: PaymentAuthorization,
}
