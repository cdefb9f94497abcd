//! Scheme registry: maps a (scheme, network) pair to its verification and
//! settlement strategy.
//!
//! The registry is a pure lookup table populated at startup and treated as
//! immutable afterwards from the engine's perspective. Lookup is exact and
//! case-sensitive with no fallback - an unresolved pair is always an explicit
//! miss, since defaulting to the wrong network could move value on the wrong
//! ledger.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{PaymentAuthorization, PaymentTerms};

/// Failure inside a settlement strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The network reached a terminal "no": rejected broadcast, reverted call.
    #[error("network rejected settlement: {0}")]
    Rejected(String),

    /// The strategy failed before the network gave a terminal answer.
    #[error("strategy failure: {0}")]
    Internal(String),
}

/// Per-(scheme, network) verification and settlement behavior.
///
/// One implementation per pair, registered into the [`SchemeRegistry`]. The
/// engine never branches on scheme or network identifiers itself.
#[async_trait]
pub trait SchemeStrategy: Send + Sync {
    /// Check the authorization's signature against the scheme's signing
    /// convention. Adversarial input (malformed signatures, unparseable
    /// addresses) is a `false` verdict, not an error.
    async fn verify_signature(
        &self,
        authorization: &PaymentAuthorization,
        terms: &PaymentTerms,
    ) -> Result<bool, StrategyError>;

    /// Submit the payment of `amount` minor units and block until the network
    /// reports a terminal state. Returns the network's transaction reference.
    ///
    /// The engine bounds this call with its settlement timeout and never
    /// retries it; any network-level idempotency belongs in here.
    async fn settle(
        &self,
        authorization: &PaymentAuthorization,
        amount: u128,
    ) -> Result<String, StrategyError>;
}

#[derive(Default)]
pub struct SchemeRegistry {
    strategies: HashMap<(String, String), Arc<dyn SchemeStrategy>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy for a (scheme, network) pair. Configuration-time
    /// only; the engines hold the registry behind `Arc` once built.
    pub fn register(
        &mut self,
        scheme: impl Into<String>,
        network: impl Into<String>,
        strategy: Arc<dyn SchemeStrategy>,
    ) {
        self.strategies
            .insert((scheme.into(), network.into()), strategy);
    }

    pub fn resolve(&self, scheme: &str, network: &str) -> Option<Arc<dyn SchemeStrategy>> {
        self.strategies
            .get(&(scheme.to_string(), network.to_string()))
            .cloned()
    }

    /// The (scheme, network) pairs this registry can serve, sorted.
    pub fn supported(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self.strategies.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
