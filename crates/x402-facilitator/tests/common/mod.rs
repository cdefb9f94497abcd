#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use x402_facilitator::{
    Facilitator, FacilitatorConfig, InMemoryReplayGuard, PaymentAuthorization, PaymentTerms,
    ReplayGuard, SchemeRegistry, SchemeStrategy, SettleRequest, StrategyError, VerifyRequest,
};

pub const SCHEME: &str = "exact";
pub const NETWORK: &str = "eip155:84532";
pub const PAY_TO: &str = "0x2222222222222222222222222222222222222222";
pub const ASSET: &str = "0x3333333333333333333333333333333333333333";

#[derive(Clone, Copy)]
pub enum SettleBehavior {
    Confirm,
    Reject,
    Fault,
}

/// Scripted strategy recording every call it receives.
pub struct MockStrategy {
    pub signature_valid: bool,
    pub behavior: SettleBehavior,
    pub settle_delay: Option<Duration>,
    pub signature_calls: AtomicUsize,
    pub settle_calls: AtomicUsize,
    pub settled_amounts: Mutex<Vec<u128>>,
}

impl MockStrategy {
    pub fn confirming() -> Self {
        Self {
            signature_valid: true,
            behavior: SettleBehavior::Confirm,
            settle_delay: None,
            signature_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
            settled_amounts: Mutex::new(Vec::new()),
        }
    }

    pub fn bad_signature() -> Self {
        Self {
            signature_valid: false,
            ..Self::confirming()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            behavior: SettleBehavior::Reject,
            ..Self::confirming()
        }
    }

    pub fn faulting() -> Self {
        Self {
            behavior: SettleBehavior::Fault,
            ..Self::confirming()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }
}

#[async_trait]
impl SchemeStrategy for MockStrategy {
    async fn verify_signature(
        &self,
        _authorization: &PaymentAuthorization,
        _terms: &PaymentTerms,
    ) -> Result<bool, StrategyError> {
        self.signature_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.signature_valid)
    }

    async fn settle(
        &self,
        _authorization: &PaymentAuthorization,
        amount: u128,
    ) -> Result<String, StrategyError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.settle_delay {
            tokio::time::sleep(delay).await;
        }
        self.settled_amounts.lock().unwrap().push(amount);
        match self.behavior {
            SettleBehavior::Confirm => Ok(format!("0x{amount:064x}")),
            SettleBehavior::Reject => Err(StrategyError::Rejected("transfer reverted".into())),
            SettleBehavior::Fault => {
                Err(StrategyError::Internal("rpc connection refused".into()))
            }
        }
    }
}

pub fn authorization(
    nonce: &str,
    amount: u128,
    valid_after: u64,
    valid_before: u64,
) -> PaymentAuthorization {
    PaymentAuthorization {
        scheme: SCHEME.to_string(),
        network: NETWORK.to_string(),
        payer: "0x1111111111111111111111111111111111111111".to_string(),
        pay_to: PAY_TO.to_string(),
        amount,
        asset: ASSET.to_string(),
        nonce: nonce.to_string(),
        valid_after,
        valid_before,
        signature: "0xsigned".to_string(),
    }
}

pub fn terms(min_amount: u128) -> PaymentTerms {
    PaymentTerms {
        pay_to: PAY_TO.to_string(),
        min_amount,
        asset: ASSET.to_string(),
        network: NETWORK.to_string(),
    }
}

pub fn verify_request(auth: PaymentAuthorization, min_amount: u128) -> VerifyRequest {
    VerifyRequest {
        authorization: auth,
        terms: terms(min_amount),
    }
}

pub fn settle_request(auth: PaymentAuthorization, min_amount: u128) -> SettleRequest {
    SettleRequest {
        authorization: auth,
        terms: terms(min_amount),
    }
}

pub fn registry_with(strategy: Arc<MockStrategy>) -> Arc<SchemeRegistry> {
    let mut registry = SchemeRegistry::new();
    registry.register(SCHEME, NETWORK, strategy);
    Arc::new(registry)
}

/// Facilitator plus handles to the strategy and guard it was built over.
pub struct Harness {
    pub facilitator: Facilitator,
    pub strategy: Arc<MockStrategy>,
    pub guard: Arc<InMemoryReplayGuard>,
}

pub fn harness(strategy: MockStrategy, config: FacilitatorConfig) -> Harness {
    let strategy = Arc::new(strategy);
    let guard = Arc::new(InMemoryReplayGuard::new());
    let facilitator = Facilitator::new(
        registry_with(Arc::clone(&strategy)),
        Arc::clone(&guard) as Arc<dyn ReplayGuard>,
        config,
    );
    Harness {
        facilitator,
        strategy,
        guard,
    }
}
