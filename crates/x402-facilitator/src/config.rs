use std::time::Duration;

use x402_engine::settle::{OverpaymentPolicy, SettlementConfig};
use x402_engine::DEFAULT_MAX_PAYLOAD_BYTES;

/// Facilitator configuration. Every knob is an explicit parameter; the
/// engines carry no hidden global defaults.
#[derive(Debug, Clone)]
pub struct FacilitatorConfig {
    /// Ceiling on an encoded payment payload.
    pub max_payload_bytes: usize,
    /// Symmetric widening of the temporal window, in seconds.
    pub clock_skew_secs: u64,
    /// Upper bound on one strategy settlement call.
    pub settlement_timeout: Duration,
    /// How long past `validBefore` a settled nonce stays held.
    pub replay_grace_secs: u64,
    /// Cadence of the background replay-record purge.
    pub purge_interval: Duration,
    /// Whether an overpaying authorization settles in full or at the minimum.
    pub overpayment: OverpaymentPolicy,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            clock_skew_secs: 0,
            settlement_timeout: Duration::from_secs(30),
            replay_grace_secs: 300,
            purge_interval: Duration::from_secs(60),
            overpayment: OverpaymentPolicy::default(),
        }
    }
}

impl FacilitatorConfig {
    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    pub fn with_clock_skew_secs(mut self, secs: u64) -> Self {
        self.clock_skew_secs = secs;
        self
    }

    pub fn with_settlement_timeout(mut self, timeout: Duration) -> Self {
        self.settlement_timeout = timeout;
        self
    }

    pub fn with_replay_grace_secs(mut self, secs: u64) -> Self {
        self.replay_grace_secs = secs;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    pub fn with_overpayment(mut self, policy: OverpaymentPolicy) -> Self {
        self.overpayment = policy;
        self
    }

    pub(crate) fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            timeout: self.settlement_timeout,
            replay_grace_secs: self.replay_grace_secs,
            overpayment: self.overpayment,
        }
    }
}
