//! [`SchemeStrategy`] implementation wiring EIP-712 verification and ERC-20
//! settlement into the engine.

use alloy::primitives::{Address, FixedBytes, U256};
use alloy::providers::Provider;
use async_trait::async_trait;

use x402_engine::registry::{SchemeStrategy, StrategyError};
use x402_engine::types::{PaymentAuthorization, PaymentTerms};

use crate::eip712::verify_transfer_signature;
use crate::{TransferAuthorization, IERC20};

/// One EVM chain this strategy serves, keyed by its CAIP-2 network name.
#[derive(Debug, Clone)]
pub struct ChainProfile {
    pub chain_id: u64,
    pub network: String,
    pub domain_name: String,
    pub domain_version: String,
}

/// `exact` scheme strategy for one EVM chain.
///
/// The facilitator's account must already hold a `transferFrom` allowance
/// from each payer; `settle` preflights the allowance and rejects
/// terminally when it is short.
pub struct ExactEvmStrategy<P> {
    provider: P,
    spender: Address,
    profile: ChainProfile,
}

impl<P> ExactEvmStrategy<P> {
    pub fn new(provider: P, spender: Address, profile: ChainProfile) -> Self {
        Self {
            provider,
            spender,
            profile,
        }
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    /// Lift the engine's opaque strings into typed EVM values. `None` means
    /// the authorization cannot be valid on this chain.
    fn typed_authorization(
        &self,
        auth: &PaymentAuthorization,
    ) -> Option<(TransferAuthorization, Address)> {
        let from = parse_address(&auth.payer)?;
        let to = parse_address(&auth.pay_to)?;
        let asset = parse_address(&auth.asset)?;
        let nonce = parse_nonce(&auth.nonce)?;
        let typed = TransferAuthorization {
            from,
            to,
            value: U256::from(auth.amount),
            validAfter: U256::from(auth.valid_after),
            validBefore: U256::from(auth.valid_before),
            nonce,
        };
        Some((typed, asset))
    }
}

fn parse_address(raw: &str) -> Option<Address> {
    raw.parse::<Address>().ok()
}

fn parse_nonce(raw: &str) -> Option<FixedBytes<32>> {
    let hex = raw.strip_prefix("0x")?;
    let bytes = alloy::hex::decode(hex).ok()?;
    let bytes: [u8; 32] = bytes.try_into().ok()?;
    Some(FixedBytes::from(bytes))
}

fn parse_signature(raw: &str) -> Option<Vec<u8>> {
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    alloy::hex::decode(hex).ok()
}

#[async_trait]
impl<P> SchemeStrategy for ExactEvmStrategy<P>
where
    P: Provider + Send + Sync,
{
    /// Malformed payloads recover nothing, so every parse or signature fault
    /// maps to `Ok(false)` rather than an error: adversarial input is an
    /// invalid payment, not a facilitator fault.
    async fn verify_signature(
        &self,
        auth: &PaymentAuthorization,
        _terms: &PaymentTerms,
    ) -> Result<bool, StrategyError> {
        let Some((typed, asset)) = self.typed_authorization(auth) else {
            tracing::debug!(payer = %auth.payer, "authorization fields are not valid EVM values");
            return Ok(false);
        };
        let Some(signature) = parse_signature(&auth.signature) else {
            return Ok(false);
        };

        match verify_transfer_signature(&typed, &signature, &self.profile, asset) {
            Ok(recovered) => Ok(recovered == typed.from),
            Err(fault) => {
                tracing::debug!(payer = %auth.payer, %fault, "signature rejected");
                Ok(false)
            }
        }
    }

    /// One `transferFrom` call. The engine bounds this future with its
    /// settlement timeout, so no inner deadline is needed.
    async fn settle(
        &self,
        auth: &PaymentAuthorization,
        amount: u128,
    ) -> Result<String, StrategyError> {
        let Some((typed, asset)) = self.typed_authorization(auth) else {
            return Err(StrategyError::Internal(
                "settle called with non-EVM authorization fields".to_string(),
            ));
        };
        let value = U256::from(amount);
        let contract = IERC20::new(asset, &self.provider);

        let allowance = contract
            .allowance(typed.from, self.spender)
            .call()
            .await
            .map_err(|e| StrategyError::Internal(format!("allowance query failed: {e}")))?;
        if allowance < value {
            return Err(StrategyError::Rejected(format!(
                "insufficient allowance: have {allowance}, need {value}"
            )));
        }

        let pending = contract
            .transferFrom(typed.from, typed.to, value)
            .send()
            .await
            .map_err(|e| StrategyError::Rejected(format!("transferFrom send failed: {e}")))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| StrategyError::Internal(format!("transferFrom receipt failed: {e}")))?;

        if !receipt.status() {
            return Err(StrategyError::Rejected("transferFrom reverted".to_string()));
        }

        Ok(format!("{:#x}", receipt.transaction_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::network::Ethereum;
    use alloy::providers::RootProvider;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    use crate::eip712::signing_hash;

    fn profile() -> ChainProfile {
        ChainProfile {
            chain_id: 84532,
            network: "eip155:84532".to_string(),
            domain_name: "TransferWithAuthorization".to_string(),
            domain_version: "1".to_string(),
        }
    }

    // A provider that is never dialed: these tests only exercise the
    // signature path, which is local.
    fn strategy() -> ExactEvmStrategy<RootProvider<Ethereum>> {
        let provider = RootProvider::<Ethereum>::new_http("http://localhost:1".parse().unwrap());
        ExactEvmStrategy::new(provider, Address::repeat_byte(0x99), profile())
    }

    fn signed_authorization(signer: &PrivateKeySigner) -> PaymentAuthorization {
        let asset = Address::repeat_byte(0x33);
        let pay_to = Address::repeat_byte(0x22);
        let nonce = FixedBytes::<32>::repeat_byte(0x07);
        let typed = TransferAuthorization {
            from: signer.address(),
            to: pay_to,
            value: U256::from(1_000u64),
            validAfter: U256::ZERO,
            validBefore: U256::from(4_000_000_000u64),
            nonce,
        };
        let hash = signing_hash(&typed, &profile(), asset);
        let sig = signer.sign_hash_sync(&hash).unwrap();

        PaymentAuthorization {
            scheme: "exact".to_string(),
            network: "eip155:84532".to_string(),
            payer: format!("{:#x}", signer.address()),
            pay_to: format!("{pay_to:#x}"),
            amount: 1_000,
            asset: format!("{asset:#x}"),
            nonce: format!("{nonce:#x}"),
            valid_after: 0,
            valid_before: 4_000_000_000,
            signature: format!("0x{}", alloy::hex::encode(sig.as_bytes())),
        }
    }

    fn terms_for(auth: &PaymentAuthorization) -> PaymentTerms {
        PaymentTerms {
            pay_to: auth.pay_to.clone(),
            min_amount: auth.amount,
            asset: auth.asset.clone(),
            network: auth.network.clone(),
        }
    }

    #[tokio::test]
    async fn accepts_a_correctly_signed_authorization() {
        let signer = PrivateKeySigner::random();
        let auth = signed_authorization(&signer);
        let ok = strategy()
            .verify_signature(&auth, &terms_for(&auth))
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn rejects_signature_from_a_different_key() {
        let signer = PrivateKeySigner::random();
        let impostor = PrivateKeySigner::random();
        let mut auth = signed_authorization(&signer);
        auth.payer = format!("{:#x}", impostor.address());

        let ok = strategy()
            .verify_signature(&auth, &terms_for(&auth))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn rejects_tampered_amount() {
        let signer = PrivateKeySigner::random();
        let mut auth = signed_authorization(&signer);
        auth.amount = 2_000;

        let ok = strategy()
            .verify_signature(&auth, &terms_for(&auth))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn rejects_garbage_fields_without_error() {
        let signer = PrivateKeySigner::random();
        let strategy = strategy();

        let mut bad_payer = signed_authorization(&signer);
        bad_payer.payer = "not-an-address".to_string();

        let mut bad_nonce = signed_authorization(&signer);
        bad_nonce.nonce = "0x1234".to_string();

        let mut bad_signature = signed_authorization(&signer);
        bad_signature.signature = "0xzz".to_string();

        let mut short_signature = signed_authorization(&signer);
        short_signature.signature = "0x1234".to_string();

        for auth in [bad_payer, bad_nonce, bad_signature, short_signature] {
            let ok = strategy
                .verify_signature(&auth, &terms_for(&auth))
                .await
                .unwrap();
            assert!(!ok);
        }
    }
}
