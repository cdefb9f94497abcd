//! EIP-712 domain construction, signature verification, and nonce generation
//! for the `exact` scheme.

use alloy::primitives::{keccak256, Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::strategy::ChainProfile;
use crate::TransferAuthorization;

/// Why a signature could not be accepted. Any of these is an adversarial
/// input, not a fault, so the strategy maps them all to a plain "invalid".
#[derive(Debug, thiserror::Error)]
pub enum SignatureFault {
    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),
    #[error("unparseable signature: {0}")]
    Parse(String),
    #[error("high-s signature rejected")]
    HighS,
    #[error("recovery failed: {0}")]
    Recovery(String),
}

/// The EIP-712 domain of a transfer authorization. The asset contract is the
/// verifying contract, so a signature is only valid for one token on one
/// chain.
pub fn transfer_domain(profile: &ChainProfile, asset: Address) -> Eip712Domain {
    Eip712Domain {
        name: Some(std::borrow::Cow::Owned(profile.domain_name.clone())),
        version: Some(std::borrow::Cow::Owned(profile.domain_version.clone())),
        chain_id: Some(U256::from(profile.chain_id)),
        verifying_contract: Some(asset),
        salt: None,
    }
}

pub fn signing_hash(
    auth: &TransferAuthorization,
    profile: &ChainProfile,
    asset: Address,
) -> B256 {
    auth.eip712_signing_hash(&transfer_domain(profile, asset))
}

/// secp256k1 curve order N / 2. Signatures with s above this are malleable
/// (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xBFD25E8CD0364140,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the signer of a transfer authorization, rejecting malformed and
/// high-s signatures.
pub fn verify_transfer_signature(
    auth: &TransferAuthorization,
    signature_bytes: &[u8],
    profile: &ChainProfile,
    asset: Address,
) -> Result<Address, SignatureFault> {
    if signature_bytes.len() != 65 {
        return Err(SignatureFault::Length(signature_bytes.len()));
    }

    // from_raw accepts v in {0, 1, 27, 28} and normalizes to parity; any
    // other v byte fails here.
    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| SignatureFault::Parse(e.to_string()))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(SignatureFault::HighS);
    }

    let hash = signing_hash(auth, profile, asset);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| SignatureFault::Recovery(e.to_string()))
}

/// A fresh 32-byte nonce as a 0x-hex string (keccak256 of CSPRNG output).
pub fn random_nonce() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", alloy::hex::encode(keccak256(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::FixedBytes;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;

    fn profile() -> ChainProfile {
        ChainProfile {
            chain_id: 84532,
            network: "eip155:84532".to_string(),
            domain_name: "TransferWithAuthorization".to_string(),
            domain_version: "1".to_string(),
        }
    }

    fn authorization(from: Address) -> TransferAuthorization {
        TransferAuthorization {
            from,
            to: Address::repeat_byte(0x22),
            value: U256::from(1000u64),
            validAfter: U256::ZERO,
            validBefore: U256::from(u64::MAX),
            nonce: FixedBytes::ZERO,
        }
    }

    #[test]
    fn sign_and_recover_roundtrip() {
        let signer = PrivateKeySigner::random();
        let asset = Address::repeat_byte(0x33);
        let auth = authorization(signer.address());

        let hash = signing_hash(&auth, &profile(), asset);
        let sig = signer.sign_hash_sync(&hash).unwrap();

        let recovered =
            verify_transfer_signature(&auth, &sig.as_bytes(), &profile(), asset).unwrap();
        assert_eq!(recovered, signer.address());
    }

    #[test]
    fn tampered_value_recovers_a_different_address() {
        let signer = PrivateKeySigner::random();
        let asset = Address::repeat_byte(0x33);
        let auth = authorization(signer.address());

        let hash = signing_hash(&auth, &profile(), asset);
        let sig = signer.sign_hash_sync(&hash).unwrap();

        let mut tampered = auth;
        tampered.value = U256::from(9_999u64);
        let recovered =
            verify_transfer_signature(&tampered, &sig.as_bytes(), &profile(), asset).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn signature_bound_to_asset_and_chain() {
        let signer = PrivateKeySigner::random();
        let asset = Address::repeat_byte(0x33);
        let auth = authorization(signer.address());

        let hash = signing_hash(&auth, &profile(), asset);
        let sig = signer.sign_hash_sync(&hash).unwrap();

        let other_asset = Address::repeat_byte(0x44);
        let recovered =
            verify_transfer_signature(&auth, &sig.as_bytes(), &profile(), other_asset).unwrap();
        assert_ne!(recovered, signer.address());

        let other_chain = ChainProfile {
            chain_id: 1,
            ..profile()
        };
        let recovered =
            verify_transfer_signature(&auth, &sig.as_bytes(), &other_chain, asset).unwrap();
        assert_ne!(recovered, signer.address());
    }

    #[test]
    fn rejects_wrong_length_signature() {
        let auth = authorization(Address::repeat_byte(0x11));
        let err = verify_transfer_signature(&auth, &[0u8; 64], &profile(), Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, SignatureFault::Length(64)));
    }

    #[test]
    fn rejects_high_s_signature() {
        let signer = PrivateKeySigner::random();
        let asset = Address::repeat_byte(0x33);
        let auth = authorization(signer.address());

        let hash = signing_hash(&auth, &profile(), asset);
        let sig = signer.sign_hash_sync(&hash).unwrap();

        // Flip s to its malleable twin: s' = N - s, parity inverted.
        let n = U256::from_limbs([
            0xBFD25E8CD0364141,
            0xBAAEDCE6AF48A03B,
            0xFFFFFFFFFFFFFFFE,
            0xFFFFFFFFFFFFFFFF,
        ]);
        let malleable = Signature::new(sig.r(), n - sig.s(), !sig.v());
        let err =
            verify_transfer_signature(&auth, &malleable.as_bytes(), &profile(), asset)
                .unwrap_err();
        assert!(matches!(err, SignatureFault::HighS));
    }

    #[test]
    fn random_nonce_is_unique_and_hex() {
        let a = random_nonce();
        let b = random_nonce();
        assert_ne!(a, b);
        assert_eq!(a.len(), 66);
        assert!(a.starts_with("0x"));
        assert!(a[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
