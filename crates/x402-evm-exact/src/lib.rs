//! `exact` scheme strategy for EVM networks.
//!
//! Verification recovers the signer of an EIP-712 `TransferAuthorization`
//! signed against the asset contract's domain and compares it to the claimed
//! payer. Settlement executes `transferFrom(from, to, value)` as the
//! facilitator's pre-approved spender account and reports the transaction
//! hash.
//!
//! The engine treats payer, asset, nonce, and signature as opaque strings;
//! this crate owns their EVM wire formats (0x-hex addresses, 32-byte nonces,
//! 65-byte signatures).

pub mod eip712;
pub mod strategy;

use alloy::sol;

// EIP-712 struct the payer signs. The sol! macro derives SolStruct, which
// provides eip712_signing_hash().
sol! {
    #[derive(Debug)]
    struct TransferAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

// ERC-20 surface needed for settlement.
sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transferFrom(address from, address to, uint256 value) external returns (bool);
    }
}

pub use eip712::{random_nonce, signing_hash, transfer_domain, verify_transfer_signature};
pub use strategy::{ChainProfile, ExactEvmStrategy};
