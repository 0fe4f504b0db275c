//! Commitment hashing.
//!
//! The commitment submitted on-chain is keccak-256 over the abi-packed
//! 32-byte big-endian words of the scaled price and the random nonce,
//! optionally also binding the submitter address. The exact tuple is a
//! protocol version parameter and must match the deployed contract,
//! otherwise every reveal will mismatch and be rejected.

use alloy::primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Which input tuple the deployed contract expects the commitment over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitBinding {
    /// `keccak256(abi.encodePacked(price, random))`
    #[default]
    PriceRandom,
    /// `keccak256(abi.encodePacked(price, random, address))`
    PriceRandomAddress,
}

/// Compute the commitment hash for one asset.
///
/// `submitter` is only consulted for `CommitBinding::PriceRandomAddress`.
#[must_use]
pub fn commit_hash(
    price_units: u128,
    random_nonce: u64,
    submitter: Address,
    binding: CommitBinding,
) -> B256 {
    let price_word = U256::from(price_units).to_be_bytes::<32>();
    let random_word = U256::from(random_nonce).to_be_bytes::<32>();

    match binding {
        CommitBinding::PriceRandom => {
            let mut data = [0u8; 64];
            data[..32].copy_from_slice(&price_word);
            data[32..].copy_from_slice(&random_word);
            keccak256(data)
        }
        CommitBinding::PriceRandomAddress => {
            let mut data = Vec::with_capacity(84);
            data.extend_from_slice(&price_word);
            data.extend_from_slice(&random_word);
            data.extend_from_slice(submitter.as_slice());
            keccak256(&data)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_deterministic() {
        let a = commit_hash(10_123_000, 42, addr(1), CommitBinding::PriceRandom);
        let b = commit_hash(10_123_000, 42, addr(1), CommitBinding::PriceRandom);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sensitive_to_each_input() {
        let base = commit_hash(100, 7, addr(1), CommitBinding::PriceRandom);
        assert_ne!(base, commit_hash(101, 7, addr(1), CommitBinding::PriceRandom));
        assert_ne!(base, commit_hash(100, 8, addr(1), CommitBinding::PriceRandom));
    }

    #[test]
    fn test_adjacent_inputs_no_collision() {
        let mut seen = std::collections::HashSet::new();
        for price in 0u128..200 {
            for random in 0u64..20 {
                assert!(seen.insert(commit_hash(
                    price,
                    random,
                    addr(1),
                    CommitBinding::PriceRandom
                )));
            }
        }
    }

    #[test]
    fn test_order_sensitive() {
        // (price=1, random=2) must differ from (price=2, random=1)
        let a = commit_hash(1, 2, addr(1), CommitBinding::PriceRandom);
        let b = commit_hash(2, 1, addr(1), CommitBinding::PriceRandom);
        assert_ne!(a, b);
    }

    #[test]
    fn test_address_binding_changes_hash() {
        let without = commit_hash(100, 7, addr(1), CommitBinding::PriceRandom);
        let with = commit_hash(100, 7, addr(1), CommitBinding::PriceRandomAddress);
        assert_ne!(without, with);

        let other = commit_hash(100, 7, addr(2), CommitBinding::PriceRandomAddress);
        assert_ne!(with, other);

        // Address is ignored under PriceRandom binding.
        assert_eq!(
            commit_hash(100, 7, addr(1), CommitBinding::PriceRandom),
            commit_hash(100, 7, addr(2), CommitBinding::PriceRandom)
        );
    }

    #[test]
    fn test_known_vector() {
        // keccak256(uint256(0) || uint256(0)) over 64 zero bytes
        let h = commit_hash(0, 0, addr(0), CommitBinding::PriceRandom);
        assert_eq!(
            hex::encode(h),
            "ad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5"
        );
    }
}
