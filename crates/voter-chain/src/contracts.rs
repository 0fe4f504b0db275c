//! Wire contracts.
//!
//! The deployed oracle contract suite defines these signatures; they are a
//! fixed wire contract and must not be changed without a matching
//! deployment.

use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use voter_core::EpochId;

sol! {
    /// Submission entry point for hashed commitments and their reveals.
    interface IPriceSubmitter {
        function submitPriceHashes(uint256 epochId, uint256[] assetIndices, bytes32[] commitHashes);
        function revealPrices(uint256 epochId, uint256[] assetIndices, uint256[] prices, uint256 randomNonce);
        function requestWhitelistingVoter(address voter, uint256 assetIndex);
        function voterWhitelistBitmap(address voter) external view returns (uint256);

        event PriceHashesSubmitted(
            address indexed submitter,
            uint256 indexed epochId,
            uint256[] assetIndices,
            bytes32[] commitHashes,
            uint256 timestamp
        );
        event PricesRevealed(
            address indexed voter,
            uint256 indexed epochId,
            uint256[] assetIndices,
            uint256[] prices,
            uint256 randomNonce,
            uint256 timestamp
        );
        event PriceFinalized(
            uint256 indexed epochId,
            uint256 indexed assetIndex,
            uint256 price,
            uint256 timestamp
        );
        event RewardEpochFinalized(uint256 indexed rewardEpochId, uint256 timestamp);
    }

    /// Startup resolution: submitter address, asset registry, epoch config.
    interface IOracleManager {
        function getPriceSubmitter() external view returns (address);
        function getSupportedIndicesAndSymbols()
            external
            view
            returns (uint256[] indices, string[] symbols);
        function getPriceEpochConfiguration()
            external
            view
            returns (uint256 firstEpochStartTs, uint256 submitPeriodSeconds, uint256 revealPeriodSeconds);
    }
}

/// Calldata for a batched commit.
#[must_use]
pub fn encode_submit_price_hashes(epoch: EpochId, indices: &[u32], hashes: &[B256]) -> Vec<u8> {
    IPriceSubmitter::submitPriceHashesCall {
        epochId: U256::from(epoch.0),
        assetIndices: indices.iter().map(|i| U256::from(*i)).collect(),
        commitHashes: hashes.to_vec(),
    }
    .abi_encode()
}

/// Calldata for a batched reveal.
#[must_use]
pub fn encode_reveal_prices(
    epoch: EpochId,
    indices: &[u32],
    prices: &[u128],
    random_nonce: u64,
) -> Vec<u8> {
    IPriceSubmitter::revealPricesCall {
        epochId: U256::from(epoch.0),
        assetIndices: indices.iter().map(|i| U256::from(*i)).collect(),
        prices: prices.iter().map(|p| U256::from(*p)).collect(),
        randomNonce: U256::from(random_nonce),
    }
    .abi_encode()
}

/// Calldata for a one-time whitelisting request.
#[must_use]
pub fn encode_request_whitelisting(voter: Address, asset_index: u32) -> Vec<u8> {
    IPriceSubmitter::requestWhitelistingVoterCall {
        voter,
        assetIndex: U256::from(asset_index),
    }
    .abi_encode()
}

/// Calldata for the whitelist bitmap view.
#[must_use]
pub fn encode_voter_whitelist_bitmap(voter: Address) -> Vec<u8> {
    IPriceSubmitter::voterWhitelistBitmapCall { voter }.abi_encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_submit_calldata_has_selector() {
        let data = encode_submit_price_hashes(EpochId(7), &[0, 2], &[B256::ZERO, B256::ZERO]);
        assert_eq!(
            &data[..4],
            IPriceSubmitter::submitPriceHashesCall::SELECTOR
        );
        // epochId is the first static word
        assert_eq!(data[4 + 31], 7);
    }

    #[test]
    fn test_reveal_calldata_round_trip() {
        let data = encode_reveal_prices(EpochId(3), &[1, 4], &[100, 200], 42);
        let decoded = IPriceSubmitter::revealPricesCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.epochId, U256::from(3u64));
        assert_eq!(decoded.assetIndices, vec![U256::from(1u64), U256::from(4u64)]);
        assert_eq!(decoded.prices, vec![U256::from(100u64), U256::from(200u64)]);
        assert_eq!(decoded.randomNonce, U256::from(42u64));
    }

    #[test]
    fn test_event_log_round_trip() {
        let event = IPriceSubmitter::PricesRevealed {
            voter: Address::repeat_byte(9),
            epochId: U256::from(12u64),
            assetIndices: vec![U256::from(0u64)],
            prices: vec![U256::from(10_123_000u64)],
            randomNonce: U256::from(7u64),
            timestamp: U256::from(1_700_000_000u64),
        };
        let log_data = event.encode_log_data();

        let decoded =
            IPriceSubmitter::PricesRevealed::decode_log_data(&log_data, true).unwrap();
        assert_eq!(decoded.voter, Address::repeat_byte(9));
        assert_eq!(decoded.prices, vec![U256::from(10_123_000u64)]);
    }
}
