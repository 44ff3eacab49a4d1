//! Gravity bridge contract ABI definitions
//!
//! Uses alloy's sol! macro to generate call and event types for the Gravity
//! contract and the ERC20 metadata the relayer needs.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Validator set argument shared by `updateValset` and `submitBatch`.
    struct ValsetArgs {
        address[] validators;
        uint256[] powers;
        uint256 valsetNonce;
        uint256 rewardAmount;
        address rewardToken;
    }

    /// Gravity bridge contract interface
    contract Gravity {
        // ========================================================================
        // State Views
        // ========================================================================

        function state_lastValsetCheckpoint() external view returns (bytes32);

        function state_lastValsetNonce() external view returns (uint256);

        function state_lastBatchNonces(address erc20Address) external view returns (uint256);

        function state_lastEventNonce() external view returns (uint256);

        function state_peggyId() external view returns (bytes32);

        // ========================================================================
        // Relayed Calls
        // ========================================================================

        /// Replace the current validator set, signed by the current set
        function updateValset(
            ValsetArgs memory _newValset,
            ValsetArgs memory _currentValset,
            uint8[] memory _v,
            bytes32[] memory _r,
            bytes32[] memory _s
        ) external;

        /// Execute an outgoing batch, signed by the current set
        function submitBatch(
            ValsetArgs memory _currentValset,
            uint8[] memory _v,
            bytes32[] memory _r,
            bytes32[] memory _s,
            uint256[] memory _amounts,
            address[] memory _destinations,
            uint256[] memory _fees,
            uint256 _batchNonce,
            address _tokenContract,
            uint256 _batchTimeout
        ) external;

        // ========================================================================
        // Events
        // ========================================================================

        event SendToCosmosEvent(
            address indexed _tokenContract,
            address indexed _sender,
            bytes32 indexed _destination,
            uint256 _amount,
            uint256 _eventNonce
        );

        event TransactionBatchExecutedEvent(
            uint256 indexed _batchNonce,
            address indexed _token,
            uint256 _eventNonce
        );

        event ValsetUpdatedEvent(
            uint256 indexed _newValsetNonce,
            uint256 _eventNonce,
            uint256 _rewardAmount,
            address _rewardToken,
            address[] _validators,
            uint256[] _powers
        );

        event ERC20DeployedEvent(
            string _cosmosDenom,
            address indexed _tokenContract,
            string _name,
            string _symbol,
            uint8 _decimals,
            uint256 _eventNonce
        );
    }

    /// ERC20 metadata used for fee valuation
    contract ERC20 {
        function decimals() external view returns (uint8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_relayed_call_selectors_differ() {
        assert_ne!(
            Gravity::updateValsetCall::SELECTOR,
            Gravity::submitBatchCall::SELECTOR
        );
    }

    #[test]
    fn test_event_signatures() {
        assert_eq!(
            Gravity::SendToCosmosEvent::SIGNATURE,
            "SendToCosmosEvent(address,address,bytes32,uint256,uint256)"
        );
        assert_eq!(
            Gravity::ValsetUpdatedEvent::SIGNATURE,
            "ValsetUpdatedEvent(uint256,uint256,uint256,address,address[],uint256[])"
        );
    }
}
