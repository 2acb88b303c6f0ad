// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Method surface of the venue contracts. Only what the deployer and the
//! sequencer client call is declared here.

use alloy_primitives::{B256, b256};
use alloy_sol_types::sol;

/// ERC-1967 `eip1967.proxy.implementation` slot.
pub const ERC1967_IMPLEMENTATION_SLOT: B256 =
    b256!("0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// ERC-1967 `eip1967.proxy.admin` slot.
pub const ERC1967_ADMIN_SLOT: B256 =
    b256!("0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// Engine discriminator passed to `addEngine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineType {
    Spot = 0,
    Perp = 1,
}

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Point {
        uint256 x;
        uint256 y;
    }

    /// Risk weights are 9-decimal fixed point.
    #[derive(Debug, PartialEq, Eq)]
    struct RiskStore {
        int32 longWeightInitial;
        int32 shortWeightInitial;
        int32 longWeightMaintenance;
        int32 shortWeightMaintenance;
        int128 priceX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpotConfig {
        address token;
        int128 interestInflectionUtilX18;
        int128 interestFloorX18;
        int128 interestSmallCapX18;
        int128 interestLargeCapX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Balance {
        int128 amount;
        int128 lastCumulativeMultiplierX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SlowModeTx {
        uint64 executableAt;
        address sender;
        bytes tx;
    }

    interface IInitializable {
        function isInitialized() external view returns (bool);
    }

    interface IVerifier {
        function initialize(Point[8] initialSet) external;
    }

    interface IClearinghouse {
        function initialize(address endpoint, address quote, address clearinghouseLiq, uint256 spreads) external;
        function addEngine(address engine, address offchainExchange, uint8 engineType) external;
    }

    interface IArbAirdrop {
        function initialize(address token) external;
    }

    interface IOffchainExchange {
        function initialize(address clearinghouse, address endpoint) external;
    }

    interface IToken {
        function initialize(string name, string symbol, address minter) external;
    }

    interface IEndpoint {
        function initialize(
            address sanctions,
            address sequencer,
            address offchainExchange,
            address clearinghouse,
            address verifier,
            int128[] initialPrices
        ) external;
        function nSubmissions() external view returns (uint64);
        function submitTransactionsCheckedWithGasLimit(uint64 idx, bytes[] transactions, uint256 gasLimit) external returns (uint64, uint256);
        function executeSlowModeTransactionImmediately() external;
        function getSlowModeTx(uint64 idx) external view returns (SlowModeTx slowModeTx, uint64 processedUpTo, uint64 total);
        function getTime() external view returns (uint128);
        function getNonce(address sender) external view returns (uint64);
        function getPriceX18(uint32 productId) external view returns (int128);
        function getSubaccountId(bytes32 subaccount) external view returns (uint64);
        function depositCollateralWithReferral(bytes32 subaccount, uint32 productId, uint128 amount, string referralCode) external;
    }

    interface ISpotEngine {
        function addProduct(
            uint32 productId,
            address book,
            int128 sizeIncrement,
            int128 minSize,
            int128 lpSpreadX18,
            SpotConfig config,
            RiskStore riskStore
        ) external;
        function getProductIds() external view returns (uint32[]);
        function getBalance(uint32 productId, bytes32 subaccount) external view returns (Balance);
        function getToken(uint32 productId) external view returns (address);
    }

    interface IPerpEngine {
        function addProduct(
            uint32 productId,
            address book,
            int128 sizeIncrement,
            int128 minSize,
            int128 lpSpreadX18,
            RiskStore riskStore
        ) external;
        function getProductIds() external view returns (uint32[]);
    }

    interface IOrderBook {
        function addMarket(uint32 productId, address token, bool isPerp) external;
        function getMarket(uint32 productId) external view returns (address);
    }

    /// Prices are 18-decimal fixed point.
    interface IPerpOracle {
        function setCustomPrice(uint32 productId, int128 priceX18) external;
        function getPrice(uint32 productId) external view returns (int128);
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}
