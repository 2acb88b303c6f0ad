// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_sol_types::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Order {
        bytes32 sender;
        int128 priceX18;
        int128 amount;
        uint64 expiration;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedOrder {
        Order order;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LiquidateSubaccount {
        bytes32 sender;
        bytes32 liquidatee;
        uint32 productId;
        bool isEncodedSpread;
        int128 amount;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedLiquidateSubaccount {
        LiquidateSubaccount tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct DepositCollateral {
        bytes32 sender;
        uint32 productId;
        uint128 amount;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedDepositCollateral {
        DepositCollateral tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct WithdrawCollateral {
        bytes32 sender;
        uint32 productId;
        uint128 amount;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedWithdrawCollateral {
        WithdrawCollateral tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SpotTick {
        uint128 time;
        int128[] utilizationRatiosX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct UpdatePrice {
        uint32 productId;
        int128 priceX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SettlePnl {
        bytes32[] subaccounts;
        uint256[] productIds;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct MatchOrders {
        uint32 productId;
        bool amm;
        SignedOrder taker;
        SignedOrder maker;
    }

    /// Shared by `MatchOrders` and `MatchOrdersRFQ`.
    #[derive(Debug, PartialEq, Eq)]
    struct MatchOrdersWithSigner {
        MatchOrders matchOrders;
        address takerLinkedSigner;
        address makerLinkedSigner;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct DepositInsurance {
        uint128 amount;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct MintLp {
        bytes32 sender;
        uint32 productId;
        uint128 amountBase;
        uint128 quoteAmountLow;
        uint128 quoteAmountHigh;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedMintLp {
        MintLp tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BurnLp {
        bytes32 sender;
        uint32 productId;
        uint128 amount;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedBurnLp {
        BurnLp tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SwapAMM {
        bytes32 sender;
        uint32 productId;
        int128 amount;
        int128 priceX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct MatchOrderAMM {
        uint32 productId;
        int128 baseDelta;
        int128 quoteDelta;
        SignedOrder taker;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ClaimSequencerFees {
        bytes32 subaccount;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct PerpTick {
        uint128 time;
        int128[] avgPriceDiffs;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ManualAssert {
        int128[] openInterests;
        int128[] totalDeposits;
        int128[] totalBorrows;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Rebate {
        bytes32[] subaccounts;
        int128[] amounts;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct UpdateProduct {
        address engine;
        bytes tx;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LinkSigner {
        bytes32 sender;
        bytes32 signer;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedLinkSigner {
        LinkSigner tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct UpdateFeeRates {
        address user;
        uint32 productId;
        int64 makerRateX18;
        int64 takerRateX18;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BurnLpAndTransfer {
        bytes32 sender;
        uint32 productId;
        uint128 amount;
        bytes32 recipient;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct TransferQuote {
        bytes32 sender;
        bytes32 recipient;
        uint128 amount;
        uint64 nonce;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct SignedTransferQuote {
        TransferQuote tx;
        bytes signature;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct RebalanceXWithdraw {
        uint32 productId;
        uint128 amount;
        address sendTo;
    }
}
