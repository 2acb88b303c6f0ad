// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;

use super::CodecError;

/// Transaction kind, identified on the wire by its one-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransactionKind {
    LiquidateSubaccount = 0,
    DepositCollateral = 1,
    WithdrawCollateral = 2,
    SpotTick = 3,
    UpdatePrice = 4,
    SettlePnl = 5,
    MatchOrders = 6,
    DepositInsurance = 7,
    ExecuteSlowMode = 8,
    MintLp = 9,
    BurnLp = 10,
    SwapAmm = 11,
    MatchOrderAmm = 12,
    DumpFees = 13,
    ClaimSequencerFees = 14,
    PerpTick = 15,
    ManualAssert = 16,
    Rebate = 17,
    UpdateProduct = 18,
    LinkSigner = 19,
    UpdateFeeRates = 20,
    BurnLpAndTransfer = 21,
    MatchOrdersRfq = 22,
    TransferQuote = 23,
    RebalanceXWithdraw = 24,
}

impl TransactionKind {
    /// Every kind, indexed by its tag.
    pub const ALL: [TransactionKind; 25] = [
        Self::LiquidateSubaccount,
        Self::DepositCollateral,
        Self::WithdrawCollateral,
        Self::SpotTick,
        Self::UpdatePrice,
        Self::SettlePnl,
        Self::MatchOrders,
        Self::DepositInsurance,
        Self::ExecuteSlowMode,
        Self::MintLp,
        Self::BurnLp,
        Self::SwapAmm,
        Self::MatchOrderAmm,
        Self::DumpFees,
        Self::ClaimSequencerFees,
        Self::PerpTick,
        Self::ManualAssert,
        Self::Rebate,
        Self::UpdateProduct,
        Self::LinkSigner,
        Self::UpdateFeeRates,
        Self::BurnLpAndTransfer,
        Self::MatchOrdersRfq,
        Self::TransferQuote,
        Self::RebalanceXWithdraw,
    ];

    pub const fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// Kinds that are sent as the bare tag byte.
    pub const fn has_payload(self) -> bool {
        !matches!(self, Self::ExecuteSlowMode | Self::DumpFees)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::LiquidateSubaccount => "LiquidateSubaccount",
            Self::DepositCollateral => "DepositCollateral",
            Self::WithdrawCollateral => "WithdrawCollateral",
            Self::SpotTick => "SpotTick",
            Self::UpdatePrice => "UpdatePrice",
            Self::SettlePnl => "SettlePnl",
            Self::MatchOrders => "MatchOrders",
            Self::DepositInsurance => "DepositInsurance",
            Self::ExecuteSlowMode => "ExecuteSlowMode",
            Self::MintLp => "MintLp",
            Self::BurnLp => "BurnLp",
            Self::SwapAmm => "SwapAMM",
            Self::MatchOrderAmm => "MatchOrderAMM",
            Self::DumpFees => "DumpFees",
            Self::ClaimSequencerFees => "ClaimSequencerFees",
            Self::PerpTick => "PerpTick",
            Self::ManualAssert => "ManualAssert",
            Self::Rebate => "Rebate",
            Self::UpdateProduct => "UpdateProduct",
            Self::LinkSigner => "LinkSigner",
            Self::UpdateFeeRates => "UpdateFeeRates",
            Self::BurnLpAndTransfer => "BurnLpAndTransfer",
            Self::MatchOrdersRfq => "MatchOrdersRFQ",
            Self::TransferQuote => "TransferQuote",
            Self::RebalanceXWithdraw => "RebalanceXWithdraw",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for TransactionKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(CodecError::UnknownTag(tag))
    }
}

impl From<TransactionKind> for u8 {
    fn from(kind: TransactionKind) -> Self {
        kind.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_indexed_by_tag() {
        for (index, kind) in TransactionKind::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.tag()), index, "{kind} is out of place");
        }
    }

    #[test]
    fn tags_past_the_table_are_rejected() {
        assert_eq!(
            TransactionKind::try_from(25),
            Err(CodecError::UnknownTag(25))
        );
        assert_eq!(
            TransactionKind::try_from(24),
            Ok(TransactionKind::RebalanceXWithdraw)
        );
    }

    #[test]
    fn tag_only_kinds() {
        let tag_only: Vec<_> = TransactionKind::ALL
            .iter()
            .filter(|kind| !kind.has_payload())
            .copied()
            .collect();
        assert_eq!(
            tag_only,
            vec![TransactionKind::ExecuteSlowMode, TransactionKind::DumpFees]
        );
    }
}
