// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::Bytes;
use alloy_sol_types::{SolType, SolValue};
use thiserror::Error;

use super::TransactionKind;
use super::payload::*;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty transaction: missing kind tag")]
    Empty,
    #[error("unknown transaction kind tag {0}")]
    UnknownTag(u8),
    #[error("{kind} payload does not match its schema: {reason}")]
    SchemaMismatch {
        kind: TransactionKind,
        reason: String,
    },
    #[error("{kind} is tag-only but {len} payload bytes follow the tag")]
    UnexpectedPayload { kind: TransactionKind, len: usize },
}

/// A sequencer transaction whose payload shape is fixed by its variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedTransaction {
    LiquidateSubaccount(SignedLiquidateSubaccount),
    DepositCollateral(SignedDepositCollateral),
    WithdrawCollateral(SignedWithdrawCollateral),
    SpotTick(SpotTick),
    UpdatePrice(UpdatePrice),
    SettlePnl(SettlePnl),
    MatchOrders(MatchOrdersWithSigner),
    DepositInsurance(DepositInsurance),
    ExecuteSlowMode,
    MintLp(SignedMintLp),
    BurnLp(SignedBurnLp),
    SwapAmm(SwapAMM),
    MatchOrderAmm(MatchOrderAMM),
    DumpFees,
    ClaimSequencerFees(ClaimSequencerFees),
    PerpTick(PerpTick),
    ManualAssert(ManualAssert),
    Rebate(Rebate),
    UpdateProduct(UpdateProduct),
    LinkSigner(SignedLinkSigner),
    UpdateFeeRates(UpdateFeeRates),
    BurnLpAndTransfer(BurnLpAndTransfer),
    MatchOrdersRfq(MatchOrdersWithSigner),
    TransferQuote(SignedTransferQuote),
    RebalanceXWithdraw(RebalanceXWithdraw),
}

impl TypedTransaction {
    pub fn spot_tick(time: u128, utilization_ratios_x18: Vec<i128>) -> Self {
        Self::SpotTick(SpotTick {
            time,
            utilizationRatiosX18: utilization_ratios_x18,
        })
    }

    pub fn perp_tick(time: u128, avg_price_diffs: Vec<i128>) -> Self {
        Self::PerpTick(PerpTick {
            time,
            avgPriceDiffs: avg_price_diffs,
        })
    }

    pub fn match_order_amm(
        product_id: u32,
        base_delta: i128,
        quote_delta: i128,
        order: Order,
        signature: Bytes,
    ) -> Self {
        Self::MatchOrderAmm(MatchOrderAMM {
            productId: product_id,
            baseDelta: base_delta,
            quoteDelta: quote_delta,
            taker: SignedOrder { order, signature },
        })
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            Self::LiquidateSubaccount(_) => TransactionKind::LiquidateSubaccount,
            Self::DepositCollateral(_) => TransactionKind::DepositCollateral,
            Self::WithdrawCollateral(_) => TransactionKind::WithdrawCollateral,
            Self::SpotTick(_) => TransactionKind::SpotTick,
            Self::UpdatePrice(_) => TransactionKind::UpdatePrice,
            Self::SettlePnl(_) => TransactionKind::SettlePnl,
            Self::MatchOrders(_) => TransactionKind::MatchOrders,
            Self::DepositInsurance(_) => TransactionKind::DepositInsurance,
            Self::ExecuteSlowMode => TransactionKind::ExecuteSlowMode,
            Self::MintLp(_) => TransactionKind::MintLp,
            Self::BurnLp(_) => TransactionKind::BurnLp,
            Self::SwapAmm(_) => TransactionKind::SwapAmm,
            Self::MatchOrderAmm(_) => TransactionKind::MatchOrderAmm,
            Self::DumpFees => TransactionKind::DumpFees,
            Self::ClaimSequencerFees(_) => TransactionKind::ClaimSequencerFees,
            Self::PerpTick(_) => TransactionKind::PerpTick,
            Self::ManualAssert(_) => TransactionKind::ManualAssert,
            Self::Rebate(_) => TransactionKind::Rebate,
            Self::UpdateProduct(_) => TransactionKind::UpdateProduct,
            Self::LinkSigner(_) => TransactionKind::LinkSigner,
            Self::UpdateFeeRates(_) => TransactionKind::UpdateFeeRates,
            Self::BurnLpAndTransfer(_) => TransactionKind::BurnLpAndTransfer,
            Self::MatchOrdersRfq(_) => TransactionKind::MatchOrdersRfq,
            Self::TransferQuote(_) => TransactionKind::TransferQuote,
            Self::RebalanceXWithdraw(_) => TransactionKind::RebalanceXWithdraw,
        }
    }

    /// ABI encoding of the payload alone; empty for tag-only kinds.
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::LiquidateSubaccount(p) => p.abi_encode(),
            Self::DepositCollateral(p) => p.abi_encode(),
            Self::WithdrawCollateral(p) => p.abi_encode(),
            Self::SpotTick(p) => p.abi_encode(),
            Self::UpdatePrice(p) => p.abi_encode(),
            Self::SettlePnl(p) => p.abi_encode(),
            Self::MatchOrders(p) | Self::MatchOrdersRfq(p) => p.abi_encode(),
            Self::DepositInsurance(p) => p.abi_encode(),
            Self::ExecuteSlowMode | Self::DumpFees => Vec::new(),
            Self::MintLp(p) => p.abi_encode(),
            Self::BurnLp(p) => p.abi_encode(),
            Self::SwapAmm(p) => p.abi_encode(),
            Self::MatchOrderAmm(p) => p.abi_encode(),
            Self::ClaimSequencerFees(p) => p.abi_encode(),
            Self::PerpTick(p) => p.abi_encode(),
            Self::ManualAssert(p) => p.abi_encode(),
            Self::Rebate(p) => p.abi_encode(),
            Self::UpdateProduct(p) => p.abi_encode(),
            Self::LinkSigner(p) => p.abi_encode(),
            Self::UpdateFeeRates(p) => p.abi_encode(),
            Self::BurnLpAndTransfer(p) => p.abi_encode(),
            Self::TransferQuote(p) => p.abi_encode(),
            Self::RebalanceXWithdraw(p) => p.abi_encode(),
        }
    }

    /// `tag ++ abi.encode(payload)`.
    pub fn encode(&self) -> Bytes {
        let payload = self.encode_payload();
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(self.kind().tag());
        out.extend_from_slice(&payload);
        out.into()
    }

    /// Validates before encoding; use this for anything headed to the endpoint.
    pub fn encode_checked(&self) -> Result<Bytes, CodecError> {
        self.validate()?;
        Ok(self.encode())
    }

    /// Checks constraints the ABI types alone cannot express.
    pub fn validate(&self) -> Result<(), CodecError> {
        let kind = self.kind();
        match self {
            Self::SettlePnl(p) => same_len(kind, &[p.subaccounts.len(), p.productIds.len()]),
            Self::ManualAssert(p) => same_len(
                kind,
                &[
                    p.openInterests.len(),
                    p.totalDeposits.len(),
                    p.totalBorrows.len(),
                ],
            ),
            Self::Rebate(p) => same_len(kind, &[p.subaccounts.len(), p.amounts.len()]),
            Self::UpdateProduct(p) if p.tx.is_empty() => Err(CodecError::SchemaMismatch {
                kind,
                reason: "product update carries no engine transaction".to_string(),
            }),
            Self::MatchOrders(p) | Self::MatchOrdersRfq(p)
                if p.matchOrders.taker.order.sender == p.matchOrders.maker.order.sender =>
            {
                Err(CodecError::SchemaMismatch {
                    kind,
                    reason: "taker and maker are the same subaccount".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (kind, payload) = split_tag(bytes)?;
        Self::decode_payload(kind, payload)
    }

    /// Decodes `payload` with the schema of `kind`. Anything that does not
    /// re-encode to exactly the same bytes is rejected.
    pub fn decode_payload(kind: TransactionKind, payload: &[u8]) -> Result<Self, CodecError> {
        use TransactionKind as K;
        let tx = match kind {
            K::LiquidateSubaccount => Self::LiquidateSubaccount(decode_strict(kind, payload)?),
            K::DepositCollateral => Self::DepositCollateral(decode_strict(kind, payload)?),
            K::WithdrawCollateral => Self::WithdrawCollateral(decode_strict(kind, payload)?),
            K::SpotTick => Self::SpotTick(decode_strict(kind, payload)?),
            K::UpdatePrice => Self::UpdatePrice(decode_strict(kind, payload)?),
            K::SettlePnl => Self::SettlePnl(decode_strict(kind, payload)?),
            K::MatchOrders => Self::MatchOrders(decode_strict(kind, payload)?),
            K::DepositInsurance => Self::DepositInsurance(decode_strict(kind, payload)?),
            K::ExecuteSlowMode => {
                expect_no_payload(kind, payload)?;
                Self::ExecuteSlowMode
            }
            K::MintLp => Self::MintLp(decode_strict(kind, payload)?),
            K::BurnLp => Self::BurnLp(decode_strict(kind, payload)?),
            K::SwapAmm => Self::SwapAmm(decode_strict(kind, payload)?),
            K::MatchOrderAmm => Self::MatchOrderAmm(decode_strict(kind, payload)?),
            K::DumpFees => {
                expect_no_payload(kind, payload)?;
                Self::DumpFees
            }
            K::ClaimSequencerFees => Self::ClaimSequencerFees(decode_strict(kind, payload)?),
            K::PerpTick => Self::PerpTick(decode_strict(kind, payload)?),
            K::ManualAssert => Self::ManualAssert(decode_strict(kind, payload)?),
            K::Rebate => Self::Rebate(decode_strict(kind, payload)?),
            K::UpdateProduct => Self::UpdateProduct(decode_strict(kind, payload)?),
            K::LinkSigner => Self::LinkSigner(decode_strict(kind, payload)?),
            K::UpdateFeeRates => Self::UpdateFeeRates(decode_strict(kind, payload)?),
            K::BurnLpAndTransfer => Self::BurnLpAndTransfer(decode_strict(kind, payload)?),
            K::MatchOrdersRfq => Self::MatchOrdersRfq(decode_strict(kind, payload)?),
            K::TransferQuote => Self::TransferQuote(decode_strict(kind, payload)?),
            K::RebalanceXWithdraw => Self::RebalanceXWithdraw(decode_strict(kind, payload)?),
        };
        Ok(tx)
    }
}

/// Splits raw transaction bytes into the kind and the undecoded payload.
pub fn split_tag(bytes: &[u8]) -> Result<(TransactionKind, &[u8]), CodecError> {
    let (&tag, payload) = bytes.split_first().ok_or(CodecError::Empty)?;
    Ok((TransactionKind::try_from(tag)?, payload))
}

/// Validates and encodes a batch, failing on the first invalid transaction.
pub fn encode_batch(transactions: &[TypedTransaction]) -> Result<Vec<Bytes>, CodecError> {
    transactions
        .iter()
        .map(TypedTransaction::encode_checked)
        .collect()
}

fn decode_strict<T>(kind: TransactionKind, payload: &[u8]) -> Result<T, CodecError>
where
    T: SolValue + From<<T::SolType as SolType>::RustType>,
{
    let value = T::abi_decode(payload).map_err(|err| CodecError::SchemaMismatch {
        kind,
        reason: err.to_string(),
    })?;
    if value.abi_encode() != payload {
        return Err(CodecError::SchemaMismatch {
            kind,
            reason: "payload is not in canonical ABI encoding".to_string(),
        });
    }
    Ok(value)
}

fn expect_no_payload(kind: TransactionKind, payload: &[u8]) -> Result<(), CodecError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(CodecError::UnexpectedPayload {
            kind,
            len: payload.len(),
        })
    }
}

fn same_len(kind: TransactionKind, lens: &[usize]) -> Result<(), CodecError> {
    match lens.split_first() {
        Some((first, rest)) if rest.iter().any(|len| len != first) => {
            Err(CodecError::SchemaMismatch {
                kind,
                reason: format!("parallel arrays differ in length: {lens:?}"),
            })
        }
        _ => Ok(()),
    }
}
