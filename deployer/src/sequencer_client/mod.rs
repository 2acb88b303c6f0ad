// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Client side of the endpoint's submission protocol.

mod client;
mod slow_mode;

use thiserror::Error;
use venue_core::transaction::CodecError;

use crate::chain::ChainError;

pub use client::{
    DEFAULT_ORDER_TTL_SECS, DEFAULT_REFERRAL_CODE, DEFAULT_STALE_INDEX_MARKERS, SequencerClient,
    SubmissionBatch, SubmissionReceipt,
};
pub use slow_mode::{InconsistentQueue, SlowModeEntry, SlowModeQueue, SlowModeState};

#[derive(Debug, Error)]
pub enum SequencerClientError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("refusing to submit an empty batch")]
    EmptyBatch,
    #[error("submission still rejected after {attempts} attempts (last index {last_index}): {source}")]
    RetriesExhausted {
        attempts: u32,
        last_index: u64,
        #[source]
        source: ChainError,
    },
    /// The send was not confirmed but the endpoint counter has moved past
    /// the index it used.
    #[error("submission at index {submission_index} is unconfirmed and may have landed: {source}")]
    MaybeLanded {
        submission_index: u64,
        #[source]
        source: ChainError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    InconsistentQueue(#[from] InconsistentQueue),
    #[error("subaccount has no balance in product {product_id} to trade")]
    NothingToTrade { product_id: u32 },
}
