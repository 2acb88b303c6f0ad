// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Sequencer transactions.
//!
//! On the wire every transaction is a single tag byte followed by the ABI
//! encoding of the payload struct selected by that tag. The tag values are
//! positional and must never be reordered.

mod codec;
mod kind;
mod payload;

pub use codec::{CodecError, TypedTransaction, encode_batch, split_tag};
pub use kind::TransactionKind;
pub use payload::*;
