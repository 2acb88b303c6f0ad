// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Post-deployment initialization as a graph of guarded steps.

mod plan;
mod runner;
pub mod venue;

use thiserror::Error;
use venue_core::fixed::FixedPointError;

use crate::chain::ChainError;
use crate::registry::RegistryError;
use crate::sequencer_client::SequencerClientError;

pub use plan::{CalldataFn, Guard, InitPlan, InitStep, PlanError, StepAction, TransactionsFn};
pub use runner::{InitReport, InitializationSequencer, StepOutcome, StepReport};

#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Sequencer(#[from] SequencerClientError),
    #[error(transparent)]
    FixedPoint(#[from] FixedPointError),
    #[error("invalid parameter {name}: {reason}")]
    Parameter { name: String, reason: String },
}
