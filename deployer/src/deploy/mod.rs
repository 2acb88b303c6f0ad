// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod deployer;
mod orchestrator;

use alloy_primitives::Address;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::chain::ChainError;
use crate::record::ArgTypeError;
use crate::registry::RegistryError;
use crate::storage::StorageError;

pub use deployer::{ContractDeployer, DEFAULT_PROXY_ARTIFACT, DeployMode, DeployOutcome};
pub use orchestrator::{
    ArgSource, ContractGroup, ContractOutcome, ContractReport, ContractSpec, DeploymentPlan,
    DeploymentReport, DirectoryOrchestrator, Tier,
};

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("{name} takes {expected} arguments, {supplied} supplied")]
    ArgumentCount {
        name: String,
        expected: usize,
        supplied: usize,
    },
    #[error("arguments for {name}: {source}")]
    ArgumentType {
        name: String,
        #[source]
        source: ArgTypeError,
    },
    #[error("deploying {name}: {source}")]
    Chain {
        name: String,
        #[source]
        source: ChainError,
    },
    #[error("proxy for {name} points at {found}, expected {expected}")]
    ProxyMismatch {
        name: String,
        expected: Address,
        found: Address,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
