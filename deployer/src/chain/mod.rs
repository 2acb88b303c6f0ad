// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Everything that talks to a chain goes through [`ContractBackend`].

mod retry;
mod rpc;
mod simulated;

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::{SolCall, SolType, SolValue};
use async_trait::async_trait;
use thiserror::Error;

pub use retry::RetryPolicy;
pub use rpc::RpcBackend;
pub use simulated::SimulatedChain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub address: Address,
    pub tx_hash: B256,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub gas_used: u64,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("reverted: {reason}")]
    Reverted { reason: String },
    #[error("undecodable return data from {call}: {reason}")]
    Decode { call: String, reason: String },
}

impl ChainError {
    /// Failures worth repeating unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Reverted { reason } => Some(reason),
            _ => None,
        }
    }

    /// True if the rendered error contains any of `markers`.
    pub fn message_matches(&self, markers: &[String]) -> bool {
        let message = self.to_string();
        markers.iter().any(|marker| message.contains(marker.as_str()))
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted {
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait ContractBackend: Send + Sync {
    /// Account that signs every transaction.
    fn sender(&self) -> Address;

    /// Sends a contract creation and waits for its receipt.
    async fn deploy(&self, init_code: Bytes) -> Result<Deployed, ChainError>;

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainError>;

    /// Sends a transaction and waits for a successful receipt.
    async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<TxOutcome, ChainError>;

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError>;

    async fn latest_timestamp(&self) -> Result<u64, ChainError>;
}

/// `eth_call` with a typed request, decoding a single return value.
pub async fn read<B, C, T>(backend: &B, to: Address, call: &C) -> Result<T, ChainError>
where
    B: ContractBackend + ?Sized,
    C: SolCall,
    T: SolValue + From<<T::SolType as SolType>::RustType>,
{
    let data = backend.call(to, call.abi_encode().into()).await?;
    T::abi_decode(&data).map_err(|err| ChainError::Decode {
        call: C::SIGNATURE.to_string(),
        reason: err.to_string(),
    })
}

pub async fn send_call<B, C>(
    backend: &B,
    to: Address,
    call: &C,
    gas_limit: Option<u64>,
) -> Result<TxOutcome, ChainError>
where
    B: ContractBackend + ?Sized,
    C: SolCall,
{
    backend.send(to, call.abi_encode().into(), gas_limit).await
}
