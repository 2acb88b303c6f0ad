// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy::eips::BlockNumberOrTag;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::providers::{
    DynProvider, PendingTransactionError, Provider, ProviderBuilder, WatchTxError,
};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportErrorKind};
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use super::{ChainError, ContractBackend, Deployed, RetryPolicy, TxOutcome};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("rpc endpoint reports chain id {actual}, expected {expected}")]
    ChainIdMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// JSON-RPC backend signing with a local key.
pub struct RpcBackend {
    provider: DynProvider,
    sender: Address,
    confirmation_timeout: Duration,
    retry: RetryPolicy,
}

impl RpcBackend {
    pub async fn connect(
        rpc_url: &str,
        expected_chain_id: u64,
        private_key: &str,
        confirmation_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ConnectError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|err| ConnectError::InvalidKey(format!("{err}")))?;
        let sender = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(rpc_url)
            .await
            .map_err(classify_rpc_error)?
            .erased();

        let actual = retry
            .run("eth_chainId", || async {
                provider.get_chain_id().await.map_err(classify_rpc_error)
            })
            .await?;
        if actual != expected_chain_id {
            return Err(ConnectError::ChainIdMismatch {
                expected: expected_chain_id,
                actual,
            });
        }

        info!(%sender, chain_id = actual, "connected to rpc endpoint");
        Ok(Self {
            provider,
            sender,
            confirmation_timeout,
            retry,
        })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    async fn submit(&self, request: TransactionRequest) -> Result<TransactionReceipt, ChainError> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(classify_rpc_error)?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, "transaction broadcast, waiting for receipt");

        let receipt = pending
            .with_timeout(Some(self.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|err| classify_pending_error(err, tx_hash))?;
        if !receipt.status() {
            return Err(ChainError::reverted(format!(
                "transaction {tx_hash} reverted on chain"
            )));
        }
        Ok(receipt)
    }
}

#[async_trait]
impl ContractBackend for RpcBackend {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy(&self, init_code: Bytes) -> Result<Deployed, ChainError> {
        let request = TransactionRequest::default()
            .with_from(self.sender)
            .with_deploy_code(init_code);
        let receipt = self.submit(request).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            ChainError::reverted(format!(
                "creation {} produced no contract address",
                receipt.transaction_hash
            ))
        })?;
        Ok(Deployed {
            address,
            tx_hash: receipt.transaction_hash,
            gas_used: receipt.gas_used,
        })
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(calldata);
        self.retry
            .run("eth_call", || {
                let request = request.clone();
                async move { self.provider.call(request).await.map_err(classify_rpc_error) }
            })
            .await
    }

    async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<TxOutcome, ChainError> {
        let mut request = TransactionRequest::default()
            .with_from(self.sender)
            .with_to(to)
            .with_input(calldata);
        if let Some(gas_limit) = gas_limit {
            request = request.with_gas_limit(gas_limit);
        }
        let receipt = self.submit(request).await?;
        Ok(TxOutcome {
            tx_hash: receipt.transaction_hash,
            gas_used: receipt.gas_used,
            block_number: receipt.block_number,
        })
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        let key = U256::from_be_bytes(slot.0);
        let value = self
            .retry
            .run("eth_getStorageAt", || async {
                self.provider
                    .get_storage_at(address, key)
                    .await
                    .map_err(classify_rpc_error)
            })
            .await?;
        Ok(B256::from(value.to_be_bytes::<32>()))
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        let block = self
            .retry
            .run("eth_getBlockByNumber", || async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Latest)
                    .await
                    .map_err(classify_rpc_error)
            })
            .await?;
        block
            .map(|block| block.header.timestamp)
            .ok_or_else(|| ChainError::Transport("node returned no latest block".to_string()))
    }
}

/// Error responses from the node are final; anything else is treated as a
/// transport problem.
fn classify_rpc_error(err: RpcError<TransportErrorKind>) -> ChainError {
    match err.as_error_resp() {
        Some(payload) => ChainError::reverted(payload.message.to_string()),
        None => ChainError::Transport(err.to_string()),
    }
}

fn classify_pending_error(err: PendingTransactionError, tx_hash: B256) -> ChainError {
    match err {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            ChainError::Timeout(format!("receipt of {tx_hash}"))
        }
        PendingTransactionError::TransportError(err) => classify_rpc_error(err),
        other => ChainError::Transport(other.to_string()),
    }
}
