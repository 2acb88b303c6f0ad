// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{SolCall, SolValue};
use tracing::{debug, info, warn};
use venue_core::contracts::{Balance, IERC20, IEndpoint, ISpotEngine, SlowModeTx};
use venue_core::subaccount::subaccount_owner;
use venue_core::transaction::{Order, TypedTransaction, encode_batch};

use super::{SequencerClientError, SlowModeEntry, SlowModeQueue};
use crate::chain::{ChainError, ContractBackend, RetryPolicy, TxOutcome, read, send_call};

/// Revert texts the endpoint uses for a submission index that is no longer
/// current.
pub const DEFAULT_STALE_INDEX_MARKERS: &[&str] = &["invalid submission index", "reverted: IS"];
pub const DEFAULT_ORDER_TTL_SECS: u64 = 3600;
pub const DEFAULT_REFERRAL_CODE: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionBatch {
    pub submission_index: u64,
    pub transactions: Vec<Bytes>,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub submission_index: u64,
    pub attempts: u32,
    pub outcome: TxOutcome,
}

pub struct SequencerClient {
    backend: Arc<dyn ContractBackend>,
    endpoint: Address,
    retry: RetryPolicy,
    stale_markers: Vec<String>,
}

impl SequencerClient {
    pub fn new(backend: Arc<dyn ContractBackend>, endpoint: Address) -> Self {
        Self {
            backend,
            endpoint,
            retry: RetryPolicy::default(),
            stale_markers: DEFAULT_STALE_INDEX_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stale_markers(mut self, markers: Vec<String>) -> Self {
        self.stale_markers = markers;
        self
    }

    pub fn endpoint(&self) -> Address {
        self.endpoint
    }

    pub async fn submission_index(&self) -> Result<u64, ChainError> {
        read(&*self.backend, self.endpoint, &IEndpoint::nSubmissionsCall {}).await
    }

    /// Encodes `transactions` and pairs them with the current index.
    pub async fn prepare(
        &self,
        transactions: &[TypedTransaction],
        gas_limit: u64,
    ) -> Result<SubmissionBatch, SequencerClientError> {
        let encoded = encode_nonempty(transactions)?;
        Ok(SubmissionBatch {
            submission_index: self.submission_index().await?,
            transactions: encoded,
            gas_limit,
        })
    }

    /// Submits a batch under a freshly read index. Stale-index rejections are
    /// retried with a re-read index. A transient failure is retried only while
    /// the counter still sits at the index used; otherwise the batch may have
    /// landed and [`SequencerClientError::MaybeLanded`] is returned. Any other
    /// revert is returned as is.
    pub async fn submit(
        &self,
        transactions: &[TypedTransaction],
        gas_limit: u64,
    ) -> Result<SubmissionReceipt, SequencerClientError> {
        let encoded = encode_nonempty(transactions)?;
        let mut attempt = 1;
        loop {
            let batch = SubmissionBatch {
                submission_index: self.submission_index().await?,
                transactions: encoded.clone(),
                gas_limit,
            };
            let err = match self.send_batch(&batch).await {
                Ok(outcome) => {
                    info!(
                        endpoint = %self.endpoint,
                        submission_index = batch.submission_index,
                        transactions = batch.transactions.len(),
                        tx_hash = %outcome.tx_hash,
                        gas_used = outcome.gas_used,
                        attempt,
                        "batch submitted"
                    );
                    return Ok(SubmissionReceipt {
                        submission_index: batch.submission_index,
                        attempts: attempt,
                        outcome,
                    });
                }
                Err(err) => err,
            };

            if err.is_transient() {
                // The batch may have executed even though no receipt came back.
                let current = self.submission_index().await?;
                if current > batch.submission_index {
                    warn!(
                        endpoint = %self.endpoint,
                        submission_index = batch.submission_index,
                        current,
                        error = %err,
                        "counter moved after an unconfirmed submission, not resending"
                    );
                    return Err(SequencerClientError::MaybeLanded {
                        submission_index: batch.submission_index,
                        source: err,
                    });
                }
            }
            let retryable = err.is_transient() || self.is_stale(&err, batch.submission_index).await;
            if !retryable {
                return Err(SequencerClientError::Chain(err));
            }
            if attempt >= self.retry.max_attempts {
                return Err(SequencerClientError::RetriesExhausted {
                    attempts: attempt,
                    last_index: batch.submission_index,
                    source: err,
                });
            }
            let delay = self.retry.delay_for(attempt);
            warn!(
                endpoint = %self.endpoint,
                submission_index = batch.submission_index,
                attempt,
                ?delay,
                error = %err,
                "submission rejected, retrying with a fresh index"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_batch(&self, batch: &SubmissionBatch) -> Result<TxOutcome, ChainError> {
        let call = IEndpoint::submitTransactionsCheckedWithGasLimitCall {
            idx: batch.submission_index,
            transactions: batch.transactions.clone(),
            gasLimit: U256::from(batch.gas_limit),
        };
        send_call(&*self.backend, self.endpoint, &call, None).await
    }

    /// A revert is stale when it names a stale index or the counter has
    /// moved past the index that was used.
    async fn is_stale(&self, err: &ChainError, used_index: u64) -> bool {
        if err.message_matches(&self.stale_markers) {
            return true;
        }
        if err.revert_reason().is_none() {
            return false;
        }
        match self.submission_index().await {
            Ok(current) => current > used_index,
            Err(read_err) => {
                debug!(error = %read_err, "could not re-read submission index");
                false
            }
        }
    }

    pub async fn slow_mode_queue(&self) -> Result<SlowModeQueue, SequencerClientError> {
        let (_, processed_up_to, total) = self.read_slow_mode(0).await?;
        let head = if processed_up_to < total {
            let (entry, _, _) = self.read_slow_mode(processed_up_to).await?;
            Some(SlowModeEntry::from(entry))
        } else {
            None
        };
        Ok(SlowModeQueue::new(total, processed_up_to, head)?)
    }

    async fn read_slow_mode(&self, idx: u64) -> Result<(SlowModeTx, u64, u64), ChainError> {
        let call = IEndpoint::getSlowModeTxCall { idx };
        let data = self
            .backend
            .call(self.endpoint, call.abi_encode().into())
            .await?;
        <(SlowModeTx, u64, u64)>::abi_decode_params(&data).map_err(|err| ChainError::Decode {
            call: IEndpoint::getSlowModeTxCall::SIGNATURE.to_string(),
            reason: err.to_string(),
        })
    }

    /// Executes the head of the slow-mode queue now. Sends nothing when the
    /// queue is empty.
    pub async fn execute_slow_mode_immediately(
        &self,
    ) -> Result<Option<TxOutcome>, SequencerClientError> {
        let queue = self.slow_mode_queue().await?;
        if queue.pending() == 0 {
            info!(endpoint = %self.endpoint, "slow mode queue is empty, nothing to execute");
            return Ok(None);
        }
        let outcome = send_call(
            &*self.backend,
            self.endpoint,
            &IEndpoint::executeSlowModeTransactionImmediatelyCall {},
            None,
        )
        .await?;
        info!(
            endpoint = %self.endpoint,
            processed_up_to = queue.processed_up_to(),
            head_kind = ?queue.head().and_then(SlowModeEntry::kind),
            tx_hash = %outcome.tx_hash,
            "slow mode head executed"
        );
        Ok(Some(outcome))
    }

    pub async fn time(&self) -> Result<u128, ChainError> {
        read(&*self.backend, self.endpoint, &IEndpoint::getTimeCall {}).await
    }

    pub async fn nonce(&self, sender: Address) -> Result<u64, ChainError> {
        read(&*self.backend, self.endpoint, &IEndpoint::getNonceCall { sender }).await
    }

    pub async fn price_x18(&self, product_id: u32) -> Result<i128, ChainError> {
        let call = IEndpoint::getPriceX18Call {
            productId: product_id,
        };
        read(&*self.backend, self.endpoint, &call).await
    }

    pub async fn subaccount_id(&self, subaccount: B256) -> Result<u64, ChainError> {
        read(
            &*self.backend,
            self.endpoint,
            &IEndpoint::getSubaccountIdCall { subaccount },
        )
        .await
    }

    pub async fn balance(
        &self,
        spot_engine: Address,
        product_id: u32,
        subaccount: B256,
    ) -> Result<Balance, ChainError> {
        let call = ISpotEngine::getBalanceCall {
            productId: product_id,
            subaccount,
        };
        read(&*self.backend, spot_engine, &call).await
    }

    /// Approves the product token and enqueues a deposit. The deposit lands in
    /// the slow-mode queue and is credited once drained.
    pub async fn deposit_collateral(
        &self,
        spot_engine: Address,
        subaccount: B256,
        product_id: u32,
        amount: u128,
        referral_code: &str,
    ) -> Result<TxOutcome, SequencerClientError> {
        let token: Address = read(
            &*self.backend,
            spot_engine,
            &ISpotEngine::getTokenCall {
                productId: product_id,
            },
        )
        .await?;
        if token.is_zero() {
            warn!(product_id, "product has no token, skipping approval");
        } else {
            let approve = IERC20::approveCall {
                spender: self.endpoint,
                amount: U256::from(amount),
            };
            send_call(&*self.backend, token, &approve, None).await?;
        }

        let deposit = IEndpoint::depositCollateralWithReferralCall {
            subaccount,
            productId: product_id,
            amount,
            referralCode: referral_code.to_string(),
        };
        let outcome = send_call(&*self.backend, self.endpoint, &deposit, None).await?;
        info!(
            %subaccount,
            product_id,
            amount,
            block_number = ?outcome.block_number,
            "deposit enqueued"
        );
        Ok(outcome)
    }

    /// Builds an AMM order for a tenth of the subaccount's balance at the
    /// current oracle price, expiring `ttl_secs` after the latest block.
    pub async fn prepare_match_order_amm(
        &self,
        spot_engine: Address,
        subaccount: B256,
        product_id: u32,
        ttl_secs: u64,
        signature: Bytes,
    ) -> Result<TypedTransaction, SequencerClientError> {
        let balance = self.balance(spot_engine, product_id, subaccount).await?;
        let amount = balance.amount / 10;
        if amount == 0 {
            return Err(SequencerClientError::NothingToTrade { product_id });
        }
        let now = self.backend.latest_timestamp().await?;
        let nonce = self.nonce(subaccount_owner(&subaccount)).await?;
        let price_x18 = self.price_x18(product_id).await?;
        debug!(product_id, amount, price_x18, nonce, "building amm order");

        let order = Order {
            sender: subaccount,
            priceX18: price_x18,
            amount,
            expiration: now.saturating_add(ttl_secs),
            nonce,
        };
        Ok(TypedTransaction::match_order_amm(
            product_id, amount, 0, order, signature,
        ))
    }
}

fn encode_nonempty(transactions: &[TypedTransaction]) -> Result<Vec<Bytes>, SequencerClientError> {
    if transactions.is_empty() {
        return Err(SequencerClientError::EmptyBatch);
    }
    Ok(encode_batch(transactions)?)
}
