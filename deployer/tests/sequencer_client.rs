// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::SolCall;
use venue_core::contracts::IEndpoint;
use venue_core::fixed::ONE_X18;
use venue_core::subaccount::default_subaccount;
use venue_core::transaction::{CodecError, SettlePnl, TransactionKind, TypedTransaction};
use venue_deployer::chain::{ChainError, ContractBackend, RetryPolicy, SimulatedChain};
use venue_deployer::sequencer_client::{
    DEFAULT_ORDER_TTL_SECS, DEFAULT_REFERRAL_CODE, SequencerClient, SequencerClientError,
    SlowModeState,
};

const GAS_LIMIT: u64 = 10_000_000;
const SUBMIT_SELECTOR: [u8; 4] = IEndpoint::submitTransactionsCheckedWithGasLimitCall::SELECTOR;

#[tokio::test]
async fn stale_index_is_retried_with_a_fresh_one() {
    let (chain, endpoint) = endpoint().await;
    chain.queue_competing_submissions(2);
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(3));

    let receipt = client.submit(&ticks(), GAS_LIMIT).await.expect("submit");

    assert_eq!(receipt.attempts, 3);
    assert_eq!(receipt.submission_index, 2);
    assert_eq!(chain.submissions(endpoint), 3);
    assert_eq!(client.submission_index().await.expect("read index"), 3);
    let attempts = chain.sends_with_selector(SUBMIT_SELECTOR);
    assert_eq!(attempts.len(), 3);
    assert_eq!(
        attempts.iter().filter(|sent| sent.succeeded).count(),
        1,
        "only the last attempt lands"
    );
}

#[tokio::test]
async fn stale_index_retries_are_bounded() {
    let (chain, endpoint) = endpoint().await;
    chain.queue_competing_submissions(5);
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(2));

    let err = client
        .submit(&ticks(), GAS_LIMIT)
        .await
        .expect_err("competitors win every round");

    match err {
        SequencerClientError::RetriesExhausted {
            attempts,
            last_index,
            source,
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(last_index, 1);
            assert!(source.to_string().contains("invalid submission index"));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let (chain, endpoint) = endpoint().await;
    chain.fail_next_sends(
        SUBMIT_SELECTOR,
        2,
        ChainError::Transport("connection reset by peer".to_string()),
    );
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(3));

    let receipt = client.submit(&ticks(), GAS_LIMIT).await.expect("submit");

    assert_eq!(receipt.attempts, 3);
    assert_eq!(receipt.submission_index, 0);
    assert_eq!(chain.submissions(endpoint), 1);
}

#[tokio::test]
async fn unconfirmed_batch_that_landed_is_not_resent() {
    let (chain, endpoint) = endpoint().await;
    chain.time_out_after_next_sends(SUBMIT_SELECTOR, 1);
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(3));

    let err = client
        .submit(&ticks(), GAS_LIMIT)
        .await
        .expect_err("receipt never arrived");

    match err {
        SequencerClientError::MaybeLanded {
            submission_index,
            source,
        } => {
            assert_eq!(submission_index, 0);
            assert!(matches!(source, ChainError::Timeout(_)));
        }
        other => panic!("expected an unconfirmed submission, got {other:?}"),
    }
    assert_eq!(chain.submissions(endpoint), 1, "batch executed exactly once");
    assert_eq!(chain.sends_with_selector(SUBMIT_SELECTOR).len(), 1);
}

#[tokio::test]
async fn timeout_before_execution_is_resent() {
    let (chain, endpoint) = endpoint().await;
    chain.fail_next_sends(
        SUBMIT_SELECTOR,
        1,
        ChainError::Timeout("receipt of pending transaction".to_string()),
    );
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(3));

    let receipt = client.submit(&ticks(), GAS_LIMIT).await.expect("submit");

    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.submission_index, 0);
    assert_eq!(chain.submissions(endpoint), 1);
}

#[tokio::test]
async fn other_reverts_surface_without_retry() {
    let (chain, endpoint) = endpoint().await;
    chain.fail_next_sends(SUBMIT_SELECTOR, 1, ChainError::reverted("gas limit too low"));
    let client = SequencerClient::new(chain.clone(), endpoint).with_retry(RetryPolicy::no_delay(5));

    let err = client
        .submit(&ticks(), GAS_LIMIT)
        .await
        .expect_err("revert is final");

    assert!(matches!(
        err,
        SequencerClientError::Chain(ChainError::Reverted { ref reason }) if reason == "gas limit too low"
    ));
    assert_eq!(chain.submissions(endpoint), 0);
}

#[tokio::test]
async fn invalid_batches_never_reach_the_network() {
    let (chain, endpoint) = endpoint().await;
    let client = SequencerClient::new(chain.clone(), endpoint);
    let mismatched = TypedTransaction::SettlePnl(SettlePnl {
        subaccounts: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
        productIds: Vec::new(),
    });

    let err = client
        .submit(&[mismatched], GAS_LIMIT)
        .await
        .expect_err("schema mismatch");
    assert!(matches!(
        err,
        SequencerClientError::Codec(CodecError::SchemaMismatch {
            kind: TransactionKind::SettlePnl,
            ..
        })
    ));

    let err = client.submit(&[], GAS_LIMIT).await.expect_err("empty batch");
    assert!(matches!(err, SequencerClientError::EmptyBatch));

    assert_eq!(chain.call_count(), 0);
    assert!(chain.sends().is_empty());
}

#[tokio::test]
async fn deposit_moves_through_the_slow_mode_queue() {
    let (chain, endpoint) = endpoint().await;
    let spot_engine = chain
        .deploy(Bytes::from_static(b"SpotEngine"))
        .await
        .expect("deploy spot engine")
        .address;
    let client = SequencerClient::new(chain.clone(), endpoint);
    let subaccount = default_subaccount(sender());

    let empty = client.slow_mode_queue().await.expect("read queue");
    assert_eq!(empty.state_since(None), SlowModeState::Empty);
    assert_eq!(
        client
            .execute_slow_mode_immediately()
            .await
            .expect("execute on empty queue"),
        None
    );

    client
        .deposit_collateral(spot_engine, subaccount, 0, 1_000, DEFAULT_REFERRAL_CODE)
        .await
        .expect("first deposit");
    client
        .deposit_collateral(spot_engine, subaccount, 0, 500, DEFAULT_REFERRAL_CODE)
        .await
        .expect("second deposit");

    let pending = client.slow_mode_queue().await.expect("read queue");
    assert_eq!(pending.state_since(Some(&empty)), SlowModeState::Pending);
    assert_eq!(pending.pending(), 2);
    let head = pending.head().expect("queued deposit");
    assert_eq!(head.kind(), Some(TransactionKind::DepositCollateral));
    assert_eq!(head.sender, sender());
    let balance = client
        .balance(spot_engine, 0, subaccount)
        .await
        .expect("read balance");
    assert_eq!(balance.amount, 0, "deposits are not credited before draining");

    client
        .execute_slow_mode_immediately()
        .await
        .expect("execute")
        .expect("head executed");
    let draining = client.slow_mode_queue().await.expect("read queue");
    assert_eq!(draining.state_since(Some(&pending)), SlowModeState::Draining);
    assert_eq!(
        client
            .balance(spot_engine, 0, subaccount)
            .await
            .expect("read balance")
            .amount,
        1_000
    );

    client
        .execute_slow_mode_immediately()
        .await
        .expect("execute")
        .expect("second head executed");
    let drained = client.slow_mode_queue().await.expect("read queue");
    assert_eq!(drained.state_since(Some(&draining)), SlowModeState::Empty);
    assert_eq!(drained.processed_up_to(), 2);
    assert_eq!(chain.balance(0, subaccount), 1_500);
}

#[tokio::test]
async fn amm_order_is_built_from_live_reads() {
    let (chain, endpoint) = endpoint().await;
    let spot_engine = chain
        .deploy(Bytes::from_static(b"SpotEngine"))
        .await
        .expect("deploy spot engine")
        .address;
    let client = SequencerClient::new(chain.clone(), endpoint);
    let subaccount = default_subaccount(sender());
    client
        .deposit_collateral(spot_engine, subaccount, 3, 1_000, DEFAULT_REFERRAL_CODE)
        .await
        .expect("deposit");
    client
        .execute_slow_mode_immediately()
        .await
        .expect("execute")
        .expect("deposit credited");
    chain.set_price(endpoint, 3, 2 * ONE_X18);

    let now = chain.latest_timestamp().await.expect("timestamp");
    let signature = Bytes::from_static(&[7; 65]);
    let tx = client
        .prepare_match_order_amm(
            spot_engine,
            subaccount,
            3,
            DEFAULT_ORDER_TTL_SECS,
            signature.clone(),
        )
        .await
        .expect("build order");

    let order = match tx {
        TypedTransaction::MatchOrderAmm(order) => order,
        other => panic!("expected a MatchOrderAMM transaction, got {other:?}"),
    };
    assert_eq!(order.productId, 3);
    assert_eq!(order.baseDelta, 100);
    assert_eq!(order.quoteDelta, 0);
    assert_eq!(order.taker.order.sender, subaccount);
    assert_eq!(order.taker.order.amount, 100);
    assert_eq!(order.taker.order.priceX18, 2 * ONE_X18);
    assert_eq!(order.taker.order.expiration, now + DEFAULT_ORDER_TTL_SECS);
    assert_eq!(order.taker.signature, signature);

    let err = client
        .prepare_match_order_amm(spot_engine, subaccount, 5, DEFAULT_ORDER_TTL_SECS, signature)
        .await
        .expect_err("no balance in product 5");
    assert!(matches!(
        err,
        SequencerClientError::NothingToTrade { product_id: 5 }
    ));
}

async fn endpoint() -> (Arc<SimulatedChain>, Address) {
    let chain = Arc::new(SimulatedChain::new(sender()));
    let endpoint = chain
        .deploy(Bytes::from_static(b"Endpoint"))
        .await
        .expect("deploy endpoint")
        .address;
    (chain, endpoint)
}

fn ticks() -> Vec<TypedTransaction> {
    vec![
        TypedTransaction::spot_tick(1_700_000_000, vec![0; 4]),
        TypedTransaction::perp_tick(1_700_000_000, vec![0; 4]),
    ]
}

fn sender() -> Address {
    Address::repeat_byte(0x5e)
}
