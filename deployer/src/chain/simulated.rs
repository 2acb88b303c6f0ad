// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! In-process chain for dry runs and tests.
//!
//! Contracts are modeled by the methods the deployer and the sequencer client
//! use, dispatched on the 4-byte selector. Every created contract answers the
//! whole surface; calls to addresses with no code return empty data.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use tracing::debug;
use venue_core::contracts::{
    Balance, ERC1967_ADMIN_SLOT, ERC1967_IMPLEMENTATION_SLOT, IArbAirdrop, IClearinghouse,
    IEndpoint, IERC20, IInitializable, IOffchainExchange, IOrderBook, IPerpEngine, IPerpOracle,
    ISpotEngine, IToken, IVerifier, SlowModeTx,
};
use venue_core::fixed::ONE_X18;
use venue_core::transaction::{DepositCollateral, SignedDepositCollateral, TypedTransaction};

use super::{ChainError, ContractBackend, Deployed, TxOutcome};

const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
const BLOCK_TIME_SECS: u64 = 2;
const SLOW_MODE_DELAY_SECS: u64 = 3 * 24 * 60 * 60;
/// `initialize()`
const BARE_INITIALIZE_SELECTOR: [u8; 4] = [0x81, 0x29, 0xfc, 0x1c];

pub const ALREADY_INITIALIZED: &str = "Initializable: contract is already initialized";
pub const INVALID_SUBMISSION_INDEX: &str = "invalid submission index";
pub const UNKNOWN_SELECTOR: &str = "function selector was not recognized";

/// A transaction the chain accepted or rejected, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTx {
    pub to: Address,
    pub selector: [u8; 4],
    pub calldata: Bytes,
    pub gas_limit: Option<u64>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct SimContract {
    init_code: Bytes,
    initialized: bool,
    storage: HashMap<B256, B256>,
    product_ids: Vec<u32>,
    tokens: HashMap<u32, Address>,
    engines: Vec<(Address, u8)>,
    n_submissions: u64,
    slow_mode: Vec<SlowModeTx>,
    slow_mode_processed: u64,
    time: u128,
    prices: HashMap<u32, i128>,
    markets: HashMap<u32, (Address, bool)>,
    custom_prices: HashMap<u32, i128>,
}

#[derive(Debug)]
struct State {
    nonce: u64,
    block_number: u64,
    timestamp: u64,
    contracts: HashMap<Address, SimContract>,
    creation_order: Vec<Address>,
    proxy_code: Option<Bytes>,
    failing_creations: Vec<(Vec<u8>, String)>,
    failing_sends: HashMap<[u8; 4], (u32, ChainError)>,
    unconfirmed_sends: HashMap<[u8; 4], u32>,
    competing_submissions: u32,
    balances: HashMap<(u32, B256), i128>,
    sends: Vec<SentTx>,
    calls: Vec<(Address, [u8; 4])>,
}

impl State {
    fn next_block(&mut self) {
        self.block_number += 1;
        self.timestamp += BLOCK_TIME_SECS;
    }

    fn tx_hash(&self, to: Address, data: &[u8]) -> B256 {
        let mut preimage = Vec::with_capacity(28 + data.len());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        preimage.extend_from_slice(to.as_slice());
        preimage.extend_from_slice(data);
        keccak256(preimage)
    }

    fn contract(&mut self, address: Address) -> Result<&mut SimContract, ChainError> {
        self.contracts
            .get_mut(&address)
            .ok_or_else(|| ChainError::reverted(format!("no contract at {address}")))
    }
}

pub struct SimulatedChain {
    sender: Address,
    state: Mutex<State>,
}

impl SimulatedChain {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            state: Mutex::new(State {
                nonce: 0,
                block_number: 0,
                timestamp: GENESIS_TIMESTAMP,
                contracts: HashMap::new(),
                creation_order: Vec::new(),
                proxy_code: None,
                failing_creations: Vec::new(),
                failing_sends: HashMap::new(),
                unconfirmed_sends: HashMap::new(),
                competing_submissions: 0,
                balances: HashMap::new(),
                sends: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// Creations whose init code starts with `code` behave as a transparent
    /// proxy constructed with `(address logic, address initialOwner, bytes data)`.
    pub fn with_proxy_bytecode(self, code: Bytes) -> Self {
        self.with_state(|state| state.proxy_code = Some(code));
        self
    }

    /// Creations whose init code contains `marker` revert with `reason`.
    pub fn fail_creations_containing(&self, marker: &[u8], reason: &str) {
        self.with_state(|state| {
            state
                .failing_creations
                .push((marker.to_vec(), reason.to_string()))
        });
    }

    /// The next `count` sends with `selector` fail with `error` before reaching
    /// the contract.
    pub fn fail_next_sends(&self, selector: [u8; 4], count: u32, error: ChainError) {
        self.with_state(|state| {
            state.failing_sends.insert(selector, (count, error));
        });
    }

    /// The next `count` sends with `selector` execute but report a receipt
    /// timeout to the sender.
    pub fn time_out_after_next_sends(&self, selector: [u8; 4], count: u32) {
        self.with_state(|state| {
            state.unconfirmed_sends.insert(selector, count);
        });
    }

    /// Each queued entry lets another sequencer land a submission right before
    /// the next one from this sender.
    pub fn queue_competing_submissions(&self, count: u32) {
        self.with_state(|state| state.competing_submissions += count);
    }

    pub fn set_price(&self, endpoint: Address, product_id: u32, price_x18: i128) {
        self.with_state(|state| {
            if let Some(contract) = state.contracts.get_mut(&endpoint) {
                contract.prices.insert(product_id, price_x18);
            }
        });
    }

    pub fn market(&self, book: Address, product_id: u32) -> Option<(Address, bool)> {
        self.with_state(|state| {
            state
                .contracts
                .get(&book)
                .and_then(|contract| contract.markets.get(&product_id).copied())
        })
    }

    pub fn deployment_count(&self) -> usize {
        self.with_state(|state| state.creation_order.len())
    }

    pub fn deployed_addresses(&self) -> Vec<Address> {
        self.with_state(|state| state.creation_order.clone())
    }

    pub fn init_code_at(&self, address: Address) -> Option<Bytes> {
        self.with_state(|state| state.contracts.get(&address).map(|c| c.init_code.clone()))
    }

    pub fn is_initialized(&self, address: Address) -> bool {
        self.with_state(|state| {
            state
                .contracts
                .get(&address)
                .is_some_and(|contract| contract.initialized)
        })
    }

    pub fn sends(&self) -> Vec<SentTx> {
        self.with_state(|state| state.sends.clone())
    }

    pub fn sends_with_selector(&self, selector: [u8; 4]) -> Vec<SentTx> {
        self.with_state(|state| {
            state
                .sends
                .iter()
                .filter(|sent| sent.selector == selector)
                .cloned()
                .collect()
        })
    }

    pub fn call_count(&self) -> usize {
        self.with_state(|state| state.calls.len())
    }

    pub fn submissions(&self, endpoint: Address) -> u64 {
        self.with_state(|state| {
            state
                .contracts
                .get(&endpoint)
                .map_or(0, |contract| contract.n_submissions)
        })
    }

    pub fn balance(&self, product_id: u32, subaccount: B256) -> i128 {
        self.with_state(|state| {
            state
                .balances
                .get(&(product_id, subaccount))
                .copied()
                .unwrap_or(0)
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().expect("simulated chain mutex poisoned");
        f(&mut state)
    }

    fn create(&self, state: &mut State, init_code: Bytes) -> Result<Deployed, ChainError> {
        if let Some((_, reason)) = state
            .failing_creations
            .iter()
            .find(|(marker, _)| contains(&init_code, marker))
        {
            return Err(ChainError::reverted(reason.clone()));
        }

        let address = self.sender.create(state.nonce);
        let tx_hash = state.tx_hash(Address::ZERO, &init_code);
        let gas_used = intrinsic_gas(&init_code) + 32_000;
        let mut contract = SimContract {
            init_code: init_code.clone(),
            ..SimContract::default()
        };

        let proxy_args = state
            .proxy_code
            .as_ref()
            .and_then(|code| init_code.strip_prefix(&code[..]));
        if let Some(args) = proxy_args {
            let (logic, _owner, data) = <(Address, Address, Bytes)>::abi_decode_params(args)
                .map_err(|err| ChainError::reverted(format!("bad proxy constructor: {err}")))?;
            let admin = address.create(1);
            contract
                .storage
                .insert(ERC1967_IMPLEMENTATION_SLOT, logic.into_word());
            contract.storage.insert(ERC1967_ADMIN_SLOT, admin.into_word());
            if !data.is_empty() {
                if !is_initializer(selector_of(&data)) {
                    return Err(ChainError::reverted("proxy init data is not an initializer"));
                }
                contract.initialized = true;
            }
        }

        state.nonce += 1;
        state.next_block();
        state.contracts.insert(address, contract);
        state.creation_order.push(address);
        debug!(%address, gas_used, "simulated creation");
        Ok(Deployed {
            address,
            tx_hash,
            gas_used,
        })
    }

    fn view(&self, state: &mut State, to: Address, data: &[u8]) -> Result<Bytes, ChainError> {
        let selector = selector_of(data);
        state.calls.push((to, selector));
        let Some(contract) = state.contracts.get(&to) else {
            return Ok(Bytes::new());
        };

        let out = if selector == IInitializable::isInitializedCall::SELECTOR {
            contract.initialized.abi_encode()
        } else if selector == IEndpoint::nSubmissionsCall::SELECTOR {
            contract.n_submissions.abi_encode()
        } else if selector == IEndpoint::getTimeCall::SELECTOR {
            contract.time.abi_encode()
        } else if selector == IEndpoint::getSlowModeTxCall::SELECTOR {
            let call = decode_call::<IEndpoint::getSlowModeTxCall>(data)?;
            let entry = usize::try_from(call.idx)
                .ok()
                .and_then(|idx| contract.slow_mode.get(idx))
                .cloned()
                .unwrap_or_else(empty_slow_mode_tx);
            let total = contract.slow_mode.len() as u64;
            (entry, contract.slow_mode_processed, total).abi_encode_params()
        } else if selector == ISpotEngine::getProductIdsCall::SELECTOR {
            contract.product_ids.abi_encode()
        } else if selector == ISpotEngine::getTokenCall::SELECTOR {
            let call = decode_call::<ISpotEngine::getTokenCall>(data)?;
            contract
                .tokens
                .get(&call.productId)
                .copied()
                .unwrap_or(Address::ZERO)
                .abi_encode()
        } else if selector == ISpotEngine::getBalanceCall::SELECTOR {
            let call = decode_call::<ISpotEngine::getBalanceCall>(data)?;
            let amount = state
                .balances
                .get(&(call.productId, call.subaccount))
                .copied()
                .unwrap_or(0);
            Balance {
                amount,
                lastCumulativeMultiplierX18: ONE_X18,
            }
            .abi_encode()
        } else if selector == IEndpoint::getPriceX18Call::SELECTOR {
            let call = decode_call::<IEndpoint::getPriceX18Call>(data)?;
            contract
                .prices
                .get(&call.productId)
                .copied()
                .unwrap_or(ONE_X18)
                .abi_encode()
        } else if selector == IOrderBook::getMarketCall::SELECTOR {
            let call = decode_call::<IOrderBook::getMarketCall>(data)?;
            contract
                .markets
                .get(&call.productId)
                .map_or(Address::ZERO, |(token, _)| *token)
                .abi_encode()
        } else if selector == IPerpOracle::getPriceCall::SELECTOR {
            let call = decode_call::<IPerpOracle::getPriceCall>(data)?;
            contract
                .custom_prices
                .get(&call.productId)
                .copied()
                .unwrap_or(0)
                .abi_encode()
        } else if selector == IEndpoint::getNonceCall::SELECTOR {
            0u64.abi_encode()
        } else if selector == IEndpoint::getSubaccountIdCall::SELECTOR {
            0u64.abi_encode()
        } else if selector == IERC20::balanceOfCall::SELECTOR {
            U256::MAX.abi_encode()
        } else {
            return Err(ChainError::reverted(UNKNOWN_SELECTOR));
        };
        Ok(out.into())
    }

    fn execute(&self, state: &mut State, to: Address, data: &[u8]) -> Result<(), ChainError> {
        let selector = selector_of(data);
        let timestamp = state.timestamp;
        if !state.contracts.contains_key(&to) {
            return Ok(());
        }

        if is_initializer(selector) {
            let contract = state.contract(to)?;
            if contract.initialized {
                return Err(ChainError::reverted(ALREADY_INITIALIZED));
            }
            contract.initialized = true;
        } else if selector == IClearinghouse::addEngineCall::SELECTOR {
            let call = decode_call::<IClearinghouse::addEngineCall>(data)?;
            let engine = state.contract(call.engine)?;
            if engine.initialized {
                return Err(ChainError::reverted(ALREADY_INITIALIZED));
            }
            engine.initialized = true;
            state
                .contract(to)?
                .engines
                .push((call.engine, call.engineType));
        } else if selector == ISpotEngine::addProductCall::SELECTOR {
            let call = decode_call::<ISpotEngine::addProductCall>(data)?;
            let engine = state.contract(to)?;
            register_product(engine, call.productId)?;
            engine.tokens.insert(call.productId, call.config.token);
        } else if selector == IPerpEngine::addProductCall::SELECTOR {
            let call = decode_call::<IPerpEngine::addProductCall>(data)?;
            register_product(state.contract(to)?, call.productId)?;
        } else if selector == IOrderBook::addMarketCall::SELECTOR {
            let call = decode_call::<IOrderBook::addMarketCall>(data)?;
            let book = state.contract(to)?;
            if book.markets.contains_key(&call.productId) {
                return Err(ChainError::reverted(format!(
                    "market {} already exists",
                    call.productId
                )));
            }
            book.markets.insert(call.productId, (call.token, call.isPerp));
        } else if selector == IPerpOracle::setCustomPriceCall::SELECTOR {
            let call = decode_call::<IPerpOracle::setCustomPriceCall>(data)?;
            state
                .contract(to)?
                .custom_prices
                .insert(call.productId, call.priceX18);
        } else if selector == IEndpoint::submitTransactionsCheckedWithGasLimitCall::SELECTOR {
            let call = decode_call::<IEndpoint::submitTransactionsCheckedWithGasLimitCall>(data)?;
            let competing = state.competing_submissions > 0;
            if competing {
                state.competing_submissions -= 1;
            }
            let endpoint = state.contract(to)?;
            if competing {
                endpoint.n_submissions += 1;
            }
            if call.idx != endpoint.n_submissions {
                return Err(ChainError::reverted(INVALID_SUBMISSION_INDEX));
            }
            let decoded = call
                .transactions
                .iter()
                .map(|tx| TypedTransaction::decode(tx))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| ChainError::reverted(format!("invalid transaction: {err}")))?;
            endpoint.n_submissions += 1;
            for tx in decoded {
                apply_submitted(state, to, tx)?;
            }
        } else if selector == IEndpoint::executeSlowModeTransactionImmediatelyCall::SELECTOR {
            drain_slow_mode(state, to)?;
        } else if selector == IEndpoint::depositCollateralWithReferralCall::SELECTOR {
            let call = decode_call::<IEndpoint::depositCollateralWithReferralCall>(data)?;
            let deposit = TypedTransaction::DepositCollateral(SignedDepositCollateral {
                tx: DepositCollateral {
                    sender: call.subaccount,
                    productId: call.productId,
                    amount: call.amount,
                },
                signature: Bytes::new(),
            });
            state.contract(to)?.slow_mode.push(SlowModeTx {
                executableAt: timestamp + SLOW_MODE_DELAY_SECS,
                sender: self.sender,
                tx: deposit.encode(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContractBackend for SimulatedChain {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn deploy(&self, init_code: Bytes) -> Result<Deployed, ChainError> {
        self.with_state(|state| self.create(state, init_code))
    }

    async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, ChainError> {
        self.with_state(|state| self.view(state, to, &calldata))
    }

    async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: Option<u64>,
    ) -> Result<TxOutcome, ChainError> {
        self.with_state(|state| {
            let selector = selector_of(&calldata);
            if let Some((remaining, error)) = state.failing_sends.get_mut(&selector) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }

            let result = self.execute(state, to, &calldata);
            state.sends.push(SentTx {
                to,
                selector,
                calldata: calldata.clone(),
                gas_limit,
                succeeded: result.is_ok(),
            });
            result?;

            let tx_hash = state.tx_hash(to, &calldata);
            state.nonce += 1;
            state.next_block();
            if let Some(remaining) = state.unconfirmed_sends.get_mut(&selector) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ChainError::Timeout(format!("receipt of {tx_hash}")));
                }
            }
            Ok(TxOutcome {
                tx_hash,
                gas_used: intrinsic_gas(&calldata),
                block_number: Some(state.block_number),
            })
        })
    }

    async fn storage_at(&self, address: Address, slot: B256) -> Result<B256, ChainError> {
        self.with_state(|state| {
            Ok(state
                .contracts
                .get(&address)
                .and_then(|contract| contract.storage.get(&slot).copied())
                .unwrap_or_default())
        })
    }

    async fn latest_timestamp(&self) -> Result<u64, ChainError> {
        self.with_state(|state| Ok(state.timestamp))
    }
}

fn apply_submitted(state: &mut State, endpoint: Address, tx: TypedTransaction) -> Result<(), ChainError> {
    match tx {
        TypedTransaction::SpotTick(tick) => {
            let contract = state.contract(endpoint)?;
            contract.time = contract.time.max(tick.time);
        }
        TypedTransaction::PerpTick(tick) => {
            let contract = state.contract(endpoint)?;
            contract.time = contract.time.max(tick.time);
        }
        TypedTransaction::ExecuteSlowMode => drain_slow_mode(state, endpoint)?,
        TypedTransaction::UpdatePrice(update) => {
            state
                .contract(endpoint)?
                .prices
                .insert(update.productId, update.priceX18);
        }
        _ => {}
    }
    Ok(())
}

fn drain_slow_mode(state: &mut State, endpoint: Address) -> Result<(), ChainError> {
    let contract = state.contract(endpoint)?;
    let Ok(index) = usize::try_from(contract.slow_mode_processed) else {
        return Err(ChainError::reverted("slow mode index overflow"));
    };
    let Some(entry) = contract.slow_mode.get(index).cloned() else {
        return Err(ChainError::reverted("no slow mode transactions pending"));
    };
    contract.slow_mode_processed += 1;

    if let Ok(TypedTransaction::DepositCollateral(deposit)) = TypedTransaction::decode(&entry.tx) {
        let amount = i128::try_from(deposit.tx.amount).unwrap_or(i128::MAX);
        *state
            .balances
            .entry((deposit.tx.productId, deposit.tx.sender))
            .or_insert(0) += amount;
    }
    Ok(())
}

fn register_product(engine: &mut SimContract, product_id: u32) -> Result<(), ChainError> {
    if !engine.initialized {
        return Err(ChainError::reverted("engine is not initialized"));
    }
    if engine.product_ids.contains(&product_id) {
        return Err(ChainError::reverted(format!(
            "product {product_id} already registered"
        )));
    }
    engine.product_ids.push(product_id);
    Ok(())
}

fn is_initializer(selector: [u8; 4]) -> bool {
    [
        BARE_INITIALIZE_SELECTOR,
        IVerifier::initializeCall::SELECTOR,
        IClearinghouse::initializeCall::SELECTOR,
        IArbAirdrop::initializeCall::SELECTOR,
        IOffchainExchange::initializeCall::SELECTOR,
        IToken::initializeCall::SELECTOR,
        IEndpoint::initializeCall::SELECTOR,
    ]
    .contains(&selector)
}

fn decode_call<C: SolCall>(data: &[u8]) -> Result<C, ChainError> {
    C::abi_decode(data).map_err(|err| ChainError::reverted(format!("{}: {err}", C::SIGNATURE)))
}

fn selector_of(data: &[u8]) -> [u8; 4] {
    let mut selector = [0u8; 4];
    let len = data.len().min(4);
    selector[..len].copy_from_slice(&data[..len]);
    selector
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

fn intrinsic_gas(data: &[u8]) -> u64 {
    21_000 + 16 * data.len() as u64
}

fn empty_slow_mode_tx() -> SlowModeTx {
    SlowModeTx {
        executableAt: 0,
        sender: Address::ZERO,
        tx: Bytes::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::read;

    fn sender() -> Address {
        Address::repeat_byte(0x5e)
    }

    #[tokio::test]
    async fn creation_addresses_follow_sender_nonce() {
        let chain = SimulatedChain::new(sender());
        let first = chain.deploy(Bytes::from_static(&[1])).await.expect("deploy");
        let second = chain.deploy(Bytes::from_static(&[2])).await.expect("deploy");

        assert_eq!(first.address, sender().create(0));
        assert_eq!(second.address, sender().create(1));
        assert_eq!(chain.deployment_count(), 2);
    }

    #[tokio::test]
    async fn initializer_runs_once() {
        let chain = SimulatedChain::new(sender());
        let target = chain
            .deploy(Bytes::from_static(&[0xaa]))
            .await
            .expect("deploy")
            .address;
        let init = IArbAirdrop::initializeCall {
            token: Address::repeat_byte(1),
        };

        chain
            .send(target, init.abi_encode().into(), None)
            .await
            .expect("first initialize");
        let err = chain
            .send(target, init.abi_encode().into(), None)
            .await
            .expect_err("second initialize");
        assert_eq!(err, ChainError::reverted(ALREADY_INITIALIZED));

        let initialized: bool = read(&chain, target, &IInitializable::isInitializedCall {})
            .await
            .expect("read");
        assert!(initialized);
    }

    #[tokio::test]
    async fn unconfirmed_send_still_takes_effect() {
        let chain = SimulatedChain::new(sender());
        let book = chain
            .deploy(Bytes::from_static(b"OrderBook"))
            .await
            .expect("deploy")
            .address;
        let token = Address::repeat_byte(9);
        let add = IOrderBook::addMarketCall {
            productId: 1,
            token,
            isPerp: false,
        };
        chain.time_out_after_next_sends(IOrderBook::addMarketCall::SELECTOR, 1);

        let err = chain
            .send(book, add.abi_encode().into(), None)
            .await
            .expect_err("no receipt");
        assert!(matches!(err, ChainError::Timeout(_)));
        assert_eq!(chain.market(book, 1), Some((token, false)));

        let listed: Address = read(&chain, book, &IOrderBook::getMarketCall { productId: 1 })
            .await
            .expect("read market");
        assert_eq!(listed, token);
        let err = chain
            .send(book, add.abi_encode().into(), None)
            .await
            .expect_err("duplicate market");
        assert_eq!(err, ChainError::reverted("market 1 already exists"));
    }

    #[tokio::test]
    async fn calls_to_empty_accounts_return_no_data() {
        let chain = SimulatedChain::new(sender());
        let data = chain
            .call(Address::repeat_byte(3), Bytes::from_static(&[1, 2, 3, 4]))
            .await
            .expect("call");
        assert!(data.is_empty());
    }
}
