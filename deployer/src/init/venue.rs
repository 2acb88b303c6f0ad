// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Initialization plan of the venue contract set.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use k256::SecretKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use venue_core::contracts::{
    EngineType, IArbAirdrop, IClearinghouse, IEndpoint, IOffchainExchange, IOrderBook,
    IPerpEngine, IPerpOracle, ISpotEngine, IToken, IVerifier, Point, RiskStore, SpotConfig,
};
use venue_core::fixed::{FixedPointError, ONE_X18, parse_x9_i32, parse_x18};
use venue_core::transaction::TypedTransaction;

use super::{Guard, InitError, InitPlan, InitStep};
use crate::registry::AddressRegistry;

/// Record names of the venue contracts.
pub mod names {
    pub const VERIFIER: &str = "Verifier";
    pub const CLEARINGHOUSE: &str = "Clearinghouse";
    pub const CLEARINGHOUSE_LIQ: &str = "ClearinghouseLiq";
    pub const ARB_AIRDROP: &str = "ArbAirdrop";
    pub const SPOT_ENGINE: &str = "SpotEngine";
    pub const PERP_ENGINE: &str = "PerpEngine";
    pub const OFFCHAIN_EXCHANGE: &str = "OffchainExchange";
    pub const ENDPOINT: &str = "Endpoint";
    pub const SANCTIONS: &str = "MockSanctions";
    pub const SEQUENCER: &str = "MockSequencer";
    pub const QUOTE_TOKEN: &str = "MockQuoteToken";
    pub const VERTEX_TOKEN: &str = "VertexToken";
    pub const ORDER_BOOK: &str = "OrderBook";
    pub const PERP_ORACLE: &str = "PerpOracle";
}

pub mod steps {
    pub const VERIFIER: &str = "verifier";
    pub const CLEARINGHOUSE: &str = "clearinghouse";
    pub const ARB_AIRDROP: &str = "arb-airdrop";
    pub const SPOT_ENGINE: &str = "spot-engine-registration";
    pub const PERP_ENGINE: &str = "perp-engine-registration";
    pub const OFFCHAIN_EXCHANGE: &str = "offchain-exchange";
    pub const ENDPOINT: &str = "endpoint";
    pub const TOKEN: &str = "token";
    pub const ENGINE_CLOCK: &str = "engine-clock";

    pub fn spot_product(id: u32) -> String {
        format!("spot-product-{id}")
    }

    pub fn perp_product(id: u32) -> String {
        format!("perp-product-{id}")
    }

    pub fn spot_market(id: u32) -> String {
        format!("spot-market-{id}")
    }

    pub fn perp_price(id: u32) -> String {
        format!("perp-price-{id}")
    }
}

/// Pairs spot 1 with perp 2 and spot 3 with perp 4.
pub const DEFAULT_SPREADS: u64 = 0x0102_0304_0000_0000;
pub const DEFAULT_CLOCK_GAS_LIMIT: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Weights are 9-decimal fixed point; `priceX18` is 18-decimal like every
    /// other `X18` value the engines read.
    pub fn risk_store(self) -> Result<RiskStore, FixedPointError> {
        let (long_initial, short_initial, long_maintenance, short_maintenance) = match self {
            RiskTier::Low => ("0.9", "1.1", "0.95", "1.05"),
            RiskTier::Medium => ("0.8", "1.2", "0.9", "1.1"),
            RiskTier::High => ("0.7", "1.3", "0.8", "1.2"),
        };
        Ok(RiskStore {
            longWeightInitial: parse_x9_i32(long_initial)?,
            shortWeightInitial: parse_x9_i32(short_initial)?,
            longWeightMaintenance: parse_x9_i32(long_maintenance)?,
            shortWeightMaintenance: parse_x9_i32(short_maintenance)?,
            priceX18: ONE_X18,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductParams {
    pub id: u32,
    /// Record name of the product token; zero address when unset.
    pub token: Option<String>,
    pub risk: RiskTier,
    pub size_increment_x18: i128,
    pub min_size_x18: i128,
    pub lp_spread_x18: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestParams {
    pub inflection_util_x18: i128,
    pub floor_x18: i128,
    pub small_cap_x18: i128,
    pub large_cap_x18: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueParams {
    pub spreads: U256,
    pub initial_prices_x18: Vec<i128>,
    pub token_name: String,
    pub token_symbol: String,
    /// Record name of the contract allowed to mint the venue token.
    pub token_minter: String,
    pub interest: InterestParams,
    pub spot_products: Vec<ProductParams>,
    pub perp_products: Vec<ProductParams>,
    /// Oracle price set for each perp product before it is registered.
    pub perp_initial_price_x18: i128,
    pub clock_gas_limit: u64,
}

impl VenueParams {
    pub fn standard() -> Result<Self, FixedPointError> {
        let product = |id, token: Option<&str>, risk, size_increment| -> Result<_, FixedPointError> {
            Ok(ProductParams {
                id,
                token: token.map(str::to_string),
                risk,
                size_increment_x18: parse_x18(size_increment)?,
                min_size_x18: parse_x18("1")?,
                lp_spread_x18: parse_x18("0.001")?,
            })
        };
        Ok(Self {
            spreads: U256::from(DEFAULT_SPREADS),
            initial_prices_x18: vec![
                parse_x18("0.00075")?,
                parse_x18("0.00080")?,
                parse_x18("0.00001")?,
            ],
            token_name: "Vertex".to_string(),
            token_symbol: "VRTX".to_string(),
            token_minter: names::CLEARINGHOUSE.to_string(),
            interest: InterestParams {
                inflection_util_x18: parse_x18("0.8")?,
                floor_x18: parse_x18("0.01")?,
                small_cap_x18: parse_x18("0.04")?,
                large_cap_x18: parse_x18("1")?,
            },
            spot_products: vec![
                product(1, Some(names::VERTEX_TOKEN), RiskTier::High, "0.01")?,
                product(3, None, RiskTier::Medium, "0.01")?,
                product(5, None, RiskTier::Low, "0.01")?,
                product(7, None, RiskTier::High, "0.01")?,
            ],
            perp_products: vec![
                product(2, None, RiskTier::Medium, "0.1")?,
                product(4, None, RiskTier::Medium, "0.1")?,
                product(6, None, RiskTier::High, "0.1")?,
                product(8, None, RiskTier::Low, "0.1")?,
            ],
            perp_initial_price_x18: ONE_X18,
            clock_gas_limit: DEFAULT_CLOCK_GAS_LIMIT,
        })
    }
}

/// Public keys of the secret scalars 1..=8, the verifier's initial signer set.
pub fn generate_test_points() -> Result<[Point; 8], InitError> {
    let mut points = Vec::with_capacity(8);
    for scalar in 1u8..=8 {
        let mut bytes = [0u8; 32];
        bytes[31] = scalar;
        let secret = SecretKey::from_slice(&bytes).map_err(|err| InitError::Parameter {
            name: "verifier key".to_string(),
            reason: err.to_string(),
        })?;
        let encoded = secret.public_key().to_encoded_point(false);
        let (Some(x), Some(y)) = (encoded.x(), encoded.y()) else {
            return Err(InitError::Parameter {
                name: "verifier key".to_string(),
                reason: "public key has no affine coordinates".to_string(),
            });
        };
        points.push(Point {
            x: U256::from_be_slice(x),
            y: U256::from_be_slice(y),
        });
    }
    points.try_into().map_err(|_| InitError::Parameter {
        name: "verifier key".to_string(),
        reason: "expected eight points".to_string(),
    })
}

fn encoded<C: SolCall>(call: C) -> Result<Bytes, InitError> {
    Ok(call.abi_encode().into())
}

fn token_address(registry: &AddressRegistry, token: Option<&str>) -> Result<Address, InitError> {
    match token {
        Some(name) => Ok(registry.resolve(name)?),
        None => Ok(Address::ZERO),
    }
}

pub fn venue_plan(params: &VenueParams) -> Result<InitPlan, InitError> {
    let points = generate_test_points()?;
    let mut plan = InitPlan::new()
        .step(
            InitStep::call(steps::VERIFIER, names::VERIFIER, move |_| {
                encoded(IVerifier::initializeCall {
                    initialSet: points.clone(),
                })
            })
            .guarded_by(initialized(names::VERIFIER)),
        )
        .step({
            let spreads = params.spreads;
            InitStep::call(steps::CLEARINGHOUSE, names::CLEARINGHOUSE, move |registry| {
                let [endpoint, quote, liquidation] = registry.resolve_all([
                    names::ENDPOINT,
                    names::QUOTE_TOKEN,
                    names::CLEARINGHOUSE_LIQ,
                ])?;
                encoded(IClearinghouse::initializeCall {
                    endpoint,
                    quote,
                    clearinghouseLiq: liquidation,
                    spreads,
                })
            })
            .guarded_by(initialized(names::CLEARINGHOUSE))
        })
        .step(
            InitStep::call(steps::ARB_AIRDROP, names::ARB_AIRDROP, |registry| {
                encoded(IArbAirdrop::initializeCall {
                    token: registry.resolve(names::VERTEX_TOKEN)?,
                })
            })
            .guarded_by(initialized(names::ARB_AIRDROP)),
        )
        .step(engine_registration(
            steps::SPOT_ENGINE,
            names::SPOT_ENGINE,
            EngineType::Spot,
        ))
        .step(engine_registration(
            steps::PERP_ENGINE,
            names::PERP_ENGINE,
            EngineType::Perp,
        ))
        .step(
            InitStep::call(steps::OFFCHAIN_EXCHANGE, names::OFFCHAIN_EXCHANGE, |registry| {
                let [clearinghouse, endpoint] =
                    registry.resolve_all([names::CLEARINGHOUSE, names::ENDPOINT])?;
                encoded(IOffchainExchange::initializeCall {
                    clearinghouse,
                    endpoint,
                })
            })
            .guarded_by(initialized(names::OFFCHAIN_EXCHANGE))
            .after(steps::SPOT_ENGINE)
            .after(steps::PERP_ENGINE),
        )
        .step({
            let initial_prices = params.initial_prices_x18.clone();
            InitStep::call(steps::ENDPOINT, names::ENDPOINT, move |registry| {
                let [sanctions, sequencer, offchain_exchange, clearinghouse, verifier] = registry
                    .resolve_all([
                        names::SANCTIONS,
                        names::SEQUENCER,
                        names::OFFCHAIN_EXCHANGE,
                        names::CLEARINGHOUSE,
                        names::VERIFIER,
                    ])?;
                encoded(IEndpoint::initializeCall {
                    sanctions,
                    sequencer,
                    offchainExchange: offchain_exchange,
                    clearinghouse,
                    verifier,
                    initialPrices: initial_prices.clone(),
                })
            })
            .guarded_by(initialized(names::ENDPOINT))
            .after(steps::VERIFIER)
            .after(steps::CLEARINGHOUSE)
            .after(steps::OFFCHAIN_EXCHANGE)
        })
        .step({
            let (name, symbol) = (params.token_name.clone(), params.token_symbol.clone());
            let minter = params.token_minter.clone();
            InitStep::call(steps::TOKEN, names::VERTEX_TOKEN, move |registry| {
                encoded(IToken::initializeCall {
                    name: name.clone(),
                    symbol: symbol.clone(),
                    minter: registry.resolve(&minter)?,
                })
            })
            .guarded_by(initialized(names::VERTEX_TOKEN))
        })
        .step({
            let spot_count = params.spot_products.len();
            let perp_count = params.perp_products.len();
            InitStep::submit(
                steps::ENGINE_CLOCK,
                names::ENDPOINT,
                params.clock_gas_limit,
                move |_, timestamp| {
                    let time = u128::from(timestamp);
                    Ok(vec![
                        TypedTransaction::spot_tick(time, vec![0; spot_count]),
                        TypedTransaction::perp_tick(time, vec![0; perp_count]),
                    ])
                },
            )
            .guarded_by(Guard::ClockStarted {
                endpoint: names::ENDPOINT.to_string(),
            })
            .after(steps::ENDPOINT)
        });

    for product in &params.spot_products {
        plan.push(spot_product_step(product, &params.interest)?);
        if let Some(token) = &product.token {
            plan.push(spot_market_step(product.id, token));
        }
    }
    for product in &params.perp_products {
        plan.push(perp_price_step(product.id, params.perp_initial_price_x18));
        plan.push(perp_product_step(product)?);
    }
    Ok(plan)
}

fn initialized(contract: &str) -> Guard {
    Guard::Initialized {
        contract: contract.to_string(),
    }
}

/// `addEngine` on the clearinghouse initializes the engine itself.
fn engine_registration(step: &str, engine: &'static str, engine_type: EngineType) -> InitStep {
    InitStep::call(step, names::CLEARINGHOUSE, move |registry| {
        let [engine, offchain_exchange] =
            registry.resolve_all([engine, names::OFFCHAIN_EXCHANGE])?;
        encoded(IClearinghouse::addEngineCall {
            engine,
            offchainExchange: offchain_exchange,
            engineType: engine_type as u8,
        })
    })
    .guarded_by(initialized(engine))
    .after(steps::CLEARINGHOUSE)
}

fn spot_product_step(
    product: &ProductParams,
    interest: &InterestParams,
) -> Result<InitStep, InitError> {
    let risk_store = product.risk.risk_store()?;
    let product = product.clone();
    let interest = interest.clone();
    let id = product.id;
    Ok(InitStep::call(
        steps::spot_product(id),
        names::SPOT_ENGINE,
        move |registry| {
            let book = registry.resolve(names::ORDER_BOOK)?;
            let token = token_address(registry, product.token.as_deref())?;
            encoded(ISpotEngine::addProductCall {
                productId: product.id,
                book,
                sizeIncrement: product.size_increment_x18,
                minSize: product.min_size_x18,
                lpSpreadX18: product.lp_spread_x18,
                config: SpotConfig {
                    token,
                    interestInflectionUtilX18: interest.inflection_util_x18,
                    interestFloorX18: interest.floor_x18,
                    interestSmallCapX18: interest.small_cap_x18,
                    interestLargeCapX18: interest.large_cap_x18,
                },
                riskStore: risk_store.clone(),
            })
        },
    )
    .guarded_by(Guard::ProductRegistered {
        engine: names::SPOT_ENGINE.to_string(),
        product_id: id,
    })
    .after(steps::SPOT_ENGINE)
    .after(steps::ENGINE_CLOCK))
}

/// Lists a token-backed spot product on the order book once it is registered.
fn spot_market_step(id: u32, token: &str) -> InitStep {
    let token = token.to_string();
    InitStep::call(steps::spot_market(id), names::ORDER_BOOK, move |registry| {
        encoded(IOrderBook::addMarketCall {
            productId: id,
            token: registry.resolve(&token)?,
            isPerp: false,
        })
    })
    .guarded_by(Guard::MarketListed {
        book: names::ORDER_BOOK.to_string(),
        product_id: id,
    })
    .after(steps::spot_product(id))
}

fn perp_price_step(id: u32, price_x18: i128) -> InitStep {
    InitStep::call(steps::perp_price(id), names::PERP_ORACLE, move |_| {
        encoded(IPerpOracle::setCustomPriceCall {
            productId: id,
            priceX18: price_x18,
        })
    })
    .guarded_by(Guard::PriceSet {
        oracle: names::PERP_ORACLE.to_string(),
        product_id: id,
    })
    .after(steps::PERP_ENGINE)
}

fn perp_product_step(product: &ProductParams) -> Result<InitStep, InitError> {
    let risk_store = product.risk.risk_store()?;
    let product = product.clone();
    let id = product.id;
    Ok(InitStep::call(
        steps::perp_product(id),
        names::PERP_ENGINE,
        move |registry| {
            encoded(IPerpEngine::addProductCall {
                productId: product.id,
                book: registry.resolve(names::ORDER_BOOK)?,
                sizeIncrement: product.size_increment_x18,
                minSize: product.min_size_x18,
                lpSpreadX18: product.lp_spread_x18,
                riskStore: risk_store.clone(),
            })
        },
    )
    .guarded_by(Guard::ProductRegistered {
        engine: names::PERP_ENGINE.to_string(),
        product_id: id,
    })
    .after(steps::perp_price(id))
    .after(steps::ENGINE_CLOCK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::uint;

    #[test]
    fn first_test_point_is_the_generator() {
        let points = generate_test_points().expect("points");
        assert_eq!(
            points[0].x,
            uint!(0x79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798_U256)
        );
        assert_eq!(
            points[0].y,
            uint!(0x483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8_U256)
        );
        assert_ne!(points[0], points[7]);
    }

    #[test]
    fn risk_tiers_scale_to_nine_decimals() {
        let low = RiskTier::Low.risk_store().expect("low tier");
        assert_eq!(low.longWeightInitial, 900_000_000);
        assert_eq!(low.shortWeightMaintenance, 1_050_000_000);
        let high = RiskTier::High.risk_store().expect("high tier");
        assert_eq!(high.shortWeightInitial, 1_300_000_000);
        assert_eq!(high.priceX18, ONE_X18);
    }

    #[test]
    fn venue_plan_keeps_the_registration_order() {
        let params = VenueParams::standard().expect("standard params");
        let plan = venue_plan(&params).expect("plan");
        let order: Vec<_> = plan
            .execution_order()
            .expect("acyclic")
            .into_iter()
            .map(|step| step.name.clone())
            .collect();

        let position = |name: &str| {
            order
                .iter()
                .position(|step| step == name)
                .expect("step present")
        };
        assert_eq!(
            &order[..9],
            &[
                steps::VERIFIER,
                steps::CLEARINGHOUSE,
                steps::ARB_AIRDROP,
                steps::SPOT_ENGINE,
                steps::PERP_ENGINE,
                steps::OFFCHAIN_EXCHANGE,
                steps::ENDPOINT,
                steps::TOKEN,
                steps::ENGINE_CLOCK,
            ]
        );
        assert!(position(steps::spot_product(1).as_str()) > position(steps::ENGINE_CLOCK));
        assert!(
            position(steps::spot_market(1).as_str()) > position(steps::spot_product(1).as_str())
        );
        for id in [2, 4, 6, 8] {
            assert!(
                position(steps::perp_price(id).as_str())
                    < position(steps::perp_product(id).as_str())
            );
        }
        // only product 1 has a token, so only it gets a market
        assert!(!order.contains(&steps::spot_market(3)));
        assert_eq!(order.len(), 9 + 8 + 1 + 4);
    }
}
