// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Address;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use venue_core::contracts::{IEndpoint, IInitializable, IOrderBook, IPerpOracle, ISpotEngine};

use super::{Guard, InitError, InitPlan, InitStep, PlanError, StepAction};
use crate::chain::{ContractBackend, RetryPolicy, read};
use crate::registry::AddressRegistry;
use crate::sequencer_client::SequencerClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Initialized { gas_used: u64 },
    AlreadyInitialized,
    /// Not attempted because a step it depends on failed in this run.
    Blocked { failed_dependency: String },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub entries: Vec<StepReport>,
    pub cancelled: bool,
}

impl InitReport {
    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.outcome)
    }

    pub fn initialized(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::Initialized { .. }))
    }

    pub fn already_initialized(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::AlreadyInitialized))
    }

    pub fn blocked(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::Blocked { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, StepOutcome::Failed(_)))
    }

    /// Every step ran or was found done.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.failed() == 0 && self.blocked() == 0
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.entries.iter().filter(|entry| pred(&entry.outcome)).count()
    }
}

/// Runs an [`InitPlan`] step by step, skipping steps whose guard already
/// holds on chain.
pub struct InitializationSequencer {
    backend: Arc<dyn ContractBackend>,
    registry: AddressRegistry,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl InitializationSequencer {
    pub fn new(
        backend: Arc<dyn ContractBackend>,
        registry: AddressRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            registry,
            retry: RetryPolicy::default(),
            cancel,
        }
    }

    /// Retry policy for sequencer submissions made by `Submit` steps.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fails only when the plan itself is malformed; step failures are
    /// reported.
    pub async fn initialize_all(&self, plan: &InitPlan) -> Result<InitReport, PlanError> {
        let order = plan.execution_order()?;
        let mut report = InitReport::default();
        // step name -> the failed step at the root of it
        let mut failed: HashMap<&str, String> = HashMap::new();

        for step in order {
            if self.cancel.is_cancelled() {
                warn!(
                    completed = report.entries.len(),
                    remaining = plan.steps().len() - report.entries.len(),
                    "initialization cancelled"
                );
                report.cancelled = true;
                break;
            }

            let blocked_by = step
                .depends_on
                .iter()
                .find_map(|dependency| failed.get(dependency.as_str()).cloned());
            let outcome = if let Some(root) = blocked_by {
                warn!(step = %step.name, failed_dependency = %root, "blocked by a failed step");
                failed.insert(&step.name, root.clone());
                StepOutcome::Blocked {
                    failed_dependency: root,
                }
            } else {
                match self.run_step(step).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(step = %step.name, error = %err, "initialization step failed, continuing");
                        failed.insert(&step.name, step.name.clone());
                        StepOutcome::Failed(err.to_string())
                    }
                }
            };
            report.entries.push(StepReport {
                name: step.name.clone(),
                outcome,
            });
        }

        info!(
            initialized = report.initialized(),
            already_initialized = report.already_initialized(),
            blocked = report.blocked(),
            failed = report.failed(),
            "initialization finished"
        );
        Ok(report)
    }

    async fn run_step(&self, step: &InitStep) -> Result<StepOutcome, InitError> {
        if let Some(guard) = &step.guard {
            if self.guard_holds(guard).await? {
                info!(step = %step.name, ?guard, "already initialized");
                return Ok(StepOutcome::AlreadyInitialized);
            }
        }

        let outcome = match &step.action {
            StepAction::Call { target, calldata } => {
                let address = self.registry.resolve(target)?;
                let data = calldata(&self.registry)?;
                self.backend.send(address, data, None).await?
            }
            StepAction::Submit {
                endpoint,
                gas_limit,
                transactions,
            } => {
                let address = self.registry.resolve(endpoint)?;
                let timestamp = self.backend.latest_timestamp().await?;
                let batch = transactions(&self.registry, timestamp)?;
                SequencerClient::new(self.backend.clone(), address)
                    .with_retry(self.retry)
                    .submit(&batch, *gas_limit)
                    .await?
                    .outcome
            }
        };
        info!(
            step = %step.name,
            tx_hash = %outcome.tx_hash,
            gas_used = outcome.gas_used,
            "initialized"
        );
        Ok(StepOutcome::Initialized {
            gas_used: outcome.gas_used,
        })
    }

    async fn guard_holds(&self, guard: &Guard) -> Result<bool, InitError> {
        let backend = &*self.backend;
        let holds = match guard {
            Guard::Initialized { contract } => {
                let address = self.registry.resolve(contract)?;
                read::<_, _, bool>(backend, address, &IInitializable::isInitializedCall {}).await?
            }
            Guard::ProductRegistered { engine, product_id } => {
                let address = self.registry.resolve(engine)?;
                let ids: Vec<u32> =
                    read(backend, address, &ISpotEngine::getProductIdsCall {}).await?;
                ids.contains(product_id)
            }
            Guard::ClockStarted { endpoint } => {
                let address = self.registry.resolve(endpoint)?;
                let time: u128 = read(backend, address, &IEndpoint::getTimeCall {}).await?;
                time > 0
            }
            Guard::MarketListed { book, product_id } => {
                let address = self.registry.resolve(book)?;
                let token: Address = read(
                    backend,
                    address,
                    &IOrderBook::getMarketCall {
                        productId: *product_id,
                    },
                )
                .await?;
                !token.is_zero()
            }
            Guard::PriceSet { oracle, product_id } => {
                let address = self.registry.resolve(oracle)?;
                let price: i128 = read(
                    backend,
                    address,
                    &IPerpOracle::getPriceCall {
                        productId: *product_id,
                    },
                )
                .await?;
                price != 0
            }
        };
        Ok(holds)
    }
}
