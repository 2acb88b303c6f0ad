// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use alloy_primitives::Bytes;
use thiserror::Error;
use venue_core::transaction::TypedTransaction;

use super::InitError;
use crate::registry::AddressRegistry;

/// Builds calldata once the addresses it needs can be resolved.
pub type CalldataFn = Box<dyn Fn(&AddressRegistry) -> Result<Bytes, InitError> + Send + Sync>;

/// Builds sequencer transactions given the latest block timestamp.
pub type TransactionsFn =
    Box<dyn Fn(&AddressRegistry, u64) -> Result<Vec<TypedTransaction>, InitError> + Send + Sync>;

/// On-chain condition meaning a step has already taken effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// `isInitialized()` on the contract returns true.
    Initialized { contract: String },
    /// `getProductIds()` on the engine lists the product.
    ProductRegistered { engine: String, product_id: u32 },
    /// `getTime()` on the endpoint is non-zero.
    ClockStarted { endpoint: String },
    /// `getMarket(product_id)` on the order book is a non-zero token.
    MarketListed { book: String, product_id: u32 },
    /// `getPrice(product_id)` on the oracle is non-zero.
    PriceSet { oracle: String, product_id: u32 },
}

pub enum StepAction {
    /// One transaction to a recorded contract.
    Call { target: String, calldata: CalldataFn },
    /// A batch of sequencer transactions submitted to the endpoint.
    Submit {
        endpoint: String,
        gas_limit: u64,
        transactions: TransactionsFn,
    },
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { target, .. } => f.debug_struct("Call").field("target", target).finish(),
            Self::Submit {
                endpoint,
                gas_limit,
                ..
            } => f
                .debug_struct("Submit")
                .field("endpoint", endpoint)
                .field("gas_limit", gas_limit)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct InitStep {
    pub name: String,
    pub guard: Option<Guard>,
    pub action: StepAction,
    pub depends_on: Vec<String>,
}

impl InitStep {
    pub fn call<F>(name: impl Into<String>, target: impl Into<String>, calldata: F) -> Self
    where
        F: Fn(&AddressRegistry) -> Result<Bytes, InitError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            guard: None,
            action: StepAction::Call {
                target: target.into(),
                calldata: Box::new(calldata),
            },
            depends_on: Vec::new(),
        }
    }

    pub fn submit<F>(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        gas_limit: u64,
        transactions: F,
    ) -> Self
    where
        F: Fn(&AddressRegistry, u64) -> Result<Vec<TypedTransaction>, InitError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            guard: None,
            action: StepAction::Submit {
                endpoint: endpoint.into(),
                gas_limit,
                transactions: Box::new(transactions),
            },
            depends_on: Vec::new(),
        }
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.depends_on.push(step.into());
        self
    }

    pub fn guarded_by(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("step {0} is declared twice")]
    DuplicateStep(String),
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: String, dependency: String },
    #[error("steps {0:?} depend on each other")]
    Cycle(Vec<String>),
}

#[derive(Debug, Default)]
pub struct InitPlan {
    steps: Vec<InitStep>,
}

impl InitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: InitStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: InitStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[InitStep] {
        &self.steps
    }

    /// Steps in dependency order. Among steps that are ready at the same
    /// time, the one declared first runs first.
    pub fn execution_order(&self) -> Result<Vec<&InitStep>, PlanError> {
        let mut index = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.name.as_str(), i).is_some() {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }
        }

        let mut pending_deps = vec![0usize; self.steps.len()];
        let mut dependents = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            for dependency in &step.depends_on {
                let Some(&dep) = index.get(dependency.as_str()) else {
                    return Err(PlanError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                pending_deps[i] += 1;
                dependents[dep].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.steps.len())
            .filter(|&i| pending_deps[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(i) = ready.pop_first() {
            order.push(&self.steps[i]);
            for &next in &dependents[i] {
                pending_deps[next] -= 1;
                if pending_deps[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        if order.len() < self.steps.len() {
            let stuck = (0..self.steps.len())
                .filter(|&i| pending_deps[i] > 0)
                .map(|i| self.steps[i].name.clone())
                .collect();
            return Err(PlanError::Cycle(stuck));
        }
        Ok(order)
    }
}
