// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::{Arc, Mutex};

use alloy_primitives::Address;
use thiserror::Error;

use crate::record::DeploymentRecord;
use crate::storage::{CreateOutcome, DeploymentStore, StorageError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{name} has no deployment record on {network}")]
    Missing { name: String, network: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Name to address resolution for one network, backed by the record store.
///
/// Cloning shares the underlying store.
#[derive(Clone)]
pub struct AddressRegistry {
    network: String,
    store: Arc<Mutex<DeploymentStore>>,
}

impl AddressRegistry {
    pub fn new(network: impl Into<String>, store: DeploymentStore) -> Self {
        Self {
            network: network.into(),
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn resolve(&self, name: &str) -> Result<Address, RegistryError> {
        self.record(name)?
            .map(|record| record.address)
            .ok_or_else(|| RegistryError::Missing {
                name: name.to_string(),
                network: self.network.clone(),
            })
    }

    /// Resolves several names at once, failing on the first missing one.
    pub fn resolve_all<const N: usize>(&self, names: [&str; N]) -> Result<[Address; N], RegistryError> {
        let mut out = [Address::ZERO; N];
        for (slot, name) in out.iter_mut().zip(names) {
            *slot = self.resolve(name)?;
        }
        Ok(out)
    }

    pub fn contains(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.record(name)?.is_some())
    }

    pub fn record(&self, name: &str) -> Result<Option<DeploymentRecord>, StorageError> {
        self.with_store(|store| store.get(&self.network, name))
    }

    pub fn create_if_absent(&self, record: &DeploymentRecord) -> Result<CreateOutcome, StorageError> {
        self.with_store(|store| store.create_if_absent(&self.network, record))
    }

    pub fn records(&self) -> Result<Vec<DeploymentRecord>, StorageError> {
        self.with_store(|store| store.list(&self.network))
    }

    pub fn with_store<T>(&self, f: impl FnOnce(&mut DeploymentStore) -> T) -> T {
        let mut store = self.store.lock().expect("deployment store mutex poisoned");
        f(&mut store)
    }
}
