// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes};
use tracing::{info, warn};
use venue_core::contracts::{ERC1967_ADMIN_SLOT, ERC1967_IMPLEMENTATION_SLOT};

use super::DeployError;
use crate::artifacts::{ArtifactSource, BytecodeInspector, ContractArtifact, Verdict};
use crate::chain::{ChainError, ContractBackend, Deployed};
use crate::record::{
    ConstructorArg, DeploymentRecord, META_IS_PROXY, META_PROXY_ADMIN, META_PROXY_TYPE,
    PROXY_TYPE_TRANSPARENT, encode_args,
};
use crate::registry::AddressRegistry;
use crate::storage::CreateOutcome;

pub const DEFAULT_PROXY_ARTIFACT: &str = "TransparentUpgradeableProxy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployMode {
    Plain,
    /// Implementation behind a transparent proxy. `initialize` arguments are
    /// bundled into the proxy constructor; `None` leaves initialization to a
    /// later step.
    Proxy {
        initialize: Option<Vec<ConstructorArg>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed(DeploymentRecord),
    AlreadyDeployed(DeploymentRecord),
    Skipped(Verdict),
}

impl DeployOutcome {
    pub fn record(&self) -> Option<&DeploymentRecord> {
        match self {
            Self::Deployed(record) | Self::AlreadyDeployed(record) => Some(record),
            Self::Skipped(_) => None,
        }
    }
}

/// Deploys one contract at a time, at most once per registry.
pub struct ContractDeployer {
    backend: Arc<dyn ContractBackend>,
    artifacts: Arc<dyn ArtifactSource>,
    registry: AddressRegistry,
    inspector: BytecodeInspector,
    proxy_artifact: String,
    proxy_owner: Address,
}

impl ContractDeployer {
    pub fn new(
        backend: Arc<dyn ContractBackend>,
        artifacts: Arc<dyn ArtifactSource>,
        registry: AddressRegistry,
    ) -> Self {
        let proxy_owner = backend.sender();
        Self {
            backend,
            artifacts,
            registry,
            inspector: BytecodeInspector::default(),
            proxy_artifact: DEFAULT_PROXY_ARTIFACT.to_string(),
            proxy_owner,
        }
    }

    pub fn with_inspector(mut self, inspector: BytecodeInspector) -> Self {
        self.inspector = inspector;
        self
    }

    /// Proxy artifact name and the owner handed to its constructor.
    pub fn with_proxy(mut self, artifact: impl Into<String>, owner: Address) -> Self {
        self.proxy_artifact = artifact.into();
        self.proxy_owner = owner;
        self
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn ContractBackend> {
        &self.backend
    }

    pub async fn deploy(
        &self,
        name: &str,
        args: &[ConstructorArg],
        mode: &DeployMode,
    ) -> Result<DeployOutcome, DeployError> {
        if let Some(existing) = self.registry.record(name)? {
            info!(contract = name, address = %existing.address, "already deployed");
            return Ok(DeployOutcome::AlreadyDeployed(existing));
        }

        let artifact = self.artifacts.load(name)?;
        let verdict = self.inspector.inspect(&artifact, args.len());
        if verdict.is_skip() {
            warn!(contract = name, reason = verdict.reason(), "skipping contract");
            return Ok(DeployOutcome::Skipped(verdict));
        }

        let built = match mode {
            DeployMode::Plain => self.deploy_plain(&artifact, args).await,
            DeployMode::Proxy { initialize } => {
                self.deploy_proxied(&artifact, args, initialize.as_deref())
                    .await
            }
        };
        let record = match built {
            Ok(record) => record,
            Err(DeployError::Chain { source, .. })
                if self.inspector.classify_failure(&source).is_some() =>
            {
                warn!(contract = name, error = %source, "creation failed as abstract, skipping");
                return Ok(DeployOutcome::Skipped(Verdict::SkipAbstract));
            }
            Err(err) => return Err(err),
        };

        match self.registry.create_if_absent(&record)? {
            CreateOutcome::Created => {
                info!(
                    contract = name,
                    address = %record.address,
                    gas_used = record.gas_used,
                    proxy = record.is_proxy(),
                    "deployed"
                );
                Ok(DeployOutcome::Deployed(record))
            }
            CreateOutcome::Existing(existing) => {
                warn!(
                    contract = name,
                    kept = %existing.address,
                    discarded = %record.address,
                    "record was created concurrently, keeping the stored one"
                );
                Ok(DeployOutcome::AlreadyDeployed(existing))
            }
        }
    }

    async fn deploy_plain(
        &self,
        artifact: &ContractArtifact,
        args: &[ConstructorArg],
    ) -> Result<DeploymentRecord, DeployError> {
        let deployed = self.create(artifact, args).await?;
        Ok(DeploymentRecord {
            name: artifact.name.clone(),
            address: deployed.address,
            abi: artifact.abi.clone(),
            implementation_address: None,
            constructor_args: args.to_vec(),
            metadata: BTreeMap::new(),
            tx_hash: Some(deployed.tx_hash),
            gas_used: deployed.gas_used,
        })
    }

    async fn deploy_proxied(
        &self,
        artifact: &ContractArtifact,
        args: &[ConstructorArg],
        initialize: Option<&[ConstructorArg]>,
    ) -> Result<DeploymentRecord, DeployError> {
        let name = artifact.name.as_str();
        let init_data = match initialize {
            Some(init_args) => initializer_calldata(artifact, init_args)?,
            None => Bytes::new(),
        };
        let proxy_artifact = self.artifacts.load(&self.proxy_artifact)?;

        let implementation = self.create(artifact, args).await?;
        info!(
            contract = name,
            implementation = %implementation.address,
            "implementation deployed, deploying proxy"
        );

        let proxy_args = [
            ConstructorArg::Address(implementation.address),
            ConstructorArg::Address(self.proxy_owner),
            ConstructorArg::Bytes(init_data),
        ];
        let proxy = self.create_named(name, &proxy_artifact, &proxy_args).await?;

        let stored_implementation = Address::from_word(
            self.backend
                .storage_at(proxy.address, ERC1967_IMPLEMENTATION_SLOT)
                .await
                .map_err(|source| chain_error(name, source))?,
        );
        if stored_implementation != implementation.address {
            return Err(DeployError::ProxyMismatch {
                name: name.to_string(),
                expected: implementation.address,
                found: stored_implementation,
            });
        }
        let admin = Address::from_word(
            self.backend
                .storage_at(proxy.address, ERC1967_ADMIN_SLOT)
                .await
                .map_err(|source| chain_error(name, source))?,
        );

        let metadata = BTreeMap::from([
            (META_PROXY_ADMIN.to_string(), admin.to_string()),
            (META_PROXY_TYPE.to_string(), PROXY_TYPE_TRANSPARENT.to_string()),
            (META_IS_PROXY.to_string(), "true".to_string()),
        ]);
        Ok(DeploymentRecord {
            name: name.to_string(),
            address: proxy.address,
            abi: artifact.abi.clone(),
            implementation_address: Some(implementation.address),
            constructor_args: initialize.map(<[_]>::to_vec).unwrap_or_default(),
            metadata,
            tx_hash: Some(proxy.tx_hash),
            gas_used: implementation.gas_used.saturating_add(proxy.gas_used),
        })
    }

    async fn create(
        &self,
        artifact: &ContractArtifact,
        args: &[ConstructorArg],
    ) -> Result<Deployed, DeployError> {
        self.create_named(&artifact.name, artifact, args).await
    }

    /// Creation errors are attributed to `name`, which differs from the
    /// artifact for proxies.
    async fn create_named(
        &self,
        name: &str,
        artifact: &ContractArtifact,
        args: &[ConstructorArg],
    ) -> Result<Deployed, DeployError> {
        let init_code = creation_code(artifact, args)?;
        self.backend
            .deploy(init_code)
            .await
            .map_err(|source| chain_error(name, source))
    }
}

/// Bytecode followed by the ABI-encoded constructor arguments.
fn creation_code(artifact: &ContractArtifact, args: &[ConstructorArg]) -> Result<Bytes, DeployError> {
    let types = artifact.constructor_types()?;
    if types.len() != args.len() {
        return Err(DeployError::ArgumentCount {
            name: artifact.name.clone(),
            expected: types.len(),
            supplied: args.len(),
        });
    }
    let encoded = encode_args(&types, args).map_err(|source| DeployError::ArgumentType {
        name: artifact.name.clone(),
        source,
    })?;
    Ok([artifact.bytecode.as_ref(), encoded.as_slice()].concat().into())
}

fn initializer_calldata(
    artifact: &ContractArtifact,
    args: &[ConstructorArg],
) -> Result<Bytes, DeployError> {
    let selector = artifact.selector("initialize", args.len())?;
    let types = artifact.function_types("initialize", args.len())?;
    let encoded = encode_args(&types, args).map_err(|source| DeployError::ArgumentType {
        name: artifact.name.clone(),
        source,
    })?;
    Ok([selector.as_slice(), encoded.as_slice()].concat().into())
}

fn chain_error(name: &str, source: ChainError) -> DeployError {
    DeployError::Chain {
        name: name.to_string(),
        source,
    }
}
