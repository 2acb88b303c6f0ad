// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use alloy::providers::DynProvider;
use alloy_primitives::{Address, address};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use venue_deployer::artifacts::{ArtifactDir, ArtifactSource};
use venue_deployer::chain::{ContractBackend, RpcBackend, SimulatedChain};
use venue_deployer::config::{RunConfig, Stage};
use venue_deployer::deploy::{
    ContractDeployer, ContractGroup, DEFAULT_PROXY_ARTIFACT, DeployMode, DeploymentPlan,
    DirectoryOrchestrator,
};
use venue_deployer::init::InitializationSequencer;
use venue_deployer::init::venue::{VenueParams, venue_plan};
use venue_deployer::listeners::EventListeners;
use venue_deployer::registry::AddressRegistry;
use venue_deployer::storage::{DeploymentStore, LockOutcome};

/// Signer of the simulated chain; the first well-known dev account.
const DRY_RUN_SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RunConfig::from_env()?;
    info!(network = ?config.network, dry_run = config.dry_run, stages = ?config.stages, "starting");

    // Dry runs never touch the persistent record store.
    let mut store = if config.dry_run {
        DeploymentStore::open_in_memory()?
    } else {
        DeploymentStore::open(&config.db_path, &config.sqlite_synchronous)?
    };
    let network = config.network.name.clone();
    let holder = format!("venue-deployer-{}", std::process::id());
    match store.try_acquire_lock(&network, &holder)? {
        LockOutcome::Acquired | LockOutcome::AlreadyHeld => {}
        LockOutcome::HeldBy(other) => {
            return Err(format!("network {network} is locked by operator {other}").into());
        }
    }
    let registry = AddressRegistry::new(network.clone(), store);

    let result = run(&config, registry.clone()).await;

    let released = registry.with_store(|store| store.release_lock(&network, &holder))?;
    if !released {
        warn!(%network, %holder, "operator lock was already gone");
    }
    result
}

async fn run(config: &RunConfig, registry: AddressRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let artifacts = Arc::new(ArtifactDir::open(config.artifacts_dir.clone())?);
    info!(root = %artifacts.root().display(), artifacts = artifacts.len(), "artifacts indexed");

    let (backend, provider): (Arc<dyn ContractBackend>, Option<DynProvider>) = if config.dry_run {
        let mut chain = SimulatedChain::new(DRY_RUN_SENDER);
        if let Ok(proxy) = artifacts.load(DEFAULT_PROXY_ARTIFACT) {
            chain = chain.with_proxy_bytecode(proxy.bytecode);
        }
        (Arc::new(chain), None)
    } else {
        let key = config
            .network
            .private_key
            .as_deref()
            .ok_or("PRIVATE_KEY is required")?;
        let rpc = RpcBackend::connect(
            &config.network.rpc_url,
            config.network.chain_id,
            key,
            config.confirmation_timeout,
            config.retry,
        )
        .await?;
        let provider = rpc.provider().clone();
        (Arc::new(rpc), Some(provider))
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    let mut failures = 0;

    if config.runs(Stage::Deploy) {
        let mut plan = DeploymentPlan::new(ContractGroup::from_sources_root(&config.contracts_dir)?);
        for name in &config.proxy_contracts {
            plan = plan.with_mode(name, DeployMode::Proxy { initialize: None });
        }
        let deployer = ContractDeployer::new(backend.clone(), artifacts.clone(), registry.clone());
        let report = DirectoryOrchestrator::new(deployer, cancel.clone())
            .deploy_all(&plan)
            .await;
        info!(
            deployed = report.deployed(),
            already_deployed = report.already_deployed(),
            skipped = report.skipped(),
            failed = report.failed(),
            gas_used = report.total_gas_used(),
            "deployment stage finished"
        );
        failures += report.failed();
        if report.cancelled {
            return Err("deployment cancelled".into());
        }
    }

    let mut listeners = EventListeners::new();
    if let (true, Some(provider)) = (config.watch_events, provider.as_ref()) {
        let contracts: Vec<_> = registry
            .records()?
            .into_iter()
            .map(|record| (record.name, record.address))
            .collect();
        listeners.watch_contracts(provider, &contracts).await?;
    }

    if config.runs(Stage::Initialize) {
        let plan = venue_plan(&VenueParams::standard()?)?;
        let report = InitializationSequencer::new(backend.clone(), registry.clone(), cancel.clone())
            .with_retry(config.retry)
            .initialize_all(&plan)
            .await?;
        failures += report.failed() + report.blocked();
        if report.cancelled {
            listeners.shutdown().await;
            return Err("initialization cancelled".into());
        }
    }

    listeners.shutdown().await;
    if failures > 0 {
        return Err(format!("{failures} contracts or steps did not complete").into());
    }
    Ok(())
}
