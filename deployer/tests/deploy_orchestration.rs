// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use alloy::json_abi::JsonAbi;
use alloy_primitives::{Address, Bytes};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use venue_deployer::artifacts::{ContractArtifact, InMemoryArtifacts, Verdict};
use venue_deployer::chain::SimulatedChain;
use venue_deployer::deploy::{
    ContractDeployer, ContractGroup, ContractOutcome, ContractSpec, DEFAULT_PROXY_ARTIFACT,
    DeployMode, DeploymentPlan, DirectoryOrchestrator, Tier,
};
use venue_deployer::record::{META_IS_PROXY, META_PROXY_TYPE, PROXY_TYPE_TRANSPARENT};
use venue_deployer::registry::AddressRegistry;
use venue_deployer::storage::DeploymentStore;

const NO_ABI: &str = "[]";
const ADDRESS_CTOR: &str = r#"[{"type":"constructor","stateMutability":"nonpayable","inputs":[{"name":"dependency","type":"address","internalType":"address"}]}]"#;
const PROXY_ABI: &str = r#"[{"type":"constructor","stateMutability":"payable","inputs":[{"name":"_logic","type":"address","internalType":"address"},{"name":"initialOwner","type":"address","internalType":"address"},{"name":"_data","type":"bytes","internalType":"bytes"}]}]"#;
const INITIALIZABLE_ABI: &str = r#"[{"type":"function","name":"initialize","stateMutability":"nonpayable","inputs":[],"outputs":[]}]"#;

#[tokio::test]
async fn library_utility_core_chain_deploys_once() {
    let db = temp_db("chain");
    let chain = Arc::new(SimulatedChain::new(sender()));
    let artifacts = Arc::new(
        InMemoryArtifacts::new()
            .with(artifact("LibraryX", NO_ABI))
            .with(artifact("UtilY", ADDRESS_CTOR))
            .with(artifact("CoreZ", ADDRESS_CTOR)),
    );
    let plan = DeploymentPlan::new(vec![
        ContractGroup::new(
            Tier::Core,
            vec![ContractSpec::new("CoreZ").address_of("UtilY")],
        ),
        ContractGroup::new(
            Tier::Utilities,
            vec![ContractSpec::new("UtilY").address_of("LibraryX")],
        ),
        ContractGroup::new(Tier::Libraries, vec![ContractSpec::new("LibraryX")]),
    ]);

    let first = orchestrator(&chain, artifacts.clone(), db.registry())
        .deploy_all(&plan)
        .await;
    assert_eq!(first.deployed(), 3, "report: {first:?}");
    assert_eq!(first.failed(), 0);

    let registry = db.registry();
    let library = registry.resolve("LibraryX").expect("library recorded");
    let util = registry.resolve("UtilY").expect("util recorded");
    let core = registry.resolve("CoreZ").expect("core recorded");
    assert_eq!(chain.deployed_addresses(), vec![library, util, core]);

    let util_code = chain.init_code_at(util).expect("util code");
    assert_eq!(&util_code[util_code.len() - 20..], library.as_slice());
    let core_code = chain.init_code_at(core).expect("core code");
    assert_eq!(&core_code[core_code.len() - 20..], util.as_slice());
    let util_record = registry.record("UtilY").expect("read").expect("util record");
    assert_eq!(
        util_record.constructor_args,
        vec![venue_deployer::record::ConstructorArg::Address(library)]
    );

    // reopened store, same chain
    let second = orchestrator(&chain, artifacts, db.registry())
        .deploy_all(&plan)
        .await;
    assert_eq!(second.deployed(), 0);
    assert_eq!(second.already_deployed(), 3);
    assert_eq!(second.total_gas_used(), 0);
    assert_eq!(chain.deployment_count(), 3);
    assert_eq!(
        db.registry().records().expect("list records").len(),
        3,
        "second run must not create records"
    );
}

#[tokio::test]
async fn tiers_run_in_order_and_skips_do_not_stop_later_tiers() {
    let chain = Arc::new(SimulatedChain::new(sender()));
    let artifacts = Arc::new(
        InMemoryArtifacts::new()
            .with(artifact("MathHelper", NO_ABI))
            .with(ContractArtifact {
                bytecode: Bytes::new(),
                ..artifact("IEndpoint", NO_ABI)
            })
            .with(artifact("GasInfo", ADDRESS_CTOR))
            .with(artifact("Endpoint", NO_ABI)),
    );
    let plan = DeploymentPlan::new(vec![
        ContractGroup::new(Tier::Core, vec![ContractSpec::new("Endpoint")]),
        ContractGroup::new(Tier::Utilities, vec![ContractSpec::new("GasInfo")]),
        ContractGroup::new(Tier::Interfaces, vec![ContractSpec::new("IEndpoint")]),
        ContractGroup::new(Tier::Libraries, vec![ContractSpec::new("MathHelper")]),
    ]);
    let registry = in_memory_registry();

    let report = orchestrator(&chain, artifacts, registry.clone())
        .deploy_all(&plan)
        .await;

    let walked: Vec<_> = report
        .entries
        .iter()
        .map(|entry| (entry.tier, entry.name.as_str()))
        .collect();
    assert_eq!(
        walked,
        vec![
            (Tier::Libraries, "MathHelper"),
            (Tier::Interfaces, "IEndpoint"),
            (Tier::Utilities, "GasInfo"),
            (Tier::Core, "Endpoint"),
        ]
    );
    assert_eq!(
        report.outcome("IEndpoint"),
        Some(&ContractOutcome::Skipped(Verdict::SkipInterface))
    );
    assert_eq!(
        report.outcome("GasInfo"),
        Some(&ContractOutcome::Skipped(Verdict::SkipParameterized { arity: 1 }))
    );
    assert_eq!(report.deployed(), 2);
    assert_eq!(report.skipped(), 2);
    assert_eq!(
        chain.deployed_addresses(),
        vec![
            registry.resolve("MathHelper").expect("library"),
            registry.resolve("Endpoint").expect("core"),
        ]
    );
    assert!(!registry.contains("IEndpoint").expect("lookup"));
}

#[tokio::test]
async fn failing_contract_is_reported_and_the_walk_continues() {
    let chain = Arc::new(SimulatedChain::new(sender()));
    chain.fail_creations_containing(b"Broken", "out of gas");
    chain.fail_creations_containing(b"BaseEngine", "BaseEngine is abstract and can't be deployed");
    let artifacts = Arc::new(
        InMemoryArtifacts::new()
            .with(artifact("Broken", NO_ABI))
            .with(artifact("BaseEngine", NO_ABI))
            .with(artifact("Healthy", NO_ABI)),
    );
    let plan = DeploymentPlan::new(vec![ContractGroup::new(
        Tier::Core,
        vec![
            ContractSpec::new("Broken"),
            ContractSpec::new("Missing"),
            ContractSpec::new("BaseEngine"),
            ContractSpec::new("Healthy"),
        ],
    )]);
    let registry = in_memory_registry();

    let report = orchestrator(&chain, artifacts, registry.clone())
        .deploy_all(&plan)
        .await;

    assert!(matches!(
        report.outcome("Broken"),
        Some(ContractOutcome::Failed(reason)) if reason.contains("out of gas")
    ));
    assert!(matches!(report.outcome("Missing"), Some(ContractOutcome::Failed(_))));
    assert_eq!(
        report.outcome("BaseEngine"),
        Some(&ContractOutcome::Skipped(Verdict::SkipAbstract))
    );
    assert!(matches!(
        report.outcome("Healthy"),
        Some(ContractOutcome::Deployed { .. })
    ));
    assert_eq!(report.failed(), 2);
    assert!(!report.cancelled);
    assert!(!registry.contains("Broken").expect("lookup"));
    assert_eq!(registry.records().expect("list").len(), 1);
}

#[tokio::test]
async fn unresolved_dependency_fails_only_its_dependent() {
    let chain = Arc::new(SimulatedChain::new(sender()));
    let artifacts = Arc::new(
        InMemoryArtifacts::new()
            .with(artifact("UtilY", ADDRESS_CTOR))
            .with(artifact("Standalone", NO_ABI)),
    );
    let plan = DeploymentPlan::new(vec![ContractGroup::new(
        Tier::Core,
        vec![
            ContractSpec::new("UtilY").address_of("LibraryX"),
            ContractSpec::new("Standalone"),
        ],
    )]);

    let report = orchestrator(&chain, artifacts, in_memory_registry())
        .deploy_all(&plan)
        .await;

    assert!(matches!(
        report.outcome("UtilY"),
        Some(ContractOutcome::Failed(reason)) if reason.contains("LibraryX")
    ));
    assert_eq!(report.deployed(), 1);
    assert_eq!(chain.deployment_count(), 1);
}

#[tokio::test]
async fn proxied_contract_is_recorded_with_proxy_metadata() {
    let proxy_code = Bytes::from_static(b"TransparentUpgradeableProxy");
    let chain = Arc::new(SimulatedChain::new(sender()).with_proxy_bytecode(proxy_code.clone()));
    let artifacts = Arc::new(
        InMemoryArtifacts::new()
            .with(ContractArtifact {
                bytecode: proxy_code,
                ..artifact(DEFAULT_PROXY_ARTIFACT, PROXY_ABI)
            })
            .with(artifact("Endpoint", INITIALIZABLE_ABI)),
    );
    let plan = DeploymentPlan::new(vec![ContractGroup::new(
        Tier::Core,
        vec![ContractSpec::new("Endpoint")],
    )])
    .with_mode(
        "Endpoint",
        DeployMode::Proxy {
            initialize: Some(Vec::new()),
        },
    );
    let registry = in_memory_registry();

    let report = orchestrator(&chain, artifacts, registry.clone())
        .deploy_all(&plan)
        .await;
    assert_eq!(report.deployed(), 1, "report: {report:?}");

    let record = registry
        .record("Endpoint")
        .expect("read")
        .expect("endpoint recorded");
    let implementation = sender().create(0);
    assert_eq!(record.address, sender().create(1));
    assert_eq!(record.implementation_address, Some(implementation));
    assert!(record.is_proxy());
    assert_eq!(
        record.metadata.get(META_PROXY_TYPE).map(String::as_str),
        Some(PROXY_TYPE_TRANSPARENT)
    );
    assert_eq!(record.metadata.get(META_IS_PROXY).map(String::as_str), Some("true"));
    assert_eq!(
        record.proxy_admin(),
        Some(record.address.create(1).to_string().as_str())
    );
    assert!(chain.is_initialized(record.address));
    assert!(!chain.is_initialized(implementation));
    assert_eq!(chain.deployment_count(), 2);
}

#[tokio::test]
async fn cancelled_run_stops_before_the_next_contract() {
    let chain = Arc::new(SimulatedChain::new(sender()));
    let artifacts = Arc::new(InMemoryArtifacts::new().with(artifact("Endpoint", NO_ABI)));
    let plan = DeploymentPlan::new(vec![ContractGroup::new(
        Tier::Core,
        vec![ContractSpec::new("Endpoint")],
    )]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let deployer = ContractDeployer::new(chain.clone(), artifacts, in_memory_registry());

    let report = DirectoryOrchestrator::new(deployer, cancel)
        .deploy_all(&plan)
        .await;

    assert!(report.cancelled);
    assert!(report.entries.is_empty());
    assert_eq!(chain.deployment_count(), 0);
}

fn sender() -> Address {
    Address::repeat_byte(0x5e)
}

struct TestDb {
    _dir: TempDir,
    path: String,
}

impl TestDb {
    /// A fresh connection each call, like a new operator run.
    fn registry(&self) -> AddressRegistry {
        let store = DeploymentStore::open(&self.path, "NORMAL").expect("open store");
        AddressRegistry::new("localhost", store)
    }
}

fn temp_db(label: &str) -> TestDb {
    let dir = tempfile::Builder::new()
        .prefix(format!("venue-deployer-{label}-").as_str())
        .tempdir()
        .expect("create temporary directory");
    let path = dir.path().join("deployments.db");
    TestDb {
        _dir: dir,
        path: path.to_string_lossy().into_owned(),
    }
}

fn in_memory_registry() -> AddressRegistry {
    AddressRegistry::new(
        "localhost",
        DeploymentStore::open_in_memory().expect("open store"),
    )
}

fn orchestrator(
    chain: &Arc<SimulatedChain>,
    artifacts: Arc<InMemoryArtifacts>,
    registry: AddressRegistry,
) -> DirectoryOrchestrator {
    let deployer = ContractDeployer::new(chain.clone(), artifacts, registry);
    DirectoryOrchestrator::new(deployer, CancellationToken::new())
}

/// The contract name doubles as its bytecode so creations can be told apart.
fn artifact(name: &str, abi: &str) -> ContractArtifact {
    ContractArtifact {
        name: name.to_string(),
        abi: serde_json::from_str::<JsonAbi>(abi).expect("parse abi"),
        bytecode: Bytes::copy_from_slice(name.as_bytes()),
        kind: None,
        is_abstract: None,
    }
}
