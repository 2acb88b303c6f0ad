// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fs;
use std::path::Path;

use alloy_primitives::Address;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{ContractDeployer, DeployError, DeployMode, DeployOutcome};
use crate::artifacts::{ArtifactError, Verdict};
use crate::record::ConstructorArg;
use crate::registry::RegistryError;

/// Deployment tiers, executed in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Libraries,
    Interfaces,
    Utilities,
    Core,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Libraries, Tier::Interfaces, Tier::Utilities, Tier::Core];

    /// Source directory relative to the contracts root.
    pub fn source_subdir(self) -> &'static str {
        match self {
            Tier::Libraries => "libraries",
            Tier::Interfaces => "interfaces",
            Tier::Utilities => "util",
            Tier::Core => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgSource {
    Value(ConstructorArg),
    /// Address of a contract deployed earlier, looked up at deploy time.
    AddressOf(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractSpec {
    pub name: String,
    pub args: Vec<ArgSource>,
    pub mode: DeployMode,
}

impl ContractSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            mode: DeployMode::Plain,
        }
    }

    pub fn arg(mut self, arg: ArgSource) -> Self {
        self.args.push(arg);
        self
    }

    pub fn address_of(self, name: impl Into<String>) -> Self {
        self.arg(ArgSource::AddressOf(name.into()))
    }

    pub fn mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractGroup {
    pub tier: Tier,
    pub contracts: Vec<ContractSpec>,
}

impl ContractGroup {
    pub fn new(tier: Tier, contracts: Vec<ContractSpec>) -> Self {
        Self { tier, contracts }
    }

    /// One contract per `*.sol` file directly under `dir`, sorted by name.
    /// A missing directory yields an empty group.
    pub fn from_source_dir(tier: Tier, dir: &Path) -> Result<Self, ArtifactError> {
        if !dir.is_dir() {
            return Ok(Self::new(tier, Vec::new()));
        }
        let io_err = |source| ArtifactError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "sol") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(Self::new(tier, names.into_iter().map(ContractSpec::new).collect()))
    }

    /// All tiers under a Solidity source root.
    pub fn from_sources_root(root: &Path) -> Result<Vec<Self>, ArtifactError> {
        Tier::ALL
            .into_iter()
            .map(|tier| Self::from_source_dir(tier, &root.join(tier.source_subdir())))
            .collect()
    }
}

/// Groups sorted by tier; the order of contracts within a tier is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    groups: Vec<ContractGroup>,
}

impl DeploymentPlan {
    pub fn new(mut groups: Vec<ContractGroup>) -> Self {
        groups.sort_by_key(|group| group.tier);
        Self { groups }
    }

    pub fn groups(&self) -> &[ContractGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|group| group.contracts.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sets the mode of every contract called `name`.
    pub fn with_mode(mut self, name: &str, mode: DeployMode) -> Self {
        self.specs_named(name).for_each(|spec| spec.mode = mode.clone());
        self
    }

    pub fn with_args(mut self, name: &str, args: Vec<ArgSource>) -> Self {
        self.specs_named(name).for_each(|spec| spec.args = args.clone());
        self
    }

    fn specs_named<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut ContractSpec> {
        self.groups
            .iter_mut()
            .flat_map(|group| group.contracts.iter_mut())
            .filter(move |spec| spec.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractOutcome {
    Deployed { address: Address, gas_used: u64 },
    AlreadyDeployed { address: Address },
    Skipped(Verdict),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractReport {
    pub tier: Tier,
    pub name: String,
    pub outcome: ContractOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    pub entries: Vec<ContractReport>,
    /// Cancellation stopped the run before every contract was visited.
    pub cancelled: bool,
}

impl DeploymentReport {
    pub fn outcome(&self, name: &str) -> Option<&ContractOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.outcome)
    }

    pub fn deployed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ContractOutcome::Deployed { .. }))
    }

    pub fn already_deployed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ContractOutcome::AlreadyDeployed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, ContractOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ContractOutcome::Failed(_)))
    }

    pub fn total_gas_used(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| match entry.outcome {
                ContractOutcome::Deployed { gas_used, .. } => gas_used,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&ContractOutcome) -> bool) -> usize {
        self.entries.iter().filter(|entry| pred(&entry.outcome)).count()
    }
}

/// Walks a [`DeploymentPlan`] one contract at a time. A failing contract is
/// reported and the walk goes on.
pub struct DirectoryOrchestrator {
    deployer: ContractDeployer,
    cancel: CancellationToken,
}

impl DirectoryOrchestrator {
    pub fn new(deployer: ContractDeployer, cancel: CancellationToken) -> Self {
        Self { deployer, cancel }
    }

    pub fn deployer(&self) -> &ContractDeployer {
        &self.deployer
    }

    pub async fn deploy_all(&self, plan: &DeploymentPlan) -> DeploymentReport {
        let mut report = DeploymentReport::default();
        for group in plan.groups() {
            info!(tier = ?group.tier, contracts = group.contracts.len(), "deploying tier");
            for spec in &group.contracts {
                if self.cancel.is_cancelled() {
                    warn!(
                        completed = report.entries.len(),
                        remaining = plan.len() - report.entries.len(),
                        "deployment cancelled"
                    );
                    report.cancelled = true;
                    return report;
                }
                let outcome = match self.deploy_spec(spec).await {
                    Ok(DeployOutcome::Deployed(record)) => ContractOutcome::Deployed {
                        address: record.address,
                        gas_used: record.gas_used,
                    },
                    Ok(DeployOutcome::AlreadyDeployed(record)) => ContractOutcome::AlreadyDeployed {
                        address: record.address,
                    },
                    Ok(DeployOutcome::Skipped(verdict)) => ContractOutcome::Skipped(verdict),
                    Err(err) => {
                        error!(tier = ?group.tier, contract = %spec.name, error = %err, "deployment failed, continuing");
                        ContractOutcome::Failed(err.to_string())
                    }
                };
                report.entries.push(ContractReport {
                    tier: group.tier,
                    name: spec.name.clone(),
                    outcome,
                });
            }
        }
        info!(
            deployed = report.deployed(),
            already_deployed = report.already_deployed(),
            skipped = report.skipped(),
            failed = report.failed(),
            gas_used = report.total_gas_used(),
            "deployment finished"
        );
        report
    }

    async fn deploy_spec(&self, spec: &ContractSpec) -> Result<DeployOutcome, DeployError> {
        // dependencies of a contract that is already recorded need not resolve
        if let Some(existing) = self.deployer.registry().record(&spec.name)? {
            info!(contract = %spec.name, address = %existing.address, "already deployed");
            return Ok(DeployOutcome::AlreadyDeployed(existing));
        }
        let args = self.resolve_args(&spec.args)?;
        self.deployer.deploy(&spec.name, &args, &spec.mode).await
    }

    fn resolve_args(&self, args: &[ArgSource]) -> Result<Vec<ConstructorArg>, RegistryError> {
        args.iter()
            .map(|arg| match arg {
                ArgSource::Value(value) => Ok(value.clone()),
                ArgSource::AddressOf(name) => {
                    self.deployer.registry().resolve(name).map(ConstructorArg::Address)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_sorts_groups_by_tier() {
        let plan = DeploymentPlan::new(vec![
            ContractGroup::new(Tier::Core, vec![ContractSpec::new("Endpoint")]),
            ContractGroup::new(Tier::Libraries, vec![ContractSpec::new("MathHelper")]),
            ContractGroup::new(Tier::Utilities, vec![ContractSpec::new("GasInfo")]),
        ]);
        let tiers: Vec<_> = plan.groups().iter().map(|group| group.tier).collect();
        assert_eq!(tiers, vec![Tier::Libraries, Tier::Utilities, Tier::Core]);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn source_dirs_follow_the_tier_layout() {
        let root = tempfile::tempdir().expect("create temp dir");
        for (dir, file) in [
            ("libraries", "MathSD21x18.sol"),
            ("libraries", "MathHelper.sol"),
            ("interfaces", "IEndpoint.sol"),
            ("util", "README.md"),
            ("", "Endpoint.sol"),
        ] {
            let dir = root.path().join(dir);
            fs::create_dir_all(&dir).expect("create dir");
            fs::write(dir.join(file), "// SPDX").expect("write source");
        }

        let groups = ContractGroup::from_sources_root(root.path()).expect("enumerate");
        let names = |tier: Tier| -> Vec<String> {
            groups
                .iter()
                .find(|group| group.tier == tier)
                .expect("tier present")
                .contracts
                .iter()
                .map(|spec| spec.name.clone())
                .collect()
        };
        assert_eq!(names(Tier::Libraries), vec!["MathHelper", "MathSD21x18"]);
        assert_eq!(names(Tier::Interfaces), vec!["IEndpoint"]);
        assert!(names(Tier::Utilities).is_empty());
        assert_eq!(names(Tier::Core), vec!["Endpoint"]);
    }

    #[test]
    fn plan_overrides_apply_by_name() {
        let plan = DeploymentPlan::new(vec![ContractGroup::new(
            Tier::Core,
            vec![ContractSpec::new("Clearinghouse"), ContractSpec::new("Endpoint")],
        )])
        .with_mode("Endpoint", DeployMode::Proxy { initialize: None })
        .with_args("Clearinghouse", vec![ArgSource::AddressOf("Endpoint".into())]);

        let specs = &plan.groups()[0].contracts;
        assert_eq!(specs[0].args, vec![ArgSource::AddressOf("Endpoint".into())]);
        assert_eq!(specs[0].mode, DeployMode::Plain);
        assert_eq!(specs[1].mode, DeployMode::Proxy { initialize: None });
    }
}
