// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Runner configuration from environment variables.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::chain::RetryPolicy;

const DEFAULT_NETWORK: &str = "localhost";
const DEFAULT_DB_PATH: &str = "deployments.db";
const DEFAULT_SQLITE_SYNCHRONOUS: &str = "NORMAL";
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const DEFAULT_CONTRACTS_DIR: &str = "contracts";
const DEFAULT_STAGES: &str = "deploy,initialize";
const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 120_000;

/// Named networks: (name, rpc url, chain id).
const PRESETS: &[(&str, &str, u64)] = &[
    ("mainnet", "https://api.harmony.one", 1_666_600_000),
    ("testnet", "https://api.s0.t.hmny.io", 1_666_700_000),
    ("localhost", "http://127.0.0.1:8545", 31_337),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown network {0:?} and no VENUE_RPC_URL/VENUE_CHAIN_ID override")]
    UnknownNetwork(String),
    #[error("{var} is required")]
    Missing { var: &'static str },
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub private_key: Option<String>,
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("name", &self.name)
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl NetworkConfig {
    /// `VENUE_NETWORK` selects a preset; `VENUE_RPC_URL` and `VENUE_CHAIN_ID`
    /// override it and together define a network that has no preset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let name = env_string(&lookup, "VENUE_NETWORK", DEFAULT_NETWORK);
        let preset = PRESETS.iter().find(|(preset, _, _)| *preset == name);

        let rpc_url = lookup("VENUE_RPC_URL").or_else(|| preset.map(|(_, url, _)| url.to_string()));
        let chain_id = match lookup("VENUE_CHAIN_ID") {
            Some(value) => Some(value.parse().map_err(|err| ConfigError::Invalid {
                var: "VENUE_CHAIN_ID",
                value: value.clone(),
                reason: format!("{err}"),
            })?),
            None => preset.map(|(_, _, chain_id)| *chain_id),
        };
        let (Some(rpc_url), Some(chain_id)) = (rpc_url, chain_id) else {
            return Err(ConfigError::UnknownNetwork(name));
        };

        Ok(Self {
            name,
            rpc_url,
            chain_id,
            private_key: lookup("PRIVATE_KEY").filter(|key| !key.trim().is_empty()),
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Deploy,
    Initialize,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub network: NetworkConfig,
    pub db_path: String,
    pub sqlite_synchronous: String,
    pub artifacts_dir: PathBuf,
    pub contracts_dir: PathBuf,
    /// Contracts deployed behind a transparent proxy, initialized later.
    pub proxy_contracts: Vec<String>,
    pub stages: Vec<Stage>,
    /// Run against the in-process simulated chain.
    pub dry_run: bool,
    pub watch_events: bool,
    pub confirmation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl RunConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let network = NetworkConfig::from_lookup(&lookup)?;
        let dry_run = env_bool(&lookup, "VENUE_DRY_RUN", false);
        if !dry_run && network.private_key.is_none() {
            return Err(ConfigError::Missing { var: "PRIVATE_KEY" });
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: env_u64(&lookup, "VENUE_MAX_ATTEMPTS", u64::from(defaults.max_attempts))
                .clamp(1, u64::from(u32::MAX)) as u32,
            min_delay: Duration::from_millis(env_u64(
                &lookup,
                "VENUE_MIN_RETRY_DELAY_MS",
                defaults.min_delay.as_millis() as u64,
            )),
            max_delay: Duration::from_millis(env_u64(
                &lookup,
                "VENUE_MAX_RETRY_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )),
            backoff_factor: env_u64(
                &lookup,
                "VENUE_BACKOFF_FACTOR",
                u64::from(defaults.backoff_factor),
            )
            .clamp(1, u64::from(u32::MAX)) as u32,
        };

        Ok(Self {
            network,
            db_path: env_string(&lookup, "VENUE_DB_PATH", DEFAULT_DB_PATH),
            sqlite_synchronous: env_string(
                &lookup,
                "VENUE_SQLITE_SYNCHRONOUS",
                DEFAULT_SQLITE_SYNCHRONOUS,
            ),
            artifacts_dir: env_string(&lookup, "VENUE_ARTIFACTS_DIR", DEFAULT_ARTIFACTS_DIR).into(),
            contracts_dir: env_string(&lookup, "VENUE_CONTRACTS_DIR", DEFAULT_CONTRACTS_DIR).into(),
            proxy_contracts: env_list(&lookup, "VENUE_PROXY_CONTRACTS", ""),
            stages: parse_stages(&env_string(&lookup, "VENUE_STAGES", DEFAULT_STAGES))?,
            dry_run,
            watch_events: env_bool(&lookup, "VENUE_WATCH_EVENTS", false),
            confirmation_timeout: Duration::from_millis(
                env_u64(
                    &lookup,
                    "VENUE_CONFIRMATION_TIMEOUT_MS",
                    DEFAULT_CONFIRMATION_TIMEOUT_MS,
                )
                .max(1),
            ),
            retry,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn runs(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

fn parse_stages(value: &str) -> Result<Vec<Stage>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|stage| !stage.is_empty())
        .map(|stage| match stage {
            "deploy" => Ok(Stage::Deploy),
            "initialize" => Ok(Stage::Initialize),
            other => Err(ConfigError::Invalid {
                var: "VENUE_STAGES",
                value: value.to_string(),
                reason: format!("unknown stage {other:?}"),
            }),
        })
        .collect()
}

fn env_string(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn env_u64(lookup: impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(lookup: impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).as_deref().map(str::trim) {
        Some("1" | "true" | "yes") => true,
        Some("0" | "false" | "no") => false,
        _ => default,
    }
}

fn env_list(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Vec<String> {
    env_string(lookup, key, default)
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn presets_resolve_by_name() {
        let network =
            NetworkConfig::from_lookup(lookup(&[("VENUE_NETWORK", "testnet")])).expect("testnet");
        assert_eq!(network.rpc_url, "https://api.s0.t.hmny.io");
        assert_eq!(network.chain_id, 1_666_700_000);
        assert_eq!(network.private_key, None);
    }

    #[test]
    fn unknown_network_needs_overrides() {
        assert_eq!(
            NetworkConfig::from_lookup(lookup(&[("VENUE_NETWORK", "devnet")])),
            Err(ConfigError::UnknownNetwork("devnet".into()))
        );
        let network = NetworkConfig::from_lookup(lookup(&[
            ("VENUE_NETWORK", "devnet"),
            ("VENUE_RPC_URL", "http://10.0.0.2:8545"),
            ("VENUE_CHAIN_ID", "900"),
        ]))
        .expect("overridden");
        assert_eq!(network.chain_id, 900);
    }

    #[test]
    fn private_key_is_redacted() {
        let network = NetworkConfig::from_lookup(lookup(&[("PRIVATE_KEY", "0xdeadbeef")]))
            .expect("localhost");
        let rendered = format!("{network:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::from_lookup(lookup(&[("VENUE_DRY_RUN", "true")])).expect("dry run");
        assert_eq!(config.db_path, "deployments.db");
        assert_eq!(config.stages, vec![Stage::Deploy, Stage::Initialize]);
        assert!(config.proxy_contracts.is_empty());
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.confirmation_timeout, Duration::from_secs(120));
    }

    #[test]
    fn live_runs_need_a_key() {
        assert_eq!(
            RunConfig::from_lookup(lookup(&[])).map(|_| ()),
            Err(ConfigError::Missing { var: "PRIVATE_KEY" })
        );
    }

    #[test]
    fn stages_and_proxies_are_lists() {
        let config = RunConfig::from_lookup(lookup(&[
            ("PRIVATE_KEY", "0x01"),
            ("VENUE_STAGES", "initialize"),
            ("VENUE_PROXY_CONTRACTS", "Endpoint, Clearinghouse"),
        ]))
        .expect("config");
        assert!(!config.runs(Stage::Deploy));
        assert!(config.runs(Stage::Initialize));
        assert_eq!(config.proxy_contracts, vec!["Endpoint", "Clearinghouse"]);

        let bad = RunConfig::from_lookup(lookup(&[("PRIVATE_KEY", "0x01"), ("VENUE_STAGES", "deploy,verify")]));
        assert!(matches!(bad, Err(ConfigError::Invalid { var: "VENUE_STAGES", .. })));
    }
}
