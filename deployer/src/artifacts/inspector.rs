// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use super::{ContractArtifact, ContractKind};
use crate::chain::ChainError;

pub const DEFAULT_ABSTRACT_MARKERS: &[&str] = &["abstract and can't be deployed"];

/// Whether a contract should be deployed, and if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Deployable,
    SkipInterface,
    SkipParameterized { arity: usize },
    SkipAbstract,
}

impl Verdict {
    pub fn is_skip(&self) -> bool {
        !matches!(self, Self::Deployable)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Deployable => "deployable",
            Self::SkipInterface => "interface (no bytecode)",
            Self::SkipParameterized { .. } => "constructor needs arguments and none were given",
            Self::SkipAbstract => "abstract contract",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BytecodeInspector {
    abstract_markers: Vec<String>,
}

impl Default for BytecodeInspector {
    fn default() -> Self {
        Self::new(DEFAULT_ABSTRACT_MARKERS.iter().map(|m| m.to_string()).collect())
    }
}

impl BytecodeInspector {
    pub fn new(abstract_markers: Vec<String>) -> Self {
        Self { abstract_markers }
    }

    pub fn inspect(&self, artifact: &ContractArtifact, supplied_args: usize) -> Verdict {
        if artifact.is_abstract == Some(true) {
            return Verdict::SkipAbstract;
        }
        if artifact.kind == Some(ContractKind::Interface) {
            return Verdict::SkipInterface;
        }
        if artifact.bytecode.is_empty() {
            // solc emits no bytecode for abstract contracts either
            return match artifact.kind {
                Some(ContractKind::Contract) => Verdict::SkipAbstract,
                _ => Verdict::SkipInterface,
            };
        }
        let arity = artifact.constructor_inputs().len();
        if arity > 0 && supplied_args == 0 {
            return Verdict::SkipParameterized { arity };
        }
        Verdict::Deployable
    }

    /// Fallback for artifacts without structural information: a creation
    /// failure whose message names an abstract contract becomes a skip.
    pub fn classify_failure(&self, err: &ChainError) -> Option<Verdict> {
        err.message_matches(&self.abstract_markers)
            .then_some(Verdict::SkipAbstract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::json_abi::JsonAbi;
    use alloy_primitives::Bytes;

    fn artifact(bytecode: &[u8], ctor_inputs: usize) -> ContractArtifact {
        let inputs: Vec<String> = (0..ctor_inputs)
            .map(|i| format!(r#"{{"name": "arg{i}", "type": "address", "internalType": "address"}}"#))
            .collect();
        let abi_json = if ctor_inputs > 0 {
            format!(
                r#"[{{"type": "constructor", "stateMutability": "nonpayable", "inputs": [{}]}}]"#,
                inputs.join(",")
            )
        } else {
            "[]".to_string()
        };
        let abi: JsonAbi = serde_json::from_str(&abi_json).expect("parse abi");
        ContractArtifact {
            name: "Sample".to_string(),
            abi,
            bytecode: Bytes::copy_from_slice(bytecode),
            kind: None,
            is_abstract: None,
        }
    }

    #[test]
    fn empty_bytecode_is_an_interface() {
        let inspector = BytecodeInspector::default();
        assert_eq!(inspector.inspect(&artifact(&[], 0), 0), Verdict::SkipInterface);
    }

    #[test]
    fn empty_bytecode_of_a_contract_is_abstract() {
        let mut sample = artifact(&[], 0);
        sample.kind = Some(ContractKind::Contract);
        assert_eq!(
            BytecodeInspector::default().inspect(&sample, 0),
            Verdict::SkipAbstract
        );
    }

    #[test]
    fn structural_abstract_flag_wins() {
        let mut sample = artifact(&[0x60], 0);
        sample.is_abstract = Some(true);
        assert_eq!(
            BytecodeInspector::default().inspect(&sample, 0),
            Verdict::SkipAbstract
        );
    }

    #[test]
    fn constructor_arguments_gate_deployment() {
        let inspector = BytecodeInspector::default();
        let sample = artifact(&[0x60, 0x80], 2);

        assert_eq!(
            inspector.inspect(&sample, 0),
            Verdict::SkipParameterized { arity: 2 }
        );
        assert_eq!(inspector.inspect(&sample, 2), Verdict::Deployable);
        assert_eq!(inspector.inspect(&artifact(&[0x60], 0), 0), Verdict::Deployable);
    }

    #[test]
    fn failure_text_fallback() {
        let inspector = BytecodeInspector::default();
        let abstract_err =
            ChainError::reverted("contract EngineState is abstract and can't be deployed");
        assert_eq!(
            inspector.classify_failure(&abstract_err),
            Some(Verdict::SkipAbstract)
        );
        assert_eq!(
            inspector.classify_failure(&ChainError::reverted("out of gas")),
            None
        );
    }
}
