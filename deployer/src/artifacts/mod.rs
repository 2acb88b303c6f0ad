// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Compiled contract artifacts.
//!
//! Both the Hardhat layout (`artifacts/contracts/**/Name.sol/Name.json`, with a
//! hex `bytecode` string) and the Foundry layout (`out/Name.sol/Name.json`,
//! with `bytecode.object` and an `ast`) are understood.

mod inspector;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use alloy::dyn_abi::{DynSolType, Specifier};
use alloy::json_abi::{JsonAbi, Param};
use alloy_primitives::{Bytes, hex};
use serde::Deserialize;
use thiserror::Error;

pub use inspector::{BytecodeInspector, Verdict};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("no artifact named {0}")]
    NotFound(String),
    #[error("reading artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {name} is malformed: {reason}")]
    Malformed { name: String, reason: String },
    #[error("artifact {name} has unlinked library placeholders")]
    Unlinked { name: String },
    #[error("artifact {name} lists {names:?} more than once")]
    Duplicate { name: String, names: Vec<PathBuf> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Contract,
    Interface,
    Library,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractArtifact {
    pub name: String,
    pub abi: JsonAbi,
    /// Creation bytecode; empty for interfaces and abstract contracts.
    pub bytecode: Bytes,
    /// From the compiler AST when the artifact carries one.
    pub kind: Option<ContractKind>,
    pub is_abstract: Option<bool>,
}

impl ContractArtifact {
    pub fn constructor_inputs(&self) -> &[Param] {
        self.abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn constructor_types(&self) -> Result<Vec<DynSolType>, ArtifactError> {
        resolve_params(&self.name, self.constructor_inputs())
    }

    /// Parameter types of the first `name` overload taking `arity` arguments.
    pub fn function_types(&self, name: &str, arity: usize) -> Result<Vec<DynSolType>, ArtifactError> {
        let function = self
            .abi
            .function(name)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
            .ok_or_else(|| ArtifactError::Malformed {
                name: self.name.clone(),
                reason: format!("no {name} overload taking {arity} arguments"),
            })?;
        resolve_params(&self.name, &function.inputs)
    }

    pub fn selector(&self, name: &str, arity: usize) -> Result<[u8; 4], ArtifactError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
            .map(|function| function.selector().0)
            .ok_or_else(|| ArtifactError::Malformed {
                name: self.name.clone(),
                reason: format!("no {name} overload taking {arity} arguments"),
            })
    }

    pub fn from_json(name: &str, json: &str) -> Result<Self, ArtifactError> {
        let malformed = |reason: String| ArtifactError::Malformed {
            name: name.to_string(),
            reason,
        };
        let raw: RawArtifact = serde_json::from_str(json).map_err(|err| malformed(err.to_string()))?;

        let bytecode_hex = match &raw.bytecode {
            RawBytecode::Hex(hex) => hex.as_str(),
            RawBytecode::Object { object } => object.as_str(),
        };
        if bytecode_hex.contains("__") {
            return Err(ArtifactError::Unlinked {
                name: name.to_string(),
            });
        }
        let bytecode = hex::decode(bytecode_hex)
            .map_err(|err| malformed(format!("bytecode: {err}")))?
            .into();

        let definition = raw
            .ast
            .as_ref()
            .and_then(|ast| find_contract_definition(ast, name));
        let kind = definition
            .and_then(|node| node.get("contractKind"))
            .and_then(|kind| kind.as_str())
            .and_then(|kind| match kind {
                "contract" => Some(ContractKind::Contract),
                "interface" => Some(ContractKind::Interface),
                "library" => Some(ContractKind::Library),
                _ => None,
            });
        let is_abstract = definition
            .and_then(|node| node.get("abstract"))
            .and_then(|flag| flag.as_bool());

        Ok(Self {
            name: raw.contract_name.unwrap_or_else(|| name.to_string()),
            abi: raw.abi,
            bytecode,
            kind,
            is_abstract,
        })
    }
}

fn resolve_params(name: &str, params: &[Param]) -> Result<Vec<DynSolType>, ArtifactError> {
    params
        .iter()
        .map(|param| {
            param.resolve().map_err(|err| ArtifactError::Malformed {
                name: name.to_string(),
                reason: format!("parameter {}: {err}", param.name),
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
    #[serde(default)]
    ast: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

fn find_contract_definition<'a>(
    node: &'a serde_json::Value,
    name: &str,
) -> Option<&'a serde_json::Value> {
    match node {
        serde_json::Value::Object(map) => {
            let is_match = map.get("nodeType").and_then(|t| t.as_str()) == Some("ContractDefinition")
                && map.get("name").and_then(|n| n.as_str()) == Some(name);
            if is_match {
                return Some(node);
            }
            map.get("nodes")
                .and_then(|nodes| find_contract_definition(nodes, name))
        }
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|item| find_contract_definition(item, name)),
        _ => None,
    }
}

/// Where the deployer gets compiled contracts from.
pub trait ArtifactSource: Send + Sync {
    fn load(&self, name: &str) -> Result<ContractArtifact, ArtifactError>;
}

/// Artifacts on disk, indexed by file stem at open.
#[derive(Debug)]
pub struct ArtifactDir {
    root: PathBuf,
    index: HashMap<String, PathBuf>,
}

impl ArtifactDir {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        let mut index = HashMap::new();
        let mut duplicates: HashMap<String, Vec<PathBuf>> = HashMap::new();
        index_dir(&root, &mut index, &mut duplicates)?;
        if let Some((name, names)) = duplicates.into_iter().next() {
            return Err(ArtifactError::Duplicate { name, names });
        }
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl ArtifactSource for ArtifactDir {
    fn load(&self, name: &str) -> Result<ContractArtifact, ArtifactError> {
        let path = self
            .index
            .get(name)
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))?;
        let json = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        ContractArtifact::from_json(name, &json)
    }
}

fn index_dir(
    dir: &Path,
    index: &mut HashMap<String, PathBuf>,
    duplicates: &mut HashMap<String, Vec<PathBuf>>,
) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            // build-info holds compiler inputs, not artifacts
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            index_dir(&path, index, duplicates)?;
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(stem) = file_name.strip_suffix(".json") else {
            continue;
        };
        if stem.ends_with(".dbg") || stem.ends_with(".metadata") {
            continue;
        }
        if let Some(previous) = index.insert(stem.to_string(), path.clone()) {
            duplicates
                .entry(stem.to_string())
                .or_insert_with(|| vec![previous])
                .push(path);
        }
    }
    Ok(())
}

/// Artifacts held in memory, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<String, ContractArtifact>,
}

impl InMemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: ContractArtifact) {
        self.artifacts.insert(artifact.name.clone(), artifact);
    }

    pub fn with(mut self, artifact: ContractArtifact) -> Self {
        self.insert(artifact);
        self
    }
}

impl ArtifactSource for InMemoryArtifacts {
    fn load(&self, name: &str) -> Result<ContractArtifact, ArtifactError> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}
