// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::BTreeMap;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy_primitives::{Address, B256, Bytes, I256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const META_PROXY_ADMIN: &str = "proxyAdmin";
pub const META_PROXY_TYPE: &str = "proxyType";
pub const META_IS_PROXY: &str = "isProxy";
pub const PROXY_TYPE_TRANSPARENT: &str = "transparent";

/// Persisted outcome of one deployment. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub name: String,
    pub address: Address,
    pub abi: JsonAbi,
    /// Set for proxy deployments.
    pub implementation_address: Option<Address>,
    pub constructor_args: Vec<ConstructorArg>,
    pub metadata: BTreeMap<String, String>,
    pub tx_hash: Option<B256>,
    pub gas_used: u64,
}

impl DeploymentRecord {
    pub fn is_proxy(&self) -> bool {
        self.implementation_address.is_some()
    }

    pub fn proxy_admin(&self) -> Option<&str> {
        self.metadata.get(META_PROXY_ADMIN).map(String::as_str)
    }
}

/// A constructor or initializer argument as supplied and as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConstructorArg {
    Address(Address),
    Uint(U256),
    Int(I256),
    Bool(bool),
    Bytes(Bytes),
    FixedBytes32(B256),
    String(String),
    AddressArray(Vec<Address>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("argument {index} ({value}) does not fit parameter type {expected}")]
pub struct ArgTypeError {
    pub index: usize,
    pub expected: String,
    pub value: String,
}

impl ConstructorArg {
    /// Converts to a dynamic ABI value of exactly type `ty`.
    pub fn to_sol_value(&self, index: usize, ty: &DynSolType) -> Result<DynSolValue, ArgTypeError> {
        let value = match (self, ty) {
            (Self::Address(address), DynSolType::Address) => DynSolValue::Address(*address),
            (Self::Uint(value), DynSolType::Uint(bits)) if value.bit_len() <= *bits => {
                DynSolValue::Uint(*value, *bits)
            }
            (Self::Int(value), DynSolType::Int(bits)) if fits_signed(value, *bits) => {
                DynSolValue::Int(*value, *bits)
            }
            (Self::Bool(flag), DynSolType::Bool) => DynSolValue::Bool(*flag),
            (Self::Bytes(bytes), DynSolType::Bytes) => DynSolValue::Bytes(bytes.to_vec()),
            (Self::FixedBytes32(word), DynSolType::FixedBytes(32)) => {
                DynSolValue::FixedBytes(*word, 32)
            }
            (Self::String(text), DynSolType::String) => DynSolValue::String(text.clone()),
            (Self::AddressArray(addresses), DynSolType::Array(inner))
                if **inner == DynSolType::Address =>
            {
                DynSolValue::Array(addresses.iter().copied().map(DynSolValue::Address).collect())
            }
            _ => {
                return Err(ArgTypeError {
                    index,
                    expected: ty.sol_type_name().into_owned(),
                    value: format!("{self:?}"),
                });
            }
        };
        Ok(value)
    }
}

fn fits_signed(value: &I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let bound = I256::ONE << (bits - 1);
    *value >= -bound && *value < bound
}

/// ABI-encodes `args` against `types` as a parameter list.
pub fn encode_args(types: &[DynSolType], args: &[ConstructorArg]) -> Result<Vec<u8>, ArgTypeError> {
    let values = types
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (ty, arg))| arg.to_sol_value(index, ty))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DynSolValue::Tuple(values).abi_encode_params())
}
