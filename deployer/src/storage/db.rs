// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{Address, B256};
use rusqlite::{Connection, Result, TransactionBehavior};
use rusqlite_migration::{M, Migrations};

use super::sql::{
    DeploymentRow, NewDeploymentRow, sql_count_deployments, sql_delete_lock, sql_insert_deployment,
    sql_insert_lock, sql_select_deployment, sql_select_deployments_for_network,
    sql_select_lock_holder,
};
use super::{CreateOutcome, LockOutcome, StorageError, StorageOpenError};
use crate::record::{ConstructorArg, DeploymentRecord};

const MIGRATION_0001_SCHEMA: &str = include_str!("migrations/0001_schema.sql");

/// Deployment records keyed by `(network, name)`.
pub struct DeploymentStore {
    conn: Connection,
}

impl DeploymentStore {
    pub fn open(path: &str, synchronous: &str) -> std::result::Result<Self, StorageOpenError> {
        let mut conn = Self::open_connection(path, synchronous)?;
        Self::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Throwaway store for dry runs.
    pub fn open_in_memory() -> std::result::Result<Self, StorageOpenError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn open_connection(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", synchronous)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    pub fn run_migrations(conn: &mut Connection) -> std::result::Result<(), StorageOpenError> {
        Migrations::new(vec![M::up(MIGRATION_0001_SCHEMA)]).to_latest(conn)?;
        Ok(())
    }

    pub fn get(
        &self,
        network: &str,
        name: &str,
    ) -> std::result::Result<Option<DeploymentRecord>, StorageError> {
        sql_select_deployment(&self.conn, network, name)?
            .map(decode_row)
            .transpose()
    }

    /// Inserts `record` unless one already exists for its name. The check and
    /// the insert share one IMMEDIATE transaction.
    pub fn create_if_absent(
        &mut self,
        network: &str,
        record: &DeploymentRecord,
    ) -> std::result::Result<CreateOutcome, StorageError> {
        let abi = to_json(&record.name, &record.abi)?;
        let constructor_args = to_json(&record.name, &record.constructor_args)?;
        let metadata = to_json(&record.name, &record.metadata)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = sql_select_deployment(&tx, network, &record.name)? {
            let existing = decode_row(existing)?;
            tx.commit()?;
            return Ok(CreateOutcome::Existing(existing));
        }

        sql_insert_deployment(
            &tx,
            &NewDeploymentRow {
                network,
                name: &record.name,
                address: record.address.as_slice(),
                abi,
                implementation_address: record.implementation_address.as_ref().map(|a| a.as_slice()),
                constructor_args,
                metadata,
                tx_hash: record.tx_hash.as_ref().map(B256::as_slice),
                gas_used: u64_to_i64(record.gas_used),
                created_at_ms: now_ms(),
            },
        )?;
        tx.commit()?;
        Ok(CreateOutcome::Created)
    }

    /// All records for `network` in creation order.
    pub fn list(&self, network: &str) -> std::result::Result<Vec<DeploymentRecord>, StorageError> {
        sql_select_deployments_for_network(&self.conn, network)?
            .into_iter()
            .map(decode_row)
            .collect()
    }

    pub fn count(&self, network: &str) -> Result<u64> {
        Ok(i64_to_u64(sql_count_deployments(&self.conn, network)?))
    }

    pub fn try_acquire_lock(&mut self, network: &str, holder: &str) -> Result<LockOutcome> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = match sql_select_lock_holder(&tx, network)? {
            Some(current) if current == holder => LockOutcome::AlreadyHeld,
            Some(current) => LockOutcome::HeldBy(current),
            None => {
                sql_insert_lock(&tx, network, holder, now_ms())?;
                LockOutcome::Acquired
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    /// Returns false when `holder` did not hold the lock.
    pub fn release_lock(&mut self, network: &str, holder: &str) -> Result<bool> {
        Ok(sql_delete_lock(&self.conn, network, holder)? > 0)
    }
}

fn decode_row(row: DeploymentRow) -> std::result::Result<DeploymentRecord, StorageError> {
    let corrupt = |reason: String| StorageError::Corrupt {
        name: row.name.clone(),
        reason,
    };
    let address = address_from_blob(&row.address).ok_or_else(|| corrupt("address".into()))?;
    let implementation_address = match &row.implementation_address {
        Some(blob) => Some(
            address_from_blob(blob).ok_or_else(|| corrupt("implementation_address".into()))?,
        ),
        None => None,
    };
    let tx_hash = match &row.tx_hash {
        Some(blob) if blob.len() == 32 => Some(B256::from_slice(blob)),
        Some(_) => return Err(corrupt("tx_hash".into())),
        None => None,
    };
    let abi: JsonAbi =
        serde_json::from_str(&row.abi).map_err(|err| corrupt(format!("abi: {err}")))?;
    let constructor_args: Vec<ConstructorArg> = serde_json::from_str(&row.constructor_args)
        .map_err(|err| corrupt(format!("constructor_args: {err}")))?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&row.metadata)
        .map_err(|err| corrupt(format!("metadata: {err}")))?;

    Ok(DeploymentRecord {
        name: row.name,
        address,
        abi,
        implementation_address,
        constructor_args,
        metadata,
        tx_hash,
        gas_used: i64_to_u64(row.gas_used),
    })
}

fn address_from_blob(blob: &[u8]) -> Option<Address> {
    (blob.len() == 20).then(|| Address::from_slice(blob))
}

fn to_json<T: serde::Serialize>(name: &str, value: &T) -> std::result::Result<String, StorageError> {
    serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        name: name.to_string(),
        source,
    })
}

fn now_ms() -> i64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
