// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::{Connection, OptionalExtension, Result, Row, Transaction, params};

const SQL_INSERT_DEPLOYMENT: &str = include_str!("queries/insert_deployment.sql");
const SQL_SELECT_DEPLOYMENT: &str = include_str!("queries/select_deployment.sql");
const SQL_SELECT_DEPLOYMENTS_FOR_NETWORK: &str =
    include_str!("queries/select_deployments_for_network.sql");
const SQL_COUNT_DEPLOYMENTS: &str = "SELECT COUNT(*) FROM deployments WHERE network = ?1";
const SQL_SELECT_LOCK_HOLDER: &str = "SELECT holder FROM operator_locks WHERE network = ?1";
const SQL_INSERT_LOCK: &str =
    "INSERT INTO operator_locks (network, holder, acquired_at_ms) VALUES (?1, ?2, ?3)";
const SQL_DELETE_LOCK: &str = "DELETE FROM operator_locks WHERE network = ?1 AND holder = ?2";

#[derive(Debug, Clone)]
pub(super) struct DeploymentRow {
    pub name: String,
    pub address: Vec<u8>,
    pub abi: String,
    pub implementation_address: Option<Vec<u8>>,
    pub constructor_args: String,
    pub metadata: String,
    pub tx_hash: Option<Vec<u8>>,
    pub gas_used: i64,
}

#[derive(Debug, Clone)]
pub(super) struct NewDeploymentRow<'a> {
    pub network: &'a str,
    pub name: &'a str,
    pub address: &'a [u8],
    pub abi: String,
    pub implementation_address: Option<&'a [u8]>,
    pub constructor_args: String,
    pub metadata: String,
    pub tx_hash: Option<&'a [u8]>,
    pub gas_used: i64,
    pub created_at_ms: i64,
}

pub(super) fn sql_select_deployment(
    conn: &Connection,
    network: &str,
    name: &str,
) -> Result<Option<DeploymentRow>> {
    conn.query_row(
        SQL_SELECT_DEPLOYMENT,
        params![network, name],
        convert_row_to_deployment_row,
    )
    .optional()
}

pub(super) fn sql_select_deployments_for_network(
    conn: &Connection,
    network: &str,
) -> Result<Vec<DeploymentRow>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_DEPLOYMENTS_FOR_NETWORK)?;
    let mapped = stmt.query_map(params![network], convert_row_to_deployment_row)?;
    mapped.collect()
}

pub(super) fn sql_count_deployments(conn: &Connection, network: &str) -> Result<i64> {
    conn.query_row(SQL_COUNT_DEPLOYMENTS, params![network], |row| row.get(0))
}

pub(super) fn sql_insert_deployment(tx: &Transaction<'_>, row: &NewDeploymentRow<'_>) -> Result<usize> {
    tx.execute(
        SQL_INSERT_DEPLOYMENT,
        params![
            row.network,
            row.name,
            row.address,
            row.abi,
            row.implementation_address,
            row.constructor_args,
            row.metadata,
            row.tx_hash,
            row.gas_used,
            row.created_at_ms,
        ],
    )
}

pub(super) fn sql_select_lock_holder(conn: &Connection, network: &str) -> Result<Option<String>> {
    conn.query_row(SQL_SELECT_LOCK_HOLDER, params![network], |row| row.get(0))
        .optional()
}

pub(super) fn sql_insert_lock(
    tx: &Transaction<'_>,
    network: &str,
    holder: &str,
    acquired_at_ms: i64,
) -> Result<usize> {
    tx.execute(SQL_INSERT_LOCK, params![network, holder, acquired_at_ms])
}

pub(super) fn sql_delete_lock(conn: &Connection, network: &str, holder: &str) -> Result<usize> {
    conn.execute(SQL_DELETE_LOCK, params![network, holder])
}

fn convert_row_to_deployment_row(row: &Row<'_>) -> Result<DeploymentRow> {
    Ok(DeploymentRow {
        name: row.get(0)?,
        address: row.get(1)?,
        abi: row.get(2)?,
        implementation_address: row.get(3)?,
        constructor_args: row.get(4)?,
        metadata: row.get(5)?,
        tx_hash: row.get(6)?,
        gas_used: row.get(7)?,
    })
}
