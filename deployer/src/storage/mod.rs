// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod db;
mod sql;

use thiserror::Error;

use crate::record::DeploymentRecord;

pub use db::DeploymentStore;

#[derive(Debug, Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored record for {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("record for {name} could not be serialized: {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of a create-if-absent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Another writer got there first; the stored record wins.
    Existing(DeploymentRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    /// Re-entrant acquisition by the current holder.
    AlreadyHeld,
    HeldBy(String),
}
