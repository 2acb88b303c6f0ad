// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Deploys the venue contracts and brings them to a tradable state.
//!
//! Flow: artifacts -> deployer -> SQLite registry -> initialization steps.
//! The registry is the only source of contract addresses after deployment.
pub mod artifacts;
pub mod chain;
pub mod config;
pub mod deploy;
pub mod init;
pub mod listeners;
pub mod record;
pub mod registry;
pub mod sequencer_client;
pub mod storage;
