// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

pub mod contracts;
pub mod fixed;
pub mod subaccount;
pub mod transaction;
