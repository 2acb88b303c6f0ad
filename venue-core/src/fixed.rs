// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Decimal string to fixed-point integer conversion.
//!
//! Prices, weights and rates are carried on chain as integers scaled by
//! 10^18 (`x18`); risk weights use 10^9 (`x9`).

use alloy_primitives::utils::{UnitsError, parse_units};
use thiserror::Error;

pub const X18_DECIMALS: u8 = 18;
pub const X9_DECIMALS: u8 = 9;

pub const ONE_X18: i128 = 1_000_000_000_000_000_000;

#[derive(Debug, Error)]
pub enum FixedPointError {
    #[error("invalid decimal {value:?}: {source}")]
    Parse {
        value: String,
        #[source]
        source: UnitsError,
    },
    #[error("{value} scaled by 10^{decimals} does not fit the target integer")]
    Overflow { value: String, decimals: u8 },
}

pub fn parse_x18(value: &str) -> Result<i128, FixedPointError> {
    parse_scaled(value, X18_DECIMALS)
}

pub fn parse_x9(value: &str) -> Result<i128, FixedPointError> {
    parse_scaled(value, X9_DECIMALS)
}

/// Same as [`parse_x9`] for fields declared as `int32` on chain.
pub fn parse_x9_i32(value: &str) -> Result<i32, FixedPointError> {
    let scaled = parse_x9(value)?;
    i32::try_from(scaled).map_err(|_| FixedPointError::Overflow {
        value: value.to_string(),
        decimals: X9_DECIMALS,
    })
}

/// Unsigned amount with an arbitrary number of token decimals.
pub fn parse_amount(value: &str, decimals: u8) -> Result<u128, FixedPointError> {
    let scaled = parse_scaled(value, decimals)?;
    u128::try_from(scaled).map_err(|_| FixedPointError::Overflow {
        value: value.to_string(),
        decimals,
    })
}

fn parse_scaled(value: &str, decimals: u8) -> Result<i128, FixedPointError> {
    let parsed = parse_units(value, decimals).map_err(|source| FixedPointError::Parse {
        value: value.to_string(),
        source,
    })?;
    i128::try_from(parsed.get_signed()).map_err(|_| FixedPointError::Overflow {
        value: value.to_string(),
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_decimal_strings() {
        assert_eq!(parse_x18("1").expect("parse"), ONE_X18);
        assert_eq!(parse_x18("0.01").expect("parse"), ONE_X18 / 100);
        assert_eq!(parse_x9("0.9").expect("parse"), 900_000_000);
        assert_eq!(parse_x9_i32("1.1").expect("parse"), 1_100_000_000);
        assert_eq!(parse_amount("250", 6).expect("parse"), 250_000_000);
    }

    #[test]
    fn rejects_garbage_and_overflow() {
        assert!(matches!(
            parse_x18("one"),
            Err(FixedPointError::Parse { .. })
        ));
        assert!(matches!(
            parse_x9_i32("3"),
            Err(FixedPointError::Overflow { .. })
        ));
    }
}
