// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::{Address, B256};

pub const DEFAULT_SUBACCOUNT_NAME: &str = "default";

/// `address ++ name`, with the name right-padded with zeros to 12 bytes.
/// Names longer than 12 bytes are truncated.
pub fn subaccount(owner: Address, name: &str) -> B256 {
    let mut out = [0u8; 32];
    out[..20].copy_from_slice(owner.as_slice());
    let name = name.as_bytes();
    let len = name.len().min(12);
    out[20..20 + len].copy_from_slice(&name[..len]);
    B256::from(out)
}

pub fn default_subaccount(owner: Address) -> B256 {
    subaccount(owner, DEFAULT_SUBACCOUNT_NAME)
}

/// The owner address is the leading 20 bytes.
pub fn subaccount_owner(subaccount: &B256) -> Address {
    Address::from_slice(&subaccount[..20])
}

/// Left-padded address, as produced by `hexZeroPad(address, 32)`.
pub fn padded_address(owner: Address) -> B256 {
    owner.into_word()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subaccount_layout() {
        let owner = Address::repeat_byte(0xab);
        let id = default_subaccount(owner);

        assert_eq!(&id[..20], owner.as_slice());
        assert_eq!(&id[20..27], b"default");
        assert!(id[27..].iter().all(|b| *b == 0));
        assert_eq!(subaccount_owner(&id), owner);
    }

    #[test]
    fn long_names_are_truncated() {
        let id = subaccount(Address::ZERO, "a-name-longer-than-twelve");
        assert_eq!(&id[20..], b"a-name-longe");
    }

    #[test]
    fn padded_address_is_right_aligned() {
        let owner = Address::repeat_byte(0x11);
        let word = padded_address(owner);
        assert!(word[..12].iter().all(|b| *b == 0));
        assert_eq!(&word[12..], owner.as_slice());
    }
}
