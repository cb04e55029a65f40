// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2024 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2024 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BIP32 derivation paths as they appear in PSBT origin records.
//!
//! The path type itself is [`DerivationPath`] from `bp-derive`; this module
//! adds the little-endian level codec and the `m/44'/0'/0'` text form.

use core::str::FromStr;

pub use derive::{
    DerivationIndex, DerivationParseError, DerivationPath, HardenedIndex, IndexParseError,
    NormalIndex, HARDENED_INDEX_BOUNDARY,
};
use derive::{Idx, IdxBase, IndexError};

/// Conversions of [`DerivationPath`] used by the origin-carrying fields.
pub trait DerivationPathExt: Sized {
    /// Parses `m/44'/0'/0'`-style path; hardened levels may be marked with `'`, `h` or `H`
    /// and the leading `m` is optional.
    fn from_bip32_str(s: &str) -> Result<Self, DerivationParseError>;

    /// Renders the path with the `m` prefix and `'` hardened markers.
    fn to_bip32_string(&self) -> String;

    /// Little-endian serialization of the path levels.
    fn to_le_bytes(&self) -> Vec<u8>;

    /// Reads path levels from little-endian bytes; the length must be a multiple of 4.
    fn from_le_bytes(bytes: &[u8]) -> Option<Self>;
}

fn index_from_u32(value: u32) -> Result<DerivationIndex, IndexError> {
    if value < HARDENED_INDEX_BOUNDARY {
        NormalIndex::try_from_index(value).map(DerivationIndex::Normal)
    } else {
        HardenedIndex::try_from_index(value).map(DerivationIndex::Hardened)
    }
}

fn index_from_str(segment: &str) -> Result<DerivationIndex, IndexParseError> {
    if segment.ends_with(['\'', 'h', 'H']) {
        HardenedIndex::from_str(segment).map(DerivationIndex::Hardened)
    } else {
        NormalIndex::from_str(segment).map(DerivationIndex::Normal)
    }
}

impl DerivationPathExt for DerivationPath {
    fn from_bip32_str(s: &str) -> Result<Self, DerivationParseError> {
        let levels = match s.strip_prefix('m') {
            Some("") => return Ok(DerivationPath::new()),
            Some(rest) => rest
                .strip_prefix('/')
                .ok_or_else(|| DerivationParseError::InvalidFormat(s.to_owned()))?,
            None => s,
        };
        levels
            .split('/')
            .map(|segment| {
                index_from_str(segment)
                    .map_err(|err| DerivationParseError::InvalidIndex(segment.to_owned(), err))
            })
            .collect()
    }

    fn to_bip32_string(&self) -> String {
        let mut s = s!("m");
        for index in self {
            s.push('/');
            s.push_str(&index.child_number().to_string());
            if index.is_hardened() {
                s.push('\'');
            }
        }
        s
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        self.iter().flat_map(|index| index.index().to_le_bytes()).collect()
    }

    fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .map(index_from_u32)
            .collect::<Result<_, _>>()
            .ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn altstr() {
        let path1 = DerivationPath::from_bip32_str("m/86h/1h/0h").unwrap();
        let path2 = DerivationPath::from_bip32_str("m/86'/1'/0'").unwrap();
        let path3 = DerivationPath::from_bip32_str("86'/1H/0h").unwrap();
        assert_eq!(path1, path2);
        assert_eq!(path1, path3);
        assert_eq!(path1.to_bip32_string(), "m/86'/1'/0'");
        assert_eq!(path1[0], DerivationIndex::hardened(86));
    }

    #[test]
    fn bip44_bytes() {
        let path = DerivationPath::from_bip32_str("m/44'/0'/0'").unwrap();
        assert_eq!(path.to_le_bytes(), vec![
            0x2C, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x80
        ]);
        assert_eq!(DerivationPath::from_le_bytes(&path.to_le_bytes()), Some(path));
        assert_eq!(DerivationPath::from_le_bytes(&[0x01, 0x02]), None);
    }

    #[test]
    fn index_boundaries() {
        let bytes = [0xFF, 0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x00, 0x80, 0xFF, 0xFF, 0xFF, 0xFF];
        let path = DerivationPath::from_le_bytes(&bytes).unwrap();
        assert!(!path[0].is_hardened());
        assert_eq!(path[0].child_number(), HARDENED_INDEX_BOUNDARY - 1);
        assert_eq!(path[1], DerivationIndex::hardened(0));
        assert_eq!(path[2].child_number(), HARDENED_INDEX_BOUNDARY - 1);
        assert!(path[2].is_hardened());
        assert_eq!(path.to_le_bytes(), bytes.to_vec());
    }

    #[test]
    fn normal_and_master() {
        let path = DerivationPath::from_bip32_str("m/0/1'/2").unwrap();
        assert_eq!(path.as_slice(), &[
            DerivationIndex::normal(0),
            DerivationIndex::hardened(1),
            DerivationIndex::normal(2)
        ]);
        assert_eq!(path.to_bip32_string(), "m/0/1'/2");
        assert_eq!(DerivationPath::from_bip32_str("m").unwrap(), DerivationPath::new());
        assert_eq!(DerivationPath::new().to_bip32_string(), "m");
    }

    #[test]
    fn invalid() {
        assert!(matches!(
            DerivationPath::from_bip32_str("m/x'"),
            Err(DerivationParseError::InvalidIndex(..))
        ));
        assert!(matches!(
            DerivationPath::from_bip32_str("m//1"),
            Err(DerivationParseError::InvalidIndex(..))
        ));
        assert!(matches!(
            DerivationPath::from_bip32_str("m1/2"),
            Err(DerivationParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            DerivationPath::from_bip32_str("m/2147483648"),
            Err(DerivationParseError::InvalidIndex(_, IndexParseError::Invalid(_)))
        ));
    }
}
