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

use amplify::hex::ToHex;

use super::shared::{decode_origin, encode_origin};
use super::{invalid_field, DerivationPath, Field, PluralField};
use crate::{KeyValue, PsbtError};

pub const XPUB_LEN: usize = 78;

/// Extended public key together with its origin.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct GlobalXpub {
    /// BIP32 serialization of the extended public key.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub xpub: Vec<u8>,
    pub master_fingerprint: [u8; 4],
    pub path: DerivationPath,
}

fn is_valid_xpub(xpub: &[u8]) -> bool {
    // the public key occupies the last 33 bytes
    xpub.len() == XPUB_LEN && matches!(xpub[45], 0x02 | 0x03)
}

impl Field for GlobalXpub {
    const NAME: &'static str = "globalXpub";
    const EXPECTED: &'static str =
        "{ masterFingerprint: 4 bytes; extendedPubkey: 78 bytes; path: derivation path }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        if !is_valid_xpub(pair.key_data()) {
            return Err(PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()));
        }
        let (master_fingerprint, path) = decode_origin(&pair.value).ok_or_else(|| {
            invalid_field(Self::NAME, pair, "value must be a non-zero multiple of 4 bytes")
        })?;
        Ok(GlobalXpub {
            xpub: pair.key_data().to_vec(),
            master_fingerprint,
            path,
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        KeyValue::with_type(key_type, &self.xpub, encode_origin(self.master_fingerprint, &self.path))
    }

    fn check(&self) -> bool { is_valid_xpub(&self.xpub) }
}

impl PluralField for GlobalXpub {
    fn dedup_key(&self) -> Vec<u8> { self.xpub.clone() }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use amplify::hex::FromHex;

    use super::*;
    use crate::fields::DerivationPathExt;

    const XPUB: &str = "0488b21e03bef5a2f9800000009414886b1ebf025db067a4cbd13a0903fbd9733a5372bba1b58b\
                        d72c1699b798022c70e12b7a0646f92279f427c7b38e7334d8e5389cff167a1dc30e73f826b683";

    fn xpub_pair() -> KeyValue {
        let mut key = vec![0x01];
        key.extend(Vec::<u8>::from_hex(XPUB).unwrap());
        KeyValue::new(key, vec![0x28, 0x12, 0x34, 0x56, 0x54, 0x00, 0x00, 0x80])
    }

    #[test]
    fn decode_encode() {
        let pair = xpub_pair();
        assert_eq!(pair.key.len(), 79);
        let xpub = GlobalXpub::decode(&pair).unwrap();
        assert_eq!(xpub.master_fingerprint, [0x28, 0x12, 0x34, 0x56]);
        assert_eq!(xpub.path.to_bip32_string(), "m/84'");
        assert!(xpub.check());
        assert_eq!(xpub.encode(0x01), pair);
    }

    #[test]
    fn invalid_key() {
        let mut pair = xpub_pair();
        pair.key[46] = 0x04;
        assert!(matches!(GlobalXpub::decode(&pair), Err(PsbtError::InvalidKey("globalXpub", _))));
        pair.key.pop();
        assert!(matches!(GlobalXpub::decode(&pair), Err(PsbtError::InvalidKey("globalXpub", _))));
    }

    #[test]
    fn dedup() {
        let xpub = GlobalXpub::decode(&xpub_pair()).unwrap();
        let mut other = xpub.clone();
        other.master_fingerprint = [0; 4];
        let mut seen = BTreeSet::new();
        assert!(!GlobalXpub::can_add_to_array(&[xpub.clone()], &other, &mut seen));
        assert!(GlobalXpub::can_add_to_array(&[], &other, &mut seen));
        assert!(!GlobalXpub::can_add_to_array(&[], &xpub, &mut seen));
    }
}
