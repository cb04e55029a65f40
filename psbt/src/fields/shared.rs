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

//! Fields present both in input and output maps. Their payload codec does not
//! depend on the map; only the key type byte differs.

use amplify::hex::ToHex;

use super::{
    check_no_key_data, fixed_bytes, invalid_field, is_valid_pubkey, DerivationPath,
    DerivationPathExt, Field, PluralField, SingularField,
};
use crate::{varint, KeyValue, PsbtError};

/// Reads a master key fingerprint followed by little-endian path levels.
pub(crate) fn decode_origin(bytes: &[u8]) -> Option<([u8; 4], DerivationPath)> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    let fingerprint = fixed_bytes(&bytes[..4])?;
    let path = DerivationPath::from_le_bytes(&bytes[4..])?;
    Some((fingerprint, path))
}

pub(crate) fn encode_origin(fingerprint: [u8; 4], path: &DerivationPath) -> Vec<u8> {
    let mut value = fingerprint.to_vec();
    value.extend(path.to_le_bytes());
    value
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Bip32Derivation {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub pubkey: Vec<u8>,
    pub master_fingerprint: [u8; 4],
    pub path: DerivationPath,
}

impl Field for Bip32Derivation {
    const NAME: &'static str = "bip32Derivation";
    const EXPECTED: &'static str =
        "{ masterFingerprint: 4 bytes; pubkey: 33 or 65 byte public key; path: derivation path }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        let pubkey = pair.key_data();
        if !is_valid_pubkey(pubkey) {
            return Err(PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()));
        }
        let (master_fingerprint, path) = decode_origin(&pair.value).ok_or_else(|| {
            invalid_field(Self::NAME, pair, "value must be a non-zero multiple of 4 bytes")
        })?;
        Ok(Bip32Derivation {
            pubkey: pubkey.to_vec(),
            master_fingerprint,
            path,
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        KeyValue::with_type(key_type, &self.pubkey, encode_origin(self.master_fingerprint, &self.path))
    }

    fn check(&self) -> bool { is_valid_pubkey(&self.pubkey) }
}

impl PluralField for Bip32Derivation {
    fn dedup_key(&self) -> Vec<u8> { self.pubkey.clone() }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct RedeemScript(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for RedeemScript {
    const NAME: &'static str = "redeemScript";
    const EXPECTED: &'static str = "script bytes";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        Ok(RedeemScript(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }
}

impl SingularField for RedeemScript {}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct WitnessScript(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for WitnessScript {
    const NAME: &'static str = "witnessScript";
    const EXPECTED: &'static str = "script bytes";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        Ok(WitnessScript(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }
}

impl SingularField for WitnessScript {}

/// Taproot key derivation, listing the script leaves the key participates in.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TapBip32Derivation {
    pub pubkey: [u8; 32],
    pub leaf_hashes: Vec<[u8; 32]>,
    pub master_fingerprint: [u8; 4],
    pub path: DerivationPath,
}

impl Field for TapBip32Derivation {
    const NAME: &'static str = "tapBip32Derivation";
    const EXPECTED: &'static str = "{ masterFingerprint: 4 bytes; pubkey: 32 byte x-only key; \
                                    leafHashes: 32 byte hashes; path: derivation path }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        let pubkey = fixed_bytes(pair.key_data())
            .ok_or_else(|| PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()))?;
        let (count, consumed) = varint::decode(&pair.value, 0)
            .map_err(|_| invalid_field(Self::NAME, pair, "missing leaf hash count"))?;
        let hashes_end = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(32))
            .and_then(|len| len.checked_add(consumed))
            .filter(|end| *end <= pair.value.len())
            .ok_or_else(|| invalid_field(Self::NAME, pair, "leaf hashes exceed value length"))?;
        let leaf_hashes: Vec<[u8; 32]> = pair.value[consumed..hashes_end]
            .chunks_exact(32)
            .filter_map(fixed_bytes)
            .collect();
        let (master_fingerprint, path) =
            decode_origin(&pair.value[hashes_end..]).ok_or_else(|| {
                invalid_field(Self::NAME, pair, "derivation must be a non-zero multiple of 4 bytes")
            })?;
        Ok(TapBip32Derivation {
            pubkey,
            leaf_hashes,
            master_fingerprint,
            path,
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        let mut value = varint::to_vec(self.leaf_hashes.len() as u64);
        for hash in &self.leaf_hashes {
            value.extend(hash);
        }
        value.extend(encode_origin(self.master_fingerprint, &self.path));
        KeyValue::with_type(key_type, &self.pubkey, value)
    }
}

impl PluralField for TapBip32Derivation {
    fn dedup_key(&self) -> Vec<u8> { self.pubkey.to_vec() }
}

/// X-only taproot internal key.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct TapInternalKey(pub [u8; 32]);

impl Field for TapInternalKey {
    const NAME: &'static str = "tapInternalKey";
    const EXPECTED: &'static str = "32 byte x-only public key";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        fixed_bytes(&pair.value)
            .map(TapInternalKey)
            .ok_or_else(|| invalid_field(Self::NAME, pair, "value must be 32 bytes"))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0) }
}

impl SingularField for TapInternalKey {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bip32_derivation() {
        let mut key = vec![0x06];
        key.extend([0x03; 33]);
        let mut value = vec![0xD9, 0x0C, 0x6A, 0x4F];
        value.extend([0x2C, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x80]);
        let pair = KeyValue::new(key, value);

        let derivation = Bip32Derivation::decode(&pair).unwrap();
        assert_eq!(derivation.master_fingerprint, [0xD9, 0x0C, 0x6A, 0x4F]);
        assert_eq!(derivation.path.to_bip32_string(), "m/44'/0'/0'");
        assert_eq!(derivation.path, DerivationPath::from_bip32_str("m/44h/0h/0h").unwrap());
        assert_eq!(derivation.encode(0x06), pair);
        // same payload under the output type byte
        assert_eq!(derivation.encode(0x02).key[0], 0x02);
        assert_eq!(derivation.encode(0x02).value, pair.value);
    }

    #[test]
    fn bip32_derivation_invalid() {
        let mut key = vec![0x06];
        key.extend([0x03; 33]);
        assert!(matches!(
            Bip32Derivation::decode(&KeyValue::new(key.clone(), vec![0x01, 0x02, 0x03])),
            Err(PsbtError::InvalidField("bip32Derivation", _, _))
        ));
        assert!(matches!(
            Bip32Derivation::decode(&KeyValue::new(key, vec![])),
            Err(PsbtError::InvalidField("bip32Derivation", _, _))
        ));
        assert!(matches!(
            Bip32Derivation::decode(&KeyValue::new(vec![0x06, 0x05, 0x05], vec![0; 4])),
            Err(PsbtError::InvalidKey("bip32Derivation", _))
        ));
    }

    #[test]
    fn tap_bip32_derivation() {
        let derivation = TapBip32Derivation {
            pubkey: [0x11; 32],
            leaf_hashes: vec![[0x22; 32], [0x33; 32]],
            master_fingerprint: [1, 2, 3, 4],
            path: DerivationPath::from_bip32_str("m/86'/0'/0'/0/1").unwrap(),
        };
        let pair = derivation.encode(0x16);
        assert_eq!(pair.key.len(), 33);
        assert_eq!(pair.value[0], 2);
        assert_eq!(pair.value.len(), 1 + 64 + 4 + 20);
        assert_eq!(TapBip32Derivation::decode(&pair).unwrap(), derivation);

        let mut truncated = pair.clone();
        truncated.value.truncate(40);
        assert!(TapBip32Derivation::decode(&truncated).is_err());
    }

    #[test]
    fn singular_scripts() {
        let pair = KeyValue::new(vec![0x04], vec![0x51]);
        let script = RedeemScript::decode(&pair).unwrap();
        assert_eq!(script, RedeemScript(vec![0x51]));
        assert_eq!(script.encode(0x00), KeyValue::new(vec![0x00], vec![0x51]));
        assert_eq!(
            WitnessScript::decode(&KeyValue::new(vec![0x05, 0x00], vec![0x51])),
            Err(PsbtError::InvalidKey("witnessScript", s!("0500")))
        );
        assert!(RedeemScript::can_add(None));
        assert!(!RedeemScript::can_add(Some(&script)));
        assert!(TapInternalKey::decode(&KeyValue::new(vec![0x17], vec![0; 31])).is_err());
    }
}
