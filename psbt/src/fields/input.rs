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

use super::{
    check_no_key_data, fixed_bytes, invalid_field, is_der_sig_with_sighash, is_valid_pubkey, Field,
    PluralField, SingularField,
};
use crate::{varint, KeyValue, PsbtError};

/// Full previous transaction spent by a non-segwit input.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct NonWitnessUtxo(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for NonWitnessUtxo {
    const NAME: &'static str = "nonWitnessUtxo";
    const EXPECTED: &'static str = "serialized previous transaction";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        Ok(NonWitnessUtxo(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }

    fn check(&self) -> bool { !self.0.is_empty() }
}

impl SingularField for NonWitnessUtxo {}

/// Previous output spent by a segwit input.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct WitnessUtxo {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub script: Vec<u8>,
    pub value: u64,
}

impl Field for WitnessUtxo {
    const NAME: &'static str = "witnessUtxo";
    const EXPECTED: &'static str = "{ script: script bytes; value: amount in satoshis }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        let amount = fixed_bytes::<8>(pair.value.get(..8).unwrap_or_default())
            .ok_or_else(|| invalid_field(Self::NAME, pair, "value is shorter than 8 bytes"))?;
        let (script_len, consumed) = varint::decode(&pair.value, 8)
            .map_err(|_| invalid_field(Self::NAME, pair, "missing script length"))?;
        let script = &pair.value[8 + consumed..];
        if script.len() as u64 != script_len {
            return Err(invalid_field(
                Self::NAME,
                pair,
                format!("declared script length {script_len} while {} bytes follow", script.len()),
            ));
        }
        Ok(WitnessUtxo {
            script: script.to_vec(),
            value: u64::from_le_bytes(amount),
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        let mut value = self.value.to_le_bytes().to_vec();
        value.extend(varint::to_vec(self.script.len() as u64));
        value.extend(&self.script);
        KeyValue::with_type(key_type, &[], value)
    }
}

impl SingularField for WitnessUtxo {}

/// ECDSA signature made by one of the keys required to spend the input.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct PartialSig {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub pubkey: Vec<u8>,
    /// DER signature followed by the sighash type byte.
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub signature: Vec<u8>,
}

impl Field for PartialSig {
    const NAME: &'static str = "partialSig";
    const EXPECTED: &'static str =
        "{ pubkey: 33 or 65 byte public key; signature: DER signature with sighash byte }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        let pubkey = pair.key_data();
        if !is_valid_pubkey(pubkey) {
            return Err(PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()));
        }
        Ok(PartialSig {
            pubkey: pubkey.to_vec(),
            signature: pair.value.clone(),
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        KeyValue::with_type(key_type, &self.pubkey, self.signature.clone())
    }

    fn check(&self) -> bool {
        is_valid_pubkey(&self.pubkey) && is_der_sig_with_sighash(&self.signature)
    }
}

impl PluralField for PartialSig {
    fn dedup_key(&self) -> Vec<u8> { self.pubkey.clone() }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct SighashType(pub u32);

impl SighashType {
    pub const ALL: Self = SighashType(0x01);
    pub const NONE: Self = SighashType(0x02);
    pub const SINGLE: Self = SighashType(0x03);
    pub const ALL_ANYONECANPAY: Self = SighashType(0x81);
}

impl Field for SighashType {
    const NAME: &'static str = "sighashType";
    const EXPECTED: &'static str = "32-bit unsigned integer";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        fixed_bytes(&pair.value)
            .map(u32::from_le_bytes)
            .map(SighashType)
            .ok_or_else(|| invalid_field(Self::NAME, pair, "value must be 4 bytes"))
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        KeyValue::with_type(key_type, &[], self.0.to_le_bytes())
    }
}

impl SingularField for SighashType {}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct FinalScriptSig(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for FinalScriptSig {
    const NAME: &'static str = "finalScriptSig";
    const EXPECTED: &'static str = "script bytes";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        Ok(FinalScriptSig(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }
}

impl SingularField for FinalScriptSig {}

/// Serialized witness stack.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct FinalScriptWitness(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for FinalScriptWitness {
    const NAME: &'static str = "finalScriptWitness";
    const EXPECTED: &'static str = "serialized witness stack";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        Ok(FinalScriptWitness(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }
}

impl SingularField for FinalScriptWitness {}

/// Proof-of-reserves commitment message.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[display("{0}")]
pub struct PorCommitment(pub String);

impl Field for PorCommitment {
    const NAME: &'static str = "porCommitment";
    const EXPECTED: &'static str = "UTF-8 string";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        String::from_utf8(pair.value.clone())
            .map(PorCommitment)
            .map_err(|err| invalid_field(Self::NAME, pair, err))
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        KeyValue::with_type(key_type, &[], self.0.as_bytes())
    }

    fn received(&self) -> String { self.0.clone() }
}

impl SingularField for PorCommitment {}

fn is_schnorr_sig(sig: &[u8]) -> bool { matches!(sig.len(), 64 | 65) }

/// Schnorr signature for the taproot key path spend.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct TapKeySig(
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))] pub Vec<u8>,
);

impl Field for TapKeySig {
    const NAME: &'static str = "tapKeySig";
    const EXPECTED: &'static str = "64 or 65 byte Schnorr signature";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        if !is_schnorr_sig(&pair.value) {
            return Err(invalid_field(Self::NAME, pair, "signature must be 64 or 65 bytes"));
        }
        Ok(TapKeySig(pair.value.clone()))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0.clone()) }

    fn check(&self) -> bool { is_schnorr_sig(&self.0) }
}

impl SingularField for TapKeySig {}

/// Schnorr signature for a taproot script path spend of a specific leaf.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TapScriptSig {
    pub pubkey: [u8; 32],
    pub leaf_hash: [u8; 32],
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub signature: Vec<u8>,
}

impl Field for TapScriptSig {
    const NAME: &'static str = "tapScriptSig";
    const EXPECTED: &'static str =
        "{ pubkey: 32 byte x-only key; leafHash: 32 bytes; signature: 64 or 65 bytes }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        let key_data = pair.key_data();
        if key_data.len() != 64 {
            return Err(PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()));
        }
        if !is_schnorr_sig(&pair.value) {
            return Err(invalid_field(Self::NAME, pair, "signature must be 64 or 65 bytes"));
        }
        let (pubkey, leaf_hash) = key_data.split_at(32);
        Ok(TapScriptSig {
            pubkey: fixed_bytes(pubkey).ok_or(PsbtError::UnexpectedEod)?,
            leaf_hash: fixed_bytes(leaf_hash).ok_or(PsbtError::UnexpectedEod)?,
            signature: pair.value.clone(),
        })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        let mut key_data = self.pubkey.to_vec();
        key_data.extend(self.leaf_hash);
        KeyValue::with_type(key_type, &key_data, self.signature.clone())
    }

    fn check(&self) -> bool { is_schnorr_sig(&self.signature) }
}

impl PluralField for TapScriptSig {
    fn dedup_key(&self) -> Vec<u8> {
        let mut key = self.pubkey.to_vec();
        key.extend(self.leaf_hash);
        key
    }
}

pub const TAPROOT_CONTROL_BASE_SIZE: usize = 33;
pub const TAPROOT_CONTROL_NODE_SIZE: usize = 32;
pub const TAPROOT_CONTROL_MAX_NODE_COUNT: usize = 128;

/// Leaf script with the control block proving its inclusion into the taproot output.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TapLeafScript {
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub control_block: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub script: Vec<u8>,
    pub leaf_version: u8,
}

impl TapLeafScript {
    fn is_valid_control_block(control_block: &[u8]) -> bool {
        let len = control_block.len();
        let max_len =
            TAPROOT_CONTROL_BASE_SIZE + TAPROOT_CONTROL_NODE_SIZE * TAPROOT_CONTROL_MAX_NODE_COUNT;
        (TAPROOT_CONTROL_BASE_SIZE..=max_len).contains(&len)
            && (len - 1) % TAPROOT_CONTROL_NODE_SIZE == 0
    }

    /// The leaf version must match the control block's first byte with the
    /// output key parity bit cleared.
    fn is_consistent(&self) -> bool {
        Self::is_valid_control_block(&self.control_block)
            && self.control_block[0] & 0xFE == self.leaf_version
    }
}

impl Field for TapLeafScript {
    const NAME: &'static str = "tapLeafScript";
    const EXPECTED: &'static str =
        "{ controlBlock: 33 + 32*n bytes; leafVersion: control block first byte without parity; \
         script: script bytes }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        let control_block = pair.key_data();
        if !Self::is_valid_control_block(control_block) {
            return Err(PsbtError::InvalidKey(Self::NAME, pair.key.to_hex()));
        }
        let (&leaf_version, script) = pair
            .value
            .split_last()
            .ok_or_else(|| invalid_field(Self::NAME, pair, "missing leaf version"))?;
        let leaf = TapLeafScript {
            control_block: control_block.to_vec(),
            script: script.to_vec(),
            leaf_version,
        };
        if !leaf.is_consistent() {
            return Err(invalid_field(
                Self::NAME,
                pair,
                format!(
                    "leaf version {leaf_version:#04x} does not match control block byte {:#04x}",
                    control_block[0]
                ),
            ));
        }
        Ok(leaf)
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        let mut value = self.script.clone();
        value.push(self.leaf_version);
        KeyValue::with_type(key_type, &self.control_block, value)
    }

    fn check(&self) -> bool { self.is_consistent() }
}

impl PluralField for TapLeafScript {
    fn dedup_key(&self) -> Vec<u8> { self.control_block.clone() }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct TapMerkleRoot(pub [u8; 32]);

impl Field for TapMerkleRoot {
    const NAME: &'static str = "tapMerkleRoot";
    const EXPECTED: &'static str = "32 byte hash";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        fixed_bytes(&pair.value)
            .map(TapMerkleRoot)
            .ok_or_else(|| invalid_field(Self::NAME, pair, "value must be 32 bytes"))
    }

    fn encode(&self, key_type: u8) -> KeyValue { KeyValue::with_type(key_type, &[], self.0) }
}

impl SingularField for TapMerkleRoot {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn witness_utxo() {
        let pair = KeyValue::new(vec![0x01], vec![
            0x00, 0xE1, 0xF5, 0x05, 0x00, 0x00, 0x00, 0x00, 0x03, 0x51, 0x52, 0x53,
        ]);
        let utxo = WitnessUtxo::decode(&pair).unwrap();
        assert_eq!(utxo.value, 100_000_000);
        assert_eq!(utxo.script, vec![0x51, 0x52, 0x53]);
        assert_eq!(utxo.encode(0x01), pair);
    }

    #[test]
    fn witness_utxo_length_mismatch() {
        let mut longer = vec![0u8; 8];
        longer.extend([0x02, 0x51, 0x52, 0x53]);
        assert!(matches!(
            WitnessUtxo::decode(&KeyValue::new(vec![0x01], longer)),
            Err(PsbtError::InvalidField("witnessUtxo", _, _))
        ));
        let mut shorter = vec![0u8; 8];
        shorter.extend([0x04, 0x51]);
        assert!(WitnessUtxo::decode(&KeyValue::new(vec![0x01], shorter)).is_err());
        assert!(WitnessUtxo::decode(&KeyValue::new(vec![0x01], vec![0; 7])).is_err());
        assert!(WitnessUtxo::decode(&KeyValue::new(vec![0x01], vec![0; 8])).is_err());
    }

    #[test]
    fn partial_sig_is_lenient_on_decode() {
        let mut key = vec![0x02];
        key.extend([0x02; 33]);
        let sig = PartialSig::decode(&KeyValue::new(key.clone(), vec![0x01, 0x02])).unwrap();
        assert!(!sig.check());

        key[1] = 0x05;
        assert_eq!(
            PartialSig::decode(&KeyValue::new(key.clone(), vec![])),
            Err(PsbtError::InvalidKey("partialSig", key.to_hex()))
        );
    }

    #[test]
    fn partial_sig_key_prefix_and_length() {
        let mut compressed_len = vec![0x02, 0x04];
        compressed_len.extend([0x11; 32]);
        let mut uncompressed_len = vec![0x02, 0x03];
        uncompressed_len.extend([0x11; 64]);
        for key in [compressed_len, uncompressed_len] {
            let sig = PartialSig::decode(&KeyValue::new(key.clone(), vec![0x01])).unwrap();
            assert_eq!(sig.pubkey, key[1..].to_vec());
            assert_eq!(sig.encode(0x02).key, key);
        }

        let mut too_long = vec![0x02, 0x02];
        too_long.extend([0x11; 33]);
        assert!(PartialSig::decode(&KeyValue::new(too_long, vec![0x01])).is_err());
    }

    #[test]
    fn sighash() {
        let pair = KeyValue::new(vec![0x03], vec![0x81, 0x00, 0x00, 0x00]);
        assert_eq!(SighashType::decode(&pair), Ok(SighashType::ALL_ANYONECANPAY));
        assert!(SighashType::decode(&KeyValue::new(vec![0x03], vec![0x01])).is_err());
        assert_eq!(SighashType::ALL.encode(0x03).value, vec![0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn por_commitment() {
        let pair = KeyValue::new(vec![0x09], b"reserves".to_vec());
        assert_eq!(PorCommitment::decode(&pair).unwrap().to_string(), "reserves");
        assert!(PorCommitment::decode(&KeyValue::new(vec![0x09], vec![0xFF, 0xFE])).is_err());
    }

    #[test]
    fn tap_sigs() {
        assert!(TapKeySig::decode(&KeyValue::new(vec![0x13], vec![0; 64])).is_ok());
        assert!(TapKeySig::decode(&KeyValue::new(vec![0x13], vec![0; 65])).is_ok());
        assert!(TapKeySig::decode(&KeyValue::new(vec![0x13], vec![0; 63])).is_err());

        let sig = TapScriptSig {
            pubkey: [0xAA; 32],
            leaf_hash: [0xBB; 32],
            signature: vec![0xCC; 64],
        };
        let pair = sig.encode(0x14);
        assert_eq!(pair.key.len(), 65);
        assert_eq!(TapScriptSig::decode(&pair), Ok(sig.clone()));
        assert_eq!(sig.dedup_key().len(), 64);
        assert!(TapScriptSig::decode(&KeyValue::new(vec![0x14; 33], vec![0; 64])).is_err());
    }

    #[test]
    fn tap_leaf_script_parity() {
        let mut control_block = vec![0xC1];
        control_block.extend([0x11; 32]);
        let leaf = TapLeafScript {
            control_block: control_block.clone(),
            script: vec![0x51],
            leaf_version: 0xC0,
        };
        assert!(leaf.check());
        let pair = leaf.encode(0x15);
        assert_eq!(pair.value, vec![0x51, 0xC0]);
        assert_eq!(TapLeafScript::decode(&pair), Ok(leaf.clone()));

        let mut odd = leaf.clone();
        odd.leaf_version = 0xC1;
        assert!(!odd.check());
        assert!(matches!(
            TapLeafScript::decode(&odd.encode(0x15)),
            Err(PsbtError::InvalidField("tapLeafScript", _, _))
        ));

        let mut short = leaf.clone();
        short.control_block.pop();
        assert!(!short.check());
        assert!(matches!(
            TapLeafScript::decode(&short.encode(0x15)),
            Err(PsbtError::InvalidKey("tapLeafScript", _))
        ));

        let mut deep = leaf;
        deep.control_block.extend([0x22; 32]);
        assert!(deep.check());
    }
}
