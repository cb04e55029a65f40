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

use std::fmt::Debug;
use std::hash::Hash;

use amplify::hex::ToHex;

use crate::{varint, MapName, PsbtError};

pub trait KeyType: Copy + Ord + Eq + Hash + Debug + 'static {
    /// All key types with a registered field in the map.
    const STANDARD: &'static [Self];
    fn from_u8(val: u8) -> Self;
    fn into_u8(self) -> u8;
    /// Camel-case field name used in error messages.
    fn field_name(self) -> &'static str;
    /// Whether the key of a registered field carries data after the type byte.
    fn has_key_data(self) -> bool;
    fn is_known(self) -> bool;
}

const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_GLOBAL_XPUB: u8 = 0x01;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum GlobalKey {
    /// `PSBT_GLOBAL_UNSIGNED_TX`
    UnsignedTx,

    /// `PSBT_GLOBAL_XPUB`
    Xpub,

    /// All unknown keys, including proprietary ones
    Unknown(u8),
}

impl KeyType for GlobalKey {
    const STANDARD: &'static [Self] = &[Self::UnsignedTx, Self::Xpub];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_GLOBAL_UNSIGNED_TX => Self::UnsignedTx,
            PSBT_GLOBAL_XPUB => Self::Xpub,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            GlobalKey::UnsignedTx => PSBT_GLOBAL_UNSIGNED_TX,
            GlobalKey::Xpub => PSBT_GLOBAL_XPUB,
            GlobalKey::Unknown(key_type) => key_type,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            GlobalKey::UnsignedTx => "unsignedTx",
            GlobalKey::Xpub => "globalXpub",
            GlobalKey::Unknown(_) => "unknown",
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            GlobalKey::UnsignedTx => false,
            GlobalKey::Xpub => true,
            GlobalKey::Unknown(_) => true,
        }
    }

    fn is_known(self) -> bool { !matches!(self, GlobalKey::Unknown(_)) }
}

const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;
const PSBT_IN_FINAL_SCRIPTWITNESS: u8 = 0x08;
const PSBT_IN_POR_COMMITMENT: u8 = 0x09;
const PSBT_IN_TAP_KEY_SIG: u8 = 0x13;
const PSBT_IN_TAP_SCRIPT_SIG: u8 = 0x14;
const PSBT_IN_TAP_LEAF_SCRIPT: u8 = 0x15;
const PSBT_IN_TAP_BIP32_DERIVATION: u8 = 0x16;
const PSBT_IN_TAP_INTERNAL_KEY: u8 = 0x17;
const PSBT_IN_TAP_MERKLE_ROOT: u8 = 0x18;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum InputKey {
    /// `PSBT_IN_NON_WITNESS_UTXO`
    NonWitnessUtxo,

    /// `PSBT_IN_WITNESS_UTXO`
    WitnessUtxo,

    /// `PSBT_IN_PARTIAL_SIG`
    PartialSig,

    /// `PSBT_IN_SIGHASH_TYPE`
    SighashType,

    /// `PSBT_IN_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_IN_WITNESS_SCRIPT`
    WitnessScript,

    /// `PSBT_IN_BIP32_DERIVATION`
    Bip32Derivation,

    /// `PSBT_IN_FINAL_SCRIPTSIG`
    FinalScriptSig,

    /// `PSBT_IN_FINAL_SCRIPTWITNESS`
    FinalScriptWitness,

    /// `PSBT_IN_POR_COMMITMENT`
    PorCommitment,

    /// `PSBT_IN_TAP_KEY_SIG`
    TapKeySig,

    /// `PSBT_IN_TAP_SCRIPT_SIG`
    TapScriptSig,

    /// `PSBT_IN_TAP_LEAF_SCRIPT`
    TapLeafScript,

    /// `PSBT_IN_TAP_BIP32_DERIVATION`
    TapBip32Derivation,

    /// `PSBT_IN_TAP_INTERNAL_KEY`
    TapInternalKey,

    /// `PSBT_IN_TAP_MERKLE_ROOT`
    TapMerkleRoot,

    /// All unknown keys, including proprietary ones and hash preimages
    Unknown(u8),
}

impl KeyType for InputKey {
    const STANDARD: &'static [Self] = &[
        Self::NonWitnessUtxo,
        Self::WitnessUtxo,
        Self::PartialSig,
        Self::SighashType,
        Self::RedeemScript,
        Self::WitnessScript,
        Self::Bip32Derivation,
        Self::FinalScriptSig,
        Self::FinalScriptWitness,
        Self::PorCommitment,
        Self::TapKeySig,
        Self::TapScriptSig,
        Self::TapLeafScript,
        Self::TapBip32Derivation,
        Self::TapInternalKey,
        Self::TapMerkleRoot,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_IN_NON_WITNESS_UTXO => Self::NonWitnessUtxo,
            PSBT_IN_WITNESS_UTXO => Self::WitnessUtxo,
            PSBT_IN_PARTIAL_SIG => Self::PartialSig,
            PSBT_IN_SIGHASH_TYPE => Self::SighashType,
            PSBT_IN_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_IN_WITNESS_SCRIPT => Self::WitnessScript,
            PSBT_IN_BIP32_DERIVATION => Self::Bip32Derivation,
            PSBT_IN_FINAL_SCRIPTSIG => Self::FinalScriptSig,
            PSBT_IN_FINAL_SCRIPTWITNESS => Self::FinalScriptWitness,
            PSBT_IN_POR_COMMITMENT => Self::PorCommitment,
            PSBT_IN_TAP_KEY_SIG => Self::TapKeySig,
            PSBT_IN_TAP_SCRIPT_SIG => Self::TapScriptSig,
            PSBT_IN_TAP_LEAF_SCRIPT => Self::TapLeafScript,
            PSBT_IN_TAP_BIP32_DERIVATION => Self::TapBip32Derivation,
            PSBT_IN_TAP_INTERNAL_KEY => Self::TapInternalKey,
            PSBT_IN_TAP_MERKLE_ROOT => Self::TapMerkleRoot,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            InputKey::NonWitnessUtxo => PSBT_IN_NON_WITNESS_UTXO,
            InputKey::WitnessUtxo => PSBT_IN_WITNESS_UTXO,
            InputKey::PartialSig => PSBT_IN_PARTIAL_SIG,
            InputKey::SighashType => PSBT_IN_SIGHASH_TYPE,
            InputKey::RedeemScript => PSBT_IN_REDEEM_SCRIPT,
            InputKey::WitnessScript => PSBT_IN_WITNESS_SCRIPT,
            InputKey::Bip32Derivation => PSBT_IN_BIP32_DERIVATION,
            InputKey::FinalScriptSig => PSBT_IN_FINAL_SCRIPTSIG,
            InputKey::FinalScriptWitness => PSBT_IN_FINAL_SCRIPTWITNESS,
            InputKey::PorCommitment => PSBT_IN_POR_COMMITMENT,
            InputKey::TapKeySig => PSBT_IN_TAP_KEY_SIG,
            InputKey::TapScriptSig => PSBT_IN_TAP_SCRIPT_SIG,
            InputKey::TapLeafScript => PSBT_IN_TAP_LEAF_SCRIPT,
            InputKey::TapBip32Derivation => PSBT_IN_TAP_BIP32_DERIVATION,
            InputKey::TapInternalKey => PSBT_IN_TAP_INTERNAL_KEY,
            InputKey::TapMerkleRoot => PSBT_IN_TAP_MERKLE_ROOT,
            InputKey::Unknown(key_type) => key_type,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            InputKey::NonWitnessUtxo => "nonWitnessUtxo",
            InputKey::WitnessUtxo => "witnessUtxo",
            InputKey::PartialSig => "partialSig",
            InputKey::SighashType => "sighashType",
            InputKey::RedeemScript => "redeemScript",
            InputKey::WitnessScript => "witnessScript",
            InputKey::Bip32Derivation => "bip32Derivation",
            InputKey::FinalScriptSig => "finalScriptSig",
            InputKey::FinalScriptWitness => "finalScriptWitness",
            InputKey::PorCommitment => "porCommitment",
            InputKey::TapKeySig => "tapKeySig",
            InputKey::TapScriptSig => "tapScriptSig",
            InputKey::TapLeafScript => "tapLeafScript",
            InputKey::TapBip32Derivation => "tapBip32Derivation",
            InputKey::TapInternalKey => "tapInternalKey",
            InputKey::TapMerkleRoot => "tapMerkleRoot",
            InputKey::Unknown(_) => "unknown",
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            InputKey::PartialSig
            | InputKey::Bip32Derivation
            | InputKey::TapScriptSig
            | InputKey::TapLeafScript
            | InputKey::TapBip32Derivation => true,

            InputKey::NonWitnessUtxo
            | InputKey::WitnessUtxo
            | InputKey::SighashType
            | InputKey::RedeemScript
            | InputKey::WitnessScript
            | InputKey::FinalScriptSig
            | InputKey::FinalScriptWitness
            | InputKey::PorCommitment
            | InputKey::TapKeySig
            | InputKey::TapInternalKey
            | InputKey::TapMerkleRoot => false,

            InputKey::Unknown(_) => true,
        }
    }

    fn is_known(self) -> bool { !matches!(self, InputKey::Unknown(_)) }
}

const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;
const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;
const PSBT_OUT_TAP_INTERNAL_KEY: u8 = 0x05;
const PSBT_OUT_TAP_TREE: u8 = 0x06;
const PSBT_OUT_TAP_BIP32_DERIVATION: u8 = 0x07;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum OutputKey {
    /// `PSBT_OUT_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_OUT_WITNESS_SCRIPT`
    WitnessScript,

    /// `PSBT_OUT_BIP32_DERIVATION`
    Bip32Derivation,

    /// `PSBT_OUT_TAP_INTERNAL_KEY`
    TapInternalKey,

    /// `PSBT_OUT_TAP_TREE`
    TapTree,

    /// `PSBT_OUT_TAP_BIP32_DERIVATION`
    TapBip32Derivation,

    /// All unknown keys, including proprietary ones
    Unknown(u8),
}

impl KeyType for OutputKey {
    const STANDARD: &'static [Self] = &[
        Self::RedeemScript,
        Self::WitnessScript,
        Self::Bip32Derivation,
        Self::TapInternalKey,
        Self::TapTree,
        Self::TapBip32Derivation,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_OUT_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_OUT_WITNESS_SCRIPT => Self::WitnessScript,
            PSBT_OUT_BIP32_DERIVATION => Self::Bip32Derivation,
            PSBT_OUT_TAP_INTERNAL_KEY => Self::TapInternalKey,
            PSBT_OUT_TAP_TREE => Self::TapTree,
            PSBT_OUT_TAP_BIP32_DERIVATION => Self::TapBip32Derivation,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            OutputKey::RedeemScript => PSBT_OUT_REDEEM_SCRIPT,
            OutputKey::WitnessScript => PSBT_OUT_WITNESS_SCRIPT,
            OutputKey::Bip32Derivation => PSBT_OUT_BIP32_DERIVATION,
            OutputKey::TapInternalKey => PSBT_OUT_TAP_INTERNAL_KEY,
            OutputKey::TapTree => PSBT_OUT_TAP_TREE,
            OutputKey::TapBip32Derivation => PSBT_OUT_TAP_BIP32_DERIVATION,
            OutputKey::Unknown(key_type) => key_type,
        }
    }

    fn field_name(self) -> &'static str {
        match self {
            OutputKey::RedeemScript => "redeemScript",
            OutputKey::WitnessScript => "witnessScript",
            OutputKey::Bip32Derivation => "bip32Derivation",
            OutputKey::TapInternalKey => "tapInternalKey",
            OutputKey::TapTree => "tapTree",
            OutputKey::TapBip32Derivation => "tapBip32Derivation",
            OutputKey::Unknown(_) => "unknown",
        }
    }

    fn has_key_data(self) -> bool {
        match self {
            OutputKey::Bip32Derivation | OutputKey::TapBip32Derivation => true,
            OutputKey::RedeemScript
            | OutputKey::WitnessScript
            | OutputKey::TapInternalKey
            | OutputKey::TapTree => false,
            OutputKey::Unknown(_) => true,
        }
    }

    fn is_known(self) -> bool { !matches!(self, OutputKey::Unknown(_)) }
}

/// Raw PSBT key-value pair; the first key byte is the type discriminant.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn with_type(key_type: u8, key_data: &[u8], value: impl Into<Vec<u8>>) -> Self {
        let mut key = Vec::with_capacity(key_data.len() + 1);
        key.push(key_type);
        key.extend_from_slice(key_data);
        KeyValue::new(key, value)
    }

    /// Type byte of the key, or `None` for an empty key.
    #[inline]
    pub fn key_type(&self) -> Option<u8> { self.key.first().copied() }

    /// Key bytes following the type byte.
    #[inline]
    pub fn key_data(&self) -> &[u8] { self.key.get(1..).unwrap_or_default() }
}

pub(crate) enum MapEntry {
    Pair(KeyValue),
    Separator,
}

const PSBT_PROPRIETARY: u8 = 0xFC;

/// Parsed view of a proprietary (`0xFC`) key.
///
/// Proprietary pairs are stored among the unknown key-values of a map; this
/// type only exposes their structure.
#[derive(Clone, PartialOrd, Ord, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display("{identifier} {subtype:#x}")]
pub struct PropKey {
    pub identifier: String,
    pub subtype: u64,
    pub data: Vec<u8>,
}

impl PropKey {
    /// Parses key bytes of the form `0xFC <varint len> <identifier> <varint subtype> <data>`.
    ///
    /// Returns `None` for non-proprietary or malformed keys.
    pub fn from_key(key: &[u8]) -> Option<Self> {
        let (&key_type, _) = key.split_first()?;
        if key_type != PSBT_PROPRIETARY {
            return None;
        }
        let (id_len, consumed) = varint::decode(key, 1).ok()?;
        let start = 1 + consumed;
        let end = start.checked_add(usize::try_from(id_len).ok()?)?;
        let identifier = String::from_utf8(key.get(start..end)?.to_vec()).ok()?;
        let (subtype, consumed) = varint::decode(key, end).ok()?;
        let data = key[end + consumed..].to_vec();
        Some(PropKey {
            identifier,
            subtype,
            data,
        })
    }
}

/// Checks that `pair` can be added as an unknown key-value to a map of key type `K`
/// already holding `existing` pairs.
pub fn check_has_key<K: KeyType>(
    map: MapName,
    pair: &KeyValue,
    existing: &[KeyValue],
) -> Result<(), PsbtError> {
    let key_type = pair.key_type().ok_or(PsbtError::EmptyKey(map))?;
    if K::from_u8(key_type).is_known() {
        return Err(PsbtError::KnownKeyType(map, key_type));
    }
    if existing.iter().any(|kv| kv.key == pair.key) {
        return Err(PsbtError::RepeatedKey(map, pair.key.to_hex()));
    }
    Ok(())
}
