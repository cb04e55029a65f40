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

use std::collections::BTreeMap;

use amplify::hex::ToHex;
use indexmap::IndexMap;

use crate::coders::check_unique;
use crate::{
    check_has_key, Bip32Derivation, Field, FinalScriptSig, FinalScriptWitness, GlobalKey,
    GlobalXpub, Input, InputKey, KeyType, KeyValue, NonWitnessUtxo, Output, OutputKey,
    PartialSig, PorCommitment, PropKey, Psbt, PsbtError, PsbtGlobal, RedeemScript, SighashType,
    TapBip32Derivation, TapInternalKey, TapKeySig, TapLeafScript, TapMerkleRoot, TapScriptSig,
    TapTree, Transaction, WitnessScript, WitnessUtxo,
};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum MapName {
    #[display("global")]
    Global,

    #[display("input #{0}")]
    Input(usize),

    #[display("output #{0}")]
    Output(usize),
}

/// Key-value pairs of a single map split into pairs of registered field types
/// and unknown pairs.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Map<K: KeyType> {
    pub name: MapName,
    pub known: Vec<(K, KeyValue)>,
    pub unknown: IndexMap<Vec<u8>, Vec<u8>>,
}

impl<K: KeyType> Map<K> {
    pub fn with(name: MapName, pairs: Vec<KeyValue>) -> Result<Self, PsbtError> {
        check_unique(name, &pairs)?;
        let mut map = Map {
            name,
            known: empty!(),
            unknown: empty!(),
        };
        for pair in pairs {
            let key_type = K::from_u8(pair.key_type().ok_or(PsbtError::EmptyKey(name))?);
            if key_type.is_known() {
                if !key_type.has_key_data() && pair.key.len() != 1 {
                    return Err(PsbtError::InvalidKey(key_type.field_name(), pair.key.to_hex()));
                }
                map.known.push((key_type, pair));
            } else {
                map.unknown.insert(pair.key, pair.value);
            }
        }
        Ok(map)
    }
}

/// Raw key-value content of all maps of a PSBT.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PsbtKeyValues {
    pub global: Vec<KeyValue>,
    pub inputs: Vec<Vec<KeyValue>>,
    pub outputs: Vec<Vec<KeyValue>>,
}

fn encode_fields<'a, F: Field + 'a>(
    fields: impl IntoIterator<Item = &'a F>,
    key_type: impl KeyType,
) -> Vec<KeyValue> {
    fields.into_iter().map(|field| field.encode(key_type.into_u8())).collect()
}

pub trait KeyMap: Sized {
    type Keys: KeyType;

    fn map_name(&self) -> MapName;

    /// Encodes all values of the field registered under `key_type`.
    fn retrieve_pairs(&self, key_type: Self::Keys) -> Vec<KeyValue>;

    /// Decodes a pair of a registered field type and stores it in the map.
    fn insert_known(&mut self, key_type: Self::Keys, pair: &KeyValue) -> Result<(), PsbtError>;

    #[doc(hidden)]
    fn _unknown_map(&self) -> &IndexMap<Vec<u8>, Vec<u8>>;
    #[doc(hidden)]
    fn _unknown_map_mut(&mut self) -> &mut IndexMap<Vec<u8>, Vec<u8>>;

    fn known_pairs(&self) -> Vec<KeyValue> {
        Self::Keys::STANDARD
            .iter()
            .flat_map(|key_type| self.retrieve_pairs(*key_type))
            .collect()
    }

    /// All pairs of the map sorted by key bytes. Unknown pairs whose key
    /// collides with an encoded field are skipped.
    fn to_pairs(&self) -> Vec<KeyValue> {
        let mut pairs = BTreeMap::new();
        for pair in self.known_pairs() {
            pairs.insert(pair.key, pair.value);
        }
        for (key, value) in self._unknown_map() {
            pairs.entry(key.clone()).or_insert_with(|| value.clone());
        }
        pairs.into_iter().map(|(key, value)| KeyValue { key, value }).collect()
    }

    fn parse_map(&mut self, map: Map<Self::Keys>) -> Result<(), PsbtError> {
        for (key_type, pair) in &map.known {
            self.insert_known(*key_type, pair)?;
        }
        for (key, value) in map.unknown {
            self._unknown_map_mut().insert(key, value);
        }
        Ok(())
    }

    /// Adds a pair of an unregistered type, failing on registered types and
    /// on keys which are already present.
    fn add_unknown(&mut self, pair: KeyValue) -> Result<(), PsbtError> {
        check_has_key::<Self::Keys>(self.map_name(), &pair, &self.to_pairs())?;
        self._unknown_map_mut().insert(pair.key, pair.value);
        Ok(())
    }

    /// Proprietary pairs stored among the unknown ones.
    fn proprietary(&self) -> Vec<(PropKey, &[u8])> {
        self._unknown_map()
            .iter()
            .filter_map(|(key, value)| PropKey::from_key(key).map(|prop| (prop, value.as_slice())))
            .collect()
    }
}

impl<T: Transaction> KeyMap for PsbtGlobal<T> {
    type Keys = GlobalKey;

    fn map_name(&self) -> MapName { MapName::Global }

    fn _unknown_map(&self) -> &IndexMap<Vec<u8>, Vec<u8>> { &self.unknown }
    fn _unknown_map_mut(&mut self) -> &mut IndexMap<Vec<u8>, Vec<u8>> { &mut self.unknown }

    fn retrieve_pairs(&self, key_type: Self::Keys) -> Vec<KeyValue> {
        match key_type {
            GlobalKey::UnsignedTx => {
                vec![KeyValue::with_type(key_type.into_u8(), &[], self.unsigned_tx.to_bytes())]
            }
            GlobalKey::Xpub => encode_fields(&self.global_xpub, key_type),
            GlobalKey::Unknown(_) => none!(),
        }
    }

    fn insert_known(&mut self, key_type: Self::Keys, pair: &KeyValue) -> Result<(), PsbtError> {
        match key_type {
            // the transaction itself is taken before the map gets parsed
            GlobalKey::UnsignedTx => {
                return Err(PsbtError::InvalidKey(key_type.field_name(), pair.key.to_hex()));
            }
            GlobalKey::Xpub => self.global_xpub.push(GlobalXpub::decode(pair)?),
            GlobalKey::Unknown(_) => {
                self.unknown.insert(pair.key.clone(), pair.value.clone());
            }
        }
        Ok(())
    }
}

impl KeyMap for Input {
    type Keys = InputKey;

    fn map_name(&self) -> MapName { MapName::Input(self.index) }

    fn _unknown_map(&self) -> &IndexMap<Vec<u8>, Vec<u8>> { &self.unknown }
    fn _unknown_map_mut(&mut self) -> &mut IndexMap<Vec<u8>, Vec<u8>> { &mut self.unknown }

    fn retrieve_pairs(&self, key_type: Self::Keys) -> Vec<KeyValue> {
        match key_type {
            InputKey::NonWitnessUtxo => encode_fields(&self.non_witness_utxo, key_type),
            InputKey::WitnessUtxo => encode_fields(&self.witness_utxo, key_type),
            InputKey::PartialSig => encode_fields(&self.partial_sig, key_type),
            InputKey::SighashType => encode_fields(&self.sighash_type, key_type),
            InputKey::RedeemScript => encode_fields(&self.redeem_script, key_type),
            InputKey::WitnessScript => encode_fields(&self.witness_script, key_type),
            InputKey::Bip32Derivation => encode_fields(&self.bip32_derivation, key_type),
            InputKey::FinalScriptSig => encode_fields(&self.final_script_sig, key_type),
            InputKey::FinalScriptWitness => encode_fields(&self.final_script_witness, key_type),
            InputKey::PorCommitment => encode_fields(&self.por_commitment, key_type),
            InputKey::TapKeySig => encode_fields(&self.tap_key_sig, key_type),
            InputKey::TapScriptSig => encode_fields(&self.tap_script_sig, key_type),
            InputKey::TapLeafScript => encode_fields(&self.tap_leaf_script, key_type),
            InputKey::TapBip32Derivation => encode_fields(&self.tap_bip32_derivation, key_type),
            InputKey::TapInternalKey => encode_fields(&self.tap_internal_key, key_type),
            InputKey::TapMerkleRoot => encode_fields(&self.tap_merkle_root, key_type),
            InputKey::Unknown(_) => none!(),
        }
    }

    fn insert_known(&mut self, key_type: Self::Keys, pair: &KeyValue) -> Result<(), PsbtError> {
        match key_type {
            InputKey::NonWitnessUtxo => {
                self.non_witness_utxo = Some(NonWitnessUtxo::decode(pair)?)
            }
            InputKey::WitnessUtxo => self.witness_utxo = Some(WitnessUtxo::decode(pair)?),
            InputKey::PartialSig => self.partial_sig.push(PartialSig::decode(pair)?),
            InputKey::SighashType => self.sighash_type = Some(SighashType::decode(pair)?),
            InputKey::RedeemScript => self.redeem_script = Some(RedeemScript::decode(pair)?),
            InputKey::WitnessScript => self.witness_script = Some(WitnessScript::decode(pair)?),
            InputKey::Bip32Derivation => {
                self.bip32_derivation.push(Bip32Derivation::decode(pair)?)
            }
            InputKey::FinalScriptSig => {
                self.final_script_sig = Some(FinalScriptSig::decode(pair)?)
            }
            InputKey::FinalScriptWitness => {
                self.final_script_witness = Some(FinalScriptWitness::decode(pair)?)
            }
            InputKey::PorCommitment => self.por_commitment = Some(PorCommitment::decode(pair)?),
            InputKey::TapKeySig => self.tap_key_sig = Some(TapKeySig::decode(pair)?),
            InputKey::TapScriptSig => self.tap_script_sig.push(TapScriptSig::decode(pair)?),
            InputKey::TapLeafScript => self.tap_leaf_script.push(TapLeafScript::decode(pair)?),
            InputKey::TapBip32Derivation => {
                self.tap_bip32_derivation.push(TapBip32Derivation::decode(pair)?)
            }
            InputKey::TapInternalKey => {
                self.tap_internal_key = Some(TapInternalKey::decode(pair)?)
            }
            InputKey::TapMerkleRoot => self.tap_merkle_root = Some(TapMerkleRoot::decode(pair)?),
            InputKey::Unknown(_) => {
                self.unknown.insert(pair.key.clone(), pair.value.clone());
            }
        }
        Ok(())
    }
}

impl KeyMap for Output {
    type Keys = OutputKey;

    fn map_name(&self) -> MapName { MapName::Output(self.index) }

    fn _unknown_map(&self) -> &IndexMap<Vec<u8>, Vec<u8>> { &self.unknown }
    fn _unknown_map_mut(&mut self) -> &mut IndexMap<Vec<u8>, Vec<u8>> { &mut self.unknown }

    fn retrieve_pairs(&self, key_type: Self::Keys) -> Vec<KeyValue> {
        match key_type {
            OutputKey::RedeemScript => encode_fields(&self.redeem_script, key_type),
            OutputKey::WitnessScript => encode_fields(&self.witness_script, key_type),
            OutputKey::Bip32Derivation => encode_fields(&self.bip32_derivation, key_type),
            OutputKey::TapInternalKey => encode_fields(&self.tap_internal_key, key_type),
            OutputKey::TapTree => encode_fields(&self.tap_tree, key_type),
            OutputKey::TapBip32Derivation => encode_fields(&self.tap_bip32_derivation, key_type),
            OutputKey::Unknown(_) => none!(),
        }
    }

    fn insert_known(&mut self, key_type: Self::Keys, pair: &KeyValue) -> Result<(), PsbtError> {
        match key_type {
            OutputKey::RedeemScript => self.redeem_script = Some(RedeemScript::decode(pair)?),
            OutputKey::WitnessScript => self.witness_script = Some(WitnessScript::decode(pair)?),
            OutputKey::Bip32Derivation => {
                self.bip32_derivation.push(Bip32Derivation::decode(pair)?)
            }
            OutputKey::TapInternalKey => {
                self.tap_internal_key = Some(TapInternalKey::decode(pair)?)
            }
            OutputKey::TapTree => self.tap_tree = Some(TapTree::decode(pair)?),
            OutputKey::TapBip32Derivation => {
                self.tap_bip32_derivation.push(TapBip32Derivation::decode(pair)?)
            }
            OutputKey::Unknown(_) => {
                self.unknown.insert(pair.key.clone(), pair.value.clone());
            }
        }
        Ok(())
    }
}

/// Builds typed maps from raw key-value sets around an already decoded
/// unsigned transaction.
///
/// The global `UNSIGNED_TX` pair, if present, is skipped: its content is
/// represented by `tx`.
pub(crate) fn psbt_from_key_values<T: Transaction>(
    tx: T,
    global: Vec<KeyValue>,
    inputs: Vec<Vec<KeyValue>>,
    outputs: Vec<Vec<KeyValue>>,
) -> Result<Psbt<T>, PsbtError> {
    let counts = tx.input_output_counts();
    if counts.inputs != inputs.len() {
        return Err(PsbtError::InputCountMismatch(counts.inputs, inputs.len()));
    }
    if counts.outputs != outputs.len() {
        return Err(PsbtError::OutputCountMismatch(counts.outputs, outputs.len()));
    }

    let unsigned_tx_key = [GlobalKey::UnsignedTx.into_u8()];
    let global = global
        .into_iter()
        .filter(|pair| pair.key != unsigned_tx_key)
        .collect();

    let mut psbt = Psbt {
        global: PsbtGlobal::new(tx),
        inputs: empty!(),
        outputs: empty!(),
    };
    psbt.global.parse_map(Map::with(MapName::Global, global)?)?;
    for (index, pairs) in inputs.into_iter().enumerate() {
        let mut input = Input::new(index);
        input.parse_map(Map::with(MapName::Input(index), pairs)?)?;
        psbt.inputs.push(input);
    }
    for (index, pairs) in outputs.into_iter().enumerate() {
        let mut output = Output::new(index);
        output.parse_map(Map::with(MapName::Output(index), pairs)?)?;
        psbt.outputs.push(output);
    }
    trace!(
        "built PSBT maps: {} global xpubs, {} inputs, {} outputs",
        psbt.global.global_xpub.len(),
        psbt.inputs.len(),
        psbt.outputs.len()
    );
    Ok(psbt)
}

impl<T: Transaction> Psbt<T> {
    /// Raw key-value content of all maps, each map sorted by key bytes.
    pub fn to_key_values(&self) -> PsbtKeyValues {
        PsbtKeyValues {
            global: self.global.to_pairs(),
            inputs: self.inputs.iter().map(Input::to_pairs).collect(),
            outputs: self.outputs.iter().map(Output::to_pairs).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use derive::{LockTime, TxVer, VarIntArray};

    use super::*;
    use crate::tx::test::outpoint;
    use crate::{UnsignedTx, UnsignedTxIn};

    #[test]
    fn sorted_pairs() {
        let mut input = Input::new(0);
        input.unknown.insert(vec![0xF0], vec![0x01]);
        input.sighash_type = Some(SighashType::ALL);
        input.redeem_script = Some(RedeemScript(vec![0x51]));
        input.unknown.insert(vec![0x01, 0x02], vec![0x02]);
        let keys = input.to_pairs().into_iter().map(|pair| pair.key).collect::<Vec<_>>();
        assert_eq!(keys, vec![vec![0x01, 0x02], vec![0x03], vec![0x04], vec![0xF0]]);
    }

    #[test]
    fn known_field_wins_over_unknown() {
        let mut output = Output::new(0);
        output.redeem_script = Some(RedeemScript(vec![0x51]));
        output.unknown.insert(vec![0x00], vec![0x52]);
        assert_eq!(output.to_pairs(), vec![KeyValue::new(vec![0x00], vec![0x51])]);
    }

    #[test]
    fn dispatch() {
        let pairs = vec![
            KeyValue::new(vec![0x03], vec![0x01, 0x00, 0x00, 0x00]),
            KeyValue::new(vec![0x0A, 0xAB], vec![0xCD]),
            KeyValue::new(vec![0xFC, 0x02, b'b', b'p', 0x01], vec![0xEF]),
        ];
        let map = Map::<InputKey>::with(MapName::Input(0), pairs).unwrap();
        assert_eq!(map.known.len(), 1);
        assert_eq!(map.unknown.len(), 2);

        let mut input = Input::new(0);
        input.parse_map(map).unwrap();
        assert_eq!(input.sighash_type, Some(SighashType::ALL));
        assert_eq!(input.unknown.get(&vec![0x0A, 0xAB]), Some(&vec![0xCD]));
        let proprietary = input.proprietary();
        assert_eq!(proprietary.len(), 1);
        assert_eq!(proprietary[0].0.identifier, "bp");
        assert_eq!(proprietary[0].1, &[0xEF]);
    }

    #[test]
    fn singular_key_with_data() {
        let pairs = vec![KeyValue::new(vec![0x03, 0x00], vec![0x01, 0x00, 0x00, 0x00])];
        assert_eq!(
            Map::<InputKey>::with(MapName::Input(2), pairs).unwrap_err(),
            PsbtError::InvalidKey("sighashType", s!("0300"))
        );

        let pairs = vec![KeyValue::new(vec![0x00, 0x01], vec![])];
        assert_eq!(
            Map::<GlobalKey>::with(MapName::Global, pairs).unwrap_err(),
            PsbtError::InvalidKey("unsignedTx", s!("0001"))
        );

        // plural fields and unknown types keep their key data
        let pairs = vec![
            KeyValue::new(vec![0x02, 0x03], vec![]),
            KeyValue::new(vec![0x0A, 0x01], vec![]),
        ];
        let map = Map::<OutputKey>::with(MapName::Output(0), pairs).unwrap();
        assert_eq!(map.known.len(), 1);
        assert_eq!(map.unknown.len(), 1);
    }

    #[test]
    fn count_mismatch() {
        let tx = UnsignedTx {
            version: TxVer::V2,
            inputs: VarIntArray::from_iter_checked([UnsignedTxIn::new(outpoint(0x11, 0))]),
            outputs: none!(),
            lock_time: LockTime::ZERO,
        };
        assert_eq!(
            psbt_from_key_values(tx.clone(), vec![], vec![], vec![]).unwrap_err(),
            PsbtError::InputCountMismatch(1, 0)
        );
        assert_eq!(
            psbt_from_key_values(tx.clone(), vec![], vec![vec![]], vec![vec![]]).unwrap_err(),
            PsbtError::OutputCountMismatch(0, 1)
        );
        let psbt = psbt_from_key_values(tx, vec![], vec![vec![]], vec![]).unwrap();
        assert_eq!(psbt.inputs.len(), 1);
    }
}
