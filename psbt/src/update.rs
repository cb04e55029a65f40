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

//! Typed updates of PSBT maps.
//!
//! An update is validated against the target map as a whole before any of
//! its values gets written, so a failing update leaves the map untouched.

use std::collections::BTreeSet;

use crate::{
    check_has_key, Bip32Derivation, FinalScriptSig, FinalScriptWitness, GlobalXpub, Input,
    KeyMap, KeyValue, MapName, NonWitnessUtxo, Output, PartialSig, PluralField, PorCommitment,
    PsbtError, PsbtGlobal, RedeemScript, SighashType, SingularField, TapBip32Derivation,
    TapInternalKey, TapKeySig, TapLeafScript, TapMerkleRoot, TapScriptSig, TapTree, Transaction,
    WitnessScript, WitnessUtxo,
};

pub trait Update<M: KeyMap>: Sized {
    /// Checks all values of the update against the current state of `map`.
    fn validate(&self, map: &M) -> Result<(), PsbtError>;

    #[doc(hidden)]
    fn commit(self, map: &mut M);

    fn apply(self, map: &mut M) -> Result<(), PsbtError> {
        self.validate(map)?;
        self.commit(map);
        Ok(())
    }
}

fn check_singular<F: SingularField>(
    map: MapName,
    current: Option<&F>,
    value: Option<&F>,
) -> Result<(), PsbtError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !value.check() {
        return Err(PsbtError::InvalidUpdate(F::NAME, F::EXPECTED, value.received()));
    }
    if !F::can_add(current) {
        return Err(PsbtError::DuplicateField(F::NAME, map));
    }
    Ok(())
}

fn check_plural<F: PluralField>(map: MapName, array: &[F], items: &[F]) -> Result<(), PsbtError> {
    let mut seen = BTreeSet::new();
    for item in items {
        if !item.check() {
            return Err(PsbtError::InvalidUpdate(F::NAME, F::EXPECTED, item.received()));
        }
        if !F::can_add_to_array(array, item, &mut seen) {
            return Err(PsbtError::DuplicateArrayItem(F::NAME, map));
        }
    }
    Ok(())
}

fn check_unknown<M: KeyMap>(map: &M, items: &[KeyValue]) -> Result<(), PsbtError> {
    if items.is_empty() {
        return Ok(());
    }
    let mut existing = map.to_pairs();
    for item in items {
        check_has_key::<M::Keys>(map.map_name(), item, &existing)?;
        existing.push(item.clone());
    }
    Ok(())
}

fn commit_unknown<M: KeyMap>(map: &mut M, items: Vec<KeyValue>) {
    for pair in items {
        map._unknown_map_mut().insert(pair.key, pair.value);
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct GlobalUpdate {
    pub global_xpub: Vec<GlobalXpub>,
    pub unknown: Vec<KeyValue>,
}

impl<T: Transaction> Update<PsbtGlobal<T>> for GlobalUpdate {
    fn validate(&self, map: &PsbtGlobal<T>) -> Result<(), PsbtError> {
        check_plural(MapName::Global, &map.global_xpub, &self.global_xpub)?;
        check_unknown(map, &self.unknown)
    }

    fn commit(self, map: &mut PsbtGlobal<T>) {
        map.global_xpub.extend(self.global_xpub);
        commit_unknown(map, self.unknown);
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct InputUpdate {
    pub non_witness_utxo: Option<NonWitnessUtxo>,
    pub witness_utxo: Option<WitnessUtxo>,
    pub partial_sig: Vec<PartialSig>,
    pub sighash_type: Option<SighashType>,
    pub redeem_script: Option<RedeemScript>,
    pub witness_script: Option<WitnessScript>,
    pub bip32_derivation: Vec<Bip32Derivation>,
    pub final_script_sig: Option<FinalScriptSig>,
    pub final_script_witness: Option<FinalScriptWitness>,
    pub por_commitment: Option<PorCommitment>,
    pub tap_key_sig: Option<TapKeySig>,
    pub tap_script_sig: Vec<TapScriptSig>,
    pub tap_leaf_script: Vec<TapLeafScript>,
    pub tap_bip32_derivation: Vec<TapBip32Derivation>,
    pub tap_internal_key: Option<TapInternalKey>,
    pub tap_merkle_root: Option<TapMerkleRoot>,
    pub unknown: Vec<KeyValue>,
}

macro_rules! commit_singular {
    ($map:ident, $update:ident, $($field:ident),+) => {
        $( if $update.$field.is_some() { $map.$field = $update.$field; } )+
    };
}

macro_rules! commit_plural {
    ($map:ident, $update:ident, $($field:ident),+) => {
        $( $map.$field.extend($update.$field); )+
    };
}

impl Update<Input> for InputUpdate {
    fn validate(&self, map: &Input) -> Result<(), PsbtError> {
        let name = map.map_name();
        check_singular(name, map.non_witness_utxo.as_ref(), self.non_witness_utxo.as_ref())?;
        check_singular(name, map.witness_utxo.as_ref(), self.witness_utxo.as_ref())?;
        check_plural(name, &map.partial_sig, &self.partial_sig)?;
        check_singular(name, map.sighash_type.as_ref(), self.sighash_type.as_ref())?;
        check_singular(name, map.redeem_script.as_ref(), self.redeem_script.as_ref())?;
        check_singular(name, map.witness_script.as_ref(), self.witness_script.as_ref())?;
        check_plural(name, &map.bip32_derivation, &self.bip32_derivation)?;
        check_singular(name, map.final_script_sig.as_ref(), self.final_script_sig.as_ref())?;
        check_singular(
            name,
            map.final_script_witness.as_ref(),
            self.final_script_witness.as_ref(),
        )?;
        check_singular(name, map.por_commitment.as_ref(), self.por_commitment.as_ref())?;
        check_singular(name, map.tap_key_sig.as_ref(), self.tap_key_sig.as_ref())?;
        check_plural(name, &map.tap_script_sig, &self.tap_script_sig)?;
        check_plural(name, &map.tap_leaf_script, &self.tap_leaf_script)?;
        check_plural(name, &map.tap_bip32_derivation, &self.tap_bip32_derivation)?;
        check_singular(name, map.tap_internal_key.as_ref(), self.tap_internal_key.as_ref())?;
        check_singular(name, map.tap_merkle_root.as_ref(), self.tap_merkle_root.as_ref())?;
        check_unknown(map, &self.unknown)
    }

    fn commit(self, map: &mut Input) {
        commit_singular!(
            map,
            self,
            non_witness_utxo,
            witness_utxo,
            sighash_type,
            redeem_script,
            witness_script,
            final_script_sig,
            final_script_witness,
            por_commitment,
            tap_key_sig,
            tap_internal_key,
            tap_merkle_root
        );
        commit_plural!(
            map,
            self,
            partial_sig,
            bip32_derivation,
            tap_script_sig,
            tap_leaf_script,
            tap_bip32_derivation
        );
        commit_unknown(map, self.unknown);
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct OutputUpdate {
    pub redeem_script: Option<RedeemScript>,
    pub witness_script: Option<WitnessScript>,
    pub bip32_derivation: Vec<Bip32Derivation>,
    pub tap_internal_key: Option<TapInternalKey>,
    pub tap_tree: Option<TapTree>,
    pub tap_bip32_derivation: Vec<TapBip32Derivation>,
    pub unknown: Vec<KeyValue>,
}

impl Update<Output> for OutputUpdate {
    fn validate(&self, map: &Output) -> Result<(), PsbtError> {
        let name = map.map_name();
        check_singular(name, map.redeem_script.as_ref(), self.redeem_script.as_ref())?;
        check_singular(name, map.witness_script.as_ref(), self.witness_script.as_ref())?;
        check_plural(name, &map.bip32_derivation, &self.bip32_derivation)?;
        check_singular(name, map.tap_internal_key.as_ref(), self.tap_internal_key.as_ref())?;
        check_singular(name, map.tap_tree.as_ref(), self.tap_tree.as_ref())?;
        check_plural(name, &map.tap_bip32_derivation, &self.tap_bip32_derivation)?;
        check_unknown(map, &self.unknown)
    }

    fn commit(self, map: &mut Output) {
        commit_singular!(map, self, redeem_script, witness_script, tap_internal_key, tap_tree);
        commit_plural!(map, self, bip32_derivation, tap_bip32_derivation);
        commit_unknown(map, self.unknown);
    }
}
