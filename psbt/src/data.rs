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

use indexmap::IndexMap;

pub use self::display_from_str::PsbtParseError;
use crate::{
    Bip32Derivation, FinalScriptSig, FinalScriptWitness, GlobalUpdate, GlobalXpub, InputUpdate,
    KeyMap, KeyValue, NonWitnessUtxo, OutputUpdate, PartialSig, PorCommitment, PsbtError,
    RedeemScript, SighashType, TapBip32Derivation, TapInternalKey, TapKeySig, TapLeafScript,
    TapMerkleRoot, TapScriptSig, TapTree, Transaction, UnsignedTx, Update, WitnessScript,
    WitnessUtxo,
};

/// Global map of a PSBT.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(crate = "serde_crate", rename_all = "camelCase", bound(serialize = "T: serde::Serialize"))
)]
pub struct PsbtGlobal<T: Transaction> {
    pub(crate) unsigned_tx: T,
    pub global_xpub: Vec<GlobalXpub>,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::unknown_as_seq"))]
    pub unknown: IndexMap<Vec<u8>, Vec<u8>>,
}

impl<T: Transaction> PsbtGlobal<T> {
    pub fn new(unsigned_tx: T) -> Self {
        PsbtGlobal {
            unsigned_tx,
            global_xpub: empty!(),
            unknown: empty!(),
        }
    }

    #[inline]
    pub fn unsigned_tx(&self) -> &T { &self.unsigned_tx }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Input {
    /// The index of this input. Used in error reporting.
    pub(crate) index: usize,

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

    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::unknown_as_seq"))]
    pub unknown: IndexMap<Vec<u8>, Vec<u8>>,
}

impl Input {
    pub fn new(index: usize) -> Self {
        Input {
            index,
            non_witness_utxo: None,
            witness_utxo: None,
            partial_sig: empty!(),
            sighash_type: None,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: empty!(),
            final_script_sig: None,
            final_script_witness: None,
            por_commitment: None,
            tap_key_sig: None,
            tap_script_sig: empty!(),
            tap_leaf_script: empty!(),
            tap_bip32_derivation: empty!(),
            tap_internal_key: None,
            tap_merkle_root: None,
            unknown: empty!(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize { self.index }

    /// Whether the input carries any final script.
    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some() || self.final_script_witness.is_some()
    }

    fn check_finalization(&self) -> bool {
        let has_utxo = self.witness_utxo.is_some() || self.non_witness_utxo.is_some();
        let needs_sig = self.redeem_script.is_some() && self.final_script_sig.is_none();
        let needs_witness = self.witness_script.is_some() && self.final_script_witness.is_none();
        has_utxo && self.is_finalized() && !needs_sig && !needs_witness
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Output {
    /// The index of this output. Used in error reporting.
    pub(crate) index: usize,

    pub redeem_script: Option<RedeemScript>,
    pub witness_script: Option<WitnessScript>,
    pub bip32_derivation: Vec<Bip32Derivation>,
    pub tap_internal_key: Option<TapInternalKey>,
    pub tap_tree: Option<TapTree>,
    pub tap_bip32_derivation: Vec<TapBip32Derivation>,

    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::unknown_as_seq"))]
    pub unknown: IndexMap<Vec<u8>, Vec<u8>>,
}

impl Output {
    pub fn new(index: usize) -> Self {
        Output {
            index,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: empty!(),
            tap_internal_key: None,
            tap_tree: None,
            tap_bip32_derivation: empty!(),
            unknown: empty!(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize { self.index }
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize),
    serde(crate = "serde_crate", rename_all = "camelCase", bound(serialize = "T: serde::Serialize"))
)]
pub struct Psbt<T: Transaction = UnsignedTx> {
    pub(crate) global: PsbtGlobal<T>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
}

impl<T: Transaction> Psbt<T> {
    /// Creates PSBT with an empty map for each of the transaction inputs and outputs.
    pub fn new(unsigned_tx: T) -> Self {
        let counts = unsigned_tx.input_output_counts();
        Psbt {
            global: PsbtGlobal::new(unsigned_tx),
            inputs: (0..counts.inputs).map(Input::new).collect(),
            outputs: (0..counts.outputs).map(Output::new).collect(),
        }
    }

    #[inline]
    pub fn global(&self) -> &PsbtGlobal<T> { &self.global }

    #[inline]
    pub fn unsigned_tx(&self) -> &T { &self.global.unsigned_tx }

    /// Serialized unsigned transaction.
    pub fn get_transaction(&self) -> Vec<u8> { self.global.unsigned_tx.to_bytes() }

    pub fn input(&self, index: usize) -> Result<&Input, PsbtError> {
        self.inputs
            .get(index)
            .ok_or(PsbtError::InputIndexOutOfRange(index, self.inputs.len()))
    }

    pub fn input_mut(&mut self, index: usize) -> Result<&mut Input, PsbtError> {
        let count = self.inputs.len();
        self.inputs.get_mut(index).ok_or(PsbtError::InputIndexOutOfRange(index, count))
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Input> { self.inputs.iter() }

    pub fn output(&self, index: usize) -> Result<&Output, PsbtError> {
        self.outputs
            .get(index)
            .ok_or(PsbtError::OutputIndexOutOfRange(index, self.outputs.len()))
    }

    pub fn output_mut(&mut self, index: usize) -> Result<&mut Output, PsbtError> {
        let count = self.outputs.len();
        self.outputs.get_mut(index).ok_or(PsbtError::OutputIndexOutOfRange(index, count))
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> { self.outputs.iter() }

    pub fn update_global(&mut self, update: GlobalUpdate) -> Result<&mut Self, PsbtError> {
        update.apply(&mut self.global)?;
        Ok(self)
    }

    pub fn update_input(
        &mut self,
        index: usize,
        update: InputUpdate,
    ) -> Result<&mut Self, PsbtError> {
        update.apply(self.input_mut(index)?)?;
        Ok(self)
    }

    pub fn update_output(
        &mut self,
        index: usize,
        update: OutputUpdate,
    ) -> Result<&mut Self, PsbtError> {
        update.apply(self.output_mut(index)?)?;
        Ok(self)
    }

    pub fn add_unknown_key_val_to_global(
        &mut self,
        pair: KeyValue,
    ) -> Result<&mut Self, PsbtError> {
        self.global.add_unknown(pair)?;
        Ok(self)
    }

    pub fn add_unknown_key_val_to_input(
        &mut self,
        index: usize,
        pair: KeyValue,
    ) -> Result<&mut Self, PsbtError> {
        self.input_mut(index)?.add_unknown(pair)?;
        Ok(self)
    }

    pub fn add_unknown_key_val_to_output(
        &mut self,
        index: usize,
        pair: KeyValue,
    ) -> Result<&mut Self, PsbtError> {
        self.output_mut(index)?.add_unknown(pair)?;
        Ok(self)
    }

    /// Adds an input to the unsigned transaction together with its PSBT map.
    ///
    /// The update is validated before the transaction gets modified.
    pub fn add_input(
        &mut self,
        txin: T::Input,
        update: InputUpdate,
    ) -> Result<&mut Self, PsbtError> {
        let mut input = Input::new(self.inputs.len());
        update.apply(&mut input)?;
        self.global.unsigned_tx.add_input(txin)?;
        self.inputs.push(input);
        debug!("added input #{} to PSBT", self.inputs.len() - 1);
        Ok(self)
    }

    /// Adds an output to the unsigned transaction together with its PSBT map.
    ///
    /// The update is validated before the transaction gets modified.
    pub fn add_output(
        &mut self,
        txout: T::Output,
        update: OutputUpdate,
    ) -> Result<&mut Self, PsbtError> {
        let mut output = Output::new(self.outputs.len());
        update.apply(&mut output)?;
        self.global.unsigned_tx.add_output(txout)?;
        self.outputs.push(output);
        debug!("added output #{} to PSBT", self.outputs.len() - 1);
        Ok(self)
    }

    pub fn add_inputs(
        &mut self,
        inputs: impl IntoIterator<Item = (T::Input, InputUpdate)>,
    ) -> Result<&mut Self, PsbtError> {
        for (txin, update) in inputs {
            self.add_input(txin, update)?;
        }
        Ok(self)
    }

    pub fn add_outputs(
        &mut self,
        outputs: impl IntoIterator<Item = (T::Output, OutputUpdate)>,
    ) -> Result<&mut Self, PsbtError> {
        for (txout, update) in outputs {
            self.add_output(txout, update)?;
        }
        Ok(self)
    }

    /// Drops all data of a finalized input except the spent output and the
    /// final scripts.
    ///
    /// Fails with [`PsbtError::UncleanFinalization`] when the input has no
    /// spent output data, no final script, or lacks the final script
    /// matching its redeem or witness script.
    pub fn clear_finalized_input(&mut self, index: usize) -> Result<&mut Self, PsbtError> {
        let input = self.input_mut(index)?;
        if !input.check_finalization() {
            return Err(PsbtError::UncleanFinalization(index));
        }
        let mut cleaned = Input::new(index);
        cleaned.witness_utxo = input.witness_utxo.take();
        cleaned.non_witness_utxo = input.non_witness_utxo.take();
        cleaned.final_script_sig = input.final_script_sig.take();
        cleaned.final_script_witness = input.final_script_witness.take();
        cleaned.unknown = std::mem::take(&mut input.unknown);
        *input = cleaned;
        trace!("cleared finalized input #{index}");
        Ok(self)
    }
}

mod display_from_str {
    use std::fmt::{self, Display, Formatter, LowerHex};
    use std::str::FromStr;

    use amplify::hex::{self, FromHex, ToHex};
    use base64::display::Base64Display;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;

    use super::*;

    #[derive(Clone, Debug, Display, Error, From)]
    #[display(inner)]
    pub enum PsbtParseError {
        #[from]
        Hex(hex::Error),

        #[from]
        Base64(base64::DecodeError),

        #[from]
        Psbt(PsbtError),
    }

    impl<T: Transaction> Psbt<T> {
        pub fn from_base64(s: &str) -> Result<Self, PsbtParseError> {
            Self::deserialize(BASE64_STANDARD.decode(s)?).map_err(PsbtParseError::from)
        }

        pub fn from_hex(s: &str) -> Result<Self, PsbtParseError> {
            let data = Vec::<u8>::from_hex(s)?;
            Self::deserialize(data).map_err(PsbtParseError::from)
        }

        pub fn to_base64(&self) -> String { BASE64_STANDARD.encode(self.serialize()) }

        pub fn to_hex(&self) -> String { self.serialize().to_hex() }
    }

    /// FromStr implementation parses both Base64 and Hex encodings.
    impl<T: Transaction> FromStr for Psbt<T> {
        type Err = PsbtParseError;

        #[inline]
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Self::from_hex(s).or_else(|_| Self::from_base64(s))
        }
    }

    /// PSBT displays Base64-encoded string.
    impl<T: Transaction> Display for Psbt<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{}", Base64Display::new(&self.serialize(), &BASE64_STANDARD))
        }
    }

    impl<T: Transaction> LowerHex for Psbt<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
    }
}
