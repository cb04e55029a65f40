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

//! BIP174 partially signed bitcoin transactions: binary codec, typed field
//! converters, updater and combiner.
//!
//! The library does not interpret the embedded unsigned transaction beyond the
//! [`Transaction`] contract; [`UnsignedTx`] is the default implementation of it.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

pub mod varint;
mod coders;
mod keys;
pub mod fields;
mod maps;
mod update;
mod combine;
mod tx;
mod data;
#[cfg(feature = "serde")]
mod serde_utils;

pub use coders::{Decode, DecodeError, Encode, PsbtError};
pub use combine::combine;
pub use data::{Input, Output, Psbt, PsbtGlobal, PsbtParseError};
pub use fields::{
    Bip32Derivation, DerivationIndex, DerivationParseError, DerivationPath, DerivationPathExt,
    Field, FinalScriptSig, FinalScriptWitness, GlobalXpub, HardenedIndex, NonWitnessUtxo,
    NormalIndex, PartialSig, PluralField, PorCommitment, RedeemScript, SighashType,
    SingularField, TapBip32Derivation, TapInternalKey, TapKeySig, TapLeaf, TapLeafScript,
    TapMerkleRoot, TapScriptSig, TapTree, WitnessScript, WitnessUtxo,
};
pub use keys::{check_has_key, GlobalKey, InputKey, KeyType, KeyValue, OutputKey, PropKey};
pub use maps::{KeyMap, MapName, PsbtKeyValues};
pub use tx::{InputOutputCounts, Transaction, UnsignedTx, UnsignedTxIn};
pub use update::{GlobalUpdate, InputUpdate, OutputUpdate, Update};
pub use varint::VarInt;
