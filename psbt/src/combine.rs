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

use std::collections::BTreeSet;

use amplify::hex::ToHex;

use crate::coders::check_unique;
use crate::maps::psbt_from_key_values;
use crate::{KeyValue, MapName, Psbt, PsbtError, Transaction};

/// Appends pairs of `other` whose keys are not yet present in `merged`.
fn merge_map(
    name: MapName,
    merged: &mut Vec<KeyValue>,
    other: Vec<KeyValue>,
) -> Result<(), PsbtError> {
    check_unique(name, &other)?;
    let mut keys = merged.iter().map(|pair| pair.key.clone()).collect::<BTreeSet<_>>();
    for pair in other {
        if keys.insert(pair.key.clone()) {
            merged.push(pair);
        } else {
            trace!("combine: keeping first value for key {} in the {name} map", pair.key.to_hex());
        }
    }
    Ok(())
}

/// Merges PSBTs sharing the same unsigned transaction.
///
/// For every map the key-value pairs of the first PSBT are kept; pairs of
/// the following PSBTs are added only for keys which are not present yet.
pub fn combine<T: Transaction>(parts: &[&Psbt<T>]) -> Result<Psbt<T>, PsbtError> {
    let (first, others) = match parts {
        [first, others @ ..] if !others.is_empty() => (*first, others),
        _ => return Err(PsbtError::NothingToCombine),
    };

    let tx_bytes = first.global.unsigned_tx.to_bytes();
    if others.iter().any(|psbt| psbt.global.unsigned_tx.to_bytes() != tx_bytes) {
        return Err(PsbtError::TxMismatch);
    }

    let mut merged = first.to_key_values();
    check_unique(MapName::Global, &merged.global)?;
    for (index, input) in merged.inputs.iter().enumerate() {
        check_unique(MapName::Input(index), input)?;
    }
    for (index, output) in merged.outputs.iter().enumerate() {
        check_unique(MapName::Output(index), output)?;
    }

    for psbt in others {
        let other = psbt.to_key_values();
        merge_map(MapName::Global, &mut merged.global, other.global)?;
        for (index, (map, pairs)) in merged.inputs.iter_mut().zip(other.inputs).enumerate() {
            merge_map(MapName::Input(index), map, pairs)?;
        }
        for (index, (map, pairs)) in merged.outputs.iter_mut().zip(other.outputs).enumerate() {
            merge_map(MapName::Output(index), map, pairs)?;
        }
    }

    debug!("combined {} PSBTs", parts.len());
    let tx = first.global.unsigned_tx.clone();
    psbt_from_key_values(tx, merged.global, merged.inputs, merged.outputs)
}

impl<T: Transaction> Psbt<T> {
    /// Combines `others` into this PSBT, keeping values of `self` on conflicts.
    pub fn combine(&mut self, others: &[&Psbt<T>]) -> Result<&mut Self, PsbtError> {
        let combined = {
            let mut parts = Vec::with_capacity(others.len() + 1);
            parts.push(&*self);
            parts.extend_from_slice(others);
            combine(&parts)?
        };
        *self = combined;
        Ok(self)
    }
}
