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

//! Typed converters between raw key-value pairs and PSBT field values.
//!
//! Every field value knows how to read itself from a [`KeyValue`], how to
//! write itself back under a given key type byte and how to validate its own
//! content before it is added to a map.

mod path;
mod global;
mod input;
mod output;
mod shared;

use std::collections::BTreeSet;
use std::fmt::Debug;

use amplify::hex::ToHex;

pub use global::GlobalXpub;
pub use input::{
    FinalScriptSig, FinalScriptWitness, NonWitnessUtxo, PartialSig, PorCommitment, SighashType,
    TapKeySig, TapLeafScript, TapMerkleRoot, TapScriptSig, WitnessUtxo,
};
pub use output::{TapLeaf, TapTree};
pub use path::{
    DerivationIndex, DerivationParseError, DerivationPath, DerivationPathExt, HardenedIndex,
    IndexParseError, NormalIndex, HARDENED_INDEX_BOUNDARY,
};
pub use shared::{Bip32Derivation, RedeemScript, TapBip32Derivation, TapInternalKey, WitnessScript};

use crate::{KeyValue, PsbtError};

pub trait Field: Clone + Debug + Sized {
    /// Camel-case field name.
    const NAME: &'static str;
    /// Human-readable description of the accepted value shape.
    const EXPECTED: &'static str;

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError>;

    fn encode(&self, key_type: u8) -> KeyValue;

    /// Validates field content before it gets added to a map.
    fn check(&self) -> bool { true }

    /// Text describing the value in error messages.
    fn received(&self) -> String {
        let pair = self.encode(0);
        if pair.key_data().is_empty() {
            pair.value.to_hex()
        } else {
            format!("{}:{}", pair.key_data().to_hex(), pair.value.to_hex())
        }
    }
}

/// Field which may be present at most once in a map.
pub trait SingularField: Field {
    fn can_add(current: Option<&Self>) -> bool { current.is_none() }
}

/// Field which may be present multiple times in a map, each time with a
/// distinct key.
pub trait PluralField: Field {
    /// Bytes identifying the item among other items of the same field.
    fn dedup_key(&self) -> Vec<u8>;

    /// Checks that `item` collides neither with `array` nor with any
    /// previously accepted item recorded in `seen`; records the item on success.
    fn can_add_to_array(array: &[Self], item: &Self, seen: &mut BTreeSet<Vec<u8>>) -> bool {
        let key = item.dedup_key();
        if array.iter().any(|existing| existing.dedup_key() == key) {
            return false;
        }
        seen.insert(key)
    }
}

pub(crate) fn invalid_field(name: &'static str, pair: &KeyValue, reason: impl ToString) -> PsbtError {
    PsbtError::InvalidField(name, pair.key.to_hex(), reason.to_string())
}

/// Ensures the key consists only of the key type byte.
pub(crate) fn check_no_key_data(name: &'static str, pair: &KeyValue) -> Result<(), PsbtError> {
    if pair.key.len() != 1 {
        return Err(PsbtError::InvalidKey(name, pair.key.to_hex()));
    }
    Ok(())
}

pub(crate) fn fixed_bytes<const LEN: usize>(bytes: &[u8]) -> Option<[u8; LEN]> {
    <[u8; LEN]>::try_from(bytes).ok()
}

/// Public key serialization: 33 or 65 bytes starting with `02`, `03` or `04`.
///
/// Length and prefix are checked independently of each other; hybrid and
/// mismatched forms are left to the signer to reject.
pub fn is_valid_pubkey(bytes: &[u8]) -> bool {
    matches!(bytes.len(), 33 | 65) && matches!(bytes[0], 0x02 | 0x03 | 0x04)
}

/// Checks the structure of a DER-encoded ECDSA signature followed by a
/// sighash type byte.
pub fn is_der_sig_with_sighash(buf: &[u8]) -> bool {
    if buf.len() < 9 || buf[0] != 0x30 || buf.len() != buf[1] as usize + 3 || buf[2] != 0x02 {
        return false;
    }
    let r_len = buf[3] as usize;
    if !(1..=33).contains(&r_len) {
        return false;
    }
    if buf.get(4 + r_len) != Some(&0x02) {
        return false;
    }
    let Some(&s_len) = buf.get(5 + r_len) else {
        return false;
    };
    let s_len = s_len as usize;
    if !(1..=33).contains(&s_len) {
        return false;
    }
    buf.len() == r_len + s_len + 7
}

#[cfg(test)]
mod test {
    use super::*;

    fn der_sig(r_len: usize, s_len: usize) -> Vec<u8> {
        let mut sig = vec![0x30, (r_len + s_len + 4) as u8, 0x02, r_len as u8];
        sig.extend(vec![0x11; r_len]);
        sig.extend([0x02, s_len as u8]);
        sig.extend(vec![0x22; s_len]);
        sig.push(0x01);
        sig
    }

    #[test]
    fn der_structure() {
        assert!(is_der_sig_with_sighash(&der_sig(32, 32)));
        assert!(is_der_sig_with_sighash(&der_sig(33, 33)));
        assert!(is_der_sig_with_sighash(&der_sig(1, 1)));
        assert!(!is_der_sig_with_sighash(&der_sig(34, 32)));
        assert!(!is_der_sig_with_sighash(&der_sig(32, 0)));
        assert!(!is_der_sig_with_sighash(&der_sig(32, 34)));
        assert!(!is_der_sig_with_sighash(&der_sig(0, 32)));
        assert!(!is_der_sig_with_sighash(&der_sig(32, 32)[..70]));

        let mut bad_tag = der_sig(32, 32);
        bad_tag[0] = 0x31;
        assert!(!is_der_sig_with_sighash(&bad_tag));

        let mut bad_int = der_sig(32, 32);
        bad_int[36] = 0x03;
        assert!(!is_der_sig_with_sighash(&bad_int));

        let mut bad_len = der_sig(32, 32);
        bad_len[1] += 1;
        assert!(!is_der_sig_with_sighash(&bad_len));

        let mut shortest = vec![0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01, 0x01];
        assert!(is_der_sig_with_sighash(&shortest));
        shortest[3] = 0x00;
        assert!(!is_der_sig_with_sighash(&shortest));
    }

    #[test]
    fn pubkeys() {
        let mut key = [0x02; 33];
        assert!(is_valid_pubkey(&key));
        key[0] = 0x04;
        assert!(is_valid_pubkey(&key));
        key[0] = 0x05;
        assert!(!is_valid_pubkey(&key));
        assert!(is_valid_pubkey(&[0x04; 65]));
        assert!(is_valid_pubkey(&[0x03; 65]));
        assert!(!is_valid_pubkey(&[0x06; 65]));
        assert!(!is_valid_pubkey(&[0x02; 32]));
        assert!(!is_valid_pubkey(&[0x02; 34]));
        assert!(!is_valid_pubkey(&[]));
    }
}
