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

use std::io::{self, Cursor, Read, Write};

use amplify::hex::ToHex;
use amplify::IoError;
use derive::{
    ConsensusDataError, ConsensusDecode, ConsensusDecodeError, ConsensusEncode, LockTime, SeqNo,
    TxOut, TxVer, Txid, Vout,
};

use crate::keys::MapEntry;
use crate::maps::{psbt_from_key_values, KeyMap};
use crate::{GlobalKey, KeyType, KeyValue, MapName, Psbt, Transaction};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum DecodeError {
    #[from]
    #[from(io::Error)]
    Io(IoError),

    #[from]
    Consensus(ConsensusDataError),

    #[from]
    Psbt(PsbtError),
}

impl From<ConsensusDecodeError> for DecodeError {
    fn from(e: ConsensusDecodeError) -> Self {
        match e {
            ConsensusDecodeError::Io(e) => DecodeError::Io(e),
            ConsensusDecodeError::Data(data) => data.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum PsbtError {
    /// unexpected end of data.
    UnexpectedEod,

    /// PSBT data are followed by some excessive bytes.
    DataNotConsumed,

    /// invalid magic bytes {0}.
    InvalidMagic(String),

    /// global map has no unsigned transaction.
    MissingUnsignedTx,

    /// duplicate key {1} in the {0} map.
    RepeatedKey(MapName, String),

    /// unsigned transaction has {0} inputs while PSBT contains {1} input maps.
    InputCountMismatch(usize, usize),

    /// unsigned transaction has {0} outputs while PSBT contains {1} output maps.
    OutputCountMismatch(usize, usize),

    /// invalid key {1} for the {0} field.
    InvalidKey(&'static str, String),

    /// invalid value of the {0} field under key {1}: {2}.
    InvalidField(&'static str, String, String),

    /// invalid data for {0}: expected {1}, got {2}.
    InvalidUpdate(&'static str, &'static str, String),

    /// can not add duplicate {0} data to the {1} map.
    DuplicateField(&'static str, MapName),

    /// can not add duplicate {0} items to the {1} map.
    DuplicateArrayItem(&'static str, MapName),

    /// key type {1:#04x} is a known field of the {0} map and must be set through its typed API.
    KnownKeyType(MapName, u8),

    /// key-value pair with an empty key can't be added to the {0} map.
    EmptyKey(MapName),

    /// at least two PSBTs are required for combining.
    NothingToCombine,

    /// one of the combined PSBTs does not have the same unsigned transaction.
    TxMismatch,

    /// input #{0} has too much or too little data to be cleaned after finalization.
    UncleanFinalization(usize),

    /// no input #{0}: PSBT has only {1} inputs.
    InputIndexOutOfRange(usize, usize),

    /// no output #{0}: PSBT has only {1} outputs.
    OutputIndexOutOfRange(usize, usize),

    /// input #{0} of the unsigned transaction has a non-empty signature script.
    UnsignedTxHasScriptSigs(usize),

    /// unsigned transaction error: {0}.
    Transaction(String),
}

impl From<DecodeError> for PsbtError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Psbt(e) => e,
            DecodeError::Io(_) => PsbtError::UnexpectedEod,
            DecodeError::Consensus(e) => PsbtError::Transaction(e.to_string()),
        }
    }
}

pub trait Encode {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError>;

    fn serialize(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        self.encode(&mut vec).expect("in-memory encoding can't error");
        vec
    }
}

impl<'a, T: Encode> Encode for &'a T {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> { (*self).encode(writer) }
}

pub trait Decode
where Self: Sized
{
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError>;
    fn deserialize(bytes: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let bytes = bytes.as_ref();
        let mut cursor = Cursor::new(bytes);
        let me = Self::decode(&mut cursor)?;
        if cursor.position() != bytes.len() as u64 {
            return Err(PsbtError::DataNotConsumed);
        }
        Ok(me)
    }
}

impl<T: Transaction> Psbt<T> {
    pub const MAGIC: [u8; 5] = *b"psbt\xFF";
    pub(crate) const SEPARATOR: [u8; 1] = [0x0];

    pub fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = Self::MAGIC.len();
        writer.write_all(&Self::MAGIC)?;

        counter += encode_map(&self.global.to_pairs(), writer)?;

        // An empty section still gets a terminator, so that readers see where it ends.
        if self.inputs.is_empty() {
            counter += Self::SEPARATOR.len();
            writer.write_all(&Self::SEPARATOR)?;
        }
        for input in &self.inputs {
            counter += encode_map(&input.to_pairs(), writer)?;
        }

        if self.outputs.is_empty() {
            counter += Self::SEPARATOR.len();
            writer.write_all(&Self::SEPARATOR)?;
        }
        for output in &self.outputs {
            counter += encode_map(&output.to_pairs(), writer)?;
        }

        Ok(counter)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        self.encode(&mut vec).expect("in-memory encoding can't error");
        vec
    }

    /// Parses PSBT, decoding the embedded unsigned transaction with
    /// [`Transaction::decode_unsigned`].
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        Self::deserialize_with(data, T::decode_unsigned)
    }

    /// Parses PSBT, decoding the embedded unsigned transaction with the provided `decoder`.
    pub fn deserialize_with(
        data: impl AsRef<[u8]>,
        decoder: impl FnOnce(&[u8]) -> Result<T, PsbtError>,
    ) -> Result<Self, PsbtError> {
        let data = data.as_ref();
        let mut cursor = Cursor::new(data);

        let mut magic = [0u8; 5];
        cursor.read_exact(&mut magic).map_err(|_| PsbtError::UnexpectedEod)?;
        if magic != Self::MAGIC {
            return Err(PsbtError::InvalidMagic(magic.to_hex()));
        }

        let global = decode_map(&mut cursor)?;
        check_unique(MapName::Global, &global)?;

        let unsigned_tx_key = [GlobalKey::UnsignedTx.into_u8()];
        let tx_data = global
            .iter()
            .find(|pair| pair.key == unsigned_tx_key)
            .map(|pair| pair.value.as_slice())
            .ok_or(PsbtError::MissingUnsignedTx)?;
        let unsigned_tx = decoder(tx_data)?;
        let counts = unsigned_tx.input_output_counts();

        let mut maps = Vec::new();
        while (cursor.position() as usize) < data.len() {
            maps.push(decode_map(&mut cursor)?);
        }
        let expected = counts.inputs + counts.outputs;
        if maps.len() > expected && counts.inputs == 0 && maps.first().is_some_and(Vec::is_empty) {
            maps.remove(0);
        }
        if maps.len() > expected && counts.outputs == 0 && maps.last().is_some_and(Vec::is_empty) {
            maps.pop();
        }
        if maps.len() < expected {
            return Err(PsbtError::UnexpectedEod);
        }
        if maps.len() > expected {
            return Err(PsbtError::DataNotConsumed);
        }

        let outputs = maps.split_off(counts.inputs);
        let inputs = maps;

        let psbt = psbt_from_key_values(unsigned_tx, global, inputs, outputs)?;
        debug!(
            "parsed PSBT with {} inputs and {} outputs ({} bytes)",
            psbt.inputs.len(),
            psbt.outputs.len(),
            data.len()
        );
        Ok(psbt)
    }
}

/// Writes key-value pairs followed by the map terminator.
pub(crate) fn encode_map(pairs: &[KeyValue], writer: &mut impl Write) -> Result<usize, IoError> {
    let mut counter = 0;
    for pair in pairs {
        counter += pair.encode(writer)?;
    }
    counter += 1;
    writer.write_all(&[0])?;
    Ok(counter)
}

/// Reads key-value pairs up to and including the map terminator.
pub(crate) fn decode_map(reader: &mut impl Read) -> Result<Vec<KeyValue>, PsbtError> {
    let mut pairs = Vec::new();
    while let MapEntry::Pair(pair) = MapEntry::decode(reader)? {
        pairs.push(pair);
    }
    Ok(pairs)
}

pub(crate) fn check_unique(name: MapName, pairs: &[KeyValue]) -> Result<(), PsbtError> {
    let mut seen = std::collections::BTreeSet::new();
    for pair in pairs {
        if !seen.insert(pair.key.as_slice()) {
            return Err(PsbtError::RepeatedKey(name, pair.key.to_hex()));
        }
    }
    Ok(())
}

impl Encode for KeyValue {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter += crate::VarInt::with(self.key.len()).encode(writer)?;
        writer.write_all(&self.key)?;
        counter += self.key.len();

        counter += crate::VarInt::with(self.value.len()).encode(writer)?;
        writer.write_all(&self.value)?;
        counter += self.value.len();

        Ok(counter)
    }
}

impl Decode for MapEntry {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let key_len = crate::VarInt::decode(reader)?;
        if key_len == 0u64 {
            return Ok(MapEntry::Separator);
        }

        let mut key = Vec::new();
        reader.take(key_len.to_u64()).read_to_end(&mut key)?;
        if key.len() != key_len.to_usize() {
            return Err(PsbtError::UnexpectedEod.into());
        }

        let value_len = crate::VarInt::decode(reader)?;
        let mut value = Vec::new();
        reader.take(value_len.to_u64()).read_to_end(&mut value)?;
        if value.len() != value_len.to_usize() {
            return Err(PsbtError::UnexpectedEod.into());
        }

        Ok(MapEntry::Pair(KeyValue { key, value }))
    }
}

macro_rules! psbt_code_using_consensus {
    ($ty:ty) => {
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                self.consensus_encode(writer)
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                Self::consensus_decode(reader).map_err(DecodeError::from)
            }
        }
    };
}

psbt_code_using_consensus!(TxVer);
psbt_code_using_consensus!(TxOut);
psbt_code_using_consensus!(Txid);
psbt_code_using_consensus!(Vout);
psbt_code_using_consensus!(SeqNo);
psbt_code_using_consensus!(LockTime);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_value_stream() {
        let pair = KeyValue::new(vec![0x02, 0xAA], vec![0x01, 0x02, 0x03]);
        let bytes = pair.serialize();
        assert_eq!(bytes, vec![0x02, 0x02, 0xAA, 0x03, 0x01, 0x02, 0x03]);
        let mut cursor = Cursor::new(bytes);
        match MapEntry::decode(&mut cursor).unwrap() {
            MapEntry::Pair(decoded) => assert_eq!(decoded, pair),
            MapEntry::Separator => panic!("separator instead of a pair"),
        }
    }

    #[test]
    fn truncated_pair() {
        let mut cursor = Cursor::new(vec![0x03, 0x01, 0x02]);
        assert_eq!(
            decode_map(&mut cursor).unwrap_err(),
            PsbtError::UnexpectedEod
        );
        let mut cursor = Cursor::new(vec![0x01, 0x05, 0x04, 0x00]);
        assert_eq!(
            decode_map(&mut cursor).unwrap_err(),
            PsbtError::UnexpectedEod
        );
    }

    #[test]
    fn map_stream() {
        let pairs = vec![
            KeyValue::new(vec![0x01], vec![0xFF]),
            KeyValue::new(vec![0x05, 0x01], vec![]),
        ];
        let mut bytes = vec![];
        encode_map(&pairs, &mut bytes).unwrap();
        assert_eq!(bytes.last(), Some(&0u8));
        let mut cursor = Cursor::new(bytes);
        assert_eq!(decode_map(&mut cursor).unwrap(), pairs);
    }

    #[test]
    fn duplicates() {
        let pairs = vec![
            KeyValue::new(vec![0x02, 0x01], vec![0x01]),
            KeyValue::new(vec![0x02, 0x01], vec![0x02]),
        ];
        assert_eq!(
            check_unique(MapName::Input(3), &pairs),
            Err(PsbtError::RepeatedKey(MapName::Input(3), s!("0201")))
        );
        assert_eq!(check_unique(MapName::Global, &pairs[..1]), Ok(()));
    }
}
