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

//! Unsigned transaction embedded into the PSBT global map.
//!
//! The PSBT codec never interprets the transaction beyond the [`Transaction`]
//! contract; [`UnsignedTx`] implements it over the `bp-consensus` data types.

use std::fmt::{self, Formatter, LowerHex};
use std::io::{Read, Write};

use amplify::hex::ToHex;
use amplify::IoError;
use derive::{LockTime, Outpoint, SeqNo, Tx, TxIn, TxOut, TxVer, Txid, VarIntArray, Vout};

use crate::{Decode, DecodeError, Encode, PsbtError, VarInt};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct InputOutputCounts {
    pub inputs: usize,
    pub outputs: usize,
}

/// Transaction collaborator of a PSBT.
pub trait Transaction: Clone {
    type Input;
    type Output;

    /// Parses the value of the global `UNSIGNED_TX` key.
    fn decode_unsigned(data: &[u8]) -> Result<Self, PsbtError>;

    fn input_output_counts(&self) -> InputOutputCounts;

    fn add_input(&mut self, input: Self::Input) -> Result<(), PsbtError>;

    fn add_output(&mut self, output: Self::Output) -> Result<(), PsbtError>;

    /// Serialization stored under the global `UNSIGNED_TX` key.
    fn to_bytes(&self) -> Vec<u8>;
}

/// Transaction data the way they are stored under the PSBT global `UNSIGNED_TX` key.
///
/// [`Tx`] can't be used directly since a PSBT may carry a transaction with zero inputs.
/// Consensus deserialization reads the zero input count as a segwit marker and fails on the
/// following byte, so the unsigned transaction is always read and written with the legacy
/// framing, and the individual parts use their consensus encoding.
///
/// `UnsignedTx` also ensures that none of its inputs contain witnesses or sigscripts.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct UnsignedTx {
    pub version: TxVer,
    pub inputs: VarIntArray<UnsignedTxIn>,
    pub outputs: VarIntArray<TxOut>,
    pub lock_time: LockTime,
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct UnsignedTxIn {
    pub prev_output: Outpoint,
    pub sequence: SeqNo,
}

impl From<Tx> for UnsignedTx {
    #[inline]
    fn from(tx: Tx) -> UnsignedTx { UnsignedTx::with_sigs_removed(tx) }
}

impl From<UnsignedTx> for Tx {
    #[inline]
    fn from(unsigned_tx: UnsignedTx) -> Tx { unsigned_tx.finalize() }
}

impl UnsignedTx {
    /// Strips signature scripts and witnesses from a transaction.
    pub fn with_sigs_removed(tx: Tx) -> UnsignedTx {
        UnsignedTx {
            version: tx.version,
            inputs: VarIntArray::from_collection_unsafe(
                tx.inputs.into_iter().map(UnsignedTxIn::from).collect(),
            ),
            outputs: tx.outputs,
            lock_time: tx.lock_time,
        }
    }

    /// Converts into a transaction with empty signature scripts and witnesses.
    pub fn finalize(self) -> Tx {
        Tx {
            version: self.version,
            inputs: VarIntArray::from_collection_unsafe(
                self.inputs.into_iter().map(TxIn::from).collect(),
            ),
            outputs: self.outputs,
            lock_time: self.lock_time,
        }
    }
}

impl From<TxIn> for UnsignedTxIn {
    #[inline]
    fn from(txin: TxIn) -> UnsignedTxIn {
        UnsignedTxIn {
            prev_output: txin.prev_output,
            sequence: txin.sequence,
        }
    }
}

impl From<UnsignedTxIn> for TxIn {
    #[inline]
    fn from(unsigned_txin: UnsignedTxIn) -> TxIn {
        TxIn {
            prev_output: unsigned_txin.prev_output,
            sig_script: none!(),
            sequence: unsigned_txin.sequence,
            witness: empty!(),
        }
    }
}

impl UnsignedTxIn {
    /// Input spending `prev_output` with the final sequence number.
    pub fn new(prev_output: Outpoint) -> Self {
        UnsignedTxIn {
            prev_output,
            sequence: SeqNo::from_consensus_u32(u32::MAX),
        }
    }
}

impl Encode for UnsignedTxIn {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.prev_output.txid.encode(writer)?;
        counter += self.prev_output.vout.encode(writer)?;
        // empty signature script
        counter += VarInt::new(0).encode(writer)?;
        counter += self.sequence.encode(writer)?;
        Ok(counter)
    }
}

impl Encode for UnsignedTx {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.version.encode(writer)?;
        counter += VarInt::with(self.inputs.len()).encode(writer)?;
        for input in self.inputs.iter() {
            counter += input.encode(writer)?;
        }
        counter += VarInt::with(self.outputs.len()).encode(writer)?;
        for output in self.outputs.iter() {
            counter += output.encode(writer)?;
        }
        counter += self.lock_time.encode(writer)?;
        Ok(counter)
    }
}

impl Decode for UnsignedTx {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let version = TxVer::decode(reader)?;

        let input_count = VarInt::decode(reader)?.to_u64();
        let mut inputs = Vec::new();
        for index in 0..input_count {
            let txid = Txid::decode(reader)?;
            let vout = Vout::decode(reader)?;
            if VarInt::decode(reader)? != 0u64 {
                return Err(PsbtError::UnsignedTxHasScriptSigs(index as usize).into());
            }
            let sequence = SeqNo::decode(reader)?;
            inputs.push(UnsignedTxIn {
                prev_output: Outpoint::new(txid, vout),
                sequence,
            });
        }

        let output_count = VarInt::decode(reader)?.to_u64();
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TxOut::decode(reader)?);
        }

        let lock_time = LockTime::decode(reader)?;
        Ok(UnsignedTx {
            version,
            inputs: VarIntArray::try_from_iter(inputs)
                .map_err(|err| PsbtError::Transaction(err.to_string()))?,
            outputs: VarIntArray::try_from_iter(outputs)
                .map_err(|err| PsbtError::Transaction(err.to_string()))?,
            lock_time,
        })
    }
}

impl Transaction for UnsignedTx {
    type Input = UnsignedTxIn;
    type Output = TxOut;

    fn decode_unsigned(data: &[u8]) -> Result<Self, PsbtError> {
        UnsignedTx::deserialize(data).map_err(|err| match err {
            PsbtError::UnexpectedEod => {
                PsbtError::Transaction(s!("transaction data are truncated"))
            }
            PsbtError::DataNotConsumed => {
                PsbtError::Transaction(s!("transaction data are followed by excessive bytes"))
            }
            err => err,
        })
    }

    fn input_output_counts(&self) -> InputOutputCounts {
        InputOutputCounts {
            inputs: self.inputs.len(),
            outputs: self.outputs.len(),
        }
    }

    fn add_input(&mut self, input: Self::Input) -> Result<(), PsbtError> {
        self.inputs.push(input).map_err(|err| PsbtError::Transaction(err.to_string()))
    }

    fn add_output(&mut self, output: Self::Output) -> Result<(), PsbtError> {
        self.outputs.push(output).map_err(|err| PsbtError::Transaction(err.to_string()))
    }

    fn to_bytes(&self) -> Vec<u8> { self.serialize() }
}

impl LowerHex for UnsignedTx {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_bytes().to_hex()) }
}
