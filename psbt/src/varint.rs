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

//! Bitcoin compact-size unsigned integers.
//!
//! Values below `0xFD` take a single byte; larger values are prefixed with
//! `0xFD`, `0xFE` or `0xFF` followed by a little-endian `u16`, `u32` or `u64`.

use std::io::{Read, Write};

use amplify::IoError;

use crate::{Decode, DecodeError, Encode, PsbtError};

const PREFIX_U16: u8 = 0xFD;
const PREFIX_U32: u8 = 0xFE;
const PREFIX_U64: u8 = 0xFF;

/// Number of bytes the compact-size encoding of `value` takes.
pub const fn encoding_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Reads a compact-size integer from `buf` starting at `offset`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode(buf: &[u8], offset: usize) -> Result<(u64, usize), PsbtError> {
    let data = buf.get(offset..).ok_or(PsbtError::UnexpectedEod)?;
    let (prefix, rest) = data.split_first().ok_or(PsbtError::UnexpectedEod)?;
    let width = match *prefix {
        PREFIX_U16 => 2,
        PREFIX_U32 => 4,
        PREFIX_U64 => 8,
        small => return Ok((small as u64, 1)),
    };
    let payload = rest.get(..width).ok_or(PsbtError::UnexpectedEod)?;
    let mut le = [0u8; 8];
    le[..width].copy_from_slice(payload);
    Ok((u64::from_le_bytes(le), 1 + width))
}

/// Writes the compact-size encoding of `value` into `buf` at `offset`.
///
/// Returns the number of bytes written; fails if `buf` is too short.
pub fn encode(value: u64, buf: &mut [u8], offset: usize) -> Result<usize, PsbtError> {
    let len = encoding_len(value);
    let end = offset.checked_add(len).ok_or(PsbtError::UnexpectedEod)?;
    let target = buf.get_mut(offset..end).ok_or(PsbtError::UnexpectedEod)?;
    match len {
        1 => target[0] = value as u8,
        3 => {
            target[0] = PREFIX_U16;
            target[1..].copy_from_slice(&(value as u16).to_le_bytes());
        }
        5 => {
            target[0] = PREFIX_U32;
            target[1..].copy_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            target[0] = PREFIX_U64;
            target[1..].copy_from_slice(&value.to_le_bytes());
        }
    }
    Ok(len)
}

/// Compact-size encoding of `value` as a fresh byte vector.
pub fn to_vec(value: u64) -> Vec<u8> {
    let mut buf = vec![0u8; encoding_len(value)];
    encode(value, &mut buf, 0).expect("buffer is allocated with the exact encoding length");
    buf
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Display)]
#[display("{0}")]
pub struct VarInt(pub u64);

impl From<u64> for VarInt {
    fn from(value: u64) -> Self { VarInt(value) }
}

impl VarInt {
    pub const fn new(u: u64) -> Self { VarInt(u) }

    pub fn with(u: impl Into<usize>) -> Self { VarInt(u.into() as u64) }

    #[inline]
    pub const fn len(self) -> usize { encoding_len(self.0) }

    #[inline]
    pub const fn to_u64(self) -> u64 { self.0 }

    #[inline]
    pub const fn to_usize(self) -> usize { self.0 as usize }
}

impl PartialEq<u64> for VarInt {
    fn eq(&self, other: &u64) -> bool { self.0.eq(other) }
}

impl Encode for VarInt {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let bytes = to_vec(self.0);
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

impl Decode for VarInt {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut buf = [0u8; 9];
        reader.read_exact(&mut buf[..1])?;
        let width = match buf[0] {
            PREFIX_U16 => 2,
            PREFIX_U32 => 4,
            PREFIX_U64 => 8,
            _ => 0,
        };
        reader.read_exact(&mut buf[1..1 + width])?;
        let (value, _) = decode(&buf[..1 + width], 0)?;
        Ok(VarInt(value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn size_class_boundaries() {
        let cases: [(u64, usize); 7] = [
            (0, 1),
            (252, 1),
            (253, 3),
            (65535, 3),
            (65536, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ];
        for (value, len) in cases {
            let bytes = to_vec(value);
            assert_eq!(bytes.len(), len);
            assert_eq!(encoding_len(value), len);
            assert_eq!(decode(&bytes, 0).unwrap(), (value, len));
        }
    }

    #[test]
    fn prefixes() {
        assert_eq!(to_vec(252), vec![0xFC]);
        assert_eq!(to_vec(253), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(to_vec(65536), vec![0xFE, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(to_vec(0x1_0000_0000), vec![0xFF, 0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn offset() {
        let mut buf = [0xAAu8; 6];
        assert_eq!(encode(0x1234, &mut buf, 2), Ok(3));
        assert_eq!(buf, [0xAA, 0xAA, 0xFD, 0x34, 0x12, 0xAA]);
        assert_eq!(decode(&buf, 2), Ok((0x1234, 3)));
    }

    #[test]
    fn exhausted() {
        assert_eq!(decode(&[], 0), Err(PsbtError::UnexpectedEod));
        assert_eq!(decode(&[0xFE, 0x01, 0x02], 0), Err(PsbtError::UnexpectedEod));
        assert_eq!(decode(&[0x01], 3), Err(PsbtError::UnexpectedEod));
        let mut short = [0u8; 2];
        assert_eq!(encode(0xFFFF, &mut short, 0), Err(PsbtError::UnexpectedEod));
    }

    #[test]
    fn stream() {
        let bytes = VarInt::new(70000).serialize();
        assert_eq!(bytes.len(), 5);
        assert_eq!(VarInt::deserialize(&bytes), Ok(VarInt::new(70000)));
        assert_eq!(VarInt::deserialize([0xFD, 0x01]), Err(PsbtError::UnexpectedEod));
    }
}
