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

use super::{check_no_key_data, invalid_field, Field, SingularField};
use crate::{varint, KeyValue, PsbtError};

pub const TAPROOT_MAX_DEPTH: u8 = 128;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TapLeaf {
    pub depth: u8,
    pub leaf_version: u8,
    #[cfg_attr(feature = "serde", serde(with = "crate::serde_utils::hex_bytes"))]
    pub script: Vec<u8>,
}

impl TapLeaf {
    fn is_valid(&self) -> bool { self.depth <= TAPROOT_MAX_DEPTH && self.leaf_version & 0x01 == 0 }
}

/// Script tree of a taproot output as a depth-first list of its leaves.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TapTree {
    pub leaves: Vec<TapLeaf>,
}

impl Field for TapTree {
    const NAME: &'static str = "tapTree";
    const EXPECTED: &'static str =
        "{ leaves: [{ depth: 0..=128; leafVersion: even byte; script: script bytes }] }";

    fn decode(pair: &KeyValue) -> Result<Self, PsbtError> {
        check_no_key_data(Self::NAME, pair)?;
        let data = &pair.value;
        let mut leaves = vec![];
        let mut pos = 0usize;
        while pos < data.len() {
            let [depth, leaf_version] = data
                .get(pos..pos + 2)
                .and_then(|bytes| <[u8; 2]>::try_from(bytes).ok())
                .ok_or_else(|| invalid_field(Self::NAME, pair, "truncated leaf header"))?;
            pos += 2;
            let (script_len, consumed) = varint::decode(data, pos)
                .map_err(|_| invalid_field(Self::NAME, pair, "truncated script length"))?;
            pos += consumed;
            let end = usize::try_from(script_len)
                .ok()
                .and_then(|len| pos.checked_add(len))
                .filter(|end| *end <= data.len())
                .ok_or_else(|| invalid_field(Self::NAME, pair, "script exceeds value length"))?;
            let leaf = TapLeaf {
                depth,
                leaf_version,
                script: data[pos..end].to_vec(),
            };
            if !leaf.is_valid() {
                return Err(invalid_field(
                    Self::NAME,
                    pair,
                    format!("invalid leaf depth {depth} or version {leaf_version:#04x}"),
                ));
            }
            leaves.push(leaf);
            pos = end;
        }
        Ok(TapTree { leaves })
    }

    fn encode(&self, key_type: u8) -> KeyValue {
        let mut value = vec![];
        for leaf in &self.leaves {
            value.push(leaf.depth);
            value.push(leaf.leaf_version);
            value.extend(varint::to_vec(leaf.script.len() as u64));
            value.extend(&leaf.script);
        }
        KeyValue::with_type(key_type, &[], value)
    }

    fn check(&self) -> bool { self.leaves.iter().all(TapLeaf::is_valid) }
}

impl SingularField for TapTree {}

#[cfg(test)]
mod test {
    use super::*;

    fn tree() -> TapTree {
        TapTree {
            leaves: vec![
                TapLeaf {
                    depth: 1,
                    leaf_version: 0xC0,
                    script: vec![0x51],
                },
                TapLeaf {
                    depth: 1,
                    leaf_version: 0xC0,
                    script: vec![0x52, 0x53],
                },
            ],
        }
    }

    #[test]
    fn encoding() {
        let pair = tree().encode(0x06);
        assert_eq!(pair.key, vec![0x06]);
        assert_eq!(pair.value, vec![0x01, 0xC0, 0x01, 0x51, 0x01, 0xC0, 0x02, 0x52, 0x53]);
        assert_eq!(TapTree::decode(&pair), Ok(tree()));
    }

    #[test]
    fn invalid_leaves() {
        let mut odd = tree();
        odd.leaves[1].leaf_version = 0xC1;
        assert!(!odd.check());
        assert!(TapTree::decode(&odd.encode(0x06)).is_err());

        let mut deep = tree();
        deep.leaves[0].depth = 129;
        assert!(!deep.check());
        assert!(TapTree::decode(&deep.encode(0x06)).is_err());

        let mut max_depth = tree();
        max_depth.leaves[0].depth = 128;
        assert!(max_depth.check());

        let mut truncated = tree().encode(0x06);
        truncated.value.pop();
        assert!(TapTree::decode(&truncated).is_err());
        truncated.value.truncate(5);
        assert!(TapTree::decode(&truncated).is_err());
    }
}
