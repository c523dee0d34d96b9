// Copyright (c) 2021-2022 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serialization::{Decode, Encode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn into_int(self) -> u64 {
        self.0
    }

    pub fn next_height(self) -> BlockHeight {
        BlockHeight(self.0.checked_add(1).expect("block height overflow"))
    }

    pub fn prev_height(self) -> Option<BlockHeight> {
        self.0.checked_sub(1).map(BlockHeight)
    }

    /// Number of blocks from `other` up to `self`, if `self` is not below.
    pub fn checked_distance(self, other: BlockHeight) -> Option<u64> {
        self.0.checked_sub(other.0)
    }
}

impl std::fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Encode for BlockHeight {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.0.encode_to(dest)
    }

    fn encoded_size(&self) -> usize {
        self.0.encoded_size()
    }
}

impl Decode for BlockHeight {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        u64::decode(input).map(Self::new)
    }
}
