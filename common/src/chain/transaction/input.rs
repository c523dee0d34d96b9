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

use super::Transaction;
use crate::primitives::Id;

/// A reference to a single output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutPoint {
    id: Id<Transaction>,
    output_index: u32,
}

impl OutPoint {
    pub fn new(id: Id<Transaction>, output_index: u32) -> Self {
        OutPoint { id, output_index }
    }

    pub fn tx_id(&self) -> Id<Transaction> {
        self.id
    }

    pub fn output_index(&self) -> u32 {
        self.output_index
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.id, self.output_index)
    }
}

impl Encode for OutPoint {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.id.encode_to(dest);
        self.output_index.encode_to(dest);
    }

    fn encoded_size(&self) -> usize {
        self.id.encoded_size() + self.output_index.encoded_size()
    }
}

impl Decode for OutPoint {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(OutPoint {
            id: Id::decode(input)?,
            output_index: u32::decode(input)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxInput {
    outpoint: OutPoint,
    sequence: u32,
}

impl TxInput {
    pub fn new(outpoint: OutPoint, sequence: u32) -> Self {
        TxInput { outpoint, sequence }
    }

    pub fn outpoint(&self) -> &OutPoint {
        &self.outpoint
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl Encode for TxInput {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.outpoint.encode_to(dest);
        self.sequence.encode_to(dest);
    }

    fn encoded_size(&self) -> usize {
        self.outpoint.encoded_size() + self.sequence.encoded_size()
    }
}

impl Decode for TxInput {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(TxInput {
            outpoint: OutPoint::decode(input)?,
            sequence: u32::decode(input)?,
        })
    }
}
