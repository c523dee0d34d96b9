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

use serialization::{decode_seq, encode_seq, seq_encoded_size, Decode, Encode};

use super::transaction::SignedTransaction;
use crate::primitives::{id::hash_encoded, Id, Idable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    prev_block_hash: Id<Block>,
    time: u64,
}

impl BlockHeader {
    pub fn new(prev_block_hash: Id<Block>, time: u64) -> Self {
        BlockHeader {
            prev_block_hash,
            time,
        }
    }

    pub fn prev_block_hash(&self) -> Id<Block> {
        self.prev_block_hash
    }

    pub fn time(&self) -> u64 {
        self.time
    }
}

impl Encode for BlockHeader {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.prev_block_hash.encode_to(dest);
        self.time.encode_to(dest);
    }

    fn encoded_size(&self) -> usize {
        self.prev_block_hash.encoded_size() + self.time.encoded_size()
    }
}

impl Decode for BlockHeader {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(BlockHeader {
            prev_block_hash: Id::decode(input)?,
            time: u64::decode(input)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<SignedTransaction>,
}

impl Block {
    pub fn new(
        transactions: Vec<SignedTransaction>,
        prev_block_hash: Id<Block>,
        time: u64,
    ) -> Self {
        Block {
            header: BlockHeader::new(prev_block_hash, time),
            transactions,
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn prev_block_hash(&self) -> Id<Block> {
        self.header.prev_block_hash()
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }
}

impl Idable for Block {
    type Tag = Block;

    fn get_id(&self) -> Id<Block> {
        Id::new(hash_encoded(self.header()))
    }
}

impl Encode for Block {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.header.encode_to(dest);
        encode_seq(dest, &self.transactions);
    }

    fn encoded_size(&self) -> usize {
        self.header.encoded_size() + seq_encoded_size(&self.transactions)
    }
}

impl Decode for Block {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(Block {
            header: BlockHeader::decode(input)?,
            transactions: decode_seq(input)?,
        })
    }
}
