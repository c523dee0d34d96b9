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

use crate::primitives::Amount;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxOutput {
    value: Amount,
    // The locking script is opaque at this layer; interpreting it is the
    // script engine's business.
    script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        TxOutput {
            value,
            script_pubkey,
        }
    }

    pub fn value(&self) -> Amount {
        self.value
    }

    pub fn script_pubkey(&self) -> &[u8] {
        &self.script_pubkey
    }
}

impl Encode for TxOutput {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.value.encode_to(dest);
        self.script_pubkey.encode_to(dest);
    }

    fn encoded_size(&self) -> usize {
        self.value.encoded_size() + self.script_pubkey.encoded_size()
    }
}

impl Decode for TxOutput {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(TxOutput {
            value: Amount::decode(input)?,
            script_pubkey: Vec::<u8>::decode(input)?,
        })
    }
}
