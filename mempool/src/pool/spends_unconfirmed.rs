// Copyright (c) 2022 RBB S.r.l
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

use common::chain::TxInput;

use super::Mempool;
use crate::tx_verifier::TransactionVerifier;

pub trait SpendsUnconfirmed<V> {
    fn spends_unconfirmed(&self, mempool: &Mempool<V>) -> bool;
}

impl<V: TransactionVerifier> SpendsUnconfirmed<V> for TxInput {
    /// An input spends an unconfirmed output if its producing transaction is
    /// still in the mempool.
    fn spends_unconfirmed(&self, mempool: &Mempool<V>) -> bool {
        mempool.contains_transaction(&self.outpoint().tx_id())
    }
}
