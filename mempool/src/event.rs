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

use common::chain::{Block, Transaction};
use common::primitives::{BlockHeight, Id};

use crate::tx_origin::TxOrigin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolEvent {
    /// A transaction passed admission, either directly or via orphan replay.
    TransactionReceived {
        tx_id: Id<Transaction>,
        origin: TxOrigin,
    },
    /// The pool switched to a new chain tip.
    NewTip(Id<Block>, BlockHeight),
}
