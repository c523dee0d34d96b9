// Copyright (c) 2023 RBB S.r.l
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

use std::collections::BTreeSet;

use common::chain::{Block, Transaction};
use common::primitives::Id;
use logging::log;

/// Txids that recently failed admission, keyed to the chain tip.
///
/// A transaction invalid at one tip may become valid after a reorg, so the
/// filter forgets everything whenever the tip changes. Transactions with a
/// witness are never recorded: a malleated witness must not poison the txid.
#[derive(Debug)]
pub struct RecentRejects {
    tip: Id<Block>,
    rejects: BTreeSet<Id<Transaction>>,
}

impl RecentRejects {
    pub fn new(tip: Id<Block>) -> Self {
        Self {
            tip,
            rejects: BTreeSet::new(),
        }
    }

    pub fn contains(&self, tx_id: &Id<Transaction>) -> bool {
        self.rejects.contains(tx_id)
    }

    pub fn insert(&mut self, tx_id: Id<Transaction>) {
        self.rejects.insert(tx_id);
    }

    /// Clear the filter if the tip moved.
    pub fn reset_for_tip(&mut self, tip: Id<Block>) {
        if self.tip != tip {
            log::trace!(
                "Clearing {} recent rejects for new tip {tip}",
                self.rejects.len()
            );
            self.tip = tip;
            self.rejects.clear();
        }
    }
}
