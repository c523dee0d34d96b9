// Copyright (c) 2022-2023 RBB S.r.l
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

use common::chain::{SignedTransaction, Transaction};
use common::primitives::{Id, Idable};

use crate::config::Time;
use crate::tx_origin::TxOrigin;
use crate::tx_verifier::TxVerified;

/// A transaction on its way into the pool, before consensus validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEntry {
    tx: SignedTransaction,
    tx_id: Id<Transaction>,
    creation_time: Time,
    origin: TxOrigin,
}

impl TxEntry {
    pub fn new(tx: SignedTransaction, creation_time: Time, origin: TxOrigin) -> Self {
        let tx_id = tx.get_id();
        Self {
            tx,
            tx_id,
            creation_time,
            origin,
        }
    }

    pub fn tx_id(&self) -> Id<Transaction> {
        self.tx_id
    }

    pub fn transaction(&self) -> &SignedTransaction {
        &self.tx
    }

    pub fn creation_time(&self) -> Time {
        self.creation_time
    }

    pub fn origin(&self) -> TxOrigin {
        self.origin
    }
}

/// A validated transaction together with the verifier's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEntryWithFee {
    entry: TxEntry,
    verified: TxVerified,
}

impl TxEntryWithFee {
    pub fn new(entry: TxEntry, verified: TxVerified) -> Self {
        Self { entry, verified }
    }

    pub fn tx_id(&self) -> Id<Transaction> {
        self.entry.tx_id()
    }

    pub fn transaction(&self) -> &SignedTransaction {
        self.entry.transaction()
    }

    pub fn entry(&self) -> &TxEntry {
        &self.entry
    }

    pub fn verified(&self) -> &TxVerified {
        &self.verified
    }

    pub fn fee(&self) -> super::fee::Fee {
        self.verified.fee
    }

    /// Virtual size in vbytes, as established by the verifier.
    pub fn size(&self) -> usize {
        self.verified.tx_size
    }

    pub fn into_parts(self) -> (TxEntry, TxVerified) {
        (self.entry, self.verified)
    }
}
