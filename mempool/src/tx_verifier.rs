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

//! The contract between the mempool and the consensus validator.
//!
//! Script verification, amount checks and maturity rules all live behind
//! [TransactionVerifier]; the mempool only consumes the verdict. The mempool
//! in turn exposes its unconfirmed outputs through
//! [UnconfirmedOutputsView] so that chained unconfirmed spends validate.

use thiserror::Error;

use common::chain::{Block, OutPoint, SignedTransaction, TxOutput};
use common::primitives::{BlockHeight, Id};

use crate::pool::fee::Fee;

/// Read access to outputs created by in-mempool transactions.
pub trait UnconfirmedOutputsView {
    fn unconfirmed_output(&self, outpoint: &OutPoint) -> Option<TxOutput>;
}

/// Facts about a transaction established by consensus validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxVerified {
    pub fee: Fee,
    /// Virtual size in vbytes.
    pub tx_size: usize,
    pub sigop_cost: u64,
    pub spends_coinbase: bool,
    /// Chain height the transaction was validated at.
    pub height: BlockHeight,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxVerifierError {
    /// At least one consumed outpoint is neither in the utxo set nor in the
    /// mempool. Recoverable: the transaction may become valid once its
    /// parents arrive.
    #[error("Transaction spends outputs not found in the utxo set or the mempool")]
    MissingInputs,
    /// Consensus or script-level rejection. `corruption_possible` marks
    /// failures that may be caused by a malleated witness, in which case the
    /// txid must not be cached as known-bad.
    #[error("Transaction failed validation: {reason}")]
    Invalid {
        reason: String,
        corruption_possible: bool,
    },
}

#[cfg_attr(test, mockall::automock)]
pub trait TransactionVerifier {
    /// Current best block as seen by the chainstate.
    fn best_block(&self) -> (Id<Block>, BlockHeight);

    /// Validate `tx` against the utxo set extended with the unconfirmed
    /// outputs of the mempool.
    fn verify(
        &self,
        tx: &SignedTransaction,
        unconfirmed: &dyn UnconfirmedOutputsView,
    ) -> Result<TxVerified, TxVerifierError>;
}
