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

use thiserror::Error;

use common::chain::Transaction;
use common::primitives::Id;

use crate::pool::fee::Fee;
use crate::pool::feerate::FeeRate;
use crate::tx_verifier::TxVerifierError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Validity(#[from] TxValidationError),
    #[error(transparent)]
    Policy(#[from] MempoolPolicyError),
}

/// Failures reported by, or while talking to, the consensus validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxValidationError {
    #[error("Transaction spends outputs not found in the utxo set or the mempool")]
    MissingInputs,
    #[error(transparent)]
    Verifier(#[from] TxVerifierError),
}

/// Mempool inclusion policy violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolPolicyError {
    #[error("Transaction has no inputs")]
    NoInputs,
    #[error("Transaction has no outputs")]
    NoOutputs,
    #[error("Transaction spends the same outpoint more than once")]
    DuplicateInputs,
    #[error("Transaction weight {weight} exceeds the standard limit {max}")]
    ExceedsMaxStandardTxWeight { weight: usize, max: usize },
    #[error("Transaction is already in the mempool")]
    TransactionAlreadyInMempool,
    #[error("Transaction was recently rejected at the current tip")]
    PreviouslyRejected,
    #[error("Transaction fee {tx_fee} is below the relay fee {relay_fee}")]
    InsufficientFeesToRelay { tx_fee: Fee, relay_fee: Fee },
    #[error("Transaction fee {tx_fee} does not meet the mempool minimum fee {minimum_fee}")]
    RollingFeeThresholdNotMet { minimum_fee: Fee, tx_fee: Fee },
    #[error("Transaction would have too many in-mempool ancestors (limit: {limit})")]
    AncestorCountLimitExceeded { limit: usize },
    #[error("Total size of in-mempool ancestors would exceed the limit of {limit} vbytes")]
    AncestorSizeLimitExceeded { limit: usize },
    #[error("Descendant count of in-mempool ancestor {ancestor} would exceed the limit of {limit}")]
    DescendantCountLimitExceeded {
        ancestor: Id<Transaction>,
        limit: usize,
    },
    #[error(
        "Descendant size of in-mempool ancestor {ancestor} would exceed the limit of {limit} vbytes"
    )]
    DescendantSizeLimitExceeded {
        ancestor: Id<Transaction>,
        limit: usize,
    },
    #[error("Transaction conflicts with an in-mempool transaction that does not signal replacement")]
    ConflictWithIrreplaceableTransaction,
    #[error("Replacement {replacement_tx} pays {replacement_fee} which does not beat {original_tx} paying {original_fee}")]
    ReplacementFeeLowerThanOriginal {
        replacement_tx: Id<Transaction>,
        replacement_fee: Fee,
        original_tx: Id<Transaction>,
        original_fee: Fee,
    },
    #[error("Replacement does not pay more than the evicted transactions and their descendants")]
    TransactionFeeLowerThanConflictsWithDescendants,
    #[error("Replacement spends an unconfirmed output not spent by any of its conflicts")]
    SpendsNewUnconfirmedOutput,
    #[error("Replacement would evict too many transactions")]
    TooManyPotentialReplacements,
    #[error("Additional fees of the replacement do not cover its relay bandwidth")]
    InsufficientFeesToRelayRbf,
    #[error("Underflow when computing the additional fees of a replacement")]
    AdditionalFeesUnderflow,
    #[error("Overflow when summing the fees of conflicting transactions")]
    ConflictsFeeOverflow,
    #[error("Overflow in a fee computation")]
    FeeOverflow,
    #[error("Overflow when accumulating ancestor fees")]
    AncestorFeeOverflow,
    #[error("Fee rate of {rate:?} could not be applied to a transaction of size {size}")]
    FeeRateComputation { rate: FeeRate, size: usize },
    #[error("Transaction was evicted by the size limit right after admission")]
    MempoolFull,
    #[error("Transaction depends on an entry that expired during admission")]
    DescendantOfExpiredTransaction,
}
