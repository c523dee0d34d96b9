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

//! Reactions to block connects and disconnects.
//!
//! Connecting a block removes its transactions from the pool (keeping
//! their descendants), evicts everything that double-spends a newly
//! confirmed input, and feeds the fee estimator. Disconnecting re-admits
//! the block's transactions and then reconciles the links and aggregates
//! of entries that regained in-pool children.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use common::chain::{Block, Transaction};
use common::primitives::{BlockHeight, Id, Idable};
use logging::log;

use super::entry::TxEntry;
use super::feerate::FeeRate;
use super::store::MempoolRemovalReason;
use super::{Mempool, TxStatus};
use crate::config::DISCONNECT_UPDATE_WORK_LIMIT;
use crate::event::MempoolEvent;
use crate::tx_origin::TxOrigin;
use crate::tx_verifier::TransactionVerifier;

pub fn block_connected<V: TransactionVerifier>(
    mempool: &mut Mempool<V>,
    block: &Block,
    height: BlockHeight,
) {
    assert_eq!(
        block.prev_block_hash(),
        mempool.current_tip.0,
        "block connected out of chain order"
    );
    let block_id = block.get_id();
    log::debug!("Connecting block {block_id} at height {height} to the mempool view");

    // The estimator sees the confirmations before any pool mutation.
    let confirmed: Vec<_> = block
        .transactions()
        .iter()
        .filter_map(|tx| mempool.store.get_entry(&tx.get_id()))
        .map(|entry| {
            let rate = NonZeroUsize::new(entry.size())
                .and_then(|size| FeeRate::from_total_tx_fee(entry.fee(), size).ok())
                .unwrap_or(FeeRate::ZERO);
            (entry.tx_id(), entry.height(), rate)
        })
        .collect();
    mempool.fee_estimator.process_block(height, &confirmed);

    // Remove the confirmed transactions, keeping their descendants alive
    // with corrected ancestor aggregates.
    for tx in block.transactions() {
        let tx_id = tx.get_id();
        if mempool.store.contains(&tx_id) {
            let stage = BTreeSet::from([tx_id]);
            mempool.store.remove_staged(&stage, true, MempoolRemovalReason::Block);
        }
    }

    // Everything that double-spends a now-confirmed input goes, in one
    // batched pass over the whole block.
    let mut conflict_stage = BTreeSet::new();
    for tx in block.transactions() {
        for input in tx.inputs() {
            if let Some(spender) = mempool.store.find_conflicting_tx(input.outpoint()) {
                conflict_stage
                    .extend(BTreeSet::from(mempool.store.unconfirmed_descendants(&spender)));
                conflict_stage.insert(spender);
            }
        }
    }
    if !conflict_stage.is_empty() {
        log::info!(
            "Removing {} mempool transactions conflicting with block {block_id}",
            conflict_stage.len()
        );
        for tx_id in &conflict_stage {
            mempool.fee_estimator.remove_tx(tx_id);
        }
        mempool
            .store
            .remove_staged(&conflict_stage, false, MempoolRemovalReason::Conflict);
    }

    mempool.current_tip = (block_id, height);
    mempool.recent_rejects.reset_for_tip(block_id);
    mempool.rolling_fee_rate.write().set_block_since_last_rolling_fee_bump(true);
    mempool.events_controller.broadcast(MempoolEvent::NewTip(block_id, height));
}

pub fn block_disconnected<V: TransactionVerifier>(mempool: &mut Mempool<V>, block: &Block) {
    let block_id = block.get_id();
    assert_eq!(
        block_id, mempool.current_tip.0,
        "disconnected block is not the current tip"
    );
    let new_tip = block.prev_block_hash();
    let new_height = mempool
        .current_tip
        .1
        .prev_height()
        .expect("cannot disconnect below genesis");
    mempool.current_tip = (new_tip, new_height);
    mempool.recent_rejects.reset_for_tip(new_tip);
    log::debug!("Disconnecting block {block_id}; mempool view back to {new_tip}");

    // Re-admit the block's transactions in block order, so parents precede
    // their children.
    let mut readded: Vec<Id<Transaction>> = Vec::new();
    for tx in block.transactions() {
        let entry = TxEntry::new(tx.clone(), mempool.clock.get_time(), TxOrigin::Local);
        let tx_id = entry.tx_id();
        match mempool.admit_transaction(entry) {
            Ok(TxStatus::InMempool) => readded.push(tx_id),
            Ok(status) => {
                log::debug!("Disconnected tx {tx_id} not re-admitted: {status:?}")
            }
            Err(err) => {
                log::info!("Disconnected tx {tx_id} rejected on re-admission: {err}")
            }
        }
    }

    // A re-added entry may already have children in the pool; reconnect the
    // links and reconcile the aggregates.
    mempool
        .store
        .update_transactions_from_block(&readded, DISCONNECT_UPDATE_WORK_LIMIT);

    // Coinbase spends validated on the abandoned branch may have lost their
    // maturity; drop the ones vouched for by a rolled-back height.
    let suspect_coinbase_spends: Vec<_> = mempool
        .store
        .iter_coinbase_spending()
        .filter(|entry| entry.height() > new_height)
        .map(|entry| entry.tx_id())
        .collect();
    for tx_id in suspect_coinbase_spends {
        mempool.fee_estimator.remove_tx(&tx_id);
        mempool.store.drop_tx_and_descendants(tx_id, MempoolRemovalReason::Conflict);
    }

    mempool.events_controller.broadcast(MempoolEvent::NewTip(new_tip, new_height));
}
