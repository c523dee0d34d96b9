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

//! The canonical in-memory store of mempool entries.
//!
//! Entries form a DAG through `parents`/`children` links. Every entry
//! carries aggregate statistics over its ancestor and descendant closures;
//! the aggregates are maintained under all mutations, so the ordered views
//! (descendant score, ancestor score, mining score, entry time) can be kept
//! as plain sorted sets of derived keys.

use std::collections::{BTreeMap, BTreeSet};

use common::chain::{OutPoint, SignedTransaction, Transaction};
use common::primitives::{BlockHeight, Id};
use logging::log;
use utils::newtype;

use self::mem_usage::{btree, MemUsage};
use super::entry::TxEntryWithFee;
use super::fee::Fee;
use crate::config::Time;
use crate::error::MempoolPolicyError;
use crate::tx_verifier::UnconfirmedOutputsView;

pub mod mem_usage;

newtype! {
    #[derive(Debug, Clone, Default)]
    pub struct Ancestors(BTreeSet<Id<Transaction>>);
}

newtype! {
    #[derive(Debug, Clone, Default)]
    pub struct Descendants(BTreeSet<Id<Transaction>>);
}

newtype! {
    #[derive(Debug, Clone, Default)]
    pub struct Conflicts(BTreeSet<Id<Transaction>>);
}

/// Why an entry leaves the pool. Removal for a block keeps the descendants
/// of the removed entry; every other reason removes them as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolRemovalReason {
    Block,
    Conflict,
    Expiry,
    SizeLimit,
    Replaced,
}

/// Ancestor-limit knobs, lifted out of the config for passing around.
#[derive(Debug, Clone, Copy)]
pub struct AncestorLimits {
    pub ancestor_count: usize,
    pub ancestor_size: usize,
    pub descendant_count: usize,
    pub descendant_size: usize,
}

impl From<&crate::config::MempoolConfig> for AncestorLimits {
    fn from(config: &crate::config::MempoolConfig) -> Self {
        Self {
            ancestor_count: config.limit_ancestor_count,
            ancestor_size: config.limit_ancestor_size,
            descendant_count: config.limit_descendant_count,
            descendant_size: config.limit_descendant_size,
        }
    }
}

/// A fee-per-size ratio compared by cross-multiplication, so that no
/// precision is lost to integer division. Products stay within `u128`
/// because the atom supply is below 2^64 and sizes are far below 2^32.
#[derive(Debug, Clone, Copy)]
pub struct ScoreRate {
    fees: u128,
    size: u64,
}

impl ScoreRate {
    fn new(fees: Fee, size: usize) -> Self {
        Self {
            fees: fees.into_atoms(),
            size: size as u64,
        }
    }
}

impl Ord for ScoreRate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let lhs = self.fees.saturating_mul(other.size as u128);
        let rhs = other.fees.saturating_mul(self.size as u128);
        lhs.cmp(&rhs)
    }
}

impl PartialOrd for ScoreRate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ScoreRate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for ScoreRate {}

/// Eviction order: worst package first, older entries first among ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DescendantScoreKey {
    rate: ScoreRate,
    creation_time: Time,
    tx_id: Id<Transaction>,
}

/// Block-building order; ties resolved by txid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AncestorScoreKey {
    rate: ScoreRate,
    tx_id: Id<Transaction>,
}

/// Plain fee-per-size order; reverse iteration yields the higher txid first
/// among equal rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MiningScoreKey {
    rate: ScoreRate,
    tx_id: Id<Transaction>,
}

#[derive(Clone, Copy)]
struct IndexKeys {
    descendant: DescendantScoreKey,
    ancestor: AncestorScoreKey,
    mining: MiningScoreKey,
}

impl IndexKeys {
    fn of(entry: &TxMempoolEntry) -> Self {
        Self {
            descendant: DescendantScoreKey {
                rate: entry.descendant_score_rate(),
                creation_time: entry.creation_time,
                tx_id: entry.tx_id,
            },
            ancestor: AncestorScoreKey {
                rate: entry.ancestor_score_rate(),
                tx_id: entry.tx_id,
            },
            mining: MiningScoreKey {
                rate: entry.mining_score_rate(),
                tx_id: entry.tx_id,
            },
        }
    }
}

/// One unconfirmed transaction in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMempoolEntry {
    tx: SignedTransaction,
    tx_id: Id<Transaction>,
    wtxid: Id<SignedTransaction>,
    fee: Fee,
    fee_delta: i128,
    modified_fee: Fee,
    size: usize,
    sigop_cost: u64,
    spends_coinbase: bool,
    height: BlockHeight,
    creation_time: Time,
    seq_no: u64,

    parents: BTreeSet<Id<Transaction>>,
    children: BTreeSet<Id<Transaction>>,

    count_with_descendants: usize,
    size_with_descendants: usize,
    fees_with_descendants: Fee,

    count_with_ancestors: usize,
    size_with_ancestors: usize,
    fees_with_ancestors: Fee,
    sigops_with_ancestors: u64,

    /// Set when a reorg reconciliation ran out of its work budget. The
    /// descendant aggregates are then unreliable and the descendant score
    /// falls back to the solo fee rate.
    dirty: bool,
}

impl TxMempoolEntry {
    fn new(tx: TxEntryWithFee, parents: BTreeSet<Id<Transaction>>) -> Self {
        let (entry, verified) = tx.into_parts();
        let creation_time = entry.creation_time();
        let tx_id = entry.tx_id();
        let tx = entry.transaction().clone();
        let wtxid = tx.wtxid();
        Self {
            tx_id,
            wtxid,
            fee: verified.fee,
            fee_delta: 0,
            modified_fee: verified.fee,
            size: verified.tx_size,
            sigop_cost: verified.sigop_cost,
            spends_coinbase: verified.spends_coinbase,
            height: verified.height,
            creation_time,
            seq_no: 0,
            parents,
            children: BTreeSet::new(),
            count_with_descendants: 1,
            size_with_descendants: verified.tx_size,
            fees_with_descendants: verified.fee,
            count_with_ancestors: 1,
            size_with_ancestors: verified.tx_size,
            fees_with_ancestors: verified.fee,
            sigops_with_ancestors: verified.sigop_cost,
            dirty: false,
            tx,
        }
    }

    pub fn transaction(&self) -> &SignedTransaction {
        &self.tx
    }

    pub fn tx_id(&self) -> Id<Transaction> {
        self.tx_id
    }

    pub fn wtxid(&self) -> Id<SignedTransaction> {
        self.wtxid
    }

    pub fn fee(&self) -> Fee {
        self.fee
    }

    pub fn fee_delta(&self) -> i128 {
        self.fee_delta
    }

    pub fn modified_fee(&self) -> Fee {
        self.modified_fee
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sigop_cost(&self) -> u64 {
        self.sigop_cost
    }

    pub fn spends_coinbase(&self) -> bool {
        self.spends_coinbase
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn creation_time(&self) -> Time {
        self.creation_time
    }

    pub fn parents(&self) -> impl Iterator<Item = &Id<Transaction>> {
        self.parents.iter()
    }

    pub fn children(&self) -> impl Iterator<Item = &Id<Transaction>> {
        self.children.iter()
    }

    pub fn count_with_descendants(&self) -> usize {
        self.count_with_descendants
    }

    pub fn size_with_descendants(&self) -> usize {
        self.size_with_descendants
    }

    pub fn fees_with_descendants(&self) -> Fee {
        self.fees_with_descendants
    }

    pub fn count_with_ancestors(&self) -> usize {
        self.count_with_ancestors
    }

    pub fn size_with_ancestors(&self) -> usize {
        self.size_with_ancestors
    }

    pub fn fees_with_ancestors(&self) -> Fee {
        self.fees_with_ancestors
    }

    pub fn sigops_with_ancestors(&self) -> u64 {
        self.sigops_with_ancestors
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// An entry may be replaced if it, or any of its unconfirmed ancestors,
    /// signals replaceability.
    pub fn is_replaceable(&self, store: &MempoolStore) -> bool {
        self.tx.is_replaceable()
            || store
                .unconfirmed_ancestors(&self.tx_id)
                .iter()
                .any(|id| store.get_entry(id).expect("ancestor").tx.is_replaceable())
    }

    fn solo_rate(&self) -> ScoreRate {
        ScoreRate::new(self.modified_fee, self.size)
    }

    /// `max(modified_fee / size, fees_with_descendants / size_with_descendants)`.
    fn descendant_score_rate(&self) -> ScoreRate {
        if self.dirty {
            return self.solo_rate();
        }
        let with_descendants =
            ScoreRate::new(self.fees_with_descendants, self.size_with_descendants);
        std::cmp::max(self.solo_rate(), with_descendants)
    }

    fn ancestor_score_rate(&self) -> ScoreRate {
        ScoreRate::new(self.fees_with_ancestors, self.size_with_ancestors)
    }

    fn mining_score_rate(&self) -> ScoreRate {
        self.solo_rate()
    }

    fn indirect_memory_usage(&self) -> usize {
        self.tx.indirect_memory_usage()
    }
}

#[derive(Debug, Default)]
pub struct MempoolStore {
    // The "main" map owning the entries. Everything else stores ids.
    txs_by_id: BTreeMap<Id<Transaction>, TxMempoolEntry>,

    // Ordered views, kept in sync with the aggregates they derive from.
    txs_by_descendant_score: BTreeSet<DescendantScoreKey>,
    txs_by_ancestor_score: BTreeSet<AncestorScoreKey>,
    txs_by_mining_score: BTreeSet<MiningScoreKey>,
    txs_by_creation_time: BTreeSet<(Time, Id<Transaction>)>,

    // Insertion order, used to re-admit transactions in the original order
    // after a reorg and to lay out the on-disk snapshot.
    txs_by_seq_no: BTreeMap<u64, Id<Transaction>>,
    next_seq_no: u64,

    // Outpoints consumed by entries, for conflict detection and reverse
    // lookup of spending transactions.
    spender_txs: BTreeMap<OutPoint, Id<Transaction>>,

    // Entries that spend a coinbase output; re-checked after reorgs.
    coinbase_spends: BTreeSet<Id<Transaction>>,

    // Incrementally maintained estimate of owned heap memory.
    cached_usage: usize,
}

impl MempoolStore {
    pub fn new() -> Self {
        Self {
            txs_by_id: BTreeMap::new(),
            txs_by_descendant_score: BTreeSet::new(),
            txs_by_ancestor_score: BTreeSet::new(),
            txs_by_mining_score: BTreeSet::new(),
            txs_by_creation_time: BTreeSet::new(),
            txs_by_seq_no: BTreeMap::new(),
            next_seq_no: 0,
            spender_txs: BTreeMap::new(),
            coinbase_spends: BTreeSet::new(),
            cached_usage: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.txs_by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.txs_by_id.len()
    }

    pub fn contains(&self, tx_id: &Id<Transaction>) -> bool {
        self.txs_by_id.contains_key(tx_id)
    }

    pub fn get_entry(&self, tx_id: &Id<Transaction>) -> Option<&TxMempoolEntry> {
        self.txs_by_id.get(tx_id)
    }

    pub fn find_conflicting_tx(&self, outpoint: &OutPoint) -> Option<Id<Transaction>> {
        self.spender_txs.get(outpoint).copied()
    }

    /// Estimated bytes of heap memory held by the pool.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.cached_usage
    }

    // Per-element accounting constants for the incremental usage estimate.

    fn entry_element_usage() -> usize {
        btree::element_usage::<Id<Transaction>, TxMempoolEntry>()
            + btree::element_usage::<DescendantScoreKey, ()>()
            + btree::element_usage::<AncestorScoreKey, ()>()
            + btree::element_usage::<MiningScoreKey, ()>()
            + btree::element_usage::<(Time, Id<Transaction>), ()>()
            + btree::element_usage::<u64, Id<Transaction>>()
    }

    fn link_element_usage() -> usize {
        btree::element_usage::<Id<Transaction>, ()>()
    }

    fn spender_element_usage() -> usize {
        btree::element_usage::<OutPoint, Id<Transaction>>()
    }

    fn usage_add(&mut self, amount: usize) {
        self.cached_usage += amount;
    }

    fn usage_sub(&mut self, amount: usize) {
        self.cached_usage = self
            .cached_usage
            .checked_sub(amount)
            .expect("memory usage accounting underflow");
    }

    /// Install a fully validated entry whose in-mempool ancestors are `A`.
    /// All policy checks have already happened; the only error left is a
    /// duplicate, which leaves the pool untouched.
    pub fn add_unchecked(
        &mut self,
        tx: TxEntryWithFee,
        parents: BTreeSet<Id<Transaction>>,
        ancestors: &Ancestors,
    ) -> Result<(), MempoolPolicyError> {
        let tx_id = tx.tx_id();
        if self.contains(&tx_id) {
            return Err(MempoolPolicyError::TransactionAlreadyInMempool);
        }

        let mut entry = TxMempoolEntry::new(tx, parents);
        entry.seq_no = self.next_seq_no;
        self.next_seq_no += 1;

        // Ancestor aggregates of the new entry
        for ancestor_id in ancestors.iter() {
            let ancestor = self.txs_by_id.get(ancestor_id).expect("ancestor in mempool");
            entry.count_with_ancestors += 1;
            entry.size_with_ancestors += ancestor.size;
            entry.fees_with_ancestors = (entry.fees_with_ancestors + ancestor.modified_fee)
                .ok_or(MempoolPolicyError::AncestorFeeOverflow)?;
            entry.sigops_with_ancestors += ancestor.sigop_cost;
        }

        // Descendant aggregates of every ancestor
        let (size, modified_fee) = (entry.size, entry.modified_fee);
        for ancestor_id in ancestors.iter().copied().collect::<Vec<_>>() {
            self.update_entry(&ancestor_id, |ancestor| {
                ancestor.count_with_descendants += 1;
                ancestor.size_with_descendants += size;
                ancestor.fees_with_descendants = (ancestor.fees_with_descendants + modified_fee)
                    .expect("descendant fee aggregate overflow");
            });
        }

        // Child link in every direct parent
        for parent_id in entry.parents.iter().copied().collect::<Vec<_>>() {
            let inserted = self
                .txs_by_id
                .get_mut(&parent_id)
                .expect("parent in mempool")
                .children
                .insert(tx_id);
            assert!(inserted, "duplicate child link");
            self.usage_add(Self::link_element_usage());
        }

        // Reverse outpoint index
        for input in entry.tx.inputs() {
            let previous = self.spender_txs.insert(*input.outpoint(), tx_id);
            assert!(
                previous.is_none(),
                "in-mempool double spend must be resolved before insertion"
            );
            self.usage_add(Self::spender_element_usage());
        }

        if entry.spends_coinbase {
            self.coinbase_spends.insert(tx_id);
        }

        self.usage_add(
            Self::entry_element_usage()
                + entry.indirect_memory_usage()
                + entry.parents.len() * Self::link_element_usage(),
        );

        self.txs_by_creation_time.insert((entry.creation_time, tx_id));
        self.txs_by_seq_no.insert(entry.seq_no, tx_id);
        let keys = IndexKeys::of(&entry);
        self.insert_score_keys(&keys);
        self.txs_by_id.insert(tx_id, entry);

        Ok(())
    }

    /// Set the operator fee delta of an entry, propagating the change into
    /// the descendant aggregates of its ancestors and the ancestor
    /// aggregates of its descendants.
    pub fn set_fee_delta(&mut self, tx_id: &Id<Transaction>, delta: i128) {
        let entry = match self.txs_by_id.get(tx_id) {
            Some(entry) => entry,
            None => return,
        };
        let old_modified = entry.modified_fee;
        let new_modified = entry
            .fee
            .saturating_add_signed(delta)
            .expect("modified fee overflow");

        self.update_entry(tx_id, |entry| {
            entry.fee_delta = delta;
            entry.modified_fee = new_modified;
            entry.fees_with_descendants =
                shift_fee(entry.fees_with_descendants, old_modified, new_modified);
            entry.fees_with_ancestors =
                shift_fee(entry.fees_with_ancestors, old_modified, new_modified);
        });

        for ancestor_id in BTreeSet::from(self.unconfirmed_ancestors(tx_id)) {
            self.update_entry(&ancestor_id, |ancestor| {
                ancestor.fees_with_descendants =
                    shift_fee(ancestor.fees_with_descendants, old_modified, new_modified);
            });
        }

        for descendant_id in BTreeSet::from(self.unconfirmed_descendants(tx_id)) {
            self.update_entry(&descendant_id, |descendant| {
                descendant.fees_with_ancestors =
                    shift_fee(descendant.fees_with_ancestors, old_modified, new_modified);
            });
        }
    }

    /// All entries reachable through `parents` links, not including the
    /// starting transaction.
    pub fn unconfirmed_ancestors(&self, tx_id: &Id<Transaction>) -> Ancestors {
        let mut visited = Ancestors::default();
        if let Some(entry) = self.txs_by_id.get(tx_id) {
            let mut queue: Vec<_> = entry.parents.iter().copied().collect();
            while let Some(current) = queue.pop() {
                if visited.insert(current) {
                    let parent = self.txs_by_id.get(&current).expect("parent in mempool");
                    queue.extend(parent.parents.iter().copied());
                }
            }
        }
        visited
    }

    /// All entries reachable through `children` links, not including the
    /// starting transaction.
    pub fn unconfirmed_descendants(&self, tx_id: &Id<Transaction>) -> Descendants {
        let mut visited = Descendants::default();
        if let Some(entry) = self.txs_by_id.get(tx_id) {
            let mut queue: Vec<_> = entry.children.iter().copied().collect();
            while let Some(current) = queue.pop() {
                if visited.insert(current) {
                    let child = self.txs_by_id.get(&current).expect("child in mempool");
                    queue.extend(child.children.iter().copied());
                }
            }
        }
        visited
    }

    /// Ancestors of a not-yet-inserted transaction with the given direct
    /// parents, checked against the chain limits.
    pub fn unconfirmed_ancestors_from_parents(
        &self,
        parents: &BTreeSet<Id<Transaction>>,
        tx_size: usize,
        limits: AncestorLimits,
    ) -> Result<Ancestors, MempoolPolicyError> {
        let mut ancestors = Ancestors::default();
        let mut total_size = tx_size;
        let mut queue: Vec<_> = parents.iter().copied().collect();

        while let Some(stage_id) = queue.pop() {
            if !ancestors.insert(stage_id) {
                continue;
            }
            let stage = self.txs_by_id.get(&stage_id).expect("parent in mempool");

            // The candidate becomes one more descendant of this ancestor.
            utils::ensure!(
                stage.count_with_descendants <= limits.descendant_count,
                MempoolPolicyError::DescendantCountLimitExceeded {
                    ancestor: stage_id,
                    limit: limits.descendant_count,
                }
            );
            utils::ensure!(
                stage.size_with_descendants + tx_size <= limits.descendant_size,
                MempoolPolicyError::DescendantSizeLimitExceeded {
                    ancestor: stage_id,
                    limit: limits.descendant_size,
                }
            );

            total_size += stage.size;
            utils::ensure!(
                total_size <= limits.ancestor_size,
                MempoolPolicyError::AncestorSizeLimitExceeded {
                    limit: limits.ancestor_size,
                }
            );
            utils::ensure!(
                ancestors.len() < limits.ancestor_count,
                MempoolPolicyError::AncestorCountLimitExceeded {
                    limit: limits.ancestor_count,
                }
            );

            queue.extend(stage.parents.iter().copied());
        }

        Ok(ancestors)
    }

    /// Remove a set of entries at once. The aggregates of all remaining
    /// relatives are corrected before any entry is dropped, so the pool
    /// never exposes a state violating the aggregate invariants.
    ///
    /// `update_descendants` is set when the removed entries were confirmed
    /// in a block: their descendants stay in the pool and lose the removed
    /// entries from their ancestor closures.
    pub fn remove_staged(
        &mut self,
        stage: &BTreeSet<Id<Transaction>>,
        update_descendants: bool,
        reason: MempoolRemovalReason,
    ) {
        if update_descendants {
            for tx_id in stage {
                let Some(entry) = self.txs_by_id.get(tx_id) else { continue };
                let (size, modified_fee, sigops) =
                    (entry.size, entry.modified_fee, entry.sigop_cost);
                for descendant_id in BTreeSet::from(self.unconfirmed_descendants(tx_id)) {
                    if stage.contains(&descendant_id) {
                        continue;
                    }
                    self.update_entry(&descendant_id, |descendant| {
                        descendant.count_with_ancestors -= 1;
                        descendant.size_with_ancestors -= size;
                        descendant.fees_with_ancestors = (descendant.fees_with_ancestors
                            - modified_fee)
                            .expect("ancestor fee aggregate underflow");
                        descendant.sigops_with_ancestors -= sigops;
                    });
                }
            }
        }

        for tx_id in stage {
            let Some(entry) = self.txs_by_id.get(tx_id) else { continue };
            let (size, modified_fee) = (entry.size, entry.modified_fee);
            for ancestor_id in BTreeSet::from(self.unconfirmed_ancestors(tx_id)) {
                if stage.contains(&ancestor_id) {
                    continue;
                }
                self.update_entry(&ancestor_id, |ancestor| {
                    ancestor.count_with_descendants -= 1;
                    ancestor.size_with_descendants -= size;
                    ancestor.fees_with_descendants = (ancestor.fees_with_descendants
                        - modified_fee)
                        .expect("descendant fee aggregate underflow");
                });
            }
        }

        for tx_id in stage {
            self.remove_unchecked(tx_id, reason);
        }
    }

    /// Remove a transaction and every in-mempool descendant.
    pub fn drop_tx_and_descendants(
        &mut self,
        tx_id: Id<Transaction>,
        reason: MempoolRemovalReason,
    ) {
        if !self.contains(&tx_id) {
            return;
        }
        let mut stage = BTreeSet::from(self.unconfirmed_descendants(&tx_id));
        stage.insert(tx_id);
        log::trace!(
            "Dropping tx {tx_id} together with {} descendants",
            stage.len() - 1
        );
        self.remove_staged(&stage, false, reason);
    }

    pub fn drop_conflicts(&mut self, conflicts: Conflicts) {
        let mut stage = BTreeSet::new();
        for conflict_id in BTreeSet::from(conflicts) {
            if self.contains(&conflict_id) {
                stage.extend(BTreeSet::from(self.unconfirmed_descendants(&conflict_id)));
                stage.insert(conflict_id);
            }
        }
        if !stage.is_empty() {
            self.remove_staged(&stage, false, MempoolRemovalReason::Replaced);
        }
    }

    fn remove_unchecked(&mut self, tx_id: &Id<Transaction>, reason: MempoolRemovalReason) {
        let Some(entry) = self.txs_by_id.remove(tx_id) else { return };
        log::trace!("Removing tx {tx_id} from the mempool ({reason:?})");

        let keys = IndexKeys::of(&entry);
        self.remove_score_keys(&keys);
        self.txs_by_creation_time.remove(&(entry.creation_time, entry.tx_id));
        self.txs_by_seq_no.remove(&entry.seq_no);
        self.coinbase_spends.remove(tx_id);

        for input in entry.tx.inputs() {
            let spender = self.spender_txs.remove(input.outpoint());
            debug_assert_eq!(spender, Some(*tx_id), "outpoint index out of sync");
            self.usage_sub(Self::spender_element_usage());
        }

        let mut severed_links = entry.parents.len() + entry.children.len();
        for parent_id in &entry.parents {
            if let Some(parent) = self.txs_by_id.get_mut(parent_id) {
                if parent.children.remove(tx_id) {
                    severed_links += 1;
                }
            }
        }
        for child_id in &entry.children {
            if let Some(child) = self.txs_by_id.get_mut(child_id) {
                if child.parents.remove(tx_id) {
                    severed_links += 1;
                }
            }
        }

        self.usage_sub(
            Self::entry_element_usage()
                + entry.indirect_memory_usage()
                + severed_links * Self::link_element_usage(),
        );
    }

    /// Reconnect links and reconcile aggregates after transactions from a
    /// disconnected block were re-admitted. A re-added entry may already
    /// have children in the pool, which the plain insertion path does not
    /// account for.
    ///
    /// Processing happens in reverse block order so that deeper entries are
    /// reconciled before their ancestors. Once `work_budget` entries have
    /// been visited, the remaining re-added entries are only marked dirty.
    pub fn update_transactions_from_block(
        &mut self,
        tx_ids: &[Id<Transaction>],
        mut work_budget: usize,
    ) {
        // Entries re-admitted in this batch got correct ancestor aggregates
        // from the insertion path; only the stayed-behind descendants lost
        // their ancestors to the connected block and need the adjustment.
        let readded: BTreeSet<_> = tx_ids.iter().copied().collect();

        for tx_id in tx_ids.iter().rev() {
            let Some(entry) = self.txs_by_id.get(tx_id) else { continue };

            // Children are found through the outpoint index, which covers
            // all spends of this entry's outputs.
            let output_count = entry.tx.outputs().len() as u32;
            let children: BTreeSet<_> = (0..output_count)
                .filter_map(|index| {
                    self.spender_txs.get(&OutPoint::new(*tx_id, index)).copied()
                })
                .collect();

            for child_id in &children {
                if self.txs_by_id.get(tx_id).expect("entry").children.contains(child_id) {
                    continue;
                }
                self.txs_by_id.get_mut(tx_id).expect("entry").children.insert(*child_id);
                self.usage_add(Self::link_element_usage());
                if self.txs_by_id.get_mut(child_id).expect("child").parents.insert(*tx_id) {
                    self.usage_add(Self::link_element_usage());
                }
            }

            match self.descendants_within_budget(tx_id, &mut work_budget) {
                Some(descendants) => {
                    let (own_size, own_fee, own_sigops) = {
                        let entry = self.txs_by_id.get(tx_id).expect("entry");
                        (entry.size, entry.modified_fee, entry.sigop_cost)
                    };

                    let mut count = 1;
                    let mut size = own_size;
                    let mut fees = own_fee;
                    for descendant_id in &descendants {
                        let descendant =
                            self.txs_by_id.get(descendant_id).expect("descendant in mempool");
                        count += 1;
                        size += descendant.size;
                        fees = (fees + descendant.modified_fee)
                            .expect("descendant fee aggregate overflow");
                    }

                    self.update_entry(tx_id, |entry| {
                        entry.count_with_descendants = count;
                        entry.size_with_descendants = size;
                        entry.fees_with_descendants = fees;
                        entry.dirty = false;
                    });

                    for descendant_id in descendants.iter().filter(|id| !readded.contains(id)) {
                        self.update_entry(descendant_id, |descendant| {
                            descendant.count_with_ancestors += 1;
                            descendant.size_with_ancestors += own_size;
                            descendant.fees_with_ancestors = (descendant.fees_with_ancestors
                                + own_fee)
                                .expect("ancestor fee aggregate overflow");
                            descendant.sigops_with_ancestors += own_sigops;
                        });
                    }
                }
                None => {
                    log::debug!(
                        "Descendant reconciliation budget exhausted, marking {tx_id} dirty"
                    );
                    self.update_entry(tx_id, |entry| entry.dirty = true);
                }
            }
        }
    }

    fn descendants_within_budget(
        &self,
        tx_id: &Id<Transaction>,
        work_budget: &mut usize,
    ) -> Option<BTreeSet<Id<Transaction>>> {
        let mut visited = BTreeSet::new();
        let entry = self.txs_by_id.get(tx_id)?;
        let mut queue: Vec<_> = entry.children.iter().copied().collect();
        while let Some(current) = queue.pop() {
            if *work_budget == 0 {
                return None;
            }
            if visited.insert(current) {
                *work_budget -= 1;
                let child = self.txs_by_id.get(&current).expect("child in mempool");
                queue.extend(child.children.iter().copied());
            }
        }
        Some(visited)
    }

    /// Entries whose `creation_time` is before `cutoff`, oldest first.
    pub fn collect_expired(&self, cutoff: Time) -> Vec<Id<Transaction>> {
        self.txs_by_creation_time
            .iter()
            .take_while(|(time, _)| *time < cutoff)
            .map(|(_, tx_id)| *tx_id)
            .collect()
    }

    // Ordered iteration. All iterators yield entry references and are
    // invalidated by any mutation, as usual.

    /// Ascending by descendant score: the first entry is the least valuable
    /// package in the pool.
    pub fn iter_by_descendant_score(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.txs_by_descendant_score
            .iter()
            .map(|key| self.txs_by_id.get(&key.tx_id).expect("index entry"))
    }

    /// Descending by ancestor score: block building order.
    pub fn iter_by_ancestor_score(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.txs_by_ancestor_score
            .iter()
            .rev()
            .map(|key| self.txs_by_id.get(&key.tx_id).expect("index entry"))
    }

    /// Descending by plain fee rate; the higher txid wins ties.
    pub fn iter_by_mining_score(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.txs_by_mining_score
            .iter()
            .rev()
            .map(|key| self.txs_by_id.get(&key.tx_id).expect("index entry"))
    }

    /// Ascending by entry time.
    pub fn iter_by_creation_time(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.txs_by_creation_time
            .iter()
            .map(|(_, tx_id)| self.txs_by_id.get(tx_id).expect("index entry"))
    }

    /// Entries that spend a coinbase output, in txid order.
    pub fn iter_coinbase_spending(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.coinbase_spends
            .iter()
            .map(|tx_id| self.txs_by_id.get(tx_id).expect("index entry"))
    }

    /// Entries in their original admission order.
    pub fn iter_by_insertion_order(&self) -> impl Iterator<Item = &TxMempoolEntry> {
        self.txs_by_seq_no
            .values()
            .map(|tx_id| self.txs_by_id.get(tx_id).expect("index entry"))
    }

    fn insert_score_keys(&mut self, keys: &IndexKeys) {
        assert!(self.txs_by_descendant_score.insert(keys.descendant));
        assert!(self.txs_by_ancestor_score.insert(keys.ancestor));
        assert!(self.txs_by_mining_score.insert(keys.mining));
    }

    fn remove_score_keys(&mut self, keys: &IndexKeys) {
        assert!(self.txs_by_descendant_score.remove(&keys.descendant));
        assert!(self.txs_by_ancestor_score.remove(&keys.ancestor));
        assert!(self.txs_by_mining_score.remove(&keys.mining));
    }

    /// Mutate an entry while keeping the score indexes consistent.
    fn update_entry(
        &mut self,
        tx_id: &Id<Transaction>,
        update: impl FnOnce(&mut TxMempoolEntry),
    ) {
        let entry = self.txs_by_id.get(tx_id).expect("entry to update");
        let old_keys = IndexKeys::of(entry);
        self.remove_score_keys(&old_keys);

        let entry = self.txs_by_id.get_mut(tx_id).expect("entry to update");
        update(entry);

        let new_keys = IndexKeys::of(entry);
        self.insert_score_keys(&new_keys);
    }

    /// Exhaustive internal consistency check, for tests.
    #[cfg(test)]
    pub fn assert_valid(&self) {
        use common::primitives::Idable;

        assert_eq!(self.txs_by_descendant_score.len(), self.txs_by_id.len());
        assert_eq!(self.txs_by_ancestor_score.len(), self.txs_by_id.len());
        assert_eq!(self.txs_by_mining_score.len(), self.txs_by_id.len());
        assert_eq!(self.txs_by_creation_time.len(), self.txs_by_id.len());
        assert_eq!(self.txs_by_seq_no.len(), self.txs_by_id.len());

        for (tx_id, entry) in &self.txs_by_id {
            assert_eq!(entry.tx.get_id(), *tx_id);

            // Links are symmetric and reflect actual spends
            for parent_id in &entry.parents {
                let parent = self.txs_by_id.get(parent_id).expect("parent");
                assert!(parent.children.contains(tx_id));
                assert!(entry
                    .tx
                    .inputs()
                    .iter()
                    .any(|input| input.outpoint().tx_id() == *parent_id));
            }
            for child_id in &entry.children {
                let child = self.txs_by_id.get(child_id).expect("child");
                assert!(child.parents.contains(tx_id));
            }

            // The outpoint index is the exact inverse of input consumption
            for input in entry.tx.inputs() {
                assert_eq!(self.spender_txs.get(input.outpoint()), Some(tx_id));
            }

            // Aggregates match the closures when the entry is clean
            if !entry.dirty {
                let descendants = BTreeSet::from(self.unconfirmed_descendants(tx_id));
                assert_eq!(entry.count_with_descendants, descendants.len() + 1);
                let (mut size_wd, mut fees_wd) = (entry.size, entry.modified_fee);
                for descendant_id in &descendants {
                    let descendant = self.txs_by_id.get(descendant_id).expect("descendant");
                    size_wd += descendant.size;
                    fees_wd = (fees_wd + descendant.modified_fee).expect("fee overflow");
                }
                assert_eq!(entry.size_with_descendants, size_wd);
                assert_eq!(entry.fees_with_descendants, fees_wd);
            }

            let ancestors = BTreeSet::from(self.unconfirmed_ancestors(tx_id));
            let dirty_ancestry = ancestors
                .iter()
                .any(|id| self.txs_by_id.get(id).expect("ancestor").dirty)
                || entry.dirty;
            if !dirty_ancestry {
                assert_eq!(entry.count_with_ancestors, ancestors.len() + 1);
                let (mut size_wa, mut fees_wa, mut sigops_wa) =
                    (entry.size, entry.modified_fee, entry.sigop_cost);
                for ancestor_id in &ancestors {
                    let ancestor = self.txs_by_id.get(ancestor_id).expect("ancestor");
                    size_wa += ancestor.size;
                    fees_wa = (fees_wa + ancestor.modified_fee).expect("fee overflow");
                    sigops_wa += ancestor.sigop_cost;
                }
                assert_eq!(entry.size_with_ancestors, size_wa);
                assert_eq!(entry.fees_with_ancestors, fees_wa);
                assert_eq!(entry.sigops_with_ancestors, sigops_wa);
            }
        }

        for (outpoint, spender) in &self.spender_txs {
            let entry = self.txs_by_id.get(spender).expect("spender");
            assert!(entry.tx.inputs().iter().any(|input| input.outpoint() == outpoint));
        }
    }
}

impl UnconfirmedOutputsView for MempoolStore {
    fn unconfirmed_output(&self, outpoint: &OutPoint) -> Option<common::chain::TxOutput> {
        self.txs_by_id
            .get(&outpoint.tx_id())
            .and_then(|entry| entry.tx.outputs().get(outpoint.output_index() as usize))
            .cloned()
    }
}

/// Replace the `old` component of an aggregate fee with `new`.
fn shift_fee(aggregate: Fee, old: Fee, new: Fee) -> Fee {
    let without_old = (aggregate - old).expect("fee aggregate underflow");
    (without_old + new).expect("fee aggregate overflow")
}
