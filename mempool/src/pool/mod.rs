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

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::{rngs::StdRng, SeedableRng};

use common::chain::{Block, OutPoint, SignedTransaction, Transaction};
use common::primitives::{BlockHeight, Id, Idable};
use common::time_getter::TimeGetter;
use logging::log;
use utils::{ensure, eventhandler::EventsController, tap_error_log::LogError};

use self::entry::{TxEntry, TxEntryWithFee};
use self::fee::Fee;
use self::fee_estimator::FeeEstimator;
use self::feerate::FeeRate;
use self::orphans::TxOrphanPool;
use self::recent_rejects::RecentRejects;
use self::rolling_fee_rate::RollingFeeRate;
use self::spends_unconfirmed::SpendsUnconfirmed;
use self::store::{Conflicts, MempoolRemovalReason, MempoolStore, TxMempoolEntry};
use crate::config::*;
use crate::error::{Error, MempoolPolicyError, TxValidationError};
use crate::event::MempoolEvent;
use crate::tx_origin::{PeerId, TxOrigin};
use crate::tx_verifier::{TransactionVerifier, TxVerifierError};

pub mod entry;
pub mod fee;
pub mod fee_estimator;
pub mod feerate;
pub mod orphans;
pub mod persistence;
pub mod store;

mod recent_rejects;
mod reorg;
mod rolling_fee_rate;
mod spends_unconfirmed;

/// Where an accepted transaction ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    InMempool,
    /// Already present; the submission was a no-op.
    InMempoolDuplicate,
    /// Inputs not yet known; parked until the parents arrive.
    InOrphanPool,
}

/// Operator-applied adjustments for one txid. Kept outside the entries so a
/// delta survives the transaction leaving and re-entering the pool.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TxDelta {
    pub priority: f64,
    pub fee: i128,
}

pub struct Mempool<V> {
    config: MempoolConfig,
    store: MempoolStore,
    orphans: TxOrphanPool,
    fee_estimator: FeeEstimator,
    rolling_fee_rate: RwLock<RollingFeeRate>,
    delta_map: BTreeMap<Id<Transaction>, TxDelta>,
    recent_rejects: RecentRejects,
    verifier: V,
    clock: TimeGetter,
    events_controller: EventsController<MempoolEvent>,
    current_tip: (Id<Block>, BlockHeight),
    relay_queue: Vec<Id<Transaction>>,
    orphan_rng: StdRng,
}

impl<V> std::fmt::Debug for Mempool<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.store)
    }
}

// Construction and read access
impl<V: TransactionVerifier> Mempool<V> {
    pub fn new(config: MempoolConfig, verifier: V, clock: TimeGetter) -> Self {
        let current_tip = verifier.best_block();
        log::trace!("Creating mempool at tip {} ({})", current_tip.0, current_tip.1);
        Self {
            store: MempoolStore::new(),
            orphans: TxOrphanPool::new(),
            fee_estimator: FeeEstimator::new(current_tip.1),
            rolling_fee_rate: RwLock::new(RollingFeeRate::new(clock.get_time())),
            delta_map: BTreeMap::new(),
            recent_rejects: RecentRejects::new(current_tip.0),
            verifier,
            clock,
            events_controller: Default::default(),
            current_tip,
            relay_queue: Vec::new(),
            orphan_rng: StdRng::from_entropy(),
            config,
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn store(&self) -> &MempoolStore {
        &self.store
    }

    pub fn best_block_id(&self) -> Id<Block> {
        self.current_tip.0
    }

    pub fn best_block_height(&self) -> BlockHeight {
        self.current_tip.1
    }

    pub fn contains_transaction(&self, tx_id: &Id<Transaction>) -> bool {
        self.store.contains(tx_id)
    }

    pub fn contains_orphan(&self, tx_id: &Id<Transaction>) -> bool {
        self.orphans.contains(tx_id)
    }

    pub fn transaction(&self, tx_id: &Id<Transaction>) -> Option<&SignedTransaction> {
        self.store.get_entry(tx_id).map(|entry| entry.transaction())
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.store.dynamic_memory_usage()
    }

    pub fn fee_estimator(&self) -> &FeeEstimator {
        &self.fee_estimator
    }

    pub fn get_all(&self) -> Vec<SignedTransaction> {
        self.store
            .iter_by_insertion_order()
            .map(|entry| entry.transaction().clone())
            .collect()
    }

    pub fn subscribe_to_events(&mut self, handler: Arc<dyn Fn(MempoolEvent) + Send + Sync>) {
        self.events_controller.subscribe_to_events(handler)
    }

    /// Ids queued for relay since the last trickle tick.
    pub fn take_relay_delta(&mut self) -> Vec<Id<Transaction>> {
        std::mem::take(&mut self.relay_queue)
    }
}

// Rolling-fee-related methods
impl<V: TransactionVerifier> Mempool<V> {
    fn rolling_fee_halflife(&self) -> std::time::Duration {
        let mem_usage = self.memory_usage();
        if mem_usage < self.config.max_size / 4 {
            ROLLING_FEE_BASE_HALFLIFE / 4
        } else if mem_usage < self.config.max_size / 2 {
            ROLLING_FEE_BASE_HALFLIFE / 2
        } else {
            ROLLING_FEE_BASE_HALFLIFE
        }
    }

    fn update_min_fee_rate(&self, rate: FeeRate) {
        let mut rolling_fee_rate = self.rolling_fee_rate.write();
        rolling_fee_rate.set_rolling_minimum_fee_rate(rate);
        rolling_fee_rate.set_block_since_last_rolling_fee_bump(false);
    }

    fn get_update_min_fee_rate(&self) -> FeeRate {
        let rolling_fee_rate = *self.rolling_fee_rate.read();
        if !rolling_fee_rate.block_since_last_rolling_fee_bump()
            || rolling_fee_rate.rolling_minimum_fee_rate() == FeeRate::ZERO
        {
            return rolling_fee_rate.rolling_minimum_fee_rate();
        }

        if self.clock.get_time()
            > rolling_fee_rate.last_rolling_fee_update() + ROLLING_FEE_DECAY_INTERVAL
        {
            self.decay_rolling_fee_rate();

            let halved_floor =
                (self.config.min_relay_fee_rate / 2).expect("division by two cannot fail");
            if self.rolling_fee_rate.read().rolling_minimum_fee_rate() < halved_floor {
                log::trace!("Rolling fee fell below half the relay floor, dropping it to zero");
                self.drop_rolling_fee();
                return FeeRate::ZERO;
            }
        }

        std::cmp::max(
            self.rolling_fee_rate.read().rolling_minimum_fee_rate(),
            self.config.min_relay_fee_rate,
        )
    }

    fn drop_rolling_fee(&self) {
        self.rolling_fee_rate.write().set_rolling_minimum_fee_rate(FeeRate::ZERO)
    }

    fn decay_rolling_fee_rate(&self) {
        let halflife = self.rolling_fee_halflife();
        let time = self.clock.get_time();
        let mut rolling_fee_rate = self.rolling_fee_rate.write();
        *rolling_fee_rate = rolling_fee_rate.decay_fee(halflife, time);
    }

    /// The fee rate below which admission fails right now.
    pub fn get_min_fee(&self) -> FeeRate {
        std::cmp::max(self.get_update_min_fee_rate(), self.config.min_relay_fee_rate)
    }
}

// Transaction validation
impl<V: TransactionVerifier> Mempool<V> {
    // Cheap mempool policy checks that run before anything else
    fn check_preliminary_mempool_policy(
        &self,
        tx: &SignedTransaction,
    ) -> Result<(), MempoolPolicyError> {
        ensure!(!tx.inputs().is_empty(), MempoolPolicyError::NoInputs);
        ensure!(!tx.outputs().is_empty(), MempoolPolicyError::NoOutputs);
        ensure!(
            !has_duplicate_entry(tx.inputs().iter().map(|input| input.outpoint())),
            MempoolPolicyError::DuplicateInputs
        );
        ensure!(
            tx.weight() <= MAX_STANDARD_TX_WEIGHT,
            MempoolPolicyError::ExceedsMaxStandardTxWeight {
                weight: tx.weight(),
                max: MAX_STANDARD_TX_WEIGHT,
            }
        );
        Ok(())
    }

    // Check the transaction against the mempool inclusion policy
    fn check_mempool_policy(&self, tx: &TxEntryWithFee) -> Result<Conflicts, MempoolPolicyError> {
        self.pays_minimum_relay_fees(tx)?;
        self.pays_minimum_mempool_fee(tx)?;
        self.rbf_checks(tx)
    }

    fn pays_minimum_relay_fees(&self, tx: &TxEntryWithFee) -> Result<(), MempoolPolicyError> {
        let tx_fee = tx.fee();
        let relay_fee = self.config.min_relay_fee_rate.compute_fee(tx.size())?;
        log::debug!("pays_minimum_relay_fees: tx_fee {tx_fee}, relay_fee {relay_fee}");
        ensure!(
            tx_fee >= relay_fee,
            MempoolPolicyError::InsufficientFeesToRelay { tx_fee, relay_fee }
        );
        Ok(())
    }

    fn pays_minimum_mempool_fee(&self, tx: &TxEntryWithFee) -> Result<(), MempoolPolicyError> {
        let tx_fee = tx.fee();
        let minimum_fee = self.get_update_min_fee_rate().compute_fee(tx.size())?;
        log::debug!("pays_minimum_mempool_fee: tx_fee {tx_fee}, minimum_fee {minimum_fee}");
        ensure!(
            tx_fee >= minimum_fee,
            MempoolPolicyError::RollingFeeThresholdNotMet {
                minimum_fee,
                tx_fee,
            }
        );
        Ok(())
    }

    fn conflicting_tx_ids<'a>(
        &'a self,
        tx: &'a SignedTransaction,
    ) -> impl 'a + Iterator<Item = Id<Transaction>> {
        tx.inputs()
            .iter()
            .filter_map(|input| self.store.find_conflicting_tx(input.outpoint()))
    }
}

// Replace-by-fee checks
impl<V: TransactionVerifier> Mempool<V> {
    fn rbf_checks(&self, tx: &TxEntryWithFee) -> Result<Conflicts, MempoolPolicyError> {
        let conflicts = self
            .conflicting_tx_ids(tx.transaction())
            .map(|conflict_id| self.store.get_entry(&conflict_id).expect("entry for id"))
            .collect::<Vec<_>>();

        if conflicts.is_empty() {
            Ok(BTreeSet::new().into())
        } else {
            self.do_rbf_checks(tx, &conflicts)
        }
    }

    fn do_rbf_checks(
        &self,
        tx: &TxEntryWithFee,
        conflicts: &[&TxMempoolEntry],
    ) -> Result<Conflicts, MempoolPolicyError> {
        for entry in conflicts {
            // A conflict may only be evicted if it signals replaceability,
            // directly or through an unconfirmed ancestor.
            ensure!(
                entry.is_replaceable(&self.store),
                MempoolPolicyError::ConflictWithIrreplaceableTransaction
            );
        }
        // It's possible that the replacement pays more fees than its direct conflicts but not more
        // than all conflicts (i.e. the direct conflicts have high-fee descendants). However, if the
        // replacement doesn't pay more fees than its direct conflicts, then we can be sure it's not
        // more economically rational to mine. Before we go digging through the mempool for all
        // transactions that would need to be removed (direct conflicts and all descendants), check
        // that the replacement transaction pays more than its direct conflicts.
        self.pays_more_than_direct_conflicts(tx, conflicts)?;
        self.spends_no_new_unconfirmed_outputs(tx, conflicts)?;
        let conflicts_with_descendants = self.potential_replacements_within_limit(conflicts)?;
        let total_conflict_fees =
            self.pays_more_than_conflicts_with_descendants(tx, &conflicts_with_descendants)?;
        self.pays_for_bandwidth(tx, total_conflict_fees)?;
        Ok(Conflicts::from(conflicts_with_descendants))
    }

    fn pays_for_bandwidth(
        &self,
        tx: &TxEntryWithFee,
        total_conflict_fees: Fee,
    ) -> Result<(), MempoolPolicyError> {
        let additional_fees =
            (tx.fee() - total_conflict_fees).ok_or(MempoolPolicyError::AdditionalFeesUnderflow)?;
        let relay_fee = self.config.min_relay_fee_rate.compute_fee(tx.size())?;
        log::debug!(
            "pays_for_bandwidth: conflict fees {total_conflict_fees}, additional {additional_fees}, relay fee {relay_fee}"
        );
        ensure!(
            additional_fees >= relay_fee,
            MempoolPolicyError::InsufficientFeesToRelayRbf
        );
        Ok(())
    }

    fn pays_more_than_conflicts_with_descendants(
        &self,
        tx: &TxEntryWithFee,
        conflicts_with_descendants: &BTreeSet<Id<Transaction>>,
    ) -> Result<Fee, MempoolPolicyError> {
        let total_conflict_fees = conflicts_with_descendants
            .iter()
            .map(|conflict_id| {
                self.store.get_entry(conflict_id).expect("conflict in mempool").fee()
            })
            .sum::<Option<Fee>>()
            .ok_or(MempoolPolicyError::ConflictsFeeOverflow)?;

        let replacement_fee = tx.fee();
        ensure!(
            replacement_fee > total_conflict_fees,
            MempoolPolicyError::TransactionFeeLowerThanConflictsWithDescendants
        );
        Ok(total_conflict_fees)
    }

    fn spends_no_new_unconfirmed_outputs(
        &self,
        tx: &TxEntryWithFee,
        conflicts: &[&TxMempoolEntry],
    ) -> Result<(), MempoolPolicyError> {
        let outpoints_spent_by_conflicts = conflicts
            .iter()
            .flat_map(|conflict| conflict.transaction().inputs().iter().map(|i| i.outpoint()))
            .collect::<BTreeSet<_>>();

        tx.transaction()
            .inputs()
            .iter()
            .find(|input| {
                // input spends an unconfirmed output
                input.spends_unconfirmed(self) &&
                // this unconfirmed output is not spent by one of the conflicts
                !outpoints_spent_by_conflicts.contains(input.outpoint())
            })
            .map_or(Ok(()), |_| {
                Err(MempoolPolicyError::SpendsNewUnconfirmedOutput)
            })
    }

    fn pays_more_than_direct_conflicts(
        &self,
        tx: &TxEntryWithFee,
        conflicts: &[&TxMempoolEntry],
    ) -> Result<(), MempoolPolicyError> {
        let replacement_fee = tx.fee();
        conflicts.iter().find(|conflict| conflict.fee() >= replacement_fee).map_or_else(
            || Ok(()),
            |conflict| {
                Err(MempoolPolicyError::ReplacementFeeLowerThanOriginal {
                    replacement_tx: tx.tx_id(),
                    replacement_fee,
                    original_tx: conflict.tx_id(),
                    original_fee: conflict.fee(),
                })
            },
        )
    }

    fn potential_replacements_within_limit(
        &self,
        conflicts: &[&TxMempoolEntry],
    ) -> Result<BTreeSet<Id<Transaction>>, MempoolPolicyError> {
        let mut num_potential_replacements = 0;
        for conflict in conflicts {
            num_potential_replacements += conflict.count_with_descendants();
            ensure!(
                num_potential_replacements <= MAX_REPLACEMENT_CANDIDATES,
                MempoolPolicyError::TooManyPotentialReplacements
            );
        }
        let replacements_with_descendants = conflicts
            .iter()
            .flat_map(|conflict| {
                BTreeSet::from(self.store.unconfirmed_descendants(&conflict.tx_id()))
            })
            .chain(conflicts.iter().map(|conflict| conflict.tx_id()))
            .collect();

        Ok(replacements_with_descendants)
    }
}

// Admission
impl<V: TransactionVerifier> Mempool<V> {
    pub fn add_transaction(
        &mut self,
        tx: SignedTransaction,
        origin: TxOrigin,
    ) -> Result<TxStatus, Error> {
        let entry = TxEntry::new(tx, self.clock.get_time(), origin);
        self.add_transaction_entry(entry)
    }

    pub fn add_transaction_entry(&mut self, entry: TxEntry) -> Result<TxStatus, Error> {
        let tx_id = entry.tx_id();
        let status = self.admit_transaction(entry).log_err_pfx("Transaction rejected: ")?;
        if status == TxStatus::InMempool {
            self.process_orphans_after(tx_id);
        }
        Ok(status)
    }

    /// Run one transaction through admission, without orphan replay.
    fn admit_transaction(&mut self, entry: TxEntry) -> Result<TxStatus, Error> {
        let tx_id = entry.tx_id();
        log::debug!("Processing transaction {tx_id} from {:?}", entry.origin());

        // Repeated submissions of a present transaction are a silent no-op
        if self.store.contains(&tx_id) {
            return Ok(TxStatus::InMempoolDuplicate);
        }
        ensure!(
            !self.recent_rejects.contains(&tx_id),
            Error::Policy(MempoolPolicyError::PreviouslyRejected)
        );

        if let Err(err) = self.check_preliminary_mempool_policy(entry.transaction()) {
            return Err(self.note_rejection(&entry, err.into()));
        }

        let verified = match self.verifier.verify(entry.transaction(), &self.store) {
            Ok(verified) => verified,
            Err(err) if orphans::detect::is_orphan_error(&err) => {
                return self.handle_missing_inputs(entry)
            }
            Err(err) => {
                return Err(self.note_rejection(&entry, TxValidationError::from(err).into()))
            }
        };

        let origin = entry.origin();
        let tx = TxEntryWithFee::new(entry, verified);

        let conflicts = match self.check_mempool_policy(&tx) {
            Ok(conflicts) => conflicts,
            Err(err) => return Err(self.note_rejection(tx.entry(), err.into())),
        };

        let parents = tx
            .transaction()
            .inputs()
            .iter()
            .map(|input| input.outpoint().tx_id())
            .filter(|id| self.store.contains(id))
            .collect::<BTreeSet<_>>();
        let ancestors = match self.store.unconfirmed_ancestors_from_parents(
            &parents,
            tx.size(),
            (&self.config).into(),
        ) {
            Ok(ancestors) => ancestors,
            Err(err) => return Err(self.note_rejection(tx.entry(), err.into())),
        };

        let replacement = !conflicts.is_empty();
        if replacement {
            log::info!("Replacing {} in-mempool transactions with {tx_id}", conflicts.len());
            for conflict_id in conflicts.iter() {
                self.fee_estimator.remove_tx(conflict_id);
            }
            self.store.drop_conflicts(conflicts);
        }

        let (fee, size, height) = (tx.fee(), tx.size(), tx.verified().height);
        self.store.add_unchecked(tx, parents, &ancestors)?;

        if let Some(delta) = self.delta_map.get(&tx_id) {
            self.store.set_fee_delta(&tx_id, delta.fee);
        }

        let fee_rate = NonZeroUsize::new(size)
            .and_then(|size| FeeRate::from_total_tx_fee(fee, size).ok())
            .unwrap_or(FeeRate::ZERO);
        self.fee_estimator.process_transaction(tx_id, height, fee_rate, !replacement);

        self.remove_expired_transactions();
        ensure!(
            self.store.contains(&tx_id),
            Error::Policy(MempoolPolicyError::DescendantOfExpiredTransaction)
        );

        self.limit_mempool_size();
        ensure!(
            self.store.contains(&tx_id),
            Error::Policy(MempoolPolicyError::MempoolFull)
        );

        self.relay_queue.push(tx_id);
        self.events_controller
            .broadcast(MempoolEvent::TransactionReceived { tx_id, origin });
        log::debug!("Transaction {tx_id} accepted into the mempool");
        Ok(TxStatus::InMempool)
    }

    /// A transaction with unknown inputs is parked in the orphan pool when
    /// it came from a peer; local submitters get the error back.
    fn handle_missing_inputs(&mut self, entry: TxEntry) -> Result<TxStatus, Error> {
        match entry.origin() {
            TxOrigin::Peer(peer) => {
                let now = self.clock.get_time();
                let tx_id = entry.tx_id();
                if self.orphans.insert(entry.transaction().clone(), peer, now) {
                    let max = self.config.max_orphan_count;
                    let evicted = self.orphans.limit(max, now, &mut self.orphan_rng);
                    if evicted > 0 {
                        log::debug!("Orphan cap exceeded, evicted {evicted} entries");
                    }
                    if self.orphans.contains(&tx_id) {
                        return Ok(TxStatus::InOrphanPool);
                    }
                }
                Err(TxValidationError::MissingInputs.into())
            }
            TxOrigin::Local => Err(TxValidationError::MissingInputs.into()),
        }
    }

    /// Record a rejection in the per-tip filter, except when the failure
    /// may stem from a malleated witness.
    fn note_rejection(&mut self, entry: &TxEntry, err: Error) -> Error {
        let corruption_possible = matches!(
            &err,
            Error::Validity(TxValidationError::Verifier(TxVerifierError::Invalid {
                corruption_possible: true,
                ..
            }))
        );
        if !corruption_possible && !entry.transaction().has_witness() {
            self.recent_rejects.insert(entry.tx_id());
        }
        err
    }

    /// Replay orphans unlocked by a newly accepted transaction, cascading
    /// through their own children. Emits the regular admission signals in
    /// dependency order.
    fn process_orphans_after(&mut self, tx_id: Id<Transaction>) {
        let mut work = vec![tx_id];
        while let Some(current) = work.pop() {
            let candidates = match self.store.get_entry(&current) {
                Some(entry) => self.orphans.children_of(entry.transaction()),
                None => continue,
            };
            for candidate_id in candidates {
                let Some(orphan) = self.orphans.remove(&candidate_id) else { continue };
                let peer = orphan.peer();
                let entry = TxEntry::new(
                    orphan.into_transaction(),
                    self.clock.get_time(),
                    TxOrigin::Peer(peer),
                );
                match self.admit_transaction(entry) {
                    Ok(TxStatus::InMempool) => work.push(candidate_id),
                    Ok(_) => {}
                    Err(err) => {
                        log::debug!("Orphan {candidate_id} replay failed: {err}")
                    }
                }
            }
        }
    }
}

// Eviction and expiry
impl<V: TransactionVerifier> Mempool<V> {
    fn limit_mempool_size(&mut self) {
        let limit = self.config.max_size;
        let _ = self.trim_to_size(limit);
    }

    /// Remove lowest-value packages until the memory estimate fits
    /// `size_limit`. Each removal bumps the rolling minimum fee above the
    /// evicted package's rate. Returns the outpoints consumed by removed
    /// transactions whose producing transaction is gone from the pool, for
    /// callers maintaining spend caches.
    pub fn trim_to_size(&mut self, size_limit: usize) -> Vec<OutPoint> {
        let mut removed_outpoints = Vec::new();
        while !self.store.is_empty() && self.store.dynamic_memory_usage() > size_limit {
            let worst = self
                .store
                .iter_by_descendant_score()
                .next()
                .expect("pool known to be non-empty");
            let worst_id = worst.tx_id();
            let package_rate = NonZeroUsize::new(worst.size_with_descendants())
                .and_then(|size| {
                    FeeRate::from_total_tx_fee(worst.fees_with_descendants(), size).ok()
                })
                .unwrap_or(FeeRate::ZERO);
            log::debug!(
                "Mempool trim: evicting package of {worst_id} at {package_rate} ({} txs)",
                worst.count_with_descendants()
            );

            let mut stage = BTreeSet::from(self.store.unconfirmed_descendants(&worst_id));
            stage.insert(worst_id);

            let spent: Vec<OutPoint> = stage
                .iter()
                .flat_map(|tx_id| {
                    self.store
                        .get_entry(tx_id)
                        .expect("staged entry")
                        .transaction()
                        .inputs()
                        .iter()
                        .map(|input| *input.outpoint())
                })
                .collect();

            for tx_id in &stage {
                self.fee_estimator.remove_tx(tx_id);
            }
            self.store.remove_staged(&stage, false, MempoolRemovalReason::SizeLimit);

            removed_outpoints
                .extend(spent.into_iter().filter(|outpoint| !self.store.contains(&outpoint.tx_id())));

            let bumped = (package_rate + self.config.min_relay_fee_rate)
                .expect("fee rate bump overflow");
            if bumped > self.rolling_fee_rate.read().rolling_minimum_fee_rate() {
                self.update_min_fee_rate(bumped);
            }
        }
        removed_outpoints
    }

    /// Remove entries older than `cutoff` along with their descendants.
    pub fn expire(&mut self, cutoff: Time) -> usize {
        let roots = self.store.collect_expired(cutoff);
        if roots.is_empty() {
            return 0;
        }
        let mut stage = BTreeSet::new();
        for tx_id in roots {
            stage.extend(BTreeSet::from(self.store.unconfirmed_descendants(&tx_id)));
            stage.insert(tx_id);
        }
        for tx_id in &stage {
            self.fee_estimator.remove_tx(tx_id);
        }
        let count = stage.len();
        self.store.remove_staged(&stage, false, MempoolRemovalReason::Expiry);
        log::info!("Expired {count} mempool transactions");
        count
    }

    fn remove_expired_transactions(&mut self) {
        let cutoff = self.clock.get_time().saturating_sub(self.config.max_tx_age);
        if !self.store.collect_expired(cutoff).is_empty() {
            self.expire(cutoff);
        }
    }
}

// Operator deltas
impl<V: TransactionVerifier> Mempool<V> {
    /// Add to the priority and fee adjustments of a txid. The fee part
    /// takes effect immediately if the transaction is in the pool and is
    /// remembered for later arrivals either way.
    pub fn apply_delta(&mut self, tx_id: Id<Transaction>, priority_delta: f64, fee_delta: i128) {
        let delta = self.delta_map.entry(tx_id).or_default();
        delta.priority += priority_delta;
        delta.fee += fee_delta;
        let fee = delta.fee;
        log::info!("Applying delta to {tx_id}: priority {priority_delta:+}, fee {fee_delta:+}");
        self.store.set_fee_delta(&tx_id, fee);
    }

    pub fn delta(&self, tx_id: &Id<Transaction>) -> Option<TxDelta> {
        self.delta_map.get(tx_id).copied()
    }

    pub fn clear_delta(&mut self, tx_id: &Id<Transaction>) {
        if self.delta_map.remove(tx_id).is_some() {
            self.store.set_fee_delta(tx_id, 0);
        }
    }
}

// Chain events
impl<V: TransactionVerifier> Mempool<V> {
    /// A block was connected on top of the pool's current tip.
    pub fn block_connected(&mut self, block: &Block, height: BlockHeight) {
        reorg::block_connected(self, block, height)
    }

    /// The pool's current tip block was disconnected.
    pub fn block_disconnected(&mut self, block: &Block) {
        reorg::block_disconnected(self, block)
    }
}

// Orphan maintenance
impl<V: TransactionVerifier> Mempool<V> {
    pub fn erase_orphans_for_peer(&mut self, peer: PeerId) -> usize {
        self.orphans.erase_for_peer(peer)
    }

    /// Drop expired orphans; a no-op while the minimum sweep interval has
    /// not elapsed.
    pub fn sweep_expired_orphans(&mut self) -> usize {
        let now = self.clock.get_time();
        self.orphans.sweep_expired(now)
    }

    /// A transaction is known if it sits in the pool, the orphan pool, or
    /// was rejected at the current tip.
    pub fn already_have(&self, tx_id: &Id<Transaction>) -> bool {
        self.store.contains(tx_id)
            || self.orphans.contains(tx_id)
            || self.recent_rejects.contains(tx_id)
    }
}

// Persistence
impl<V: TransactionVerifier> Mempool<V> {
    /// Snapshot the pool contents in admission order.
    pub fn collect_snapshot(&self) -> Vec<persistence::SnapshotEntry> {
        self.store
            .iter_by_insertion_order()
            .map(|entry| persistence::SnapshotEntry {
                tx: entry.transaction().clone(),
                entry_time: entry.creation_time().as_secs(),
                fee_delta: entry.fee_delta() as i64,
            })
            .collect()
    }

    /// Feed a snapshot back through admission. Entries keep their original
    /// admission times and fee deltas; anything no longer valid is skipped.
    pub fn load_snapshot(&mut self, entries: Vec<persistence::SnapshotEntry>) -> usize {
        let total = entries.len();
        let mut accepted = 0;
        for snapshot_entry in entries {
            let tx_id = snapshot_entry.tx.get_id();
            if snapshot_entry.fee_delta != 0 {
                self.delta_map.entry(tx_id).or_default().fee = snapshot_entry.fee_delta as i128;
            }
            let entry = TxEntry::new(
                snapshot_entry.tx,
                Time::from_secs(snapshot_entry.entry_time),
                TxOrigin::Local,
            );
            match self.add_transaction_entry(entry) {
                Ok(TxStatus::InMempool) => accepted += 1,
                Ok(status) => log::debug!("Snapshot tx {tx_id} landed as {status:?}"),
                Err(err) => log::debug!("Snapshot tx {tx_id} no longer valid: {err}"),
            }
        }
        log::info!("Imported {accepted} of {total} transactions from the mempool snapshot");
        accepted
    }
}

fn has_duplicate_entry<T>(iter: T) -> bool
where
    T: IntoIterator,
    T::Item: Ord,
{
    let mut uniq = BTreeSet::new();
    iter.into_iter().any(move |x| !uniq.insert(x))
}

#[cfg(test)]
mod tests;
