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

//! Fee estimation from observed confirmation latencies.
//!
//! Admitted transactions are sorted into geometrically spaced fee-rate
//! buckets. When a block confirms a tracked transaction, every "confirmed
//! within N blocks" counter at or above its latency is credited for its
//! bucket. All counters decay exponentially per block, so recent history
//! dominates. An estimate for a target is the cheapest bucket range whose
//! confirmation fraction clears the success threshold, with still-pending
//! transactions counted against it.

use std::collections::BTreeMap;

use common::chain::Transaction;
use common::primitives::{BlockHeight, Id};
use logging::log;

use super::feerate::FeeRate;

/// Number of confirmation targets tracked.
pub const MAX_CONFIRM_TARGET: usize = 25;

/// Cheapest tracked fee-rate bucket, in atoms per 1000 vbytes.
const MIN_BUCKET_FEERATE: f64 = 1000.0;

/// Most expensive tracked fee-rate bucket.
const MAX_BUCKET_FEERATE: f64 = 1e10;

/// Geometric spacing between adjacent buckets.
const BUCKET_SPACING: f64 = 1.1;

/// Per-block decay of all moving averages.
const DECAY: f64 = 0.998;

/// Minimum decayed sample weight before a bucket range yields an estimate.
const SUFFICIENT_SAMPLES: f64 = 1.0;

/// Fraction of a bucket range that must confirm within the target.
const SUCCESS_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy)]
struct TrackedTx {
    height: BlockHeight,
    bucket: usize,
}

#[derive(Debug)]
pub struct FeeEstimator {
    /// Upper bound fee rate of each bucket, ascending.
    buckets: Vec<f64>,

    best_seen_height: BlockHeight,

    /// Decayed count of transactions confirmed within `target` blocks, per
    /// `[target - 1][bucket]`.
    conf_avg: Vec<Vec<f64>>,
    /// Decayed count of all confirmed transactions per bucket.
    tx_ct_avg: Vec<f64>,
    /// Decayed sum of fee rates per bucket, for representative rates.
    avg_feerate: Vec<f64>,

    /// Still-unconfirmed transactions per `[height % MAX_CONFIRM_TARGET][bucket]`.
    unconf_txs: Vec<Vec<usize>>,
    /// Unconfirmed transactions older than the tracking window.
    old_unconf_txs: Vec<usize>,

    tracked: BTreeMap<Id<Transaction>, TrackedTx>,
}

impl FeeEstimator {
    pub fn new(best_seen_height: BlockHeight) -> Self {
        let mut buckets = Vec::new();
        let mut bound = MIN_BUCKET_FEERATE;
        while bound <= MAX_BUCKET_FEERATE {
            buckets.push(bound);
            bound *= BUCKET_SPACING;
        }
        buckets.push(f64::INFINITY);

        let n = buckets.len();
        Self {
            best_seen_height,
            conf_avg: vec![vec![0.0; n]; MAX_CONFIRM_TARGET],
            tx_ct_avg: vec![0.0; n],
            avg_feerate: vec![0.0; n],
            unconf_txs: vec![vec![0; n]; MAX_CONFIRM_TARGET],
            old_unconf_txs: vec![0; n],
            tracked: BTreeMap::new(),
            buckets,
        }
    }

    pub fn best_seen_height(&self) -> BlockHeight {
        self.best_seen_height
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    fn bucket_index(&self, feerate: f64) -> usize {
        self.buckets.partition_point(|bound| *bound < feerate)
    }

    fn ring_slot(height: BlockHeight) -> usize {
        (height.into_int() % MAX_CONFIRM_TARGET as u64) as usize
    }

    /// Observe a newly admitted transaction.
    ///
    /// Only transactions admitted at the current height with
    /// `valid_fee_estimate` participate: replacements and re-admissions
    /// would skew the statistics.
    pub fn process_transaction(
        &mut self,
        tx_id: Id<Transaction>,
        height: BlockHeight,
        feerate: FeeRate,
        valid_fee_estimate: bool,
    ) {
        if !valid_fee_estimate || height != self.best_seen_height {
            return;
        }
        if self.tracked.contains_key(&tx_id) {
            return;
        }
        let bucket = self.bucket_index(feerate.atoms_per_kb() as f64);
        self.unconf_txs[Self::ring_slot(height)][bucket] += 1;
        self.tracked.insert(tx_id, TrackedTx { height, bucket });
    }

    /// Forget a transaction that left the pool without being confirmed.
    pub fn remove_tx(&mut self, tx_id: &Id<Transaction>) {
        let Some(tracked) = self.tracked.remove(tx_id) else { return };
        let age = self.best_seen_height.checked_distance(tracked.height).unwrap_or(0);
        let slot = if age >= MAX_CONFIRM_TARGET as u64 {
            &mut self.old_unconf_txs[tracked.bucket]
        } else {
            &mut self.unconf_txs[Self::ring_slot(tracked.height)][tracked.bucket]
        };
        *slot = slot.checked_sub(1).unwrap_or_else(|| {
            log::error!("Fee estimator unconfirmed count underflow");
            0
        });
    }

    /// Observe a connected block. `confirmed` lists the entries from the
    /// block that were in the pool, with their admission heights and fee
    /// rates. Must be called before the entries are removed from the pool.
    pub fn process_block(
        &mut self,
        height: BlockHeight,
        confirmed: &[(Id<Transaction>, BlockHeight, FeeRate)],
    ) {
        if height <= self.best_seen_height && self.best_seen_height != BlockHeight::zero() {
            return;
        }
        self.best_seen_height = height;

        self.decay_averages();
        self.rotate_unconfirmed(height);

        for (tx_id, entry_height, feerate) in confirmed {
            self.process_confirmed_tx(*tx_id, *entry_height, *feerate);
        }
    }

    fn decay_averages(&mut self) {
        for row in &mut self.conf_avg {
            for value in row.iter_mut() {
                *value *= DECAY;
            }
        }
        for value in self.tx_ct_avg.iter_mut() {
            *value *= DECAY;
        }
        for value in self.avg_feerate.iter_mut() {
            *value *= DECAY;
        }
    }

    /// The ring slot about to be reused belongs to entries that fell out of
    /// the tracking window; count them as long-unconfirmed instead.
    fn rotate_unconfirmed(&mut self, height: BlockHeight) {
        let slot = Self::ring_slot(height);
        for bucket in 0..self.buckets.len() {
            self.old_unconf_txs[bucket] += self.unconf_txs[slot][bucket];
            self.unconf_txs[slot][bucket] = 0;
        }
    }

    fn process_confirmed_tx(
        &mut self,
        tx_id: Id<Transaction>,
        entry_height: BlockHeight,
        feerate: FeeRate,
    ) {
        if let Some(tracked) = self.tracked.remove(&tx_id) {
            let age = self.best_seen_height.checked_distance(tracked.height).unwrap_or(0);
            if age < MAX_CONFIRM_TARGET as u64 {
                let slot = Self::ring_slot(tracked.height);
                let count = &mut self.unconf_txs[slot][tracked.bucket];
                *count = count.saturating_sub(1);
            } else {
                self.old_unconf_txs[tracked.bucket] =
                    self.old_unconf_txs[tracked.bucket].saturating_sub(1);
            }
        }

        let blocks_to_confirm = match self.best_seen_height.checked_distance(entry_height) {
            Some(blocks) if blocks >= 1 => blocks as usize,
            _ => return,
        };

        let bucket = self.bucket_index(feerate.atoms_per_kb() as f64);
        for target in blocks_to_confirm..=MAX_CONFIRM_TARGET {
            self.conf_avg[target - 1][bucket] += 1.0;
        }
        self.tx_ct_avg[bucket] += 1.0;
        self.avg_feerate[bucket] += feerate.atoms_per_kb() as f64;
    }

    /// The lowest fee rate expected to confirm within `conf_target` blocks,
    /// if the history supports an estimate.
    pub fn estimate_fee(&self, conf_target: usize) -> Option<FeeRate> {
        if conf_target == 0
            || conf_target > MAX_CONFIRM_TARGET
            || self.best_seen_height == BlockHeight::zero()
        {
            return None;
        }

        // Walk from the most expensive bucket down, extending the passing
        // range for as long as the confirmation fraction holds up. The
        // lowest extension that still passes is the estimate; the first
        // failure ends the scan.
        let mut conf_sum = 0.0;
        let mut total_sum = 0.0;
        let mut extra_sum = 0.0;
        let mut feerate_sum = 0.0;
        let mut best_rate = None;

        for bucket in (0..self.buckets.len()).rev() {
            conf_sum += self.conf_avg[conf_target - 1][bucket];
            total_sum += self.tx_ct_avg[bucket];
            extra_sum += self.pending_older_than(conf_target, bucket) as f64;
            feerate_sum += self.avg_feerate[bucket];

            if total_sum < SUFFICIENT_SAMPLES {
                continue;
            }
            if conf_sum / (total_sum + extra_sum) >= SUCCESS_THRESHOLD {
                best_rate = Some(feerate_sum / total_sum);
            } else {
                break;
            }
        }

        best_rate.map(|rate| FeeRate::from_atoms_per_kb(rate as u128))
    }

    /// Scan upward from `conf_target` until some target yields an estimate.
    pub fn estimate_smart_fee(&self, conf_target: usize) -> Option<(FeeRate, usize)> {
        let start = conf_target.clamp(1, MAX_CONFIRM_TARGET);
        (start..=MAX_CONFIRM_TARGET)
            .find_map(|target| self.estimate_fee(target).map(|rate| (rate, target)))
    }

    /// Transactions in `bucket` that have waited longer than `conf_target`
    /// blocks and still sit in the pool; they count against the bucket.
    fn pending_older_than(&self, conf_target: usize, bucket: usize) -> usize {
        let mut pending = self.old_unconf_txs[bucket];
        for age in conf_target..MAX_CONFIRM_TARGET {
            let Some(height) = self.best_seen_height.into_int().checked_sub(age as u64) else {
                break;
            };
            pending += self.unconf_txs[BlockHeight::new(height).into_int() as usize
                % MAX_CONFIRM_TARGET][bucket];
        }
        pending
    }
}
