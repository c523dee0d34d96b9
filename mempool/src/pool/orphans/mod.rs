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

//! Holding area for transactions whose inputs are not yet known.
//!
//! Orphans wait for their parents for a bounded time and within a bounded
//! count; when the cap is exceeded, uniformly random entries make room.
//! Every orphan remembers the peer that announced it, so a disconnecting
//! peer takes its orphans with it.

pub mod detect;

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use common::chain::{OutPoint, SignedTransaction, Transaction};
use common::primitives::{Id, Idable};
use logging::log;

use crate::config::{Time, MAX_STANDARD_TX_WEIGHT, ORPHAN_EXPIRY, ORPHAN_SWEEP_MIN_INTERVAL};
use crate::tx_origin::PeerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanEntry {
    tx: SignedTransaction,
    peer: PeerId,
    expiry_time: Time,
}

impl OrphanEntry {
    pub fn transaction(&self) -> &SignedTransaction {
        &self.tx
    }

    pub fn into_transaction(self) -> SignedTransaction {
        self.tx
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn expiry_time(&self) -> Time {
        self.expiry_time
    }
}

#[derive(Debug, Default)]
pub struct TxOrphanPool {
    orphans: BTreeMap<Id<Transaction>, OrphanEntry>,

    // Orphans indexed by each outpoint they consume, so a newly accepted
    // transaction can look up the orphans it may unlock.
    by_outpoint: BTreeMap<OutPoint, BTreeSet<Id<Transaction>>>,

    by_peer: BTreeMap<PeerId, BTreeSet<Id<Transaction>>>,

    next_sweep: Time,
}

impl TxOrphanPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, tx_id: &Id<Transaction>) -> bool {
        self.orphans.contains_key(tx_id)
    }

    pub fn get(&self, tx_id: &Id<Transaction>) -> Option<&OrphanEntry> {
        self.orphans.get(tx_id)
    }

    /// Store a transaction until its parents arrive. Returns false for
    /// duplicates and for transactions too large to be worth holding.
    pub fn insert(&mut self, tx: SignedTransaction, peer: PeerId, now: Time) -> bool {
        let tx_id = tx.get_id();
        if self.orphans.contains_key(&tx_id) {
            return false;
        }
        if tx.weight() > MAX_STANDARD_TX_WEIGHT {
            log::debug!("Ignoring oversized orphan {tx_id} (weight {})", tx.weight());
            return false;
        }

        for input in tx.inputs() {
            self.by_outpoint.entry(*input.outpoint()).or_default().insert(tx_id);
        }
        self.by_peer.entry(peer).or_default().insert(tx_id);
        self.orphans.insert(
            tx_id,
            OrphanEntry {
                tx,
                peer,
                expiry_time: now + ORPHAN_EXPIRY,
            },
        );
        log::debug!("Stored orphan {tx_id} from peer {peer}");
        true
    }

    pub fn remove(&mut self, tx_id: &Id<Transaction>) -> Option<OrphanEntry> {
        let entry = self.orphans.remove(tx_id)?;
        for input in entry.tx.inputs() {
            let ids = self.by_outpoint.get_mut(input.outpoint()).expect("outpoint indexed");
            ids.remove(tx_id);
            if ids.is_empty() {
                self.by_outpoint.remove(input.outpoint());
            }
        }
        let peer_orphans = self.by_peer.get_mut(&entry.peer).expect("peer indexed");
        peer_orphans.remove(tx_id);
        if peer_orphans.is_empty() {
            self.by_peer.remove(&entry.peer);
        }
        Some(entry)
    }

    pub fn erase_for_peer(&mut self, peer: PeerId) -> usize {
        let ids: Vec<_> = self
            .by_peer
            .get(&peer)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for tx_id in &ids {
            self.remove(tx_id);
        }
        if !ids.is_empty() {
            log::debug!("Erased {} orphans of disconnected peer {peer}", ids.len());
        }
        ids.len()
    }

    /// Deduplicated ids of orphans that spend an output of `tx`. The same
    /// orphan may match several outputs, so ids are collected into a set
    /// before being handed back for a replay pass.
    pub fn children_of(&self, tx: &SignedTransaction) -> Vec<Id<Transaction>> {
        let tx_id = tx.get_id();
        let mut candidates = BTreeSet::new();
        for index in 0..tx.outputs().len() as u32 {
            if let Some(ids) = self.by_outpoint.get(&OutPoint::new(tx_id, index)) {
                candidates.extend(ids.iter().copied());
            }
        }
        candidates.into_iter().collect()
    }

    /// Drop entries past their expiry time. Runs at most once per
    /// [ORPHAN_SWEEP_MIN_INTERVAL]; afterwards the next sweep is scheduled
    /// relative to the earliest surviving expiry.
    pub fn sweep_expired(&mut self, now: Time) -> usize {
        if now < self.next_sweep {
            return 0;
        }
        let expired: Vec<_> = self
            .orphans
            .iter()
            .filter(|(_, entry)| entry.expiry_time <= now)
            .map(|(tx_id, _)| *tx_id)
            .collect();
        for tx_id in &expired {
            self.remove(tx_id);
        }

        let min_surviving_expiry =
            self.orphans.values().map(|entry| entry.expiry_time).min().unwrap_or(now);
        self.next_sweep = min_surviving_expiry + ORPHAN_SWEEP_MIN_INTERVAL;

        if !expired.is_empty() {
            log::info!("Expired {} orphan transactions", expired.len());
        }
        expired.len()
    }

    /// Sweep, then evict uniformly random entries until at most `max`
    /// orphans remain. Returns the total number of entries dropped.
    pub fn limit(&mut self, max: usize, now: Time, rng: &mut impl Rng) -> usize {
        let mut evicted = self.sweep_expired(now);
        while self.orphans.len() > max {
            let victim = *self
                .orphans
                .keys()
                .nth(rng.gen_range(0..self.orphans.len()))
                .expect("non-empty orphan pool");
            self.remove(&victim);
            evicted += 1;
        }
        evicted
    }

    /// When the next expiry sweep is due, for scheduling.
    pub fn next_sweep_time(&self) -> Time {
        self.next_sweep
    }
}
