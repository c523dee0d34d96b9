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

//! Single-writer serialization and periodic maintenance.
//!
//! The pool itself is not thread-aware; [MempoolHandle] wraps it in a
//! writer-priority lock so that readers share access and every mutation is
//! exclusive. The `run` loop drives the periodic tasks (orphan sweeps,
//! relay trickles) and persists the pool on shutdown. Blocking I/O and
//! relay callbacks happen outside the critical section: state is
//! snapshotted under the lock first.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use common::chain::Transaction;
use common::primitives::Id;
use logging::log;
use utils::tap_error_log::LogError;

use crate::config::RELAY_TRICKLE_INTERVAL;
use crate::pool::{persistence, Mempool};
use crate::tx_verifier::TransactionVerifier;

pub struct MempoolHandle<V> {
    pool: Arc<RwLock<Mempool<V>>>,
}

impl<V> Clone for MempoolHandle<V> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<V: TransactionVerifier + Send + Sync + 'static> MempoolHandle<V> {
    pub fn new(mempool: Mempool<V>) -> Self {
        Self {
            pool: Arc::new(RwLock::new(mempool)),
        }
    }

    /// Shared read access; runs concurrently with other readers.
    pub fn read<R>(&self, f: impl FnOnce(&Mempool<V>) -> R) -> R {
        f(&self.pool.read())
    }

    /// Exclusive write access. The callback must leave every invariant
    /// satisfied and must not block on I/O.
    pub fn write<R>(&self, f: impl FnOnce(&mut Mempool<V>) -> R) -> R {
        f(&mut self.pool.write())
    }

    /// Load the on-disk snapshot, if one is configured, feeding the entries
    /// back through admission.
    pub fn load_saved_mempool(&self) -> usize {
        let Some(path) = self.read(|pool| pool.config().mempool_file.clone()) else {
            return 0;
        };
        match persistence::read_snapshot(&path) {
            Ok(entries) => self.write(|pool| pool.load_snapshot(entries)),
            Err(err) => {
                log::warn!("Failed to read the mempool snapshot: {err}");
                0
            }
        }
    }

    /// Snapshot the pool under the lock and write the file outside of it.
    pub fn save_mempool(&self) -> bool {
        let Some(path) = self.read(|pool| pool.config().mempool_file.clone()) else {
            return false;
        };
        let entries = self.read(|pool| pool.collect_snapshot());
        persistence::write_snapshot(&path, &entries)
            .log_err_pfx("Failed to persist the mempool: ")
            .is_ok()
    }

    /// Periodic task loop. Returns once `shutdown` flips to true and the
    /// final save (if configured) completed.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        on_relay: impl Fn(Vec<Id<Transaction>>),
    ) {
        log::info!("Starting mempool maintenance tasks");
        let mut trickle = tokio::time::interval(RELAY_TRICKLE_INTERVAL);
        trickle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = trickle.tick() => {
                    // Drain under the lock, notify outside of it.
                    let delta = self.write(|pool| {
                        pool.sweep_expired_orphans();
                        pool.take_relay_delta()
                    });
                    if !delta.is_empty() {
                        on_relay(delta);
                    }
                }

                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let save_on_shutdown = self.read(|pool| pool.config().save_on_shutdown);
        if save_on_shutdown {
            let handle = self.clone();
            let saved =
                tokio::task::spawn_blocking(move || handle.save_mempool()).await.unwrap_or(false);
            if saved {
                log::info!("Mempool persisted on shutdown");
            }
        }
        log::info!("Mempool maintenance tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use common::chain::{OutPoint, Transaction, TxInput, TxOutput};
    use common::primitives::{Amount, BlockHeight, Id, H256};
    use common::time_getter::TimeGetter;

    use crate::config::MempoolConfig;
    use crate::tx_verifier::{
        TransactionVerifier, TxVerified, TxVerifierError, UnconfirmedOutputsView,
    };

    /// A verifier that accepts everything with a fixed fee.
    struct AcceptAll;

    impl TransactionVerifier for AcceptAll {
        fn best_block(&self) -> (Id<common::chain::Block>, BlockHeight) {
            (Id::zero(), BlockHeight::new(1))
        }

        fn verify(
            &self,
            tx: &common::chain::SignedTransaction,
            _unconfirmed: &dyn UnconfirmedOutputsView,
        ) -> Result<TxVerified, TxVerifierError> {
            Ok(TxVerified {
                fee: crate::pool::fee::Fee::from_atoms(10_000),
                tx_size: tx.vsize(),
                sigop_cost: 1,
                spends_coinbase: false,
                height: BlockHeight::new(1),
            })
        }
    }

    fn make_tx(byte: u8) -> common::chain::SignedTransaction {
        Transaction::new(
            1,
            vec![TxInput::new(OutPoint::new(Id::new(H256::repeat_byte(byte)), 0), 0)],
            vec![TxOutput::new(Amount::from_atoms(1000), vec![])],
            0,
        )
        .unwrap()
        .with_signatures(vec![Default::default()])
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn relay_trickle_delivers_queued_ids() {
        let handle = MempoolHandle::new(Mempool::new(
            MempoolConfig::default(),
            AcceptAll,
            TimeGetter::default(),
        ));

        use common::primitives::Idable;
        let tx = make_tx(1);
        let tx_id = tx.transaction().get_id();
        handle
            .write(|pool| pool.add_transaction(tx, crate::tx_origin::TxOrigin::Local))
            .unwrap();

        let relayed: Arc<Mutex<Vec<Id<Transaction>>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);

        let task = {
            let handle = handle.clone();
            let relayed = Arc::clone(&relayed);
            tokio::spawn(async move {
                handle
                    .run(shutdown_receiver, move |ids| {
                        relayed.lock().unwrap().extend(ids)
                    })
                    .await
            })
        };

        // Let the trickle interval fire at least once
        tokio::time::sleep(Duration::from_secs(6)).await;
        shutdown_sender.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(*relayed.lock().unwrap(), vec![tx_id]);
    }
}
