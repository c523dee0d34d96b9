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

use super::*;
use crate::pool::fee::Fee;
use crate::pool::store::MempoolRemovalReason;

/// parent -> {child_a, child_b} -> grandchild
fn admit_diamond(
    mempool: &mut Mempool<TestChainstate>,
    chainstate: &TestChainstate,
) -> [SignedTransaction; 4] {
    let input = chainstate.add_utxo(10_000_000);
    let parent = build_tx(&[input], &[4_000_000, 4_000_000]);
    let child_a = build_tx(&[outpoint(&parent, 0)], &[3_000_000]);
    let child_b = build_tx(&[outpoint(&parent, 1)], &[3_000_000]);
    let grandchild = build_tx(&[outpoint(&child_a, 0), outpoint(&child_b, 0)], &[5_000_000]);

    for tx in [&parent, &child_a, &child_b, &grandchild] {
        assert_eq!(
            mempool.add_transaction(tx.clone(), TxOrigin::Local).unwrap(),
            TxStatus::InMempool
        );
    }
    [parent, child_a, child_b, grandchild]
}

#[test]
fn diamond_aggregates() {
    let (mut mempool, chainstate, _clock) = setup();
    let [parent, child_a, child_b, grandchild] = admit_diamond(&mut mempool, &chainstate);

    let store = mempool.store();
    let parent_entry = store.get_entry(&parent.get_id()).unwrap();
    let grandchild_entry = store.get_entry(&grandchild.get_id()).unwrap();
    let child_a_entry = store.get_entry(&child_a.get_id()).unwrap();

    assert_eq!(parent_entry.count_with_descendants(), 4);
    assert_eq!(parent_entry.count_with_ancestors(), 1);
    assert_eq!(grandchild_entry.count_with_ancestors(), 4);
    assert_eq!(grandchild_entry.count_with_descendants(), 1);
    assert_eq!(child_a_entry.count_with_ancestors(), 2);
    assert_eq!(child_a_entry.count_with_descendants(), 2);

    let total_size: usize =
        [&parent, &child_a, &child_b, &grandchild].iter().map(|tx| tx.vsize()).sum();
    assert_eq!(parent_entry.size_with_descendants(), total_size);
    assert_eq!(grandchild_entry.size_with_ancestors(), total_size);

    // parent/children links
    assert_eq!(
        parent_entry.children().copied().collect::<std::collections::BTreeSet<_>>(),
        std::collections::BTreeSet::from([child_a.get_id(), child_b.get_id()])
    );
    assert_eq!(grandchild_entry.parents().count(), 2);

    store.assert_valid();
}

#[test]
fn recursive_removal_takes_all_descendants() {
    let (mut mempool, chainstate, _clock) = setup();
    let [parent, child_a, child_b, grandchild] = admit_diamond(&mut mempool, &chainstate);

    // Removing child_a must drag the grandchild along, but leave child_b
    let mut stage =
        std::collections::BTreeSet::from(mempool.store.unconfirmed_descendants(&child_a.get_id()));
    stage.insert(child_a.get_id());
    mempool.store.remove_staged(&stage, false, MempoolRemovalReason::Expiry);

    let store = mempool.store();
    assert!(!store.contains(&child_a.get_id()));
    assert!(!store.contains(&grandchild.get_id()));
    assert!(store.contains(&child_b.get_id()));

    let parent_entry = store.get_entry(&parent.get_id()).unwrap();
    assert_eq!(parent_entry.count_with_descendants(), 2);
    let child_b_entry = store.get_entry(&child_b.get_id()).unwrap();
    assert_eq!(child_b_entry.count_with_descendants(), 1);

    store.assert_valid();
}

#[test]
fn prevout_index_tracks_spenders() {
    let (mut mempool, chainstate, _clock) = setup();
    let [parent, child_a, _child_b, _grandchild] = admit_diamond(&mut mempool, &chainstate);

    let store = mempool.store();
    assert_eq!(
        store.find_conflicting_tx(&outpoint(&parent, 0)),
        Some(child_a.get_id())
    );
    assert_eq!(store.find_conflicting_tx(&outpoint(&child_a, 0)), Some(_grandchild.get_id()));
    assert_eq!(store.find_conflicting_tx(&outpoint(&_grandchild, 0)), None);
}

#[test]
fn fee_delta_reorders_and_propagates() {
    let (mut mempool, chainstate, _clock) = setup();

    let input_a = chainstate.add_utxo(1_000_000);
    let input_b = chainstate.add_utxo(1_000_000);
    let tx_a = build_tx(&[input_a], &[1_000_000 - DEFAULT_FEE]);
    let tx_b = build_tx(&[input_b], &[1_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(tx_a.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(tx_b.clone(), TxOrigin::Local).unwrap();

    // Equal fees; bump one of them well past the other
    mempool.apply_delta(tx_a.get_id(), 0.0, 50_000);

    let entry_a = mempool.store().get_entry(&tx_a.get_id()).unwrap();
    assert_eq!(entry_a.fee(), Fee::from_atoms(DEFAULT_FEE));
    assert_eq!(entry_a.modified_fee(), Fee::from_atoms(DEFAULT_FEE + 50_000));

    // The bumped transaction is now the one most worth keeping, so the
    // other one must be first in eviction order.
    let eviction_order: Vec<_> =
        mempool.store().iter_by_descendant_score().map(|e| e.tx_id()).collect();
    assert_eq!(eviction_order.first(), Some(&tx_b.get_id()));
    assert_eq!(eviction_order.last(), Some(&tx_a.get_id()));

    mempool.store().assert_valid();
}

#[test]
fn fee_delta_applies_to_future_arrivals() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(1_000_000);
    let tx = build_tx(&[input], &[1_000_000 - DEFAULT_FEE]);
    let tx_id = tx.get_id();

    // The delta is recorded before the transaction is known
    mempool.apply_delta(tx_id, 1.5, 7_000);
    assert_eq!(
        mempool.delta(&tx_id),
        Some(TxDelta {
            priority: 1.5,
            fee: 7_000,
        })
    );

    mempool.add_transaction(tx, TxOrigin::Local).unwrap();
    let entry = mempool.store().get_entry(&tx_id).unwrap();
    assert_eq!(entry.modified_fee(), Fee::from_atoms(DEFAULT_FEE + 7_000));
    mempool.store().assert_valid();
}

#[test]
fn fee_delta_updates_ancestor_aggregates() {
    let (mut mempool, chainstate, _clock) = setup();
    let [parent, _child_a, _child_b, grandchild] = admit_diamond(&mut mempool, &chainstate);

    let parent_fees_wd_before =
        mempool.store().get_entry(&parent.get_id()).unwrap().fees_with_descendants();

    mempool.apply_delta(grandchild.get_id(), 0.0, 30_000);

    let store = mempool.store();
    let parent_entry = store.get_entry(&parent.get_id()).unwrap();
    assert_eq!(
        parent_entry.fees_with_descendants(),
        (parent_fees_wd_before + Fee::from_atoms(30_000)).unwrap()
    );
    let grandchild_entry = store.get_entry(&grandchild.get_id()).unwrap();
    assert_eq!(
        grandchild_entry.fees_with_ancestors(),
        (store.get_entry(&parent.get_id()).unwrap().fees_with_descendants())
    );
    store.assert_valid();
}

#[test]
fn expiry_removes_old_transactions_with_descendants() {
    let (mut mempool, chainstate, clock) = setup();

    let input = chainstate.add_utxo(10_000_000);
    let old_parent = build_tx(&[input], &[10_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(old_parent.clone(), TxOrigin::Local).unwrap();

    clock.advance(Duration::from_secs(3600));
    let young_child = build_tx(&[outpoint(&old_parent, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(young_child.clone(), TxOrigin::Local).unwrap();

    let unrelated_input = chainstate.add_utxo(1_000_000);
    let unrelated = build_tx(&[unrelated_input], &[1_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(unrelated.clone(), TxOrigin::Local).unwrap();

    // Cut off right after the parent's entry time: the young child goes
    // too, because it depends on the expired parent.
    let removed = mempool.expire(START_TIME + Duration::from_secs(1));
    assert_eq!(removed, 2);
    assert!(!mempool.contains_transaction(&old_parent.get_id()));
    assert!(!mempool.contains_transaction(&young_child.get_id()));
    assert!(mempool.contains_transaction(&unrelated.get_id()));
    mempool.store().assert_valid();
}

#[test]
fn entry_time_ordering_breaks_score_ties() {
    let (mut mempool, chainstate, clock) = setup();

    // Two identical-shape transactions with identical fees, admitted at
    // different times.
    let input_a = chainstate.add_utxo(1_000_000);
    let early = build_tx(&[input_a], &[1_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(early.clone(), TxOrigin::Local).unwrap();

    clock.advance(Duration::from_secs(10));
    let input_b = chainstate.add_utxo(1_000_000);
    let late = build_tx(&[input_b], &[1_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(late.clone(), TxOrigin::Local).unwrap();

    let order: Vec<_> = mempool.store().iter_by_descendant_score().map(|e| e.tx_id()).collect();
    assert_eq!(order, vec![early.get_id(), late.get_id()]);
}

#[test]
fn mining_score_ties_resolved_by_higher_txid() {
    let (mut mempool, chainstate, _clock) = setup();

    let input_a = chainstate.add_utxo(1_000_000);
    let input_b = chainstate.add_utxo(1_000_000);
    let tx_a = build_tx(&[input_a], &[1_000_000 - DEFAULT_FEE]);
    let tx_b = build_tx(&[input_b], &[1_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(tx_a.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(tx_b.clone(), TxOrigin::Local).unwrap();

    let order: Vec<_> = mempool.store().iter_by_mining_score().map(|e| e.tx_id()).collect();
    let higher = std::cmp::max(tx_a.get_id(), tx_b.get_id());
    assert_eq!(order.first(), Some(&higher));
}

#[test]
fn ancestor_score_prefers_packages_with_cheap_ancestry() {
    let (mut mempool, chainstate, _clock) = setup();

    // A lone high-fee transaction
    let input_a = chainstate.add_utxo(1_000_000);
    let lone = build_tx(&[input_a], &[1_000_000 - 5 * DEFAULT_FEE]);
    mempool.add_transaction(lone.clone(), TxOrigin::Local).unwrap();

    // A high-fee child dragging a low-fee parent
    let input_b = chainstate.add_utxo(1_000_000);
    let parent = build_tx(&[input_b], &[1_000_000 - DEFAULT_FEE]);
    let child = build_tx(&[outpoint(&parent, 0)], &[1_000_000 - 6 * DEFAULT_FEE]);
    mempool.add_transaction(parent.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(child.clone(), TxOrigin::Local).unwrap();

    let first = mempool.store().iter_by_ancestor_score().next().unwrap().tx_id();
    assert_eq!(first, lone.get_id());
}
