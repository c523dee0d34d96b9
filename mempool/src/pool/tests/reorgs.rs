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

use super::*;

#[test]
fn block_confirms_pool_transactions() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(10_000_000);
    let parent = build_tx(&[input], &[10_000_000 - DEFAULT_FEE]);
    let child = build_tx(&[outpoint(&parent, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(parent.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(child.clone(), TxOrigin::Local).unwrap();
    assert_eq!(mempool.fee_estimator().tracked_count(), 2);

    connect_block(&mut mempool, &chainstate, vec![parent, child]);
    assert_eq!(mempool.store().len(), 0);
    assert_eq!(mempool.fee_estimator().tracked_count(), 0);
    mempool.store().assert_valid();
}

#[test]
fn block_removes_conflicting_spends() {
    let (mut mempool, chainstate, _clock) = setup();

    let contested = chainstate.add_utxo(10_000_000);
    let in_pool = build_tx(&[contested], &[10_000_000 - DEFAULT_FEE]);
    let dependent = build_tx(&[outpoint(&in_pool, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(in_pool.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(dependent.clone(), TxOrigin::Local).unwrap();

    // A different spend of the same output confirms instead
    let confirmed = build_tx_final(&[contested], &[10_000_000 - 3 * DEFAULT_FEE]);
    connect_block(&mut mempool, &chainstate, vec![confirmed]);

    assert!(!mempool.contains_transaction(&in_pool.get_id()));
    assert!(!mempool.contains_transaction(&dependent.get_id()));
    assert_eq!(mempool.store().len(), 0);
    mempool.store().assert_valid();
}

#[test]
fn confirming_a_parent_keeps_descendants_with_fixed_aggregates() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(10_000_000);
    let parent = build_tx(&[input], &[10_000_000 - DEFAULT_FEE]);
    let child = build_tx(&[outpoint(&parent, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(parent.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(child.clone(), TxOrigin::Local).unwrap();

    connect_block(&mut mempool, &chainstate, vec![parent.clone()]);

    let store = mempool.store();
    assert!(!store.contains(&parent.get_id()));
    let child_entry = store.get_entry(&child.get_id()).unwrap();
    assert_eq!(child_entry.count_with_ancestors(), 1);
    assert_eq!(child_entry.size_with_ancestors(), child.vsize());
    assert_eq!(child_entry.parents().count(), 0);
    store.assert_valid();
}

#[test]
fn disconnect_restores_parent_under_existing_child() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(10_000_000);
    let parent = build_tx(&[input], &[10_000_000 - DEFAULT_FEE]);
    let child = build_tx(&[outpoint(&parent, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(parent.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(child.clone(), TxOrigin::Local).unwrap();

    // The parent confirms while the child stays behind
    let block = connect_block(&mut mempool, &chainstate, vec![parent.clone()]);
    assert!(mempool.contains_transaction(&child.get_id()));

    // The reorg returns the parent to the pool underneath the child
    disconnect_block(&mut mempool, &chainstate, &block);

    let store = mempool.store();
    let parent_entry = store.get_entry(&parent.get_id()).expect("parent re-admitted");
    let child_entry = store.get_entry(&child.get_id()).expect("child still present");

    assert_eq!(
        parent_entry.children().copied().collect::<Vec<_>>(),
        vec![child.get_id()]
    );
    assert_eq!(parent_entry.count_with_descendants(), 2);
    assert_eq!(child_entry.count_with_ancestors(), 2);
    assert_eq!(
        child_entry.size_with_ancestors(),
        parent.vsize() + child.vsize()
    );
    store.assert_valid();
}

#[test]
fn full_reorg_round_trip_restores_the_package() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(10_000_000);
    let parent = build_tx(&[input], &[10_000_000 - DEFAULT_FEE]);
    let child = build_tx(&[outpoint(&parent, 0)], &[10_000_000 - 2 * DEFAULT_FEE]);
    mempool.add_transaction(parent.clone(), TxOrigin::Local).unwrap();
    mempool.add_transaction(child.clone(), TxOrigin::Local).unwrap();

    let block = connect_block(&mut mempool, &chainstate, vec![parent.clone(), child.clone()]);
    assert_eq!(mempool.store().len(), 0);

    disconnect_block(&mut mempool, &chainstate, &block);

    let store = mempool.store();
    assert_eq!(store.len(), 2);
    let parent_entry = store.get_entry(&parent.get_id()).unwrap();
    let child_entry = store.get_entry(&child.get_id()).unwrap();
    assert_eq!(parent_entry.count_with_descendants(), 2);
    assert_eq!(child_entry.count_with_ancestors(), 2);
    assert_eq!(
        parent_entry.children().copied().collect::<Vec<_>>(),
        vec![child.get_id()]
    );
    store.assert_valid();
}

#[test]
fn new_tip_events_are_emitted() {
    let (mut mempool, chainstate, _clock) = setup();
    let events = collect_events(&mut mempool);

    let block = connect_block(&mut mempool, &chainstate, vec![]);
    disconnect_block(&mut mempool, &chainstate, &block);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        MempoolEvent::NewTip(block.get_id(), BlockHeight::new(1))
    );
    assert_eq!(
        events[1],
        MempoolEvent::NewTip(block.prev_block_hash(), BlockHeight::zero())
    );
}

#[test]
#[should_panic = "chain order"]
fn out_of_order_block_connect_is_a_programming_error() {
    let (mut mempool, _chainstate, _clock) = setup();
    let bogus_parent = Id::new(H256::repeat_byte(0x99));
    let block = Block::new(vec![], bogus_parent, 7);
    mempool.block_connected(&block, BlockHeight::new(1));
}

#[test]
fn disconnect_drops_stale_coinbase_spends() {
    let (mut mempool, chainstate, _clock) = setup();

    // Advance the chain so there is a height to roll back from
    let block = connect_block(&mut mempool, &chainstate, vec![]);

    // A spend of a coinbase output validated at height 1
    let coinbase_outpoint = chainstate.add_coinbase_utxo(10_000_000);
    let spend = build_tx(&[coinbase_outpoint], &[10_000_000 - DEFAULT_FEE]);
    mempool.add_transaction(spend.clone(), TxOrigin::Local).unwrap();
    assert!(mempool.store().get_entry(&spend.get_id()).unwrap().spends_coinbase());

    // Rolling back below the validation height evicts the spend
    disconnect_block(&mut mempool, &chainstate, &block);
    assert!(!mempool.contains_transaction(&spend.get_id()));
    mempool.store().assert_valid();
}
