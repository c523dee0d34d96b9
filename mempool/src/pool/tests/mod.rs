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

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::chain::{Block, OutPoint, SignedTransaction, Transaction, TxInput, TxOutput};
use common::primitives::{id::hash_encoded, Amount, BlockHeight, Id, Idable, H256};
use common::time_getter::TimeGetter;

use super::*;
use crate::tx_verifier::{TxVerified, UnconfirmedOutputsView};

mod graph;
mod reorgs;

pub const START_TIME: Duration = Duration::from_secs(1_600_000_000);
pub const DEFAULT_FEE: u128 = 10_000;

#[derive(Clone)]
pub struct MockClock(Arc<Mutex<Duration>>);

impl MockClock {
    pub fn new(start: Duration) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn time_getter(&self) -> TimeGetter {
        let inner = Arc::clone(&self.0);
        TimeGetter::new(Arc::new(move || *inner.lock().unwrap()))
    }

    pub fn now(&self) -> Duration {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

#[derive(Debug, Clone, Copy)]
struct UtxoData {
    value: Amount,
    is_coinbase: bool,
}

struct ChainstateData {
    utxos: BTreeMap<OutPoint, UtxoData>,
    tip: (Id<Block>, BlockHeight),
    undo: BTreeMap<Id<Block>, Vec<(OutPoint, UtxoData)>>,
    fresh_outpoint_counter: u64,
}

/// An in-memory stand-in for the chainstate: a utxo map plus a tip, with
/// just enough block handling to drive connect/disconnect scenarios.
#[derive(Clone)]
pub struct TestChainstate(Arc<Mutex<ChainstateData>>);

impl TestChainstate {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ChainstateData {
            utxos: BTreeMap::new(),
            tip: (Id::zero(), BlockHeight::zero()),
            undo: BTreeMap::new(),
            fresh_outpoint_counter: 0,
        })))
    }

    fn add_utxo_inner(&self, value: u128, is_coinbase: bool) -> OutPoint {
        let mut data = self.0.lock().unwrap();
        data.fresh_outpoint_counter += 1;
        let outpoint = OutPoint::new(Id::new(hash_encoded(&data.fresh_outpoint_counter)), 0);
        data.utxos.insert(
            outpoint,
            UtxoData {
                value: Amount::from_atoms(value),
                is_coinbase,
            },
        );
        outpoint
    }

    /// A fresh confirmed output of the given value.
    pub fn add_utxo(&self, value: u128) -> OutPoint {
        self.add_utxo_inner(value, false)
    }

    pub fn add_coinbase_utxo(&self, value: u128) -> OutPoint {
        self.add_utxo_inner(value, true)
    }

    pub fn tip(&self) -> (Id<Block>, BlockHeight) {
        self.0.lock().unwrap().tip
    }

    pub fn connect_block(&self, block: &Block, height: BlockHeight) {
        let mut data = self.0.lock().unwrap();
        let mut undo = Vec::new();
        for tx in block.transactions() {
            for input in tx.inputs() {
                if let Some(utxo) = data.utxos.remove(input.outpoint()) {
                    undo.push((*input.outpoint(), utxo));
                }
            }
            let tx_id = tx.get_id();
            for (index, output) in tx.outputs().iter().enumerate() {
                data.utxos.insert(
                    OutPoint::new(tx_id, index as u32),
                    UtxoData {
                        value: output.value(),
                        is_coinbase: false,
                    },
                );
            }
        }
        data.undo.insert(block.get_id(), undo);
        data.tip = (block.get_id(), height);
    }

    pub fn disconnect_block(&self, block: &Block) {
        let mut data = self.0.lock().unwrap();
        assert_eq!(data.tip.0, block.get_id(), "disconnecting a non-tip block");
        for tx in block.transactions() {
            let tx_id = tx.get_id();
            for index in 0..tx.outputs().len() as u32 {
                data.utxos.remove(&OutPoint::new(tx_id, index));
            }
        }
        for (outpoint, utxo) in data.undo.remove(&block.get_id()).unwrap_or_default() {
            data.utxos.insert(outpoint, utxo);
        }
        let height = data.tip.1.prev_height().expect("disconnect below genesis");
        data.tip = (block.prev_block_hash(), height);
    }
}

impl TransactionVerifier for TestChainstate {
    fn best_block(&self) -> (Id<Block>, BlockHeight) {
        self.tip()
    }

    fn verify(
        &self,
        tx: &SignedTransaction,
        unconfirmed: &dyn UnconfirmedOutputsView,
    ) -> Result<TxVerified, TxVerifierError> {
        let data = self.0.lock().unwrap();
        let mut total_in = Amount::ZERO;
        let mut spends_coinbase = false;

        for input in tx.inputs() {
            let value = if let Some(utxo) = data.utxos.get(input.outpoint()) {
                spends_coinbase |= utxo.is_coinbase;
                utxo.value
            } else if let Some(output) = unconfirmed.unconfirmed_output(input.outpoint()) {
                output.value()
            } else {
                return Err(TxVerifierError::MissingInputs);
            };
            total_in = (total_in + value).expect("input value overflow");
        }

        let total_out = tx
            .outputs()
            .iter()
            .map(|output| output.value())
            .sum::<Option<Amount>>()
            .expect("output value overflow");

        let fee = (total_in - total_out).ok_or_else(|| TxVerifierError::Invalid {
            reason: "outputs exceed inputs".into(),
            corruption_possible: false,
        })?;

        Ok(TxVerified {
            fee: fee.into(),
            tx_size: tx.vsize(),
            sigop_cost: tx.inputs().len() as u64,
            spends_coinbase,
            height: data.tip.1,
        })
    }
}

/// A transaction spending `inputs` with replaceable sequence numbers.
pub fn build_tx(inputs: &[OutPoint], output_values: &[u128]) -> SignedTransaction {
    build_tx_with_sequence(inputs, output_values, 0)
}

/// Same, but opting out of replacement signaling.
pub fn build_tx_final(inputs: &[OutPoint], output_values: &[u128]) -> SignedTransaction {
    build_tx_with_sequence(inputs, output_values, u32::MAX)
}

pub fn build_tx_with_sequence(
    inputs: &[OutPoint],
    output_values: &[u128],
    sequence: u32,
) -> SignedTransaction {
    let inputs: Vec<_> =
        inputs.iter().map(|outpoint| TxInput::new(*outpoint, sequence)).collect();
    let outputs: Vec<_> = output_values
        .iter()
        .map(|value| TxOutput::new(Amount::from_atoms(*value), vec![0x51]))
        .collect();
    let witnesses = vec![Default::default(); inputs.len()];
    Transaction::new(1, inputs, outputs, 0)
        .expect("valid transaction")
        .with_signatures(witnesses)
        .expect("witness count matches")
}

pub fn outpoint(tx: &SignedTransaction, index: u32) -> OutPoint {
    OutPoint::new(tx.get_id(), index)
}

pub fn setup() -> (Mempool<TestChainstate>, TestChainstate, MockClock) {
    setup_with_config(MempoolConfig::default())
}

pub fn setup_with_config(
    config: MempoolConfig,
) -> (Mempool<TestChainstate>, TestChainstate, MockClock) {
    let chainstate = TestChainstate::new();
    let clock = MockClock::new(START_TIME);
    let mempool = Mempool::new(config, chainstate.clone(), clock.time_getter());
    (mempool, chainstate, clock)
}

/// Record every event the pool emits.
pub fn collect_events(mempool: &mut Mempool<TestChainstate>) -> Arc<Mutex<Vec<MempoolEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    mempool.subscribe_to_events(Arc::new(move |event| sink.lock().unwrap().push(event)));
    events
}

/// Build a block of `txs` on the current chainstate tip and connect it to
/// both the chainstate and the mempool.
pub fn connect_block(
    mempool: &mut Mempool<TestChainstate>,
    chainstate: &TestChainstate,
    txs: Vec<SignedTransaction>,
) -> Block {
    let (tip_id, tip_height) = chainstate.tip();
    let height = tip_height.next_height();
    let block = Block::new(txs, tip_id, height.into_int());
    chainstate.connect_block(&block, height);
    mempool.block_connected(&block, height);
    block
}

pub fn disconnect_block(
    mempool: &mut Mempool<TestChainstate>,
    chainstate: &TestChainstate,
    block: &Block,
) {
    chainstate.disconnect_block(block);
    mempool.block_disconnected(block);
}

#[test]
fn accept_single_transaction() {
    let (mut mempool, chainstate, _clock) = setup();
    let input = chainstate.add_utxo(1_000_000);
    let tx = build_tx(&[input], &[1_000_000 - DEFAULT_FEE]);
    let tx_id = tx.get_id();

    let events = collect_events(&mut mempool);
    let status = mempool.add_transaction(tx, TxOrigin::Local).unwrap();

    assert_eq!(status, TxStatus::InMempool);
    assert!(mempool.contains_transaction(&tx_id));
    assert_eq!(mempool.store().len(), 1);
    assert_eq!(
        *events.lock().unwrap(),
        vec![MempoolEvent::TransactionReceived {
            tx_id,
            origin: TxOrigin::Local,
        }]
    );
    mempool.store().assert_valid();
}

#[test]
fn duplicate_submission_is_a_noop() {
    let (mut mempool, chainstate, _clock) = setup();
    let input = chainstate.add_utxo(1_000_000);
    let tx = build_tx(&[input], &[1_000_000 - DEFAULT_FEE]);

    assert_eq!(
        mempool.add_transaction(tx.clone(), TxOrigin::Local).unwrap(),
        TxStatus::InMempool
    );
    assert_eq!(
        mempool.add_transaction(tx, TxOrigin::Local).unwrap(),
        TxStatus::InMempoolDuplicate
    );
    assert_eq!(mempool.store().len(), 1);
    mempool.store().assert_valid();
}

#[test]
fn missing_inputs_from_local_submitter_is_an_error() {
    let (mut mempool, _chainstate, _clock) = setup();
    let unknown = OutPoint::new(Id::new(H256::repeat_byte(0x77)), 0);
    let tx = build_tx(&[unknown], &[1]);

    let err = mempool.add_transaction(tx, TxOrigin::Local).unwrap_err();
    assert_eq!(err, Error::Validity(TxValidationError::MissingInputs));
    assert_eq!(mempool.orphan_count(), 0);
}

#[test]
fn empty_transactions_rejected() {
    let (mut mempool, chainstate, _clock) = setup();

    let no_inputs = build_tx(&[], &[1]);
    assert_eq!(
        mempool.add_transaction(no_inputs, TxOrigin::Local).unwrap_err(),
        Error::Policy(MempoolPolicyError::NoInputs)
    );

    let input = chainstate.add_utxo(1_000_000);
    let no_outputs = build_tx(&[input], &[]);
    assert_eq!(
        mempool.add_transaction(no_outputs, TxOrigin::Local).unwrap_err(),
        Error::Policy(MempoolPolicyError::NoOutputs)
    );
}

#[test]
fn duplicate_inputs_rejected() {
    let (mut mempool, chainstate, _clock) = setup();
    let input = chainstate.add_utxo(1_000_000);
    let tx = build_tx(&[input, input], &[1_000_000 - DEFAULT_FEE]);
    assert_eq!(
        mempool.add_transaction(tx, TxOrigin::Local).unwrap_err(),
        Error::Policy(MempoolPolicyError::DuplicateInputs)
    );
}

#[test]
fn verifier_rejection_surfaces_as_a_validity_error() {
    let mut verifier = crate::tx_verifier::MockTransactionVerifier::new();
    verifier
        .expect_best_block()
        .return_const((Id::<Block>::zero(), BlockHeight::zero()));
    verifier.expect_verify().returning(|_, _| {
        Err(TxVerifierError::Invalid {
            reason: "scripted failure".into(),
            corruption_possible: false,
        })
    });

    let clock = MockClock::new(START_TIME);
    let mut mempool = Mempool::new(MempoolConfig::default(), verifier, clock.time_getter());

    let tx = build_tx(&[OutPoint::new(Id::new(H256::repeat_byte(0x31)), 0)], &[1]);
    let err = mempool.add_transaction(tx, TxOrigin::Local).unwrap_err();
    assert!(matches!(
        err,
        Error::Validity(TxValidationError::Verifier(TxVerifierError::Invalid { .. }))
    ));
}

#[test]
fn already_have_covers_pool_orphans_and_rejects() {
    let (mut mempool, chainstate, _clock) = setup();

    let input = chainstate.add_utxo(1_000_000);
    let in_pool = build_tx(&[input], &[1_000_000 - DEFAULT_FEE]);
    let in_pool_id = in_pool.get_id();
    mempool.add_transaction(in_pool, TxOrigin::Local).unwrap();
    assert!(mempool.already_have(&in_pool_id));

    let unknown = OutPoint::new(Id::new(H256::repeat_byte(0x12)), 0);
    let orphan = build_tx(&[unknown], &[5]);
    let orphan_id = orphan.get_id();
    mempool.add_transaction(orphan, TxOrigin::Peer(PeerId::new(3))).unwrap();
    assert!(mempool.already_have(&orphan_id));

    // Spending more than the inputs provide fails validation and lands in
    // the reject filter (the tx carries no witness).
    let input = chainstate.add_utxo(1_000);
    let invalid = build_tx(&[input], &[100_000]);
    let invalid_id = invalid.get_id();
    mempool.add_transaction(invalid, TxOrigin::Local).unwrap_err();
    assert!(mempool.already_have(&invalid_id));

    assert!(!mempool.already_have(&Id::new(H256::repeat_byte(0xee))));
}
