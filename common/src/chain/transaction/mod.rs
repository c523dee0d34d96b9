// Copyright (c) 2021-2022 RBB S.r.l
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

use serialization::{decode_seq, encode_seq, seq_encoded_size, Decode, Encode};

use crate::primitives::{id::hash_encoded, Id, Idable};

pub mod input;
pub use input::*;

pub mod output;
pub use output::*;

pub mod signed_transaction;
pub use signed_transaction::*;

/// Sequence numbers at or above this value opt the input out of replacement
/// signaling (BIP125).
pub const SEQUENCE_FINAL_THRESHOLD: u32 = 0xffff_fffe;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionCreationError {
    #[error("The number of signatures does not match the number of inputs")]
    InvalidWitnessCount,
}

/// The witness-less transaction body.
///
/// The id of a transaction is the hash of this body, so signatures never
/// affect the txid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
}

impl Idable for Transaction {
    type Tag = Transaction;

    fn get_id(&self) -> Id<Transaction> {
        Id::new(hash_encoded(self))
    }
}

impl Transaction {
    pub fn new(
        version: u32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
    ) -> Result<Self, TransactionCreationError> {
        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    /// A transaction signals replaceability if any of its inputs carries a
    /// non-final sequence number.
    pub fn is_replaceable(&self) -> bool {
        self.inputs.iter().any(|input| input.sequence() < SEQUENCE_FINAL_THRESHOLD)
    }

    pub fn with_signatures(
        self,
        witnesses: Vec<InputWitness>,
    ) -> Result<SignedTransaction, TransactionCreationError> {
        SignedTransaction::new(self, witnesses)
    }
}

impl Encode for Transaction {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.version.encode_to(dest);
        encode_seq(dest, &self.inputs);
        encode_seq(dest, &self.outputs);
        self.lock_time.encode_to(dest);
    }

    fn encoded_size(&self) -> usize {
        self.version.encoded_size()
            + seq_encoded_size(&self.inputs)
            + seq_encoded_size(&self.outputs)
            + self.lock_time.encoded_size()
    }
}

impl Decode for Transaction {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Ok(Transaction {
            version: u32::decode(input)?,
            inputs: decode_seq(input)?,
            outputs: decode_seq(input)?,
            lock_time: u32::decode(input)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{Amount, H256};

    fn tx_with_sequence(sequence: u32) -> Transaction {
        let outpoint = OutPoint::new(Id::new(H256::repeat_byte(0x11)), 0);
        Transaction::new(
            1,
            vec![TxInput::new(outpoint, sequence)],
            vec![TxOutput::new(Amount::from_atoms(1000), vec![0x51])],
            0,
        )
        .unwrap()
    }

    #[test]
    fn id_ignores_witness_but_not_body() {
        let tx_a = tx_with_sequence(0);
        let tx_b = tx_with_sequence(1);
        assert_ne!(tx_a.get_id(), tx_b.get_id());

        let signed = tx_a.clone().with_signatures(vec![InputWitness::new(vec![0xab])]).unwrap();
        assert_eq!(signed.transaction().get_id(), tx_a.get_id());
    }

    #[test]
    fn replaceability_signaling() {
        assert!(tx_with_sequence(0).is_replaceable());
        assert!(tx_with_sequence(SEQUENCE_FINAL_THRESHOLD - 1).is_replaceable());
        assert!(!tx_with_sequence(SEQUENCE_FINAL_THRESHOLD).is_replaceable());
        assert!(!tx_with_sequence(u32::MAX).is_replaceable());
    }

    #[test]
    fn encoding_round_trip() {
        let tx = tx_with_sequence(3);
        let decoded = Transaction::decode_all(&tx.encode()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(tx.encoded_size(), tx.encode().len());
    }
}
