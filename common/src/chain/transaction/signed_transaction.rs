// Copyright (c) 2022 RBB S.r.l
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

use serialization::{decode_seq, encode_seq, seq_encoded_size, Decode, Encode};

use super::{Transaction, TransactionCreationError, TxInput, TxOutput};
use crate::primitives::{id::hash_encoded, Id, Idable};

/// Witness data authorizing one input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct InputWitness(Vec<u8>);

impl InputWitness {
    pub fn new(data: Vec<u8>) -> Self {
        InputWitness(data)
    }

    pub fn no_signature() -> Self {
        InputWitness(Vec::new())
    }

    pub fn raw(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Encode for InputWitness {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.0.encode_to(dest)
    }

    fn encoded_size(&self) -> usize {
        self.0.encoded_size()
    }
}

impl Decode for InputWitness {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        Vec::<u8>::decode(input).map(InputWitness)
    }
}

/// A transaction together with the witnesses for its inputs.
///
/// The witness-carrying encoding hashes to the wtxid; witness bytes are
/// discounted when computing the virtual size so fee rates compare fairly
/// across witness and non-witness transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: Transaction,
    witnesses: Vec<InputWitness>,
}

impl SignedTransaction {
    pub fn new(
        transaction: Transaction,
        witnesses: Vec<InputWitness>,
    ) -> Result<Self, TransactionCreationError> {
        if witnesses.len() != transaction.inputs().len() {
            return Err(TransactionCreationError::InvalidWitnessCount);
        }
        Ok(SignedTransaction {
            transaction,
            witnesses,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }

    pub fn inputs(&self) -> &[TxInput] {
        self.transaction.inputs()
    }

    pub fn outputs(&self) -> &[TxOutput] {
        self.transaction.outputs()
    }

    pub fn witnesses(&self) -> &[InputWitness] {
        &self.witnesses
    }

    pub fn has_witness(&self) -> bool {
        self.witnesses.iter().any(|w| !w.is_empty())
    }

    pub fn is_replaceable(&self) -> bool {
        self.transaction.is_replaceable()
    }

    /// The id of the witness-carrying serialization.
    pub fn wtxid(&self) -> Id<SignedTransaction> {
        Id::new(hash_encoded(self))
    }

    /// Serialization weight: the witness-less body counts four times, the
    /// witness bytes once.
    pub fn weight(&self) -> usize {
        let base_size = self.transaction.encoded_size();
        let total_size = self.encoded_size();
        base_size * 3 + total_size
    }

    /// Virtual size in vbytes, rounding the weight up.
    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }
}

impl Idable for SignedTransaction {
    type Tag = Transaction;

    fn get_id(&self) -> Id<Transaction> {
        self.transaction.get_id()
    }
}

impl Encode for SignedTransaction {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.transaction.encode_to(dest);
        encode_seq(dest, &self.witnesses);
    }

    fn encoded_size(&self) -> usize {
        self.transaction.encoded_size() + seq_encoded_size(&self.witnesses)
    }
}

impl Decode for SignedTransaction {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        let transaction = Transaction::decode(input)?;
        let witnesses = decode_seq(input)?;
        if witnesses.len() != transaction.inputs().len() {
            return Err(serialization::Error::InvalidValue("witness count"));
        }
        Ok(SignedTransaction {
            transaction,
            witnesses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::OutPoint;
    use crate::primitives::{Amount, H256};

    fn make_signed(witness: Vec<u8>) -> SignedTransaction {
        let tx = Transaction::new(
            1,
            vec![TxInput::new(
                OutPoint::new(Id::new(H256::repeat_byte(0x22)), 1),
                u32::MAX,
            )],
            vec![TxOutput::new(Amount::from_atoms(5000), vec![0x00, 0x14])],
            0,
        )
        .unwrap();
        tx.with_signatures(vec![InputWitness::new(witness)]).unwrap()
    }

    #[test]
    fn wtxid_covers_witness() {
        let a = make_signed(vec![0x01]);
        let b = make_signed(vec![0x02]);
        assert_eq!(a.get_id(), b.get_id());
        assert_ne!(a.wtxid(), b.wtxid());
    }

    #[test]
    fn vsize_discounts_witness_bytes() {
        let without = make_signed(vec![]);
        let with = make_signed(vec![0xaa; 100]);
        assert_eq!(with.get_id(), without.get_id());
        let witness_bytes = with.encoded_size() - without.encoded_size();
        // Each witness byte adds a quarter vbyte, rounded up.
        assert!(with.vsize() - without.vsize() <= witness_bytes / 4 + 1);
        assert!(with.vsize() > without.vsize());
    }

    #[test]
    fn encoding_round_trip() {
        let tx = make_signed(vec![0xde, 0xad]);
        assert_eq!(SignedTransaction::decode_all(&tx.encode()).unwrap(), tx);
    }

    #[test]
    fn witness_count_mismatch_rejected() {
        let tx = make_signed(vec![]);
        let mut encoded = tx.transaction().encode();
        // No witnesses for a one-input transaction
        serialization::compact::write(&mut encoded, 0);
        assert_eq!(
            SignedTransaction::decode_all(&encoded).unwrap_err(),
            serialization::Error::InvalidValue("witness count")
        );
    }
}
