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

//! Estimate memory usage taken by the pool's data structures.
//!
//! The numbers are estimates, not measurements. What matters is that the
//! estimate is consistent and that it strictly shrinks whenever an entry is
//! removed, so size-bounded trimming always makes progress.

use std::mem;

use common::chain::{SignedTransaction, TxInput, TxOutput};

// Code to estimate size taken up by [std::collections::BTreeSet] or [std::collections::BTreeMap].
pub mod btree {
    use std::mem;

    // The following constants mirror the layout of the standard library
    // B-tree nodes. If the library changes, the estimate gets less precise
    // but stays an estimate.

    const B: usize = 6;
    const CAP: usize = B * 2 - 1;
    const BF: usize = 2 * B; // branching factor

    struct _LeafNode<K, V> {
        _parent: *mut (),
        _parent_idx: u16,
        _len: u16,
        _keys: [K; CAP],
        _vals: [V; CAP],
    }

    struct _InternalNode<K, V> {
        _data: _LeafNode<K, V>,
        _children: [*mut (); BF],
    }

    /// Estimate the memory usage of a B-tree holding `num_elems` elements.
    ///
    /// Includes the node structure and the keys and values stored inline;
    /// anything the keys and values point to indirectly has to be tracked
    /// separately. Assuming nodes are on average 75% full, an additional
    /// overhead is added for the unused occupied space.
    pub fn usage<K, V>(num_elems: usize) -> usize {
        let num_elems = num_elems as u64;

        let leaf_size = mem::size_of::<_LeafNode<K, V>>() as u64;
        let internal_size = mem::size_of::<_InternalNode<K, V>>() as u64;

        let leaves = (leaf_size * num_elems) / CAP as u64;

        let elems_per_internal_node = (CAP * BF) as u64;
        let internals = (internal_size * num_elems * 11) / (elems_per_internal_node * 10);

        let total = 4 * (leaves + internals) / 3;

        total as usize
    }

    /// Amortized cost of a single element, used for incremental accounting.
    pub fn element_usage<K, V>() -> usize {
        usage::<K, V>(CAP) / CAP
    }
}

/// Trait for data types capable of reporting their current memory usage.
pub trait MemUsage {
    /// Amount of memory taken by the data owned by `self` (e.g. if it
    /// contains `Box` or `Vec`).
    fn indirect_memory_usage(&self) -> usize;

    fn total_memory_usage(&self) -> usize
    where
        Self: Sized,
    {
        self.indirect_memory_usage() + mem::size_of::<Self>()
    }
}

impl MemUsage for u8 {
    fn indirect_memory_usage(&self) -> usize {
        0
    }
}

impl<T: MemUsage> MemUsage for [T] {
    fn indirect_memory_usage(&self) -> usize {
        self.iter().map(T::indirect_memory_usage).sum::<usize>() + self.len() * mem::size_of::<T>()
    }
}

impl<T: MemUsage> MemUsage for Vec<T> {
    fn indirect_memory_usage(&self) -> usize {
        self.as_slice().indirect_memory_usage()
    }
}

impl MemUsage for TxInput {
    fn indirect_memory_usage(&self) -> usize {
        // No data owned by this object
        0
    }
}

impl MemUsage for TxOutput {
    fn indirect_memory_usage(&self) -> usize {
        self.script_pubkey().len()
    }
}

impl MemUsage for SignedTransaction {
    fn indirect_memory_usage(&self) -> usize {
        let ins = self.inputs().indirect_memory_usage();
        let outs = self.outputs().indirect_memory_usage();
        let sigs = self
            .witnesses()
            .iter()
            .map(|w| w.raw().len() + mem::size_of_val(w))
            .sum::<usize>();
        ins + outs + sigs
    }
}
