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

//! Mempool subsystem: the in-memory store of unconfirmed, policy-valid
//! transactions awaiting inclusion in a block.
//!
//! The [pool::Mempool] object holds the transaction graph together with the
//! orphan pool, the fee estimator and the eviction machinery. All mutations
//! go through a single writer; [scheduler::MempoolHandle] wraps the pool in
//! the corresponding lock and drives the periodic maintenance tasks.

pub mod config;
pub mod error;
pub mod event;
pub mod pool;
pub mod scheduler;
pub mod tx_origin;
pub mod tx_verifier;

pub use config::MempoolConfig;
pub use event::MempoolEvent;
pub use pool::{Mempool, TxStatus};
pub use scheduler::MempoolHandle;
