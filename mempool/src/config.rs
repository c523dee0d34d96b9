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

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::feerate::FeeRate;

/// Wall-clock time as a duration since the unix epoch.
pub type Time = Duration;

pub const MAX_MEMPOOL_SIZE_BYTES: usize = 300 * 1_000_000;

pub const DEFAULT_MEMPOOL_EXPIRY: Duration = Duration::from_secs(72 * 60 * 60);

pub const DEFAULT_LIMIT_ANCESTOR_COUNT: usize = 25;
pub const DEFAULT_LIMIT_ANCESTOR_SIZE: usize = 101_000;
pub const DEFAULT_LIMIT_DESCENDANT_COUNT: usize = 25;
pub const DEFAULT_LIMIT_DESCENDANT_SIZE: usize = 101_000;

/// Admission floor, in atoms per 1000 vbytes. Also used as the increment when
/// the rolling minimum fee is bumped after an eviction.
pub const DEFAULT_MIN_RELAY_FEE_RATE: FeeRate = FeeRate::from_atoms_per_kb(1000);

/// Weight above which a transaction is not relayed at all.
pub const MAX_STANDARD_TX_WEIGHT: usize = 400_000;

pub const DEFAULT_MAX_ORPHAN_COUNT: usize = 100;

/// How long an orphan may wait for its parents before a sweep removes it.
pub const ORPHAN_EXPIRY: Duration = Duration::from_secs(20 * 60);

/// Minimum interval between two orphan expiration sweeps.
pub const ORPHAN_SWEEP_MIN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Cadence of relay notifications to attached peers.
pub const RELAY_TRICKLE_INTERVAL: Duration = Duration::from_secs(5);

pub const ROLLING_FEE_BASE_HALFLIFE: Duration = Duration::from_secs(12 * 60 * 60);

/// The rolling fee is decayed lazily, at most this often.
pub const ROLLING_FEE_DECAY_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on the number of in-pool transactions a replacement may evict.
pub const MAX_REPLACEMENT_CANDIDATES: usize = 100;

/// Entries visited while reconnecting descendants after a block disconnect
/// before the remaining entries fall back to approximate ordering.
pub const DISCONNECT_UPDATE_WORK_LIMIT: usize = 4_000;

static_assertions::const_assert!(DEFAULT_LIMIT_ANCESTOR_SIZE < MAX_MEMPOOL_SIZE_BYTES);
static_assertions::const_assert!(ORPHAN_EXPIRY.as_secs() > ORPHAN_SWEEP_MIN_INTERVAL.as_secs());

/// Runtime-configurable mempool options; everything else above is policy
/// fixed at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolConfig {
    /// Upper bound on `dynamic_memory_usage`, enforced by trimming.
    pub max_size: usize,
    /// Transactions older than this are evicted.
    pub max_tx_age: Duration,
    pub limit_ancestor_count: usize,
    pub limit_ancestor_size: usize,
    pub limit_descendant_count: usize,
    pub limit_descendant_size: usize,
    pub min_relay_fee_rate: FeeRate,
    pub max_orphan_count: usize,
    /// Persist the pool contents on shutdown.
    pub save_on_shutdown: bool,
    /// Location of the mempool snapshot file, if persistence is enabled.
    pub mempool_file: Option<PathBuf>,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: MAX_MEMPOOL_SIZE_BYTES,
            max_tx_age: DEFAULT_MEMPOOL_EXPIRY,
            limit_ancestor_count: DEFAULT_LIMIT_ANCESTOR_COUNT,
            limit_ancestor_size: DEFAULT_LIMIT_ANCESTOR_SIZE,
            limit_descendant_count: DEFAULT_LIMIT_DESCENDANT_COUNT,
            limit_descendant_size: DEFAULT_LIMIT_DESCENDANT_SIZE,
            min_relay_fee_rate: DEFAULT_MIN_RELAY_FEE_RATE,
            max_orphan_count: DEFAULT_MAX_ORPHAN_COUNT,
            save_on_shutdown: true,
            mempool_file: None,
        }
    }
}
