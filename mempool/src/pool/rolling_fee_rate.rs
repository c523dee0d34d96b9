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

use std::time::Duration;

use super::feerate::FeeRate;
use crate::config::Time;

/// The decaying floor on admission fee rates.
///
/// Bumped whenever eviction removes a package, halved once per halflife, and
/// only allowed to decay after a block has been connected since the last
/// bump.
#[derive(Debug, Clone, Copy)]
pub struct RollingFeeRate {
    block_since_last_rolling_fee_bump: bool,
    rolling_minimum_fee_rate: FeeRate,
    last_rolling_fee_update: Time,
}

impl RollingFeeRate {
    pub fn new(creation_time: Time) -> Self {
        Self {
            block_since_last_rolling_fee_bump: false,
            rolling_minimum_fee_rate: FeeRate::ZERO,
            last_rolling_fee_update: creation_time,
        }
    }

    pub fn rolling_minimum_fee_rate(&self) -> FeeRate {
        self.rolling_minimum_fee_rate
    }

    pub fn block_since_last_rolling_fee_bump(&self) -> bool {
        self.block_since_last_rolling_fee_bump
    }

    pub fn last_rolling_fee_update(&self) -> Time {
        self.last_rolling_fee_update
    }

    pub fn set_rolling_minimum_fee_rate(&mut self, rate: FeeRate) {
        self.rolling_minimum_fee_rate = rate;
    }

    pub fn set_block_since_last_rolling_fee_bump(&mut self, value: bool) {
        self.block_since_last_rolling_fee_bump = value;
    }

    /// Halve the rate once per elapsed halflife.
    #[must_use]
    pub fn decay_fee(mut self, halflife: Duration, current_time: Time) -> Self {
        let elapsed = current_time.saturating_sub(self.last_rolling_fee_update);
        let exponent = elapsed.as_secs_f64() / halflife.as_secs_f64();
        let decayed = (self.rolling_minimum_fee_rate.atoms_per_kb() as f64)
            * 0.5_f64.powf(exponent);
        self.rolling_minimum_fee_rate = FeeRate::from_atoms_per_kb(decayed as u128);
        self.last_rolling_fee_update = current_time;
        self
    }
}
