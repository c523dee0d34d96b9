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

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use common::primitives::Amount;

use super::fee::Fee;
use crate::error::MempoolPolicyError;

/// A fee rate in atoms per 1000 vbytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct FeeRate {
    atoms_per_kb: u128,
}

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate::from_atoms_per_kb(0);

    pub const fn from_atoms_per_kb(atoms_per_kb: u128) -> Self {
        FeeRate { atoms_per_kb }
    }

    pub fn new(amount_per_kb: Amount) -> Self {
        FeeRate {
            atoms_per_kb: amount_per_kb.into_atoms(),
        }
    }

    pub const fn atoms_per_kb(&self) -> u128 {
        self.atoms_per_kb
    }

    /// The rate paid by a transaction of `tx_size` vbytes with total `fee`.
    pub fn from_total_tx_fee(
        fee: Fee,
        tx_size: NonZeroUsize,
    ) -> Result<Self, MempoolPolicyError> {
        let atoms = fee
            .into_atoms()
            .checked_mul(1000)
            .ok_or(MempoolPolicyError::FeeOverflow)?;
        Ok(FeeRate {
            atoms_per_kb: atoms / tx_size.get() as u128,
        })
    }

    /// The fee this rate demands from a transaction of `tx_size` vbytes.
    pub fn compute_fee(&self, tx_size: usize) -> Result<Fee, MempoolPolicyError> {
        let atoms = self
            .atoms_per_kb
            .checked_mul(tx_size as u128)
            .ok_or(MempoolPolicyError::FeeRateComputation {
                rate: *self,
                size: tx_size,
            })?;
        Ok(Fee::from_atoms(atoms / 1000))
    }
}

impl std::ops::Add for FeeRate {
    type Output = Option<FeeRate>;

    fn add(self, other: FeeRate) -> Self::Output {
        self.atoms_per_kb
            .checked_add(other.atoms_per_kb)
            .map(FeeRate::from_atoms_per_kb)
    }
}

impl std::ops::Div<u128> for FeeRate {
    type Output = Option<FeeRate>;

    fn div(self, divisor: u128) -> Self::Output {
        self.atoms_per_kb.checked_div(divisor).map(FeeRate::from_atoms_per_kb)
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/kvB", self.atoms_per_kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_round_trips_through_rate() {
        let rate = FeeRate::from_atoms_per_kb(2500);
        let fee = rate.compute_fee(400).unwrap();
        assert_eq!(fee, Fee::from_atoms(1000));
        let back = FeeRate::from_total_tx_fee(fee, NonZeroUsize::new(400).unwrap()).unwrap();
        assert_eq!(back, rate);
    }

    #[test]
    fn compute_fee_rounds_down() {
        let rate = FeeRate::from_atoms_per_kb(999);
        assert_eq!(rate.compute_fee(1).unwrap(), Fee::ZERO);
        assert_eq!(rate.compute_fee(1001).unwrap(), Fee::from_atoms(999));
    }
}
