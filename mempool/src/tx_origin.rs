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

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    pub const fn new(id: u64) -> Self {
        PeerId(id)
    }

    pub const fn into_int(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a transaction entered the node from.
///
/// Locally submitted transactions never land in the orphan pool: a missing
/// input is reported back to the submitter instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOrigin {
    /// Local interfaces: RPC, the wallet, or the on-disk snapshot.
    Local,
    /// Relayed over the network by the given peer.
    Peer(PeerId),
}

impl TxOrigin {
    pub fn is_local(&self) -> bool {
        matches!(self, TxOrigin::Local)
    }

    pub fn peer(&self) -> Option<PeerId> {
        match self {
            TxOrigin::Local => None,
            TxOrigin::Peer(peer) => Some(*peer),
        }
    }
}
