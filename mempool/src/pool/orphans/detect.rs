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

use crate::tx_verifier::TxVerifierError;

/// Check an error signifies a potential orphan transaction
pub fn is_orphan_error(err: &TxVerifierError) -> bool {
    match err {
        // This signifies a possible orphan
        TxVerifierError::MissingInputs => true,
        // These do not
        TxVerifierError::Invalid { .. } => false,
    }
}
