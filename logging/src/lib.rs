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

//! Logging engine and its interfaces.
//!
//! Everything in this workspace logs through the [log] facade re-exported
//! here, so that the backend can be swapped in one place.

pub use log;

use std::sync::Once;

static INITIALIZE_LOGGER_ONCE_FLAG: Once = Once::new();

/// Initialize the logging backend.
///
/// Repeated calls are no-ops, so tests may call this freely.
pub fn init_logging() {
    INITIALIZE_LOGGER_ONCE_FLAG.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init()
    })
}
