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

/// Return early with the given error unless the condition holds.
#[macro_export]
macro_rules! ensure {
    ($condition:expr, $err:expr $(,)?) => {
        if !($condition) {
            return Err($err.into());
        }
    };
}

#[cfg(test)]
mod tests {
    fn checked(condition: bool) -> Result<(), &'static str> {
        ensure!(condition, "nope");
        Ok(())
    }

    #[test]
    fn ensure_passes_and_fails() {
        assert_eq!(checked(true), Ok(()));
        assert_eq!(checked(false), Err("nope"));
    }
}
