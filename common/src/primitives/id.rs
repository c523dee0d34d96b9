// Copyright (c) 2021-2022 RBB S.r.l
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

use std::marker::PhantomData;

use sha2::{Digest, Sha256};

use serialization::{Decode, Encode};

fixed_hash::construct_fixed_hash! {
    pub struct H256(32);
}

impl Encode for H256 {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        dest.extend_from_slice(self.as_bytes())
    }

    fn encoded_size(&self) -> usize {
        H256::len_bytes()
    }
}

impl Decode for H256 {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        if input.len() < H256::len_bytes() {
            return Err(serialization::Error::UnexpectedEof);
        }
        let (head, tail) = input.split_at(H256::len_bytes());
        *input = tail;
        Ok(H256::from_slice(head))
    }
}

/// A typed content-addressed identifier.
///
/// The tag parameter ties an id to the object kind it identifies, so a block
/// id cannot be confused with a transaction id at compile time. The phantom
/// is `fn() -> T` so that `Id<T>` is `Send + Sync + Copy` regardless of `T`.
pub struct Id<T> {
    hash: H256,
    _shadow: PhantomData<fn() -> T>,
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state)
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id<{}>{{{:x}}}", std::any::type_name::<T>(), self.hash)
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:x}", self.hash)
    }
}

impl<T> Id<T> {
    pub const fn new(hash: H256) -> Self {
        Self {
            hash,
            _shadow: PhantomData,
        }
    }

    pub const fn get(&self) -> H256 {
        self.hash
    }

    pub const fn zero() -> Self {
        Self::new(H256::zero())
    }
}

impl<T> Encode for Id<T> {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        self.hash.encode_to(dest)
    }

    fn encoded_size(&self) -> usize {
        self.hash.encoded_size()
    }
}

impl<T> Decode for Id<T> {
    fn decode(input: &mut &[u8]) -> serialization::Result<Self> {
        H256::decode(input).map(Self::new)
    }
}

/// Anything that has a canonical id derived from its encoded form.
pub trait Idable {
    type Tag;

    fn get_id(&self) -> Id<Self::Tag>;
}

/// Double-SHA256 over the canonical encoding of a value.
pub fn hash_encoded<T: Encode>(value: &T) -> H256 {
    let first = Sha256::digest(value.encode());
    let second = Sha256::digest(first);
    H256::from_slice(&second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_input_sensitive() {
        let a = hash_encoded(&42_u64);
        let b = hash_encoded(&42_u64);
        let c = hash_encoded(&43_u64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_encoding_round_trip() {
        struct Thing;
        let id = Id::<Thing>::new(hash_encoded(&7_u32));
        let encoded = id.encode();
        assert_eq!(encoded.len(), 32);
        assert_eq!(Id::<Thing>::decode_all(&encoded).unwrap(), id);
    }
}
