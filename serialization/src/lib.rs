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

//! Canonical wire-format serialization.
//!
//! The encoding is byte-exact and non-malleable: fixed-width integers are
//! little-endian, collection lengths use the compact variable-width integer
//! (see [compact]), and decoding rejects non-minimal length prefixes. The
//! same primitives back both the transaction format and on-disk snapshots.

pub mod compact;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Non-minimal compact integer encoding")]
    NonMinimalCompactInt,
    #[error("Trailing data after the encoded object")]
    TrailingData,
    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Serialize `self` into the canonical byte form.
pub trait Encode {
    fn encode_to(&self, dest: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }

    fn encoded_size(&self) -> usize {
        self.encode().len()
    }
}

/// Deserialize from the canonical byte form, advancing the input slice.
pub trait Decode: Sized {
    fn decode(input: &mut &[u8]) -> Result<Self>;

    /// Decode an object that must span the whole input.
    fn decode_all(mut input: &[u8]) -> Result<Self> {
        let obj = Self::decode(&mut input)?;
        if input.is_empty() {
            Ok(obj)
        } else {
            Err(Error::TrailingData)
        }
    }
}

fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if input.len() < len {
        return Err(Error::UnexpectedEof);
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

macro_rules! impl_int_codec {
    ($($int:ty),*) => {
        $(
            impl Encode for $int {
                fn encode_to(&self, dest: &mut Vec<u8>) {
                    dest.extend_from_slice(&self.to_le_bytes())
                }

                fn encoded_size(&self) -> usize {
                    std::mem::size_of::<$int>()
                }
            }

            impl Decode for $int {
                fn decode(input: &mut &[u8]) -> Result<Self> {
                    let bytes = take(input, std::mem::size_of::<$int>())?;
                    Ok(<$int>::from_le_bytes(bytes.try_into().expect("exact length taken")))
                }
            }
        )*
    };
}

impl_int_codec!(u8, u16, u32, u64, u128, i32, i64);

impl Encode for bool {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        dest.push(*self as u8)
    }

    fn encoded_size(&self) -> usize {
        1
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::InvalidValue("bool")),
        }
    }
}

impl Encode for Vec<u8> {
    fn encode_to(&self, dest: &mut Vec<u8>) {
        compact::write(dest, self.len() as u64);
        dest.extend_from_slice(self)
    }

    fn encoded_size(&self) -> usize {
        compact::size(self.len() as u64) + self.len()
    }
}

impl Decode for Vec<u8> {
    fn decode(input: &mut &[u8]) -> Result<Self> {
        let len = compact::read(input)?;
        let len = usize::try_from(len).map_err(|_| Error::InvalidValue("byte vector length"))?;
        Ok(take(input, len)?.to_vec())
    }
}

/// Encode a sequence of objects as a compact count followed by the items.
pub fn encode_seq<T: Encode>(dest: &mut Vec<u8>, items: &[T]) {
    compact::write(dest, items.len() as u64);
    for item in items {
        item.encode_to(dest)
    }
}

pub fn decode_seq<T: Decode>(input: &mut &[u8]) -> Result<Vec<T>> {
    let count = compact::read(input)?;
    let count = usize::try_from(count).map_err(|_| Error::InvalidValue("sequence length"))?;
    // Do not trust the count for preallocation, the input may be hostile
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::decode(input)?)
    }
    Ok(items)
}

pub fn seq_encoded_size<T: Encode>(items: &[T]) -> usize {
    compact::size(items.len() as u64) + items.iter().map(Encode::encoded_size).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        let value = 0xdead_beef_u32;
        let encoded = value.encode();
        assert_eq!(encoded, vec![0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(u32::decode_all(&encoded).unwrap(), value);
    }

    #[test]
    fn trailing_data_rejected() {
        let mut encoded = 7_u16.encode();
        encoded.push(0x00);
        assert_eq!(u16::decode_all(&encoded).unwrap_err(), Error::TrailingData);
    }

    #[test]
    fn byte_vec_round_trip() {
        let data = vec![1_u8, 2, 3, 4, 5];
        let encoded = data.encode();
        assert_eq!(encoded[0], 5);
        assert_eq!(Vec::<u8>::decode_all(&encoded).unwrap(), data);
    }

    #[test]
    fn eof_detected() {
        let encoded = 1234_u64.encode();
        assert_eq!(
            u64::decode_all(&encoded[..7]).unwrap_err(),
            Error::UnexpectedEof
        );
    }
}
