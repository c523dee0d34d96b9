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

//! On-disk snapshot of the pool contents.
//!
//! Layout: a little-endian `u64` version, a little-endian `i64` entry
//! count, then per entry the canonical transaction serialization followed
//! by the compact-encoded entry time (seconds) and operator fee delta
//! (two's-complement `u64`). The file is replaced atomically: the new
//! contents go to a sibling `.new` file which is fsynced and renamed over
//! the old snapshot.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use common::chain::SignedTransaction;
use logging::log;
use serialization::{compact, Decode, Encode};

pub const SNAPSHOT_VERSION: u64 = 0;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Mempool snapshot I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported mempool snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u64 },
    #[error("Malformed mempool snapshot entry {index}: {source}")]
    Malformed {
        index: i64,
        source: serialization::Error,
    },
    #[error("Malformed mempool snapshot header: {0}")]
    MalformedHeader(serialization::Error),
}

/// One persisted pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub tx: SignedTransaction,
    /// Admission time, in seconds since the epoch.
    pub entry_time: u64,
    /// Operator fee delta in atoms.
    pub fee_delta: i64,
}

pub fn encode_snapshot(entries: &[SnapshotEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    SNAPSHOT_VERSION.encode_to(&mut out);
    (entries.len() as i64).encode_to(&mut out);
    for entry in entries {
        entry.tx.encode_to(&mut out);
        compact::write(&mut out, entry.entry_time);
        compact::write(&mut out, entry.fee_delta as u64);
    }
    out
}

/// Decode a snapshot in full. A malformed entry aborts the load; nothing
/// before it is returned either, so a load is all-or-nothing.
pub fn decode_snapshot(mut input: &[u8]) -> Result<Vec<SnapshotEntry>, PersistenceError> {
    let input = &mut input;
    let version = u64::decode(input).map_err(PersistenceError::MalformedHeader)?;
    if version != SNAPSHOT_VERSION {
        return Err(PersistenceError::UnsupportedVersion { found: version });
    }
    let count = i64::decode(input).map_err(PersistenceError::MalformedHeader)?;

    let mut entries = Vec::new();
    for index in 0..count {
        let malformed = |source| PersistenceError::Malformed { index, source };
        let tx = SignedTransaction::decode(input).map_err(malformed)?;
        let entry_time = compact::read(input).map_err(malformed)?;
        let fee_delta = compact::read(input).map_err(malformed)? as i64;
        entries.push(SnapshotEntry {
            tx,
            entry_time,
            fee_delta,
        });
    }
    if !input.is_empty() {
        return Err(PersistenceError::Malformed {
            index: count,
            source: serialization::Error::TrailingData,
        });
    }
    Ok(entries)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".new");
    path.with_file_name(file_name)
}

/// Write the snapshot next to `path` and atomically rename it into place.
pub fn write_snapshot(path: &Path, entries: &[SnapshotEntry]) -> Result<(), PersistenceError> {
    let staging = staging_path(path);
    {
        let mut file = fs::File::create(&staging)?;
        file.write_all(&encode_snapshot(entries))?;
        file.sync_all()?;
    }
    fs::rename(&staging, path)?;
    log::info!("Wrote {} mempool entries to {}", entries.len(), path.display());
    Ok(())
}

/// Read a snapshot back. A missing file is an empty pool, not an error.
pub fn read_snapshot(path: &Path) -> Result<Vec<SnapshotEntry>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    decode_snapshot(&bytes)
}
