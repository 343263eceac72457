//! Framed cache snapshots.
//!
//! A dump is a magic-and-version header followed by the bincode
//! encoding of the entry sequence, each entry carrying its key, write
//! time, TTL and value. Loading is additive and skips entries whose
//! TTL elapsed between the two steps.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::cache::entry::Entry;
use crate::cache::{CacheKey, CacheValue};
use crate::error::CacheError;

const SNAPSHOT_MAGIC: [u8; 4] = *b"STSH";
const SNAPSHOT_VERSION: u8 = 1;

fn unreachable_file(error: impl std::fmt::Display) -> CacheError {
    CacheError::UnreachableFile(error.to_string())
}

/// Writes a framed snapshot of `entries` to `path`.
pub(crate) fn dump_entries<K: CacheKey, V: CacheValue>(
    entries: &Vec<Entry<K, V>>,
    path: &Path,
) -> Result<usize, CacheError> {
    let file = File::create(path).map_err(unreachable_file)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&SNAPSHOT_MAGIC).map_err(unreachable_file)?;
    writer.write_all(&[SNAPSHOT_VERSION]).map_err(unreachable_file)?;
    bincode::serde::encode_into_std_write(entries, &mut writer, bincode::config::standard())
        .map_err(unreachable_file)?;
    writer.flush().map_err(unreachable_file)?;
    Ok(entries.len())
}

/// Reads a framed snapshot back, verifying the header.
pub(crate) fn load_entries<K: CacheKey, V: CacheValue>(
    path: &Path,
) -> Result<Vec<Entry<K, V>>, CacheError> {
    let file = File::open(path).map_err(unreachable_file)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(unreachable_file)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(CacheError::UnreachableFile("not a cache snapshot".to_string()));
    }
    let mut version = [0u8; 1];
    reader.read_exact(&mut version).map_err(unreachable_file)?;
    if version[0] != SNAPSHOT_VERSION {
        return Err(CacheError::UnreachableFile(format!(
            "unsupported snapshot version {}",
            version[0]
        )));
    }

    bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
        .map_err(unreachable_file)
}
