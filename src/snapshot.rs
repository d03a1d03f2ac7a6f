//! Atomic, checksummed persistence of store images.
//!
//! An image file holds two lines: the hex-encoded xxh64 hash of the JSON
//! body, then the body itself.
//!
//! ```text
//! 3f2a9c0d1e4b5a67
//! {"account_state":{"pts":12,"qts":0,"date":0,"seq":3},"peers":{...}}
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Compute the xxh64 hash of `body`, hex-encoded.
pub fn body_hash(body: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(body, 0);
    format!("{:016x}", hash)
}

/// Save an image atomically.
///
/// Writes to a `.tmp` file first, syncs, then renames over `path`. If the
/// process crashes mid-write, the previous image survives intact.
pub fn save<S: Serialize>(path: &Path, value: &S) -> Result<(), SnapshotError> {
    let tmp_path = path.with_extension("tmp");

    let body = serde_json::to_string(value)?;
    let hash = body_hash(body.as_bytes());

    let mut file = fs::File::create(&tmp_path)?;
    writeln!(file, "{hash}")?;
    file.write_all(body.as_bytes())?;
    file.sync_data()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    log::debug!(
        "syncfold: saved image {} ({} bytes)",
        path.display(),
        body.len()
    );
    Ok(())
}

/// Load an image.
///
/// Returns `Ok(None)` if the file doesn't exist, its hash doesn't match, or
/// the body doesn't deserialize.
pub fn load<S: DeserializeOwned>(path: &Path) -> Result<Option<S>, SnapshotError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let Some((hash, body)) = contents.split_once('\n') else {
        log::warn!("syncfold: image {} has no header, ignoring", path.display());
        return Ok(None);
    };
    if body_hash(body.as_bytes()) != hash {
        log::warn!("syncfold: image {} hash mismatch, ignoring", path.display());
        return Ok(None);
    }

    match serde_json::from_str(body) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("syncfold: image {} does not decode: {e}", path.display());
            Ok(None)
        }
    }
}

/// Delete an image and its `.tmp` file if present.
///
/// Idempotent: missing files are not an error.
pub fn delete(path: &Path) -> io::Result<()> {
    for candidate in [path.to_path_buf(), path.with_extension("tmp")] {
        match fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
