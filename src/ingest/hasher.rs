use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{bail, Context, Result};
use memmap2::MmapOptions;
use sha2::{Digest, Sha256};

const MMAP_THRESHOLD: u64 = 500 * 1024 * 1024;
const READ_BUFFER: usize = 64 * 1024;

/// Byte length and hex SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub sha256: String,
}

pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?} for hashing", path))?;
    let len = file.metadata()?.len();

    let sha256 = if len > MMAP_THRESHOLD {
        // Managed copies are only written by this process, never while mapped.
        let mapped = unsafe { MmapOptions::new().map(&file)? };
        hex::encode(Sha256::digest(&mapped[..]))
    } else {
        digest_reader(BufReader::with_capacity(READ_BUFFER, file))
            .with_context(|| format!("Failed to read {:?}", path))?
    };
    Ok(Fingerprint { len, sha256 })
}

fn digest_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Fails unless `copy` has the same content as `source`. Returns the digest.
pub fn verify_copy(source: &Path, copy: &Path) -> Result<String> {
    let copy_len = copy
        .metadata()
        .with_context(|| format!("Copy {:?} is missing", copy))?
        .len();
    let expected = fingerprint(source)?;
    if expected.len != copy_len {
        bail!(
            "Copy of {:?} at {:?} is truncated ({} of {} bytes)",
            source,
            copy,
            copy_len,
            expected.len
        );
    }
    let actual = fingerprint(copy)?;
    if expected.sha256 != actual.sha256 {
        bail!("Copy of {:?} at {:?} is corrupt ({} != {})", source, copy, expected.sha256, actual.sha256);
    }
    Ok(actual.sha256)
}
