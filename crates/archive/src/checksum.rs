//! SHA-1 content digests, the checksum the archive dedups on.

use crate::ArchiveError;
use rayon::prelude::*;
use sha1::{Digest, Sha1};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hex-encoded SHA-1 of the file's contents.
pub fn sha1_file(path: &Path) -> Result<String, ArchiveError> {
    let mut file = fs::File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| ArchiveError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes every file on the rayon pool. Output order follows input order and
/// the first failure aborts the batch.
pub fn sha1_files(paths: &[PathBuf]) -> Result<Vec<String>, ArchiveError> {
    paths.par_iter().map(|p| sha1_file(p)).collect()
}
