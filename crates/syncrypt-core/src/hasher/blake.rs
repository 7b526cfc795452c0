use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Lowercase hex BLAKE3 digest. This is the ledger's dedup key, so a
/// collision would suppress encryption of distinct content.
pub type ContentHash = String;

/// Stream a file through BLAKE3.
pub fn hash_file(file: &Path) -> io::Result<ContentHash> {
    let mut reader = BufReader::new(File::open(file)?);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
    blake3::hash(data).to_hex().to_string()
}

/// Hash a batch of files in parallel. Output order matches input order so
/// callers can keep processing sequentially.
pub fn hash_files(files: &[PathBuf]) -> Vec<io::Result<ContentHash>> {
    files.par_iter().map(|file| hash_file(file)).collect()
}
