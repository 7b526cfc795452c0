use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::crypto::{CryptoGateway, KeyRing};
use crate::error::Error;
use crate::hasher;
use crate::paths::TreeMapping;
use crate::storage::{FileRecord, Ledger};

/// Ledger rows touched by one detect phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetectReport {
    /// Newly flagged as pending deletion.
    pub flagged: Vec<String>,
    /// Flagged earlier, seen again in this scan.
    pub restored: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeletionReport {
    pub removed_from_ledger: usize,
    pub artifacts_deleted: usize,
    /// Decrypted content did not match the ledger hash; artifact left on disk.
    pub artifacts_kept: usize,
    pub artifacts_missing: usize,
    /// Matched, but the artifact could not be removed.
    pub cleanup_failures: usize,
    /// Rows whose removal failed; they stay flagged for the next apply.
    pub ledger_failures: usize,
}

/// Flag every tracked filename that `scanned` no longer contains, and clear
/// the flag on flagged rows whose file is back.
pub fn detect_deletions(ledger: &Ledger, scanned: &BTreeSet<String>) -> Result<DetectReport, Error> {
    let mut report = DetectReport::default();

    for filename in ledger.list_all_filenames()? {
        if scanned.contains(&filename) {
            continue;
        }
        match ledger.mark_deleted(&filename) {
            Ok(true) => {
                info!(
                    "File {} is not in the source directory and was marked for deletion.",
                    filename
                );
                report.flagged.push(filename);
            }
            Ok(false) => {}
            Err(e) => error!("Failed to mark {} for deletion: {}", filename, e),
        }
    }

    for filename in ledger.list_deleted_filenames()? {
        if !scanned.contains(&filename) {
            continue;
        }
        match ledger.restore(&filename) {
            Ok(true) => {
                info!("File {} reappeared, no longer pending deletion.", filename);
                report.restored.push(filename);
            }
            Ok(false) => {}
            Err(e) => error!("Failed to restore {}: {}", filename, e),
        }
    }

    Ok(report)
}

/// Rows pending deletion, for operator review. Read-only.
pub fn review_deletions(ledger: &Ledger) -> Result<Vec<FileRecord>, Error> {
    Ok(ledger.list_deleted()?)
}

/// Remove every flagged row and, where the artifact still decrypts to the
/// recorded hash, its artifact.
///
/// The row goes first, before verification. A mismatch leaves the artifact
/// in place with a warning. Any decryption failure aborts with
/// [`Error::Crypto`]: the key material is not what we assumed, so no further
/// deletions are attempted.
pub fn apply_deletions(
    ledger: &Ledger,
    gateway: &dyn CryptoGateway,
    mapping: &TreeMapping,
    keys: &KeyRing,
) -> Result<DeletionReport, Error> {
    info!("Deleting removed files...");
    let mut report = DeletionReport::default();

    for filename in ledger.list_deleted_filenames()? {
        let expected_hash = ledger.get_hash(&filename)?;

        if let Err(e) = ledger.remove(&filename) {
            error!("Failed to remove {} from the ledger: {}", filename, e);
            report.ledger_failures += 1;
            continue;
        }
        report.removed_from_ledger += 1;

        let Some(expected_hash) = expected_hash else {
            continue;
        };

        let artifact = match mapping.artifact_path(Path::new(&filename)) {
            Ok(path) => path,
            Err(e) => {
                warn!("{}; no artifact to delete for {}", e, filename);
                report.artifacts_missing += 1;
                continue;
            }
        };
        if !artifact.exists() {
            warn!("No artifact at {}, nothing to delete", artifact.display());
            report.artifacts_missing += 1;
            continue;
        }

        if verify_artifact(gateway, &artifact, &expected_hash, keys)? {
            match fs::remove_file(&artifact) {
                Ok(()) => {
                    info!("Deleted encrypted file: {}", artifact.display());
                    report.artifacts_deleted += 1;
                }
                Err(e) => {
                    error!("Failed to delete {}: {}", artifact.display(), e);
                    report.cleanup_failures += 1;
                }
            }
        } else {
            warn!(
                "Hash of {} does not match the ledger. The row was removed from the ledger but not from the disk.",
                artifact.display()
            );
            report.artifacts_kept += 1;
        }
    }

    info!(
        "Deletions applied: {} rows removed, {} artifacts deleted, {} kept, {} missing",
        report.removed_from_ledger,
        report.artifacts_deleted,
        report.artifacts_kept,
        report.artifacts_missing
    );
    Ok(report)
}

/// Decrypt `artifact` into a scratch directory and compare its hash. The
/// scratch directory is removed on every path out of this function.
fn verify_artifact(
    gateway: &dyn CryptoGateway,
    artifact: &Path,
    expected_hash: &str,
    keys: &KeyRing,
) -> Result<bool, Error> {
    let scratch = tempfile::Builder::new()
        .prefix("syncrypt-verify-")
        .tempdir()?;
    debug!("Created temp directory for decryption: {}", scratch.path().display());

    let plaintext = scratch.path().join("plaintext");
    if let Err(e) = gateway.decrypt(artifact, &plaintext, &keys.private_key, &keys.passphrase) {
        if e.kind.is_key_failure() {
            error!(
                "Cannot use private key {} (did you provide the passphrase?): {}",
                keys.private_key.display(),
                e
            );
        } else {
            error!("Decrypting {} failed: {}", artifact.display(), e);
        }
        return Err(e.into());
    }
    let actual_hash = hasher::hash_file(&plaintext)?;

    if let Err(e) = scratch.close() {
        error!("Failed to clean up verification directory: {}", e);
    }
    Ok(actual_hash == expected_hash)
}
