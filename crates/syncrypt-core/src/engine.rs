use crate::config::AppConfig;
use crate::crypto::{CryptoGateway, KeyRing};
use crate::error::Error;
use crate::hasher;
use crate::paths::{self, PathError, TreeMapping};
use crate::progress::ProgressReporter;
use crate::reconcile::{self, classify, Classification, DeletionReport};
use crate::scanner::{self, ScanSnapshot};
use crate::storage::{FileRecord, Ledger};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Files hashed in parallel before the sequential sync of that batch.
const HASH_BATCH_SIZE: usize = 64;

/// Everything a pass needs besides the ledger and the gateway.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mapping: TreeMapping,
    pub keys: KeyRing,
    pub ignore_patterns: Vec<String>,
    pub propagate_deletions: bool,
}

impl SyncOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let (input, output) = config.roots()?;
        Ok(Self {
            mapping: TreeMapping::new(input, output),
            keys: config.key_ring(),
            ignore_patterns: config.ignore_patterns.clone(),
            propagate_deletions: config.propagate_deletions,
        })
    }
}

/// Per-file result of the classify-and-sync step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Duplicate,
    New,
    Updated,
    /// Hashing, encryption or the ledger write failed; the file is retried next pass.
    Failed,
}

#[derive(Debug, Default)]
pub struct PassReport {
    pub scan_duration: Duration,
    pub sync_duration: Duration,
    pub files_scanned: usize,
    pub dirs_scanned: usize,
    pub dirs_created: usize,
    pub unchanged: usize,
    pub new: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub flagged_for_deletion: usize,
    pub restored: usize,
    pub deletions: Option<DeletionReport>,
}

impl PassReport {
    pub fn encrypted(&self) -> usize {
        self.new + self.updated
    }

    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Duplicate => self.duplicates += 1,
            SyncOutcome::New => self.new += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecryptReport {
    pub decrypted: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drives synchronization passes against an explicit ledger handle.
pub struct SyncEngine<'a> {
    ledger: &'a Ledger,
    gateway: &'a dyn CryptoGateway,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(ledger: &'a Ledger, gateway: &'a dyn CryptoGateway, options: SyncOptions) -> Self {
        Self {
            ledger,
            gateway,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// One full pass, always in this order:
    /// 1. Scan the source tree
    /// 2. Mirror its directories into the destination
    /// 3. Classify and, where needed, encrypt each file
    /// 4. Flag ledger rows whose file is gone
    /// 5. Apply deletions, if configured
    ///
    /// Any `Err` is fatal to the pass, including an output root nested in
    /// the input root. Per-file failures are logged and counted.
    pub fn run_pass(&self, reporter: &dyn ProgressReporter) -> Result<PassReport, Error> {
        let mut report = PassReport::default();
        self.options.mapping.check_disjoint()?;

        // Phase 1: Scan
        info!("Searching files and directories...");
        reporter.on_scan_start();
        let scan_start = Instant::now();
        let snapshot = self.scan()?;
        report.scan_duration = scan_start.elapsed();
        report.files_scanned = snapshot.files.len();
        report.dirs_scanned = snapshot.dirs.len();
        reporter.on_scan_complete(
            snapshot.files.len(),
            snapshot.dirs.len(),
            report.scan_duration.as_secs_f64(),
        );
        let mapping = TreeMapping::new(&snapshot.root, self.options.mapping.output_root());

        // Phase 2: Mirror directories
        info!("Creating directories...");
        report.dirs_created = mirror_directories(&mapping, &snapshot)?;

        // Phase 3: Classify and sync
        info!("Processing {} files.", snapshot.files.len());
        reporter.on_sync_start(snapshot.files.len());
        let sync_start = Instant::now();
        let total = snapshot.files.len();
        let mut done = 0;
        for batch in snapshot.files.chunks(HASH_BATCH_SIZE) {
            let stamps: Vec<Option<FileStamp>> = batch.iter().map(|f| FileStamp::of(f)).collect();
            let hashes = hasher::hash_files(batch);
            for ((file, stamp), hash) in batch.iter().zip(stamps).zip(hashes) {
                done += 1;
                reporter.on_file_synced(done, total, &file.to_string_lossy());
                let hash = if stamp.is_some() && FileStamp::of(file) != stamp {
                    debug!("{} changed after hashing, hashing again", file.display());
                    hasher::hash_file(file)
                } else {
                    hash
                };
                let outcome = match hash {
                    Ok(hash) => self.sync_file(&mapping, file, &hash)?,
                    Err(e) => {
                        error!("Error hashing {}: {}", file.display(), e);
                        SyncOutcome::Failed
                    }
                };
                report.record(outcome);
            }
        }
        report.sync_duration = sync_start.elapsed();
        reporter.on_sync_complete(report.sync_duration.as_secs_f64());

        // Phase 4: Detect deletions
        info!("Marking files for deletions...");
        let detected = reconcile::detect_deletions(self.ledger, &snapshot.filename_set())?;
        report.flagged_for_deletion = detected.flagged.len();
        report.restored = detected.restored.len();
        reporter.on_deletions_detected(detected.flagged.len());

        // Phase 5: Apply deletions
        if self.options.propagate_deletions {
            report.deletions = Some(reconcile::apply_deletions(
                self.ledger,
                self.gateway,
                &mapping,
                &self.options.keys,
            )?);
        }

        info!(
            "Complete. {} new, {} updated, {} unchanged, {} duplicates, {} failed",
            report.new, report.updated, report.unchanged, report.duplicates, report.failed
        );
        Ok(report)
    }

    fn scan(&self) -> Result<ScanSnapshot, Error> {
        Ok(scanner::scan_tree(
            self.options.mapping.input_root(),
            &self.options.ignore_patterns,
        )?)
    }

    /// Classify one file and act on the decision. Only ledger read failures
    /// escape as errors.
    pub fn sync_file(
        &self,
        mapping: &TreeMapping,
        file: &Path,
        hash: &str,
    ) -> Result<SyncOutcome, Error> {
        let filename = file.to_string_lossy();
        let class = classify(self.ledger, &filename, hash)?;

        match class {
            Classification::Unchanged => {
                debug!("Skipping {} -> Unchanged.", filename);
                return Ok(SyncOutcome::Unchanged);
            }
            Classification::DuplicateContent => {
                warn!("Found an existing hash for file: {}, skipping.", filename);
                return Ok(SyncOutcome::Duplicate);
            }
            Classification::ContentChanged => {
                info!("{} changed, updating hash and re-encrypting.", filename);
            }
            Classification::New => {}
        }

        let artifact = match mapping.artifact_path(file) {
            Ok(path) => path,
            Err(e) => {
                error!("{}", e);
                return Ok(SyncOutcome::Failed);
            }
        };

        info!("Encrypting {}", filename);
        if let Err(e) = self
            .gateway
            .encrypt(file, &artifact, &self.options.keys.public_key)
        {
            error!("Encrypting {} failed: {}", filename, e);
            return Ok(SyncOutcome::Failed);
        }

        debug!("Storing hash {} for {}", hash, filename);
        if let Err(e) = self.ledger.upsert(&filename, hash, class.is_update()) {
            error!("Storing hash for {} failed: {}", filename, e);
            return Ok(SyncOutcome::Failed);
        }

        info!("Wrote {}", artifact.display());
        Ok(if class.is_update() {
            SyncOutcome::Updated
        } else {
            SyncOutcome::New
        })
    }

    /// Decrypt-only pass: the input tree holds artifacts, the output tree
    /// receives plaintext. The ledger is not touched.
    pub fn decrypt_all(&self, reporter: &dyn ProgressReporter) -> Result<DecryptReport, Error> {
        let mut report = DecryptReport::default();

        reporter.on_scan_start();
        let scan_start = Instant::now();
        let snapshot = self.scan()?;
        reporter.on_scan_complete(
            snapshot.files.len(),
            snapshot.dirs.len(),
            scan_start.elapsed().as_secs_f64(),
        );
        let mapping = TreeMapping::new(&snapshot.root, self.options.mapping.output_root());
        mirror_directories(&mapping, &snapshot)?;

        let keys = &self.options.keys;
        info!("Using keyfile: {}", keys.private_key.display());
        reporter.on_sync_start(snapshot.files.len());
        let sync_start = Instant::now();
        let total = snapshot.files.len();
        for (index, file) in snapshot.files.iter().enumerate() {
            reporter.on_file_synced(index + 1, total, &file.to_string_lossy());
            let dest = match mapping.plaintext_path(file) {
                Ok(dest) => dest,
                Err(PathError::NotAnArtifact(_)) => {
                    debug!("Skipping {}, not an artifact", file.display());
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            info!("Decrypting {}", file.display());
            match self
                .gateway
                .decrypt(file, &dest, &keys.private_key, &keys.passphrase)
            {
                Ok(()) => {
                    info!("Wrote {}", dest.display());
                    report.decrypted += 1;
                }
                Err(e) => {
                    error!("Decrypting {} failed: {}", file.display(), e);
                    report.failed += 1;
                }
            }
        }
        reporter.on_sync_complete(sync_start.elapsed().as_secs_f64());

        info!(
            "Decryption complete: {} decrypted, {} skipped, {} failed",
            report.decrypted, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Rows pending deletion.
    pub fn review_deletions(&self) -> Result<Vec<FileRecord>, Error> {
        reconcile::review_deletions(self.ledger)
    }

    /// One-shot apply, outside a pass.
    pub fn apply_deletions(&self) -> Result<DeletionReport, Error> {
        let mapping = self.options.mapping.canonicalized().unwrap_or_else(|e| {
            debug!(
                "Cannot canonicalize {} ({}), using it as given",
                self.options.mapping.input_root().display(),
                e
            );
            self.options.mapping.clone()
        });
        reconcile::apply_deletions(self.ledger, self.gateway, &mapping, &self.options.keys)
    }
}

/// Size and modification time, to notice a file rewritten between hashing
/// and encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: SystemTime,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok()?,
        })
    }
}

/// Ensure the output root and every mirrored subdirectory exist. Failing to
/// create one is fatal.
fn mirror_directories(mapping: &TreeMapping, snapshot: &ScanSnapshot) -> Result<usize, Error> {
    let mut created = usize::from(paths::ensure_dir(mapping.output_root())?);
    for dir in &snapshot.dirs {
        if paths::ensure_dir(&mapping.mirror_dir(dir)?)? {
            created += 1;
        }
    }
    Ok(created)
}

/// Write a new key pair. Fails without touching anything if either key file exists.
pub fn generate_keys(gateway: &dyn CryptoGateway, keys: &KeyRing) -> Result<(), Error> {
    gateway.generate_keypair(&keys.public_key, &keys.private_key, &keys.passphrase)?;
    let dir = keys
        .public_key
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    info!("Keypair written to {}", dir.display());
    Ok(())
}
