use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use syncrypt_core::crypto::{CryptoError, CryptoErrorKind};
use syncrypt_core::hasher::hash_bytes;
use syncrypt_core::paths::{PathError, TreeMapping};
use syncrypt_core::{
    generate_keys, AppConfig, CryptoGateway, Error, KeyRing, Ledger, ProgressReporter,
    SealedBoxGateway, SilentReporter, SyncEngine, SyncOptions,
};

const MARKER: &[u8] = b"enc:";

/// Gateway that "encrypts" by prefixing a marker and records every call.
#[derive(Default)]
struct RecordingGateway {
    encrypted: RefCell<Vec<PathBuf>>,
    fail_on: Option<&'static str>,
    decrypt_calls: Cell<usize>,
}

impl RecordingGateway {
    fn failing_on(name: &'static str) -> Self {
        Self {
            fail_on: Some(name),
            ..Self::default()
        }
    }

    fn encrypt_calls(&self) -> usize {
        self.encrypted.borrow().len()
    }
}

impl CryptoGateway for RecordingGateway {
    fn encrypt(&self, source: &Path, dest: &Path, _public_key: &Path) -> Result<(), CryptoError> {
        if self.fail_on.is_some_and(|name| source.ends_with(name)) {
            return Err(CryptoError::new(CryptoErrorKind::Io, source, "refused"));
        }
        let plaintext =
            fs::read(source).map_err(|e| CryptoError::new(CryptoErrorKind::Io, source, e))?;
        fs::write(dest, [MARKER, &plaintext].concat())
            .map_err(|e| CryptoError::new(CryptoErrorKind::Io, dest, e))?;
        self.encrypted.borrow_mut().push(source.to_path_buf());
        Ok(())
    }

    fn decrypt(
        &self,
        source: &Path,
        dest: &Path,
        _private_key: &Path,
        _passphrase: &str,
    ) -> Result<(), CryptoError> {
        self.decrypt_calls.set(self.decrypt_calls.get() + 1);
        let artifact =
            fs::read(source).map_err(|e| CryptoError::new(CryptoErrorKind::Io, source, e))?;
        let plaintext = artifact
            .strip_prefix(MARKER)
            .ok_or_else(|| CryptoError::new(CryptoErrorKind::Corrupt, source, "no marker"))?;
        fs::write(dest, plaintext).map_err(|e| CryptoError::new(CryptoErrorKind::Io, dest, e))
    }

    fn generate_keypair(
        &self,
        _public_key: &Path,
        _private_key: &Path,
        _passphrase: &str,
    ) -> Result<(), CryptoError> {
        Ok(())
    }
}

fn options(src: &Path, dst: &Path) -> SyncOptions {
    SyncOptions {
        mapping: TreeMapping::new(src, dst),
        keys: KeyRing {
            public_key: PathBuf::from("unused.pub"),
            private_key: PathBuf::from("unused.key"),
            passphrase: String::new(),
        },
        ignore_patterns: vec![],
        propagate_deletions: false,
    }
}

/// Source and destination roots under one temp dir.
fn roots(tmp: &Path) -> (PathBuf, PathBuf) {
    let src = tmp.join("source");
    let dst = tmp.join("encrypted");
    fs::create_dir_all(&src).unwrap();
    (src, dst)
}

fn tracked_name(path: &Path) -> String {
    fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

#[test]
fn test_first_pass_encrypts_and_records_every_file() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::create_dir_all(src.join("docs/drafts")).unwrap();
    fs::create_dir_all(src.join("empty")).unwrap();
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("docs/b.txt"), "bravo").unwrap();
    fs::write(src.join("docs/drafts/c.txt"), "charlie").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.dirs_scanned, 3);
    assert_eq!(report.new, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(gateway.encrypt_calls(), 3);

    assert!(dst.join("empty").is_dir());
    assert!(dst.join("docs/drafts").is_dir());
    assert_eq!(fs::read(dst.join("a.txt.syncrypt")).unwrap(), b"enc:alpha");
    assert_eq!(
        fs::read(dst.join("docs/drafts/c.txt.syncrypt")).unwrap(),
        b"enc:charlie"
    );

    let tracked = ledger.list_all_filenames().unwrap();
    assert_eq!(tracked.len(), 3);
    assert!(tracked.contains(&tracked_name(&src.join("docs/b.txt"))));
}

#[test]
fn test_second_pass_over_untouched_tree_is_idempotent() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("b.txt"), "bravo").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));

    engine.run_pass(&SilentReporter).unwrap();
    let before = ledger.list_records().unwrap();
    let calls = gateway.encrypt_calls();

    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.encrypted(), 0);
    assert_eq!(gateway.encrypt_calls(), calls);
    // Timestamps included: no row was written.
    assert_eq!(ledger.list_records().unwrap(), before);
}

#[test]
fn test_copied_file_is_a_duplicate_and_not_encrypted() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "aaa").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));

    engine.run_pass(&SilentReporter).unwrap();
    let before = ledger.list_records().unwrap();
    assert_eq!(before.len(), 1);

    fs::copy(src.join("a.txt"), src.join("b.txt")).unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.duplicates, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.encrypted(), 0);
    assert!(!dst.join("b.txt.syncrypt").exists());
    assert_eq!(ledger.list_records().unwrap(), before);
}

#[test]
fn test_identical_files_in_one_pass_encrypt_only_the_first() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("first.txt"), "same bytes").unwrap();
    fs::write(src.join("second.txt"), "same bytes").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.new, 1);
    assert_eq!(report.duplicates, 1);
    assert!(dst.join("first.txt.syncrypt").exists());
    assert!(!dst.join("second.txt.syncrypt").exists());
    assert_eq!(
        ledger.list_all_filenames().unwrap(),
        vec![tracked_name(&src.join("first.txt"))]
    );
}

#[test]
fn test_changed_file_is_reencrypted_and_updated_in_place() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "version one").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));

    engine.run_pass(&SilentReporter).unwrap();
    let name = tracked_name(&src.join("a.txt"));
    let old_hash = ledger.get_hash(&name).unwrap().unwrap();

    fs::write(src.join("a.txt"), "version two").unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(gateway.encrypt_calls(), 2);
    let records = ledger.list_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_ne!(records[0].content_hash, old_hash);
    assert_eq!(
        fs::read(dst.join("a.txt.syncrypt")).unwrap(),
        b"enc:version two"
    );
}

#[test]
fn test_encryption_failure_skips_file_and_retries_next_pass() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("bad.txt"), "rejected").unwrap();
    fs::write(src.join("good.txt"), "accepted").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let failing = RecordingGateway::failing_on("bad.txt");
    let report = SyncEngine::new(&ledger, &failing, options(&src, &dst))
        .run_pass(&SilentReporter)
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.new, 1);
    assert!(!ledger
        .has_filename(&tracked_name(&src.join("bad.txt")))
        .unwrap());

    let healthy = RecordingGateway::default();
    let report = SyncEngine::new(&ledger, &healthy, options(&src, &dst))
        .run_pass(&SilentReporter)
        .unwrap();
    assert_eq!(report.new, 1);
    assert_eq!(report.unchanged, 1);
}

#[test]
fn test_ignore_patterns_exclude_files_from_the_pass() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("keep.txt"), "keep").unwrap();
    fs::write(src.join("scratch.tmp"), "skip").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let mut opts = options(&src, &dst);
    opts.ignore_patterns = vec!["**/*.tmp".to_string()];
    let report = SyncEngine::new(&ledger, &gateway, opts)
        .run_pass(&SilentReporter)
        .unwrap();

    assert_eq!(report.files_scanned, 1);
    assert!(!dst.join("scratch.tmp.syncrypt").exists());
}

#[test]
fn test_removed_file_is_flagged_then_restored_when_it_returns() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("b.txt"), "bravo").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    engine.run_pass(&SilentReporter).unwrap();

    let a_name = tracked_name(&src.join("a.txt"));
    fs::remove_file(src.join("a.txt")).unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.flagged_for_deletion, 1);
    assert!(report.deletions.is_none());
    assert_eq!(gateway.decrypt_calls.get(), 0);

    let pending = engine.review_deletions().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].filename, a_name);
    assert!(pending[0].deleted);
    // Still pending on the next pass; review does not consume it.
    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.flagged_for_deletion, 0);
    assert_eq!(engine.review_deletions().unwrap().len(), 1);

    fs::write(src.join("a.txt"), "alpha").unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.unchanged, 2);
    assert!(engine.review_deletions().unwrap().is_empty());
    assert!(dst.join("a.txt.syncrypt").exists());
}

#[test]
fn test_propagating_pass_deletes_verified_artifacts() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("b.txt"), "bravo").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let mut opts = options(&src, &dst);
    opts.propagate_deletions = true;
    let engine = SyncEngine::new(&ledger, &gateway, opts);
    engine.run_pass(&SilentReporter).unwrap();

    fs::remove_file(src.join("a.txt")).unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();

    let deletions = report.deletions.unwrap();
    assert_eq!(deletions.removed_from_ledger, 1);
    assert_eq!(deletions.artifacts_deleted, 1);
    assert_eq!(gateway.decrypt_calls.get(), 1);
    assert!(!dst.join("a.txt.syncrypt").exists());
    assert!(dst.join("b.txt.syncrypt").exists());
    assert_eq!(ledger.list_records().unwrap().len(), 1);
}

#[test]
fn test_renamed_file_is_picked_up_once_old_name_is_flagged() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("old.txt"), "moving content").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    engine.run_pass(&SilentReporter).unwrap();

    fs::rename(src.join("old.txt"), src.join("new.txt")).unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();
    // The old row is still active while new.txt is classified.
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.flagged_for_deletion, 1);

    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.new, 1);
    assert!(dst.join("new.txt.syncrypt").exists());
}

#[test]
fn test_output_root_inside_input_root_is_rejected() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("source");
    let dst = src.join("encrypted");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), "alpha").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));

    for _ in 0..2 {
        assert!(matches!(
            engine.run_pass(&SilentReporter),
            Err(Error::Path(PathError::OutputInsideInput { .. }))
        ));
    }
    assert!(!dst.exists());
    assert_eq!(gateway.encrypt_calls(), 0);
    assert!(ledger.list_records().unwrap().is_empty());
}

#[test]
fn test_pass_spanning_several_hash_batches_tracks_every_file() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    for i in 0..150 {
        fs::write(src.join(format!("file-{i:03}.txt")), format!("body {i}")).unwrap();
    }

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    let report = engine.run_pass(&SilentReporter).unwrap();

    assert_eq!(report.new, 150);
    assert_eq!(ledger.list_records().unwrap().len(), 150);
    let name = tracked_name(&src.join("file-149.txt"));
    assert_eq!(
        ledger.get_hash(&name).unwrap(),
        Some(hash_bytes(b"body 149"))
    );
}

/// Rewrites `target` when the pass reaches `trigger`.
struct RewritingReporter {
    trigger: &'static str,
    target: PathBuf,
    body: &'static str,
}

impl ProgressReporter for RewritingReporter {
    fn on_file_synced(&self, _index: usize, _total_files: usize, path: &str) {
        if path.ends_with(self.trigger) {
            fs::write(&self.target, self.body).unwrap();
        }
    }
}

#[test]
fn test_file_rewritten_after_hashing_is_recorded_with_its_new_hash() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("b.txt"), "bravo").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(&ledger, &gateway, options(&src, &dst));
    // Both files are hashed together; b.txt changes before its turn.
    let reporter = RewritingReporter {
        trigger: "a.txt",
        target: src.join("b.txt"),
        body: "bravo, rewritten",
    };
    engine.run_pass(&reporter).unwrap();

    let name = tracked_name(&src.join("b.txt"));
    assert_eq!(
        ledger.get_hash(&name).unwrap(),
        Some(hash_bytes(b"bravo, rewritten"))
    );
    assert_eq!(
        fs::read(dst.join("b.txt.syncrypt")).unwrap(),
        b"enc:bravo, rewritten"
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_name_is_never_tracked() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::write(src.join("a.txt"), "alpha").unwrap();
    let bad = src.join(OsStr::from_bytes(b"b\xff.txt"));
    fs::write(&bad, "bravo").unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let mut opts = options(&src, &dst);
    opts.propagate_deletions = true;
    let engine = SyncEngine::new(&ledger, &gateway, opts);

    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.files_scanned, 1);
    assert_eq!(report.new, 1);
    assert_eq!(ledger.list_all_filenames().unwrap().len(), 1);

    fs::remove_file(&bad).unwrap();
    let report = engine.run_pass(&SilentReporter).unwrap();
    assert_eq!(report.flagged_for_deletion, 0);
    let deletions = report.deletions.unwrap();
    assert_eq!(deletions.removed_from_ledger, 0);
    assert_eq!(deletions.artifacts_missing, 0);
    assert_eq!(fs::read_dir(&dst).unwrap().count(), 1);
}

#[test]
fn test_missing_roots_are_reported_before_any_work() {
    let config = AppConfig::default();
    assert!(matches!(
        SyncOptions::from_config(&config),
        Err(Error::MissingSetting("input_dir"))
    ));
}

#[test]
fn test_missing_source_tree_is_fatal() {
    let tmp = tempdir().unwrap();
    let ledger = Ledger::open_in_memory().unwrap();
    let gateway = RecordingGateway::default();
    let engine = SyncEngine::new(
        &ledger,
        &gateway,
        options(&tmp.path().join("nope"), &tmp.path().join("out")),
    );
    assert!(matches!(engine.run_pass(&SilentReporter), Err(Error::Io(_))));
}

#[test]
fn test_decrypt_pass_restores_plaintext_tree() {
    let tmp = tempdir().unwrap();
    let (src, dst) = roots(tmp.path());
    fs::create_dir_all(src.join("nested")).unwrap();
    fs::write(src.join("a.txt"), "alpha").unwrap();
    fs::write(src.join("nested/b.bin"), [0u8, 1, 2, 3, 255]).unwrap();

    let keys = KeyRing {
        public_key: tmp.path().join("public.syncrypt.key"),
        private_key: tmp.path().join("private.syncrypt.key"),
        passphrase: "correct horse".to_string(),
    };
    let gateway = SealedBoxGateway::new();
    generate_keys(&gateway, &keys).unwrap();

    let ledger = Ledger::open_in_memory().unwrap();
    let mut sync_opts = options(&src, &dst);
    sync_opts.keys = keys.clone();
    SyncEngine::new(&ledger, &gateway, sync_opts)
        .run_pass(&SilentReporter)
        .unwrap();
    let tracked = ledger.list_records().unwrap();

    // Stray plaintext in the artifact tree is left alone.
    fs::write(dst.join("notes.md"), "not an artifact").unwrap();

    let restored = tmp.path().join("restored");
    let mut decrypt_opts = options(&dst, &restored);
    decrypt_opts.keys = keys;
    let report = SyncEngine::new(&ledger, &gateway, decrypt_opts)
        .decrypt_all(&SilentReporter)
        .unwrap();

    assert_eq!(report.decrypted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(fs::read(restored.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(
        fs::read(restored.join("nested/b.bin")).unwrap(),
        [0u8, 1, 2, 3, 255]
    );
    assert!(!restored.join("notes.md").exists());
    assert_eq!(ledger.list_records().unwrap(), tracked);
}
