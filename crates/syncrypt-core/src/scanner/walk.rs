use glob::Pattern;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

/// Files and directories observed by one walk of the source tree. Lives for
/// a single pass.
#[derive(Debug, Default, Clone)]
pub struct ScanSnapshot {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

impl ScanSnapshot {
    /// Filenames as the ledger stores them.
    pub fn filename_set(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .map(|f| f.to_string_lossy().into_owned())
            .collect()
    }
}

/// Walk `root` depth-first in file-name order. Skips symlinks, anything
/// matching an ignore glob and any path that is not valid UTF-8 (the ledger
/// keys files by their UTF-8 path). The root is canonicalized so every
/// reported path is absolute; the root itself is not reported.
pub fn scan_tree(root: &Path, ignore_globs: &[String]) -> io::Result<ScanSnapshot> {
    let root = fs::canonicalize(root)?;

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut snapshot = ScanSnapshot {
        root: root.clone(),
        ..ScanSnapshot::default()
    };

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(entry.path()))
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                match err.into_io_error() {
                    Some(io_err) if io_err.kind() == io::ErrorKind::PermissionDenied => {
                        error!("Access denied reading {}: {}", path.display(), io_err);
                        continue;
                    }
                    Some(io_err) => {
                        return Err(io::Error::new(
                            io_err.kind(),
                            format!("Error reading {}: {}", path.display(), io_err),
                        ));
                    }
                    None => {
                        error!("Filesystem loop at {}, skipping", path.display());
                        continue;
                    }
                }
            }
        };

        if entry.depth() == 0 {
            continue;
        }

        if entry.path().to_str().is_none() {
            error!(
                "Skipping {}, its path is not valid UTF-8",
                entry.path().display()
            );
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            snapshot.dirs.push(entry.into_path());
        } else if file_type.is_file() {
            snapshot.files.push(entry.into_path());
        }
    }

    Ok(snapshot)
}
