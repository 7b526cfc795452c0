use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::error::Error;

/// Suffix appended to every encrypted artifact.
pub const ARTIFACT_EXTENSION: &str = "syncrypt";

#[derive(Error, Debug)]
pub enum PathError {
    #[error("{} is not under {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("{} does not carry the .{} suffix", .0.display(), ARTIFACT_EXTENSION)]
    NotAnArtifact(PathBuf),

    #[error("output root {} lies inside input root {}", output.display(), input.display())]
    OutputInsideInput { output: PathBuf, input: PathBuf },
}

/// Maps paths under `input_root` to their counterparts under `output_root`.
#[derive(Debug, Clone)]
pub struct TreeMapping {
    input_root: PathBuf,
    output_root: PathBuf,
}

impl TreeMapping {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Same mapping with the input root canonicalized, so it matches the
    /// absolute paths the scanner reports.
    pub fn canonicalized(&self) -> std::io::Result<Self> {
        Ok(Self {
            input_root: fs::canonicalize(&self.input_root)?,
            output_root: self.output_root.clone(),
        })
    }

    /// Fail when the output tree would be scanned as part of the input tree.
    /// The output root need not exist yet.
    pub fn check_disjoint(&self) -> Result<(), Error> {
        let input = fs::canonicalize(&self.input_root)?;
        let output = resolve(&self.output_root)?;
        if output.starts_with(&input) {
            return Err(PathError::OutputInsideInput { output, input }.into());
        }
        Ok(())
    }

    fn relative<'a>(&self, path: &'a Path) -> Result<&'a Path, PathError> {
        path.strip_prefix(&self.input_root)
            .map_err(|_| PathError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.input_root.clone(),
            })
    }

    /// Destination directory mirroring a source directory.
    pub fn mirror_dir(&self, dir: &Path) -> Result<PathBuf, PathError> {
        Ok(self.output_root.join(self.relative(dir)?))
    }

    /// Artifact location for a source file: same relative path, suffix appended.
    pub fn artifact_path(&self, source: &Path) -> Result<PathBuf, PathError> {
        let mut target = self.output_root.join(self.relative(source)?).into_os_string();
        target.push(".");
        target.push(ARTIFACT_EXTENSION);
        Ok(PathBuf::from(target))
    }

    /// Plaintext location for an artifact found under the input root
    /// (decrypt-only passes run with the artifact tree as input).
    pub fn plaintext_path(&self, artifact: &Path) -> Result<PathBuf, PathError> {
        if artifact.extension().map_or(true, |ext| ext != ARTIFACT_EXTENSION) {
            return Err(PathError::NotAnArtifact(artifact.to_path_buf()));
        }
        let relative = self.relative(artifact)?.with_extension("");
        Ok(self.output_root.join(relative))
    }
}

/// Absolute form of `path` with symlinks resolved as far as it exists on disk.
fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(e),
            },
        }
    }
}

/// Create `dir` (and parents) unless it already exists.
pub fn ensure_dir(dir: &Path) -> Result<bool, Error> {
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir).map_err(|source| Error::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })?;
    info!("Created {}", dir.display());
    Ok(true)
}
