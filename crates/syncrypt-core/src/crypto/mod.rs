//! Encryption gateway.
//!
//! The sync engine never looks inside an artifact. It hands paths to a
//! [`CryptoGateway`] and acts on success or on the [`CryptoErrorKind`] it
//! gets back: during mirroring any failure skips the file, during deletion
//! verification any failure aborts the pass.

mod sealed;

use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use sealed::SealedBoxGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// Reading the source or writing the destination failed.
    Io,
    /// A key file is missing, unreadable or not a syncrypt key.
    KeyMaterial,
    /// The private key could not be unlocked with the given passphrase.
    Passphrase,
    /// The artifact has a bad header or failed authentication.
    Corrupt,
    /// Key generation found key files already in place.
    KeysExist,
}

impl CryptoErrorKind {
    /// Failures that say the configured key material cannot be trusted.
    pub fn is_key_failure(self) -> bool {
        matches!(self, Self::KeyMaterial | Self::Passphrase)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::KeyMaterial => "key material",
            Self::Passphrase => "passphrase",
            Self::Corrupt => "corrupt artifact",
            Self::KeysExist => "keys exist",
        }
    }
}

impl fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("{kind} error for {}: {message}", path.display())]
pub struct CryptoError {
    pub kind: CryptoErrorKind,
    pub path: PathBuf,
    pub message: String,
}

impl CryptoError {
    pub fn new(kind: CryptoErrorKind, path: &Path, message: impl fmt::Display) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Key file locations and the passphrase that unlocks the private key.
#[derive(Clone)]
pub struct KeyRing {
    pub public_key: PathBuf,
    pub private_key: PathBuf,
    pub passphrase: String,
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("public_key", &self.public_key)
            .field("private_key", &self.private_key)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

pub trait CryptoGateway {
    /// Encrypt `source` for the holder of `public_key`, writing the artifact to `dest`.
    fn encrypt(&self, source: &Path, dest: &Path, public_key: &Path) -> Result<(), CryptoError>;

    /// Decrypt the artifact at `source` into `dest`.
    fn decrypt(
        &self,
        source: &Path,
        dest: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError>;

    /// Write a fresh key pair. Never overwrites existing key files.
    fn generate_keypair(
        &self,
        public_key: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError>;
}
