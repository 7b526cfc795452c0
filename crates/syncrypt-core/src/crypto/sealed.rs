use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::{CryptoError, CryptoErrorKind, CryptoGateway};

const PUBLIC_MAGIC: &[u8; 8] = b"SYNCPUB1";
const SECRET_MAGIC: &[u8; 8] = b"SYNCSEC1";
const ARTIFACT_MAGIC: &[u8; 8] = b"SYNCRYPT";
const FORMAT_VERSION: u8 = 1;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;
const SALT_LEN: usize = 16;
const TAG_LEN: usize = 16;

const PUBLIC_FILE_LEN: usize = PUBLIC_MAGIC.len() + KEY_LEN;
const SECRET_FILE_LEN: usize = SECRET_MAGIC.len() + SALT_LEN + NONCE_LEN + KEY_LEN + TAG_LEN;
const ARTIFACT_HEADER_LEN: usize = ARTIFACT_MAGIC.len() + 1 + KEY_LEN + NONCE_LEN;

const PAYLOAD_INFO: &[u8] = b"syncrypt artifact v1";

/// Sealed-box gateway: each artifact is encrypted with XChaCha20-Poly1305
/// under a key agreed between a fresh X25519 ephemeral key and the
/// recipient's public key. The private key file is sealed under an
/// Argon2id-derived passphrase key.
///
/// Artifact layout:
///
/// ```text
/// "SYNCRYPT" | version (1) | ephemeral public key (32) | nonce (24) | ciphertext + tag
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct SealedBoxGateway;

impl SealedBoxGateway {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoGateway for SealedBoxGateway {
    fn encrypt(&self, source: &Path, dest: &Path, public_key: &Path) -> Result<(), CryptoError> {
        let recipient = read_public_key(public_key)?;
        let plaintext = Zeroizing::new(
            fs::read(source).map_err(|e| CryptoError::new(CryptoErrorKind::Io, source, e))?,
        );

        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&recipient);
        let key = derive_payload_key(shared.as_bytes(), &ephemeral_public, &recipient, dest)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = XChaCha20Poly1305::new(Key::from_slice(&key[..]))
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CryptoError::new(CryptoErrorKind::Corrupt, source, "encryption failed"))?;

        let mut artifact = Vec::with_capacity(ARTIFACT_HEADER_LEN + ciphertext.len());
        artifact.extend_from_slice(ARTIFACT_MAGIC);
        artifact.push(FORMAT_VERSION);
        artifact.extend_from_slice(ephemeral_public.as_bytes());
        artifact.extend_from_slice(&nonce);
        artifact.extend_from_slice(&ciphertext);

        write_atomic(dest, &artifact, false)?;
        debug!("Sealed {} -> {}", source.display(), dest.display());
        Ok(())
    }

    fn decrypt(
        &self,
        source: &Path,
        dest: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError> {
        let artifact =
            fs::read(source).map_err(|e| CryptoError::new(CryptoErrorKind::Io, source, e))?;
        if artifact.len() < ARTIFACT_HEADER_LEN + TAG_LEN
            || &artifact[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC
        {
            return Err(CryptoError::new(
                CryptoErrorKind::Corrupt,
                source,
                "not a syncrypt artifact",
            ));
        }
        let version = artifact[ARTIFACT_MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(CryptoError::new(
                CryptoErrorKind::Corrupt,
                source,
                format!("unsupported artifact version {version}"),
            ));
        }

        let mut offset = ARTIFACT_MAGIC.len() + 1;
        let ephemeral_public = PublicKey::from(read_array::<KEY_LEN>(&artifact[offset..]));
        offset += KEY_LEN;
        let nonce = &artifact[offset..offset + NONCE_LEN];
        offset += NONCE_LEN;
        let ciphertext = &artifact[offset..];

        let secret = unlock_secret_key(private_key, passphrase)?;
        let recipient = PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&ephemeral_public);
        let key = derive_payload_key(shared.as_bytes(), &ephemeral_public, &recipient, source)?;

        let plaintext = Zeroizing::new(
            XChaCha20Poly1305::new(Key::from_slice(&key[..]))
                .decrypt(XNonce::from_slice(nonce), ciphertext)
                .map_err(|_| {
                    CryptoError::new(
                        CryptoErrorKind::Corrupt,
                        source,
                        "authentication failed (artifact damaged or sealed for another key)",
                    )
                })?,
        );

        write_atomic(dest, &plaintext, false)?;
        debug!("Opened {} -> {}", source.display(), dest.display());
        Ok(())
    }

    fn generate_keypair(
        &self,
        public_key: &Path,
        private_key: &Path,
        passphrase: &str,
    ) -> Result<(), CryptoError> {
        for path in [public_key, private_key] {
            if path.exists() {
                return Err(CryptoError::new(
                    CryptoErrorKind::KeysExist,
                    path,
                    "key file already present, will not overwrite",
                ));
            }
        }

        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let kek = derive_passphrase_key(passphrase, &salt, private_key)?;
        let sealed = XChaCha20Poly1305::new(Key::from_slice(&kek[..]))
            .encrypt(XNonce::from_slice(&nonce), secret.as_bytes().as_slice())
            .map_err(|_| {
                CryptoError::new(CryptoErrorKind::KeyMaterial, private_key, "sealing failed")
            })?;

        let mut secret_file = Vec::with_capacity(SECRET_FILE_LEN);
        secret_file.extend_from_slice(SECRET_MAGIC);
        secret_file.extend_from_slice(&salt);
        secret_file.extend_from_slice(&nonce);
        secret_file.extend_from_slice(&sealed);

        let mut public_file = Vec::with_capacity(PUBLIC_FILE_LEN);
        public_file.extend_from_slice(PUBLIC_MAGIC);
        public_file.extend_from_slice(public.as_bytes());

        write_atomic(private_key, &secret_file, true)?;
        write_atomic(public_key, &public_file, false)?;
        Ok(())
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn read_public_key(path: &Path) -> Result<PublicKey, CryptoError> {
    let bytes =
        fs::read(path).map_err(|e| CryptoError::new(CryptoErrorKind::KeyMaterial, path, e))?;
    if bytes.len() != PUBLIC_FILE_LEN || &bytes[..PUBLIC_MAGIC.len()] != PUBLIC_MAGIC {
        return Err(CryptoError::new(
            CryptoErrorKind::KeyMaterial,
            path,
            "not a syncrypt public key",
        ));
    }
    Ok(PublicKey::from(read_array::<KEY_LEN>(&bytes[PUBLIC_MAGIC.len()..])))
}

fn unlock_secret_key(path: &Path, passphrase: &str) -> Result<StaticSecret, CryptoError> {
    let bytes =
        fs::read(path).map_err(|e| CryptoError::new(CryptoErrorKind::KeyMaterial, path, e))?;
    if bytes.len() != SECRET_FILE_LEN || &bytes[..SECRET_MAGIC.len()] != SECRET_MAGIC {
        return Err(CryptoError::new(
            CryptoErrorKind::KeyMaterial,
            path,
            "not a syncrypt private key",
        ));
    }

    let salt_start = SECRET_MAGIC.len();
    let nonce_start = salt_start + SALT_LEN;
    let sealed_start = nonce_start + NONCE_LEN;

    let kek = derive_passphrase_key(passphrase, &bytes[salt_start..nonce_start], path)?;
    let opened = Zeroizing::new(
        XChaCha20Poly1305::new(Key::from_slice(&kek[..]))
            .decrypt(
                XNonce::from_slice(&bytes[nonce_start..sealed_start]),
                &bytes[sealed_start..],
            )
            .map_err(|_| {
                CryptoError::new(
                    CryptoErrorKind::Passphrase,
                    path,
                    "cannot unlock private key (did you provide the passphrase?)",
                )
            })?,
    );

    let mut secret = Zeroizing::new([0u8; KEY_LEN]);
    secret.copy_from_slice(&opened);
    Ok(StaticSecret::from(*secret))
}

fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8],
    path: &Path,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::new(CryptoErrorKind::KeyMaterial, path, e))?;
    Ok(key)
}

fn derive_payload_key(
    shared: &[u8; KEY_LEN],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
    path: &Path,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut salt = [0u8; KEY_LEN * 2];
    salt[..KEY_LEN].copy_from_slice(ephemeral.as_bytes());
    salt[KEY_LEN..].copy_from_slice(recipient.as_bytes());

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    Hkdf::<Sha256>::new(Some(&salt[..]), &shared[..])
        .expand(PAYLOAD_INFO, &mut key[..])
        .map_err(|e| CryptoError::new(CryptoErrorKind::KeyMaterial, path, e))?;
    Ok(key)
}

/// Write through a sibling temp file so `dest` is never left half written.
fn write_atomic(dest: &Path, data: &[u8], private: bool) -> Result<(), CryptoError> {
    let io_err = |e: std::io::Error| CryptoError::new(CryptoErrorKind::Io, dest, e);
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600)).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = private;

    tmp.persist(dest).map_err(|e| io_err(e.error))?;
    Ok(())
}
