//! Encrypted on-disk session persistence.
//!
//! A session keeps two blobs in the temporary directory, one for the
//! credentials record and one for the filesystem snapshot. The filename
//! and the CTR nonce both derive from `SHA256(username||password||name)`,
//! so the files are unlinkable without the credentials. The payload is
//! prefixed with its own digest; a blob that fails the digest check is
//! treated as absent.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::client::SidParam;
use crate::base64::base64url_encode;
use crate::crypto::aes::{aes128_cbc_encrypt, aes128_ctr};
use crate::crypto::sha256_digest;
use crate::error::Result;

/// Length of the filename stem cut from the encrypted digest.
const STEM_LEN: usize = 30;

/// On-disk session blob store.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store blobs in the system temporary directory.
    pub fn new() -> Self {
        Self {
            dir: std::env::temp_dir(),
        }
    }

    /// Store blobs in a specific directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive the blob path and the CTR nonce for a credential tuple.
    fn derive(
        &self,
        pk: &[u8; 16],
        username: &str,
        password: &str,
        name: &str,
    ) -> (PathBuf, [u8; 8]) {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(password.as_bytes());
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        let mut stem = base64url_encode(&aes128_cbc_encrypt(&digest, pk));
        stem.truncate(STEM_LEN);

        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&digest[..8]);

        (self.dir.join(stem), nonce)
    }

    /// Encrypt and write a blob, replacing any previous one atomically.
    pub fn save(
        &self,
        pk: &[u8; 16],
        username: &str,
        password: &str,
        name: &str,
        payload: &[u8],
    ) -> Result<()> {
        let (path, nonce) = self.derive(pk, username, password, name);

        let mut plain = sha256_digest(payload).to_vec();
        plain.extend_from_slice(payload);
        let cipher = aes128_ctr(&plain, pk, &nonce, 0);

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &cipher)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read and decrypt a blob.
    ///
    /// Absence, truncation, or a digest mismatch all yield `None`.
    pub fn load(
        &self,
        pk: &[u8; 16],
        username: &str,
        password: &str,
        name: &str,
    ) -> Option<Vec<u8>> {
        let (path, nonce) = self.derive(pk, username, password, name);
        let cipher = fs::read(&path).ok()?;

        let plain = aes128_ctr(&cipher, pk, &nonce, 0);
        if plain.len() < 32 {
            tracing::debug!(path = %path.display(), "session blob too short, ignoring");
            return None;
        }

        let (digest, payload) = plain.split_at(32);
        if sha256_digest(payload)[..] != *digest {
            tracing::warn!(path = %path.display(), "session blob failed integrity check, ignoring");
            return None;
        }

        Some(payload.to_vec())
    }

    /// Delete a blob if present.
    pub fn remove(&self, pk: &[u8; 16], username: &str, password: &str, name: &str) {
        let (path, _) = self.derive(pk, username, password, name);
        let _ = fs::remove_file(path);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The persisted session record.
///
/// Serialised as JSON before the blob envelope is applied. `privk` is
/// the raw (unwrapped) private key material; the envelope is the only
/// protection layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// User handle (empty for exported-folder sessions)
    pub uh: String,
    /// Account email; absent for ephemeral accounts
    pub email: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Master key, base64
    pub mk: String,
    /// Password key, base64; checked against the credentials on load
    pub pk: String,
    /// Public key in wire form
    pub pubk: Option<String>,
    /// Unwrapped private key material, base64
    pub privk: Option<String>,
    /// Session id
    pub sid: String,
    /// Which query parameter carries the sid
    pub sid_param: SidParam,
    /// Epoch milliseconds of the last rewrite
    pub saved: u64,
}
