//! Cryptographic operations for the storage protocol.

use sha2::{Digest, Sha256};

pub mod aes;
pub mod attrs;
pub mod auth;
pub mod buffer;
pub mod keys;
pub mod random;
pub mod rsa;

/// SHA-256 digest of a buffer.
pub fn sha256_digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

pub use aes::*;
pub use attrs::*;
pub use auth::*;
pub use buffer::*;
pub use keys::*;
pub use random::*;
pub use rsa::*;
