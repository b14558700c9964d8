//! Key derivation and key wrapping.
//!
//! The password stretch and the login hash are the service's own
//! constructions, not standard KDFs. Do not reuse them elsewhere.

use super::aes::{aes128_ecb_decrypt, aes128_ecb_encrypt, aes128_ecb_encrypt_block};
use crate::base64::{base64url_decode, base64url_encode};
use crate::error::{MegaError, Result};

/// Pack a password into the byte layout the legacy KDF consumes: UTF-16
/// code units, BMP latin-1 units as single bytes, everything else as two
/// big-endian bytes, zero-padded to a 4-byte boundary.
fn pack_password(password: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(password.len() * 2);
    for cu in password.encode_utf16() {
        if cu <= 0x00FF {
            bytes.push(cu as u8);
        } else {
            bytes.extend_from_slice(&cu.to_be_bytes());
        }
    }
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
}

/// Derive the 16-byte password key (PK) from a password.
///
/// 65,536 rounds of AES over a fixed seed, keyed by the password in
/// 16-byte chunks. Deterministic: the same password yields the same key
/// on every platform.
pub fn make_password_key(password: &str) -> [u8; 16] {
    // Fixed seed used by every client of the service.
    let mut pkey: [u8; 16] = [
        0x93, 0xC4, 0x67, 0xE3, 0x7D, 0xB0, 0xC7, 0xA4, 0xD1, 0xBE, 0x3F, 0x81, 0x01, 0x52, 0xCB,
        0x56,
    ];

    let packed = pack_password(password);
    if packed.is_empty() {
        return pkey;
    }

    for _ in 0..65536 {
        for chunk in packed.chunks(16) {
            let mut round_key = [0u8; 16];
            round_key[..chunk.len()].copy_from_slice(chunk);
            pkey = aes128_ecb_encrypt_block(&pkey, &round_key);
        }
    }

    pkey
}

/// Compute the login hash for a username.
///
/// The lowercased email is XOR-folded into a 16-byte block, encrypted
/// 16,384 times under PK, and bytes [0..4] + [8..12] of the result are
/// returned URL-base64 encoded. Proves knowledge of the password without
/// sending it.
pub fn make_username_hash(email: &str, pk: &[u8; 16]) -> String {
    let mut hash = [0u8; 16];
    for (i, b) in email.to_lowercase().bytes().enumerate() {
        hash[i % 16] ^= b;
    }

    for _ in 0..16384 {
        hash = aes128_ecb_encrypt_block(&hash, pk);
    }

    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&hash[..4]);
    out[4..].copy_from_slice(&hash[8..12]);
    base64url_encode(&out)
}

/// Wrap a 16-byte key under another key (AES-ECB). This is how the
/// master key travels: EMK = wrap(PK, MK).
pub fn encrypt_key(key: &[u8; 16], wrapping_key: &[u8; 16]) -> Vec<u8> {
    aes128_ecb_encrypt(key, wrapping_key)
}

/// Unwrap a base64-encoded 16-byte key.
pub fn decrypt_key(b64: &str, wrapping_key: &[u8; 16]) -> Result<[u8; 16]> {
    let data = base64url_decode(b64)?;
    if data.len() != 16 {
        return Err(MegaError::Crypto(format!(
            "wrapped key must be 16 bytes, got {}",
            data.len()
        )));
    }

    let decrypted = aes128_ecb_decrypt(&data, wrapping_key);
    let mut key = [0u8; 16];
    key.copy_from_slice(&decrypted);
    Ok(key)
}

/// Fold a 32-byte packed file key down to the 16-byte AES key used for
/// attribute decryption, by XORing the two halves.
pub fn unpack_file_key(key_full: &[u8; 32]) -> [u8; 16] {
    let mut key = [0u8; 16];
    for i in 0..16 {
        key[i] = key_full[i] ^ key_full[i + 16];
    }
    key
}
