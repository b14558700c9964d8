//! Session-proof blobs.
//!
//! A temporary session id (TSID) is self-authenticating: the server
//! echoes back a blob whose last 16 bytes are the AES encryption of its
//! first 16 bytes under the account's master key. Only a client holding
//! the master key can verify it.

use super::aes::aes128_ecb_encrypt_block;
use super::buffer::join_buf;
use super::random::make_random_key;
use crate::base64::base64url_decode;

/// Verify a temporary session id against the master key.
///
/// Decodes the blob, requires at least 32 bytes, and accepts iff the
/// last 16 bytes equal `AES(MK, first 16 bytes)`.
pub fn check_tsid(tsid_b64: &str, mk: &[u8; 16]) -> bool {
    let Ok(data) = base64url_decode(tsid_b64) else {
        return false;
    };
    if data.len() < 32 {
        return false;
    }

    let mut ts1 = [0u8; 16];
    ts1.copy_from_slice(&data[..16]);
    let ts2a = &data[data.len() - 16..];

    aes128_ecb_encrypt_block(&ts1, mk)[..] == *ts2a
}

/// Build a fresh `ts` blob: 16 random bytes followed by their encryption
/// under the master key. Sent at account creation so the server can hand
/// back verifiable TSIDs.
pub fn make_ts_blob(mk: &[u8; 16]) -> Vec<u8> {
    let ts1 = make_random_key();
    let ts2 = aes128_ecb_encrypt_block(&ts1, mk);
    join_buf(&[&ts1, &ts2])
}
