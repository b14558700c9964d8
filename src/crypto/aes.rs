//! AES-128 block modes used by the protocol.
//!
//! Key wrapping uses single-block ECB, attribute blobs use CBC with a
//! zero IV, and the session blob envelope uses CTR with an 8-byte nonce.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

/// AES-128-ECB encrypt a single 16-byte block.
pub fn aes128_ecb_encrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.encrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB decrypt a single 16-byte block.
pub fn aes128_ecb_decrypt_block(data: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut block = GenericArray::clone_from_slice(data);
    cipher.decrypt_block(&mut block);
    block.into()
}

/// AES-128-ECB encrypt multiple blocks.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "ECB input must be 16-byte aligned");

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(16) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    out
}

/// AES-128-ECB decrypt multiple blocks.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "ECB input must be 16-byte aligned");

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(16) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    out
}

/// AES-128-CBC encrypt with an all-zero IV.
///
/// The service only ever uses CBC for attribute blobs and blob-name
/// derivation, always with a zero IV.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_cbc_encrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "CBC input must be 16-byte aligned");

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    let mut prev = [0u8; 16];
    for chunk in out.chunks_exact_mut(16) {
        for (b, p) in chunk.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        prev.copy_from_slice(chunk);
    }
    out
}

/// AES-128-CBC decrypt with an all-zero IV.
///
/// # Panics
/// Panics if data length is not a multiple of 16.
pub fn aes128_cbc_decrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    assert!(data.len() % 16 == 0, "CBC input must be 16-byte aligned");

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    let mut prev = [0u8; 16];
    for chunk in out.chunks_exact_mut(16) {
        let mut ct = [0u8; 16];
        ct.copy_from_slice(chunk);
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        for (b, p) in chunk.iter_mut().zip(prev.iter()) {
            *b ^= p;
        }
        prev = ct;
    }
    out
}

/// AES-128-CTR transform over `nonce || counter_be64` blocks.
///
/// Works on any input length; encryption and decryption are the same
/// operation. `counter` is the value of the first block's counter half.
pub fn aes128_ctr(data: &[u8], key: &[u8; 16], nonce: &[u8; 8], counter: u64) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    let mut ctr = counter;

    for chunk in out.chunks_mut(16) {
        let mut block = [0u8; 16];
        block[..8].copy_from_slice(nonce);
        block[8..].copy_from_slice(&ctr.to_be_bytes());
        cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));

        for (b, k) in chunk.iter_mut().zip(block.iter()) {
            *b ^= k;
        }
        ctr = ctr.wrapping_add(1);
    }
    out
}
