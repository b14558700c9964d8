//! Encrypted node-attribute codec.
//!
//! Node attributes travel as `base64(CBC0(node_key, "MEGA" || json))`,
//! zero-padded to the block size. The `MEGA{` prefix doubles as the
//! integrity check: a wrong key produces garbage that fails the prefix
//! comparison.

use serde_json::{Map, Value};

use super::aes::{aes128_cbc_decrypt, aes128_cbc_encrypt};
use super::buffer::align_buf;
use crate::base64::{base64url_decode, base64url_encode};

const ATTR_MAGIC: &[u8] = b"MEGA";

/// Encrypt an attribute map under a node key.
pub fn make_node_attrs(key: &[u8; 16], attrs: &Map<String, Value>) -> String {
    let mut plain = ATTR_MAGIC.to_vec();
    plain.extend_from_slice(Value::Object(attrs.clone()).to_string().as_bytes());
    let padded = align_buf(&plain, 16, false);
    base64url_encode(&aes128_cbc_encrypt(&padded, key))
}

/// Decrypt an attribute blob.
///
/// Returns `None` on any failure: bad base64, misaligned ciphertext,
/// missing `MEGA{` prefix, or a JSON tail that does not parse. Trailing
/// zero padding after the JSON object is tolerated.
pub fn decrypt_node_attrs(key: &[u8; 16], blob_b64: &str) -> Option<Map<String, Value>> {
    let data = base64url_decode(blob_b64).ok()?;
    if data.is_empty() || data.len() % 16 != 0 {
        return None;
    }

    let plain = aes128_cbc_decrypt(&data, key);
    // Byte-prefix comparison, not a string conversion: the tail may not
    // be valid UTF-8 when the key is wrong.
    if !plain.starts_with(b"MEGA{") {
        return None;
    }

    let tail = &plain[ATTR_MAGIC.len()..];
    let end = tail.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let json = std::str::from_utf8(&tail[..end]).ok()?;
    match serde_json::from_str::<Value>(json).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_attrs() -> Map<String, Value> {
        let mut attrs = Map::new();
        attrs.insert("n".to_string(), json!("hello.txt"));
        attrs.insert("label".to_string(), json!(3));
        attrs
    }

    #[test]
    fn roundtrip() {
        let key = [0x21u8; 16];
        let attrs = sample_attrs();
        let blob = make_node_attrs(&key, &attrs);
        assert_eq!(decrypt_node_attrs(&key, &blob), Some(attrs));
    }

    #[test]
    fn wrong_key_is_none() {
        let blob = make_node_attrs(&[1u8; 16], &sample_attrs());
        assert_eq!(decrypt_node_attrs(&[2u8; 16], &blob), None);
    }

    #[test]
    fn corrupt_ciphertext_is_none() {
        let key = [4u8; 16];
        let blob = make_node_attrs(&key, &sample_attrs());
        let mut data = base64url_decode(&blob).unwrap();
        data[0] ^= 0xFF;
        assert_eq!(decrypt_node_attrs(&key, &base64url_encode(&data)), None);
    }

    #[test]
    fn bad_magic_is_none() {
        let key = [4u8; 16];
        let plain = align_buf(b"NOPE{\"n\":\"x\"}", 16, false);
        let blob = base64url_encode(&aes128_cbc_encrypt(&plain, &key));
        assert_eq!(decrypt_node_attrs(&key, &blob), None);
    }

    #[test]
    fn magic_without_object_is_none() {
        // "MEGA" followed by a bare array parses as JSON but lacks the
        // `MEGA{` prefix.
        let key = [4u8; 16];
        let plain = align_buf(b"MEGA[1,2]", 16, false);
        let blob = base64url_encode(&aes128_cbc_encrypt(&plain, &key));
        assert_eq!(decrypt_node_attrs(&key, &blob), None);
    }

    #[test]
    fn tolerates_heavy_zero_padding() {
        let key = [8u8; 16];
        let mut plain = b"MEGA{\"n\":\"a\"}".to_vec();
        plain.resize(64, 0);
        let blob = base64url_encode(&aes128_cbc_encrypt(&plain, &key));
        let attrs = decrypt_node_attrs(&key, &blob).unwrap();
        assert_eq!(attrs.get("n"), Some(&json!("a")));
    }

    #[test]
    fn garbage_input_is_none() {
        assert_eq!(decrypt_node_attrs(&[0u8; 16], "@@@"), None);
        assert_eq!(decrypt_node_attrs(&[0u8; 16], ""), None);
        let misaligned = base64url_encode(&[1u8; 20]);
        assert_eq!(decrypt_node_attrs(&[0u8; 16], &misaligned), None);
    }
}
