//! URL-safe base64 dialect used on the wire.
//!
//! All binary material crosses the wire as base64 with `-` and `_`
//! instead of `+` and `/`, and without `=` padding. The same dialect is
//! reused for the on-disk blob filenames, which is why it must stay
//! filesystem-safe.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode bytes as URL-safe unpadded base64.
///
/// # Example
/// ```
/// use megafs::base64::base64url_encode;
/// let encoded = base64url_encode(b"hello");
/// assert!(!encoded.contains('='));
/// assert!(!encoded.contains('+'));
/// assert!(!encoded.contains('/'));
/// ```
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe base64 to bytes.
///
/// Standard-alphabet input and trailing padding are tolerated, since a
/// few server fields are emitted in the standard alphabet.
pub fn base64url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let normalized: String = s
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    URL_SAFE_NO_PAD.decode(normalized.as_bytes())
}
