//! Error types for the megafs library.

use thiserror::Error;

/// Main error type for megafs operations.
#[derive(Error, Debug)]
pub enum MegaError {
    /// Transport-level failure with the transport's own code.
    ///
    /// Codes `busy` and `no_response` are retried by the transaction
    /// engine; anything else surfaces here verbatim.
    #[error("Transport error ({code}): {message}")]
    Transport { code: String, message: String },

    /// The service returned a negative result code.
    #[error("API error {name}: {message}")]
    Api {
        code: i32,
        name: &'static str,
        message: &'static str,
    },

    /// The service returned nothing usable for a request slot.
    #[error("Empty response from server")]
    EmptyResponse,

    /// Response shape did not match the request.
    #[error("Invalid response from server")]
    InvalidResponse,

    /// The temporary session id failed its self-authentication check.
    #[error("Invalid temporary session id")]
    InvalidTsid,

    /// The challenge session id could not be decrypted with the private key.
    #[error("Session id decryption failed")]
    SidDecryptFailed,

    /// Login material decrypted to garbage; the password is wrong.
    #[error("Bad password")]
    BadPassword,

    /// A pending batch was cancelled before a response arrived.
    #[error("Request aborted")]
    Aborted,

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Local file I/O error (session persistence).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

/// Result type alias for megafs operations.
pub type Result<T> = std::result::Result<T, MegaError>;
