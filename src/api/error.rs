//! Service error taxonomy.
//!
//! Every negative integer in a response maps to a symbolic name and a
//! canonical human message. Unmapped integers surface as `EUNKNOWN`.

use crate::error::MegaError;

/// Result codes returned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Internal error
    Internal,
    /// Invalid argument
    Args,
    /// Request failed, retry requested
    Again,
    /// Rate limit exceeded
    RateLimit,
    /// Failed permanently
    Failed,
    /// Too many concurrent connections or transfers
    TooMany,
    /// Out of range
    Range,
    /// Expired
    Expired,
    /// Not found
    NotFound,
    /// Circular linkage
    Circular,
    /// Access denied
    Access,
    /// Already exists
    Exists,
    /// Incomplete request
    Incomplete,
    /// Invalid key or integrity check failure
    Key,
    /// Bad session id
    Sid,
    /// Blocked
    Blocked,
    /// Over quota
    OverQuota,
    /// Temporarily unavailable
    TempUnavail,
    /// Connection overflow
    TooManyConnections,
    /// Write error
    Write,
    /// Read error
    Read,
    /// Invalid application key
    AppKey,
    /// Anything the taxonomy does not cover
    Unknown,
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -1 => ErrorCode::Internal,
            -2 => ErrorCode::Args,
            -3 => ErrorCode::Again,
            -4 => ErrorCode::RateLimit,
            -5 => ErrorCode::Failed,
            -6 => ErrorCode::TooMany,
            -7 => ErrorCode::Range,
            -8 => ErrorCode::Expired,
            -9 => ErrorCode::NotFound,
            -10 => ErrorCode::Circular,
            -11 => ErrorCode::Access,
            -12 => ErrorCode::Exists,
            -13 => ErrorCode::Incomplete,
            -14 => ErrorCode::Key,
            -15 => ErrorCode::Sid,
            -16 => ErrorCode::Blocked,
            -17 => ErrorCode::OverQuota,
            -18 => ErrorCode::TempUnavail,
            -19 => ErrorCode::TooManyConnections,
            -20 => ErrorCode::Write,
            -21 => ErrorCode::Read,
            -22 => ErrorCode::AppKey,
            _ => ErrorCode::Unknown,
        }
    }
}

impl ErrorCode {
    /// Symbolic wire name.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "EINTERNAL",
            ErrorCode::Args => "EARGS",
            ErrorCode::Again => "EAGAIN",
            ErrorCode::RateLimit => "ERATELIMIT",
            ErrorCode::Failed => "EFAILED",
            ErrorCode::TooMany => "ETOOMANY",
            ErrorCode::Range => "ERANGE",
            ErrorCode::Expired => "EEXPIRED",
            ErrorCode::NotFound => "ENOENT",
            ErrorCode::Circular => "ECIRCULAR",
            ErrorCode::Access => "EACCESS",
            ErrorCode::Exists => "EEXIST",
            ErrorCode::Incomplete => "EINCOMPLETE",
            ErrorCode::Key => "EKEY",
            ErrorCode::Sid => "ESID",
            ErrorCode::Blocked => "EBLOCKED",
            ErrorCode::OverQuota => "EOVERQUOTA",
            ErrorCode::TempUnavail => "ETEMPUNAVAIL",
            ErrorCode::TooManyConnections => "ETOOMANYCONNECTIONS",
            ErrorCode::Write => "EWRITE",
            ErrorCode::Read => "EREAD",
            ErrorCode::AppKey => "EAPPKEY",
            ErrorCode::Unknown => "EUNKNOWN",
        }
    }

    /// Canonical human-readable message.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Internal => "Internal error",
            ErrorCode::Args => "Invalid argument",
            ErrorCode::Again => "Request failed, retrying",
            ErrorCode::RateLimit => "Rate limit exceeded",
            ErrorCode::Failed => "Failed permanently",
            ErrorCode::TooMany => "Too many concurrent connections or transfers",
            ErrorCode::Range => "Out of range",
            ErrorCode::Expired => "Expired",
            ErrorCode::NotFound => "Not found",
            ErrorCode::Circular => "Circular linkage detected",
            ErrorCode::Access => "Access denied",
            ErrorCode::Exists => "Already exists",
            ErrorCode::Incomplete => "Incomplete",
            ErrorCode::Key => "Invalid key/integrity check failed",
            ErrorCode::Sid => "Bad session ID",
            ErrorCode::Blocked => "Blocked",
            ErrorCode::OverQuota => "Over quota",
            ErrorCode::TempUnavail => "Temporarily not available",
            ErrorCode::TooManyConnections => "Connection overflow",
            ErrorCode::Write => "Write error",
            ErrorCode::Read => "Read error",
            ErrorCode::AppKey => "Invalid application key",
            ErrorCode::Unknown => "Unknown error",
        }
    }
}

/// Build the crate-level error for a raw service result code.
pub fn api_error(code: i64) -> MegaError {
    let ec = ErrorCode::from(code);
    MegaError::Api {
        code: code as i32,
        name: ec.name(),
        message: ec.message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mapping() {
        let table: [(i64, &str, &str); 22] = [
            (-1, "EINTERNAL", "Internal error"),
            (-2, "EARGS", "Invalid argument"),
            (-3, "EAGAIN", "Request failed, retrying"),
            (-4, "ERATELIMIT", "Rate limit exceeded"),
            (-5, "EFAILED", "Failed permanently"),
            (-6, "ETOOMANY", "Too many concurrent connections or transfers"),
            (-7, "ERANGE", "Out of range"),
            (-8, "EEXPIRED", "Expired"),
            (-9, "ENOENT", "Not found"),
            (-10, "ECIRCULAR", "Circular linkage detected"),
            (-11, "EACCESS", "Access denied"),
            (-12, "EEXIST", "Already exists"),
            (-13, "EINCOMPLETE", "Incomplete"),
            (-14, "EKEY", "Invalid key/integrity check failed"),
            (-15, "ESID", "Bad session ID"),
            (-16, "EBLOCKED", "Blocked"),
            (-17, "EOVERQUOTA", "Over quota"),
            (-18, "ETEMPUNAVAIL", "Temporarily not available"),
            (-19, "ETOOMANYCONNECTIONS", "Connection overflow"),
            (-20, "EWRITE", "Write error"),
            (-21, "EREAD", "Read error"),
            (-22, "EAPPKEY", "Invalid application key"),
        ];

        for (code, name, message) in table {
            let ec = ErrorCode::from(code);
            assert_eq!(ec.name(), name, "code {code}");
            assert_eq!(ec.message(), message, "code {code}");
        }
    }

    #[test]
    fn unmapped_codes_are_unknown() {
        assert_eq!(ErrorCode::from(-23), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from(-999), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from(0), ErrorCode::Unknown);
        assert_eq!(ErrorCode::from(7), ErrorCode::Unknown);
        assert_eq!(ErrorCode::Unknown.name(), "EUNKNOWN");
    }

    #[test]
    fn api_error_carries_original_code() {
        match api_error(-123) {
            MegaError::Api { code, name, .. } => {
                assert_eq!(code, -123);
                assert_eq!(name, "EUNKNOWN");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
