//! API transaction engine.

pub mod client;
pub mod error;

pub use client::{ApiClient, RetryPolicy, SidParam};
pub use error::ErrorCode;
