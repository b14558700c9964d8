//! # megafs
//!
//! Client library for a MEGA-style encrypted cloud-storage service.
//!
//! The library authenticates a user, manages the password/master/RSA key
//! hierarchy, exchanges JSON batches with the service, persists resumable
//! session state to disk in encrypted form, and materialises the server's
//! opaque node catalogue into a navigable path tree with per-node keys
//! and attributes unwrapped.
//!
//! ## Example: open a session and walk the tree
//!
//! ```no_run
//! use megafs::Session;
//!
//! # async fn example() -> megafs::Result<()> {
//! let mut session = Session::new("user@example.com", "password");
//! session.open(false).await?;
//! session.load_filesystem().await?;
//!
//! if let Some(fs) = session.filesystem() {
//!     for child in fs.children_of(&fs.node_by_path("Root").unwrap().handle) {
//!         println!("{} ({} bytes)", child.path, child.size);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod base64;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod http;
pub mod session;

// Re-export commonly used types
pub use api::{ApiClient, ErrorCode, RetryPolicy, SidParam};
pub use error::{MegaError, Result};
pub use fs::{FileSystem, Node, NodeType};
pub use http::{HttpClient, Transport, TransportError};
pub use session::{Session, SessionRecord, SessionStore};
