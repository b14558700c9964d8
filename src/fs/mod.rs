//! Filesystem node types and tree materialisation.

pub mod node;
pub mod tree;

pub use node::{Node, NodeType, NETWORK_HANDLE, TOP_HANDLE};
pub use tree::{FileSystem, TreeBuilder};
