//! Filesystem node types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handle of the synthetic root-of-roots node.
pub const TOP_HANDLE: &str = "*TOP*";

/// Handle of the synthetic contacts container.
pub const NETWORK_HANDLE: &str = "*NETWORK";

/// Node type enumeration matching the service's integer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// Regular file (0)
    File,
    /// Folder (1)
    Folder,
    /// Cloud drive root (2)
    Root,
    /// Inbox (3)
    Inbox,
    /// Rubbish bin (4)
    Rubbish,
    /// Contact pseudo-node (8)
    Contact,
    /// Contacts container (9)
    Network,
    /// Synthetic root of roots; never sent by the server
    Top,
}

impl NodeType {
    /// Map a server-side type integer. Unknown values yield `None`.
    pub fn from_i64(t: i64) -> Option<Self> {
        match t {
            0 => Some(NodeType::File),
            1 => Some(NodeType::Folder),
            2 => Some(NodeType::Root),
            3 => Some(NodeType::Inbox),
            4 => Some(NodeType::Rubbish),
            8 => Some(NodeType::Contact),
            9 => Some(NodeType::Network),
            _ => None,
        }
    }

    /// Whether nodes of this type can have children.
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeType::File | NodeType::Contact)
    }

    /// Fixed display label for root-class nodes.
    pub fn fixed_name(&self) -> Option<&'static str> {
        match self {
            NodeType::Root => Some("Root"),
            NodeType::Inbox => Some("Inbox"),
            NodeType::Rubbish => Some("Rubbish"),
            _ => None,
        }
    }
}

/// A node of the materialised tree, with its key and attributes
/// unwrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Opaque server handle
    pub handle: String,
    /// Parent handle; defaults to the synthetic top for parentless real
    /// nodes, `None` only for the top itself and an exported-folder root
    pub parent_handle: Option<String>,
    /// Share-origin owner handle; may coexist with the parent
    pub su_handle: Option<String>,
    /// Owning user handle
    pub user: Option<String>,
    /// Node type
    pub node_type: NodeType,
    /// File size in bytes (0 for containers)
    pub size: u64,
    /// Modification time (epoch seconds)
    pub mtime: i64,
    /// Decrypted 16-byte node key (attribute key for files)
    pub key: Option<[u8; 16]>,
    /// Packed 32-byte key, file nodes only
    pub key_full: Option<[u8; 32]>,
    /// Decrypted attribute map
    pub attrs: Map<String, Value>,
    /// Display name, from attributes or the fixed root-class labels
    pub name: String,
    /// Full path, assigned during tree building
    pub path: String,
}

impl Node {
    pub(crate) fn synthetic_top() -> Self {
        Self {
            handle: TOP_HANDLE.to_string(),
            parent_handle: None,
            su_handle: None,
            user: None,
            node_type: NodeType::Top,
            size: 0,
            mtime: 0,
            key: None,
            key_full: None,
            attrs: Map::new(),
            name: TOP_HANDLE.to_string(),
            path: String::new(),
        }
    }

    pub(crate) fn synthetic_network() -> Self {
        Self {
            handle: NETWORK_HANDLE.to_string(),
            parent_handle: Some(TOP_HANDLE.to_string()),
            su_handle: None,
            user: None,
            node_type: NodeType::Network,
            size: 0,
            mtime: 0,
            key: None,
            key_full: None,
            attrs: Map::new(),
            name: NETWORK_HANDLE.to_string(),
            path: String::new(),
        }
    }

    pub(crate) fn contact(user_handle: &str, email: &str) -> Self {
        Self {
            handle: user_handle.to_string(),
            parent_handle: Some(NETWORK_HANDLE.to_string()),
            su_handle: None,
            user: Some(user_handle.to_string()),
            node_type: NodeType::Contact,
            size: 0,
            mtime: 0,
            key: None,
            key_full: None,
            attrs: Map::new(),
            name: email.to_string(),
            path: String::new(),
        }
    }

    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }

    pub fn is_folder(&self) -> bool {
        self.node_type.is_container()
    }

    pub fn is_contact(&self) -> bool {
        self.node_type == NodeType::Contact
    }
}
