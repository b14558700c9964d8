//! Filesystem materialisation.
//!
//! Ingests one `f` response: authenticates and installs share keys,
//! unwraps per-node keys, decrypts attributes, and lays the nodes out as
//! a path tree rooted at the synthetic top node. Nodes that fail key or
//! attribute checks are dropped, never fatal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::base64::base64url_decode;
use crate::crypto::aes::{aes128_ecb_decrypt, aes128_ecb_encrypt_block};
use crate::crypto::attrs::decrypt_node_attrs;
use crate::crypto::keys::unpack_file_key;
use crate::crypto::rsa::MegaRsaKey;
use crate::fs::node::{Node, NodeType, TOP_HANDLE};

/// Materialised filesystem snapshot.
///
/// `nodes` maps handle -> node; `share_keys` maps handle -> folder key;
/// `path_map` maps unique path -> handle; `children` maps a container
/// handle to its children in import order (shared nodes are indexed
/// under both their parent and their share origin).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSystem {
    pub nodes: HashMap<String, Node>,
    pub share_keys: HashMap<String, [u8; 16]>,
    path_map: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
}

impl FileSystem {
    pub fn node(&self, handle: &str) -> Option<&Node> {
        self.nodes.get(handle)
    }

    pub fn node_by_path(&self, path: &str) -> Option<&Node> {
        self.nodes.get(self.path_map.get(path)?)
    }

    /// Children of a container, in import order.
    pub fn children_of(&self, handle: &str) -> Vec<&Node> {
        self.children
            .get(handle)
            .map(|handles| handles.iter().filter_map(|h| self.nodes.get(h)).collect())
            .unwrap_or_default()
    }

    pub fn path_map(&self) -> &HashMap<String, String> {
        &self.path_map
    }

    /// Number of nodes, synthetic ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds a [`FileSystem`] out of an `f` response.
pub struct TreeBuilder<'a> {
    mk: &'a [u8; 16],
    rsa: Option<&'a MegaRsaKey>,
    user_handle: &'a str,
    exported_folder: bool,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(mk: &'a [u8; 16], user_handle: &'a str) -> Self {
        Self {
            mk,
            rsa: None,
            user_handle,
            exported_folder: false,
        }
    }

    /// Provide the RSA private key for RSA-delivered share keys.
    pub fn with_rsa(mut self, rsa: &'a MegaRsaKey) -> Self {
        self.rsa = Some(rsa);
        self
    }

    /// Exported-folder mode: the first returned node becomes the root
    /// and the session master key doubles as its share key.
    pub fn exported_folder(mut self) -> Self {
        self.exported_folder = true;
        self
    }

    /// Materialise the tree.
    pub fn build(&self, response: &Value) -> FileSystem {
        let mut fs = FileSystem::default();
        let mut order: Vec<String> = Vec::new();

        for node in [Node::synthetic_top(), Node::synthetic_network()] {
            order.push(node.handle.clone());
            fs.nodes.insert(node.handle.clone(), node);
        }

        let f = response.get("f").and_then(|v| v.as_array());

        let exported_root = if self.exported_folder {
            f.and_then(|arr| arr.first())
                .and_then(|n| n.get("h"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        } else {
            None
        };
        if let Some(h) = &exported_root {
            fs.share_keys.insert(h.clone(), *self.mk);
        }

        if let Some(ok) = response.get("ok").and_then(|v| v.as_array()) {
            for entry in ok {
                self.install_ok_share_key(&mut fs, entry);
            }
        }

        if let Some(entries) = f {
            for node_json in entries {
                if let Some(node) = self.import_node(&mut fs, node_json, exported_root.as_deref())
                {
                    order.push(node.handle.clone());
                    fs.nodes.insert(node.handle.clone(), node);
                }
            }
        }

        if let Some(users) = response.get("u").and_then(|v| v.as_array()) {
            for entry in users {
                if entry.get("c").and_then(|v| v.as_i64()) != Some(1) {
                    continue;
                }
                let Some(handle) = entry.get("u").and_then(|v| v.as_str()) else {
                    continue;
                };
                let email = entry.get("m").and_then(|v| v.as_str()).unwrap_or(handle);
                let contact = Node::contact(handle, email);
                order.push(contact.handle.clone());
                fs.nodes.insert(contact.handle.clone(), contact);
            }
        }

        assign_paths(&mut fs, &order);
        index_children(&mut fs, &order);
        fs
    }

    /// Install an owner-wrapped share key, but only if the handle
    /// authenticator checks out: `AES(MK, h||h)` must equal `ha`.
    fn install_ok_share_key(&self, fs: &mut FileSystem, entry: &Value) {
        let (Some(h), Some(ha), Some(k)) = (
            entry.get("h").and_then(|v| v.as_str()),
            entry.get("ha").and_then(|v| v.as_str()),
            entry.get("k").and_then(|v| v.as_str()),
        ) else {
            return;
        };

        if !authenticate_share_handle(self.mk, h, ha) {
            tracing::warn!(handle = h, "share key failed handle authentication, skipping");
            return;
        }

        let Ok(wrapped) = base64url_decode(k) else {
            tracing::warn!(handle = h, "share key is not valid base64, skipping");
            return;
        };
        if wrapped.is_empty() || wrapped.len() % 16 != 0 {
            tracing::warn!(handle = h, "share key ciphertext misaligned, skipping");
            return;
        }

        let plain = aes128_ecb_decrypt(&wrapped, self.mk);
        let mut key = [0u8; 16];
        key.copy_from_slice(&plain[..16]);
        fs.share_keys.insert(h.to_string(), key);
    }

    /// Import one `f` entry. Returns `None` when the node is dropped.
    fn import_node(
        &self,
        fs: &mut FileSystem,
        json: &Value,
        exported_root: Option<&str>,
    ) -> Option<Node> {
        let handle = json.get("h")?.as_str()?.to_string();
        let node_type = match json.get("t").and_then(|v| v.as_i64()).map(NodeType::from_i64) {
            Some(Some(t)) => t,
            _ => {
                tracing::debug!(handle = %handle, "unknown node type, dropping");
                return None;
            }
        };

        let parent = json
            .get("p")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let su_handle = json
            .get("su")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let user = json.get("u").and_then(|v| v.as_str()).map(str::to_string);
        let size = json.get("s").and_then(|v| v.as_u64()).unwrap_or(0);
        let mtime = json.get("ts").and_then(|v| v.as_i64()).unwrap_or(0);

        // Root-class nodes carry no key material and get fixed labels.
        if let Some(label) = node_type.fixed_name() {
            return Some(Node {
                handle,
                parent_handle: parent.or_else(|| Some(TOP_HANDLE.to_string())),
                su_handle,
                user,
                node_type,
                size: 0,
                mtime,
                key: None,
                key_full: None,
                attrs: serde_json::Map::new(),
                name: label.to_string(),
                path: String::new(),
            });
        }

        if !matches!(node_type, NodeType::File | NodeType::Folder) {
            tracing::debug!(handle = %handle, ?node_type, "unexpected catalogue entry, dropping");
            return None;
        }

        let k_field = json.get("k")?.as_str()?;
        let raw_key = self.unwrap_node_key(fs, &handle, k_field)?;

        let (key, key_full) = match node_type {
            NodeType::File => {
                if raw_key.len() < 32 {
                    tracing::debug!(handle = %handle, "file key shorter than 32 bytes, dropping");
                    return None;
                }
                let mut full = [0u8; 32];
                full.copy_from_slice(&raw_key[..32]);
                (unpack_file_key(&full), Some(full))
            }
            _ => {
                if raw_key.len() < 16 {
                    tracing::debug!(handle = %handle, "folder key shorter than 16 bytes, dropping");
                    return None;
                }
                let mut key = [0u8; 16];
                key.copy_from_slice(&raw_key[..16]);
                (key, None)
            }
        };

        let attrs_b64 = json.get("a")?.as_str()?;
        let Some(attrs) = decrypt_node_attrs(&key, attrs_b64) else {
            tracing::debug!(handle = %handle, "attribute blob rejected, dropping node");
            return None;
        };
        let name = attrs.get("n")?.as_str()?.to_string();
        if !is_safe_name(&name) {
            tracing::warn!(handle = %handle, "unsafe node name, dropping");
            return None;
        }

        // Per-node share key delivery: AES-wrapped when exactly one
        // block, RSA otherwise.
        if let Some(esk) = json.get("sk").and_then(|v| v.as_str()) {
            if let Some(sk) = self.decrypt_share_key(esk) {
                fs.share_keys.insert(handle.clone(), sk);
            } else {
                tracing::debug!(handle = %handle, "undecryptable sk entry ignored");
            }
        }

        let parent_handle = if exported_root == Some(handle.as_str()) {
            None
        } else {
            parent.or_else(|| Some(TOP_HANDLE.to_string()))
        };

        Some(Node {
            handle,
            parent_handle,
            su_handle,
            user,
            node_type,
            size,
            mtime,
            key: Some(key),
            key_full,
            attrs,
            name,
            path: String::new(),
        })
    }

    /// Unwrap a node key from its `owner:ciphertext` pair list. The
    /// first pair we hold a key for wins.
    fn unwrap_node_key(&self, fs: &FileSystem, handle: &str, k_field: &str) -> Option<Vec<u8>> {
        for part in k_field.split('/') {
            let Some((owner, cipher)) = part.split_once(':') else {
                continue;
            };

            let unwrap_key: Option<[u8; 16]> = if owner == self.user_handle {
                Some(*self.mk)
            } else {
                fs.share_keys.get(owner).copied()
            };
            let Some(unwrap_key) = unwrap_key else {
                continue;
            };

            let Ok(wrapped) = base64url_decode(cipher) else {
                continue;
            };
            if wrapped.is_empty() || wrapped.len() % 16 != 0 {
                continue;
            }
            return Some(aes128_ecb_decrypt(&wrapped, &unwrap_key));
        }

        tracing::debug!(handle = %handle, "no usable key source, dropping node");
        None
    }

    fn decrypt_share_key(&self, esk_b64: &str) -> Option<[u8; 16]> {
        let data = base64url_decode(esk_b64).ok()?;
        let plain = if data.len() == 16 {
            aes128_ecb_decrypt(&data, self.mk)
        } else if data.len() > 16 {
            self.rsa?.decrypt(&data)?
        } else {
            return None;
        };

        if plain.len() < 16 {
            return None;
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&plain[..16]);
        Some(key)
    }
}

/// Check `AES(MK, h||h) == ha` for an 8-character node handle.
fn authenticate_share_handle(mk: &[u8; 16], h: &str, ha_b64: &str) -> bool {
    let hb = h.as_bytes();
    if hb.len() != 8 {
        return false;
    }

    let mut block = [0u8; 16];
    block[..8].copy_from_slice(hb);
    block[8..].copy_from_slice(hb);

    let Ok(ha) = base64url_decode(ha_b64) else {
        return false;
    };
    aes128_ecb_encrypt_block(&block, mk)[..] == ha[..]
}

/// Reject `.`, `..` and names carrying path separators.
fn is_safe_name(name: &str) -> bool {
    #[cfg(windows)]
    const FORBIDDEN: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*'];
    #[cfg(not(windows))]
    const FORBIDDEN: &[char] = &['/'];

    !(name.is_empty() || name == "." || name == ".." || name.contains(FORBIDDEN))
}

/// Assign a unique path to every node, in import order. Colliding paths
/// get a `.<handle>` suffix.
fn assign_paths(fs: &mut FileSystem, order: &[String]) {
    let cap = fs.nodes.len();

    for handle in order {
        let path = {
            let Some(node) = fs.nodes.get(handle) else {
                continue;
            };
            if node.node_type == NodeType::Top {
                continue;
            }
            compute_path(&fs.nodes, node, cap)
        };

        let unique = if fs.path_map.contains_key(&path) {
            format!("{path}.{handle}")
        } else {
            path
        };
        fs.path_map.insert(unique.clone(), handle.clone());
        if let Some(node) = fs.nodes.get_mut(handle) {
            node.path = unique;
        }
    }
}

/// Walk to the root collecting names. The walk is capped at the node
/// count so a cyclic catalogue cannot hang us.
fn compute_path(nodes: &HashMap<String, Node>, node: &Node, cap: usize) -> String {
    let mut names = vec![node.name.clone()];
    let mut current = node;
    let mut depth = 0;

    loop {
        let ancestor = current
            .parent_handle
            .as_deref()
            .and_then(|h| nodes.get(h))
            .or_else(|| current.su_handle.as_deref().and_then(|h| nodes.get(h)));
        let Some(ancestor) = ancestor else {
            break;
        };
        if ancestor.node_type == NodeType::Top {
            break;
        }

        depth += 1;
        if depth > cap {
            tracing::warn!(handle = %node.handle, "ancestry walk exceeded node count, truncating path");
            return node.name.clone();
        }
        names.push(ancestor.name.clone());
        current = ancestor;
    }

    names.reverse();
    names.join("/")
}

/// Index every node under its parent and, when distinct, its share
/// origin, so shared nodes also appear under the sharer.
fn index_children(fs: &mut FileSystem, order: &[String]) {
    let mut edges: Vec<(String, String)> = Vec::new();
    for handle in order {
        let Some(node) = fs.nodes.get(handle) else {
            continue;
        };
        if let Some(parent) = &node.parent_handle {
            edges.push((parent.clone(), handle.clone()));
        }
        if let Some(su) = &node.su_handle {
            if node.parent_handle.as_deref() != Some(su.as_str()) {
                edges.push((su.clone(), handle.clone()));
            }
        }
    }

    for (parent, child) in edges {
        fs.children.entry(parent).or_default().push(child);
    }
}
