//! Node and tree digests.
//!
//! Each node hashes to a 64-bit digest; the tree digest is the wrapping sum of
//! every node digest, so it can be maintained incrementally:
//!
//! ```text
//! tree' = tree - old_node + new_node
//! ```
//!
//! Nodes under the reserved `/zookeeper/` subtree digest to zero and therefore
//! never contribute.

use std::hash::Hasher;

use seahash::SeaHasher;
use serde::{Deserialize, Serialize};

use crate::types::Stat;

/// Version of the digest function. Bumped whenever the hashed layout changes.
pub const DIGEST_VERSION: i32 = 2;

/// Root of the reserved system subtree.
pub const RESERVED_ROOT: &str = "/zookeeper";

/// Node holding the serialized membership configuration.
pub const CONFIG_NODE: &str = "/zookeeper/config";

/// Size in bytes of the fixed stat encoding fed to the hasher.
pub const STAT_DIGEST_BYTES: usize = 5 * 8 + 3 * 4 + 8;

/// How a change affects the tree digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOp {
    /// A node appears; nothing to subtract.
    Add,
    /// A node disappears; nothing to add.
    Remove,
    /// A node's content or metadata changes.
    Update,
    /// The tree digest is left unchanged.
    Noop,
}

/// Digest pair attached to a pending record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecalculatedDigest {
    /// Digest of the node itself (0 for removed nodes).
    pub node_digest: u64,
    /// Tree digest after this change is applied.
    pub tree_digest: u64,
}

/// Tree digest stamped on a transaction for replica verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnDigest {
    /// Digest function version.
    pub version: i32,
    /// Expected tree digest once the transaction is applied.
    pub tree_digest: u64,
}

impl TxnDigest {
    /// Stamps `tree_digest` with the current digest version.
    pub fn new(tree_digest: u64) -> Self {
        Self { version: DIGEST_VERSION, tree_digest }
    }
}

/// Whether a node is excluded from digests.
#[inline]
pub fn is_digest_exempt(path: &str) -> bool {
    path.strip_prefix(RESERVED_ROOT).is_some_and(|rest| rest.starts_with('/'))
}

/// Streaming hasher for one node.
///
/// Layout:
/// - path: UTF-8 bytes
/// - data: raw bytes
/// - czxid, mzxid, pzxid: u64 BE
/// - ctime, mtime: i64 BE
/// - version, cversion, aversion: i32 BE
/// - ephemeral_owner: i64 BE
pub struct NodeHasher {
    hasher: SeaHasher,
}

impl NodeHasher {
    /// Create a new node hasher.
    pub fn new() -> Self {
        Self { hasher: SeaHasher::new() }
    }

    /// Feed the node path.
    pub fn add_path(&mut self, path: &str) {
        self.hasher.write(path.as_bytes());
    }

    /// Feed the node data.
    pub fn add_data(&mut self, data: &[u8]) {
        self.hasher.write(data);
    }

    /// Feed the fixed-size stat encoding.
    pub fn add_stat(&mut self, stat: &Stat) {
        self.hasher.write(&encode_stat(stat));
    }

    /// Finalize and return the node digest.
    pub fn finalize(self) -> u64 {
        self.hasher.finish()
    }
}

impl Default for NodeHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Big-endian encoding of the persisted stat fields in digest order.
pub fn encode_stat(stat: &Stat) -> [u8; STAT_DIGEST_BYTES] {
    let mut buf = [0u8; STAT_DIGEST_BYTES];
    let mut at = 0;
    let mut put = |bytes: &[u8]| {
        buf[at..at + bytes.len()].copy_from_slice(bytes);
        at += bytes.len();
    };
    put(&stat.czxid.value().to_be_bytes());
    put(&stat.mzxid.value().to_be_bytes());
    put(&stat.pzxid.value().to_be_bytes());
    put(&stat.ctime.to_be_bytes());
    put(&stat.mtime.to_be_bytes());
    put(&stat.version.to_be_bytes());
    put(&stat.cversion.to_be_bytes());
    put(&stat.aversion.to_be_bytes());
    put(&stat.ephemeral_owner.to_be_bytes());
    buf
}

/// Digest of a single node, or 0 for reserved nodes.
pub fn node_digest(path: &str, data: &[u8], stat: &Stat) -> u64 {
    if is_digest_exempt(path) {
        return 0;
    }
    let mut hasher = NodeHasher::new();
    hasher.add_path(path);
    hasher.add_data(data);
    hasher.add_stat(stat);
    hasher.finalize()
}

/// Applies a node change to a tree digest.
#[inline]
pub fn fold_tree_digest(current: u64, old_node: u64, new_node: u64) -> u64 {
    current.wrapping_sub(old_node).wrapping_add(new_node)
}
