//! Committed tree view.
//!
//! The prepare stage only reads committed state: single-node snapshots, a
//! session's ephemeral paths, reserved-path checks and the tree digest.
//! [`CommittedTree`] is that seam. [`InMemoryTree`] is the reference
//! implementation used by tests and by embedders without a storage engine;
//! it also applies prepared transactions so prepare output can be checked
//! end to end.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use arbor_types::{
    Acl, CONFIG_NODE, CONTAINER_EPHEMERAL_OWNER, EphemeralType, KeeperError, RESERVED_ROOT,
    SessionId, Stat, Txn, TxnHeader, Zxid, digest::fold_tree_digest, node_digest,
    validation::parent_path,
};
use parking_lot::{Mutex, RwLock};

/// Quota subtree under the reserved root.
const QUOTA_NODE: &str = "/zookeeper/quota";

/// Consistent copy of one committed node, taken under its read lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Node metadata.
    pub stat: Stat,
    /// Number of children.
    pub child_count: i32,
    /// Node ACL.
    pub acl: Vec<Acl>,
    /// Node data.
    pub data: Vec<u8>,
}

/// Read-only view of committed tree state.
pub trait CommittedTree: Send + Sync {
    /// Snapshot of the node at `path`, if it exists.
    fn node(&self, path: &str) -> Option<NodeSnapshot>;

    /// Committed ephemeral paths owned by `session`.
    fn ephemerals(&self, session: SessionId) -> BTreeSet<String>;

    /// Whether `path` is a system node clients may not delete.
    fn is_reserved_path(&self, path: &str) -> bool;

    /// Current committed tree digest.
    fn tree_digest(&self) -> u64;
}

#[derive(Debug)]
struct DataNode {
    stat: Stat,
    data: Vec<u8>,
    acl: Vec<Acl>,
    children: BTreeSet<String>,
}

impl DataNode {
    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            stat: self.stat,
            child_count: i32::try_from(self.children.len()).unwrap_or(i32::MAX),
            acl: self.acl.clone(),
            data: self.data.clone(),
        }
    }
}

/// In-memory committed tree with per-node locks and an incrementally
/// maintained tree digest.
pub struct InMemoryTree {
    nodes: RwLock<HashMap<String, Arc<RwLock<DataNode>>>>,
    digest: Mutex<u64>,
}

impl InMemoryTree {
    /// Creates a tree holding the root and the reserved system nodes.
    pub fn new() -> Self {
        let tree = Self { nodes: RwLock::new(HashMap::new()), digest: Mutex::new(0) };
        tree.seed("/", &["zookeeper"], Acl::open_unsafe());
        tree.seed(RESERVED_ROOT, &["config", "quota"], Acl::open_unsafe());
        tree.seed(CONFIG_NODE, &[], Acl::read_unsafe());
        tree.seed(QUOTA_NODE, &[], Acl::open_unsafe());
        tree
    }

    fn seed(&self, path: &str, children: &[&str], acl: Vec<Acl>) {
        let node = DataNode {
            stat: Stat::default(),
            data: Vec::new(),
            acl,
            children: children.iter().map(|c| (*c).to_string()).collect(),
        };
        self.add_digest(0, node_digest(path, &node.data, &node.stat));
        self.nodes.write().insert(path.to_string(), Arc::new(RwLock::new(node)));
    }

    fn add_digest(&self, old_node: u64, new_node: u64) {
        let mut digest = self.digest.lock();
        *digest = fold_tree_digest(*digest, old_node, new_node);
    }

    fn lookup(&self, path: &str) -> Option<Arc<RwLock<DataNode>>> {
        self.nodes.read().get(path).cloned()
    }

    /// Number of nodes, system nodes included.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Sorted child names of `path`.
    pub fn children(&self, path: &str) -> Option<Vec<String>> {
        let node = self.lookup(path)?;
        let node = node.read();
        Some(node.children.iter().cloned().collect())
    }

    /// Recomputes the tree digest from every node.
    pub fn full_digest(&self) -> u64 {
        let nodes = self.nodes.read();
        nodes.iter().fold(0u64, |acc, (path, node)| {
            let node = node.read();
            acc.wrapping_add(node_digest(path, &node.data, &node.stat))
        })
    }

    /// Creates a node.
    ///
    /// `parent_cversion` of `None` bumps the parent's child generation by one.
    ///
    /// # Errors
    ///
    /// Returns `NodeExists` if the path is taken, `NoNode` if the parent is
    /// missing, and `BadArguments` for a path without `/`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_node(
        &self,
        path: &str,
        data: Vec<u8>,
        acl: Vec<Acl>,
        ephemeral_owner: i64,
        parent_cversion: Option<i32>,
        zxid: Zxid,
        time: i64,
    ) -> Result<(), KeeperError> {
        let parent = parent_path(path)
            .ok_or_else(|| KeeperError::BadArguments { path: path.to_string() })?;
        let child = &path[path.rfind('/').map_or(0, |i| i + 1)..];

        let mut nodes = self.nodes.write();
        if nodes.contains_key(path) {
            return Err(KeeperError::NodeExists { path: path.to_string() });
        }
        let parent_node = nodes
            .get(parent)
            .cloned()
            .ok_or_else(|| KeeperError::NoNode { path: parent.to_string() })?;
        {
            let mut p = parent_node.write();
            let old = node_digest(parent, &p.data, &p.stat);
            p.children.insert(child.to_string());
            let cversion = parent_cversion.unwrap_or(p.stat.cversion + 1);
            if cversion > p.stat.cversion {
                p.stat.cversion = cversion;
                p.stat.pzxid = zxid;
            }
            self.add_digest(old, node_digest(parent, &p.data, &p.stat));
        }

        let node = DataNode {
            stat: Stat::created(zxid, time, ephemeral_owner),
            data,
            acl,
            children: BTreeSet::new(),
        };
        self.add_digest(0, node_digest(path, &node.data, &node.stat));
        nodes.insert(path.to_string(), Arc::new(RwLock::new(node)));
        Ok(())
    }

    /// Deletes a node and detaches it from its parent.
    ///
    /// # Errors
    ///
    /// Returns `NoNode` if the node does not exist.
    pub fn delete_node(&self, path: &str, zxid: Zxid) -> Result<(), KeeperError> {
        let mut nodes = self.nodes.write();
        let node =
            nodes.remove(path).ok_or_else(|| KeeperError::NoNode { path: path.to_string() })?;
        {
            let node = node.read();
            self.add_digest(node_digest(path, &node.data, &node.stat), 0);
        }

        let Some(parent) = parent_path(path) else {
            return Ok(());
        };
        if let Some(parent_node) = nodes.get(parent) {
            let mut p = parent_node.write();
            let old = node_digest(parent, &p.data, &p.stat);
            let child = &path[path.rfind('/').map_or(0, |i| i + 1)..];
            p.children.remove(child);
            if zxid > p.stat.pzxid {
                p.stat.pzxid = zxid;
            }
            self.add_digest(old, node_digest(parent, &p.data, &p.stat));
        }
        Ok(())
    }

    /// Replaces a node's data.
    ///
    /// # Errors
    ///
    /// Returns `NoNode` if the node does not exist.
    pub fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        version: i32,
        zxid: Zxid,
        time: i64,
    ) -> Result<(), KeeperError> {
        let node = self.lookup(path).ok_or_else(|| KeeperError::NoNode { path: path.to_string() })?;
        let mut node = node.write();
        let old = node_digest(path, &node.data, &node.stat);
        node.data = data;
        node.stat.version = version;
        node.stat.mzxid = zxid;
        node.stat.mtime = time;
        self.add_digest(old, node_digest(path, &node.data, &node.stat));
        Ok(())
    }

    /// Replaces a node's ACL.
    ///
    /// # Errors
    ///
    /// Returns `NoNode` if the node does not exist.
    pub fn set_acl(&self, path: &str, acl: Vec<Acl>, version: i32) -> Result<(), KeeperError> {
        let node = self.lookup(path).ok_or_else(|| KeeperError::NoNode { path: path.to_string() })?;
        let mut node = node.write();
        let old = node_digest(path, &node.data, &node.stat);
        node.acl = acl;
        node.stat.aversion = version;
        self.add_digest(old, node_digest(path, &node.data, &node.stat));
        Ok(())
    }

    /// Applies a prepared transaction.
    ///
    /// Failed multi-ops (any error sub-transaction) leave the tree untouched.
    ///
    /// # Errors
    ///
    /// Returns the first tree error, or `Marshalling` for an undecodable
    /// sub-transaction.
    pub fn apply(&self, hdr: &TxnHeader, txn: &Txn) -> Result<(), KeeperError> {
        match txn {
            Txn::Create { path, data, acl, ephemeral, parent_cversion } => {
                let owner = if *ephemeral { hdr.client_id.value() } else { 0 };
                self.create_node(
                    path,
                    data.clone(),
                    acl.clone(),
                    owner,
                    Some(*parent_cversion),
                    hdr.zxid,
                    hdr.time,
                )
            },
            Txn::CreateContainer { path, data, acl, parent_cversion } => self.create_node(
                path,
                data.clone(),
                acl.clone(),
                CONTAINER_EPHEMERAL_OWNER,
                Some(*parent_cversion),
                hdr.zxid,
                hdr.time,
            ),
            Txn::CreateTtl { path, data, acl, parent_cversion, ttl } => self.create_node(
                path,
                data.clone(),
                acl.clone(),
                EphemeralType::ttl_owner(*ttl),
                Some(*parent_cversion),
                hdr.zxid,
                hdr.time,
            ),
            Txn::Delete { path } => self.delete_node(path, hdr.zxid),
            Txn::SetData { path, data, version } => {
                self.set_data(path, data.clone(), *version, hdr.zxid, hdr.time)
            },
            Txn::SetAcl { path, acl, version } => self.set_acl(path, acl.clone(), *version),
            Txn::CloseSession { paths } => {
                let paths = if paths.is_empty() {
                    self.ephemerals(hdr.client_id)
                } else {
                    paths.iter().cloned().collect()
                };
                for path in paths {
                    // Already gone: a concurrent delete won the race.
                    let _ = self.delete_node(&path, hdr.zxid);
                }
                Ok(())
            },
            Txn::Multi { txns } => {
                let decoded = txns
                    .iter()
                    .map(|sub| sub.decode().map_err(KeeperError::from))
                    .collect::<Result<Vec<_>, _>>()?;
                if decoded.iter().any(Txn::is_error) {
                    return Ok(());
                }
                for sub in &decoded {
                    self.apply(hdr, sub)?;
                }
                Ok(())
            },
            Txn::CheckVersion { .. } | Txn::CreateSession { .. } | Txn::Error { .. } => Ok(()),
        }
    }
}

impl Default for InMemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CommittedTree for InMemoryTree {
    fn node(&self, path: &str) -> Option<NodeSnapshot> {
        let node = self.lookup(path)?;
        let snapshot = node.read().snapshot();
        Some(snapshot)
    }

    fn ephemerals(&self, session: SessionId) -> BTreeSet<String> {
        let nodes = self.nodes.read();
        nodes
            .iter()
            .filter(|(_, node)| node.read().stat.ephemeral_owner == session.value())
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn is_reserved_path(&self, path: &str) -> bool {
        matches!(path, "/" | RESERVED_ROOT | CONFIG_NODE | QUOTA_NODE)
    }

    fn tree_digest(&self) -> u64 {
        *self.digest.lock()
    }
}
