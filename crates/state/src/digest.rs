//! Digest strategies for pending changes.
//!
//! The prepare stage asks a [`DigestStrategy`] for the digest pair to attach
//! to each pending record and for the digest to stamp on each transaction.
//! [`AdditiveDigest`] maintains the additive tree digest on top of the
//! committed tree; [`NoDigest`] disables digests entirely.

use std::sync::Arc;

use arbor_types::{
    DigestOp, PrecalculatedDigest, Stat, TxnDigest, digest::fold_tree_digest, node_digest,
};

use crate::{
    ledger::PendingLedger,
    tree::{CommittedTree, NodeSnapshot},
};

/// Node content fed to the digest function.
#[derive(Debug, Clone, Copy)]
pub struct NodeImage<'a> {
    /// Node path.
    pub path: &'a str,
    /// Node data.
    pub data: &'a [u8],
    /// Node metadata.
    pub stat: &'a Stat,
}

/// Source of node and tree digests for the prepare stage.
pub trait DigestStrategy: Send + Sync {
    /// Whether digests are produced at all.
    fn is_enabled(&self) -> bool;

    /// Digest pair for a record read straight from the committed tree.
    fn seed(&self, path: &str, node: &NodeSnapshot) -> Option<PrecalculatedDigest>;

    /// Tree digest as of the newest pending change.
    fn current_tree_digest(&self, ledger: &PendingLedger) -> Option<u64>;

    /// Digest pair for a change about to be appended.
    ///
    /// `previous` is the node digest of the image being replaced (ignored for
    /// [`DigestOp::Add`] and [`DigestOp::Noop`]); `image` is the new content
    /// (ignored for [`DigestOp::Remove`] and [`DigestOp::Noop`]).
    fn precalculate(
        &self,
        ledger: &PendingLedger,
        op: DigestOp,
        previous: Option<&PrecalculatedDigest>,
        image: Option<NodeImage<'_>>,
    ) -> Option<PrecalculatedDigest>;

    /// Digest to stamp on a transaction carrying no record of its own.
    fn txn_digest(&self, ledger: &PendingLedger) -> Option<TxnDigest> {
        self.current_tree_digest(ledger).map(TxnDigest::new)
    }
}

/// Additive tree digest: `tree - old_node + new_node`.
pub struct AdditiveDigest {
    tree: Arc<dyn CommittedTree>,
}

impl AdditiveDigest {
    /// Creates a strategy seeded from `tree`'s committed digest.
    pub fn new(tree: Arc<dyn CommittedTree>) -> Self {
        Self { tree }
    }
}

impl DigestStrategy for AdditiveDigest {
    fn is_enabled(&self) -> bool {
        true
    }

    fn seed(&self, path: &str, node: &NodeSnapshot) -> Option<PrecalculatedDigest> {
        Some(PrecalculatedDigest {
            node_digest: node_digest(path, &node.data, &node.stat),
            tree_digest: 0,
        })
    }

    fn current_tree_digest(&self, ledger: &PendingLedger) -> Option<u64> {
        Some(ledger.latest_tree_digest().unwrap_or_else(|| self.tree.tree_digest()))
    }

    fn precalculate(
        &self,
        ledger: &PendingLedger,
        op: DigestOp,
        previous: Option<&PrecalculatedDigest>,
        image: Option<NodeImage<'_>>,
    ) -> Option<PrecalculatedDigest> {
        let previous_node = previous.map_or(0, |d| d.node_digest);
        let new_node = image.map_or(0, |n| node_digest(n.path, n.data, n.stat));
        let (old, new) = match op {
            DigestOp::Add => (0, new_node),
            DigestOp::Remove => (previous_node, 0),
            DigestOp::Update => (previous_node, new_node),
            DigestOp::Noop => (0, 0),
        };
        let current = self.current_tree_digest(ledger)?;
        Some(PrecalculatedDigest { node_digest: new, tree_digest: fold_tree_digest(current, old, new) })
    }
}

/// Disabled digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDigest;

impl DigestStrategy for NoDigest {
    fn is_enabled(&self) -> bool {
        false
    }

    fn seed(&self, _path: &str, _node: &NodeSnapshot) -> Option<PrecalculatedDigest> {
        None
    }

    fn current_tree_digest(&self, _ledger: &PendingLedger) -> Option<u64> {
        None
    }

    fn precalculate(
        &self,
        _ledger: &PendingLedger,
        _op: DigestOp,
        _previous: Option<&PrecalculatedDigest>,
        _image: Option<NodeImage<'_>>,
    ) -> Option<PrecalculatedDigest> {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use arbor_test_utils::strategies::{arb_data, arb_path};
    use arbor_types::{Acl, Zxid};
    use proptest::prelude::*;

    use super::*;
    use crate::{ledger::ChangeRecord, tree::InMemoryTree};

    fn strategy() -> (Arc<InMemoryTree>, AdditiveDigest) {
        let tree = Arc::new(InMemoryTree::new());
        let digest = AdditiveDigest::new(tree.clone());
        (tree, digest)
    }

    #[test]
    fn test_current_digest_falls_back_to_committed() {
        let (tree, digest) = strategy();
        let ledger = PendingLedger::new();
        assert_eq!(digest.current_tree_digest(&ledger), Some(tree.tree_digest()));
    }

    #[test]
    fn test_current_digest_prefers_newest_record() {
        let (_, digest) = strategy();
        let ledger = PendingLedger::new();
        let mut record = ChangeRecord::tombstone(Zxid::new(1), "/a");
        record.digest = Some(PrecalculatedDigest { node_digest: 0, tree_digest: 1234 });
        ledger.append(record);
        assert_eq!(digest.current_tree_digest(&ledger), Some(1234));
        assert_eq!(digest.txn_digest(&ledger).expect("enabled").tree_digest, 1234);
    }

    #[test]
    fn test_noop_keeps_tree_digest() {
        let (tree, digest) = strategy();
        let ledger = PendingLedger::new();
        let result = digest.precalculate(&ledger, DigestOp::Noop, None, None).expect("enabled");
        assert_eq!(result.tree_digest, tree.tree_digest());
        assert_eq!(result.node_digest, 0);
    }

    #[test]
    fn test_seed_uses_node_digest() {
        let (tree, digest) = strategy();
        let root = tree.node("/").expect("root");
        let seeded = digest.seed("/", &root).expect("enabled");
        assert_eq!(seeded.node_digest, node_digest("/", &root.data, &root.stat));
        assert_eq!(seeded.tree_digest, 0);
    }

    #[test]
    fn test_disabled_strategy_yields_nothing() {
        let ledger = PendingLedger::new();
        assert!(!NoDigest.is_enabled());
        assert_eq!(NoDigest.txn_digest(&ledger), None);
        assert_eq!(NoDigest.precalculate(&ledger, DigestOp::Add, None, None), None);
    }

    proptest! {
        /// Adding a node and then removing it returns the tree digest to its
        /// starting value.
        #[test]
        fn prop_add_remove_returns_to_start(path in arb_path(), data in arb_data()) {
            let (tree, digest) = strategy();
            let ledger = PendingLedger::new();
            let stat = Stat::created(Zxid::new(1), 10, 0);
            let image = NodeImage { path: &path, data: &data, stat: &stat };

            let added = digest
                .precalculate(&ledger, DigestOp::Add, None, Some(image))
                .expect("enabled");
            let mut record =
                ChangeRecord::new(Zxid::new(1), path.clone(), stat, 0, Acl::open_unsafe(), data.clone());
            record.digest = Some(added);
            ledger.append(record);

            let removed = digest
                .precalculate(&ledger, DigestOp::Remove, Some(&added), None)
                .expect("enabled");
            prop_assert_eq!(removed.tree_digest, tree.tree_digest());
        }
    }
}
