//! Node-state resolution.
//!
//! Answers "what does this node look like once every prepared transaction
//! is applied": the newest pending image if there is one, otherwise the
//! committed node.

use std::sync::Arc;

use arbor_types::{KeeperError, Zxid};

use crate::{
    digest::DigestStrategy,
    ledger::{ChangeRecord, PendingLedger},
    tree::CommittedTree,
};

/// Reads node state through the pending ledger.
#[derive(Clone)]
pub struct NodeResolver {
    ledger: Arc<PendingLedger>,
    tree: Arc<dyn CommittedTree>,
    digest: Arc<dyn DigestStrategy>,
}

impl NodeResolver {
    /// Creates a resolver over `ledger` and `tree`.
    pub fn new(
        ledger: Arc<PendingLedger>,
        tree: Arc<dyn CommittedTree>,
        digest: Arc<dyn DigestStrategy>,
    ) -> Self {
        Self { ledger, tree, digest }
    }

    /// Pending ledger read by this resolver.
    pub fn ledger(&self) -> &Arc<PendingLedger> {
        &self.ledger
    }

    /// Committed tree read by this resolver.
    pub fn tree(&self) -> &Arc<dyn CommittedTree> {
        &self.tree
    }

    /// Digest strategy used to seed committed records.
    pub fn digest(&self) -> &Arc<dyn DigestStrategy> {
        &self.digest
    }

    /// Effective live image of `path`, or `None` when it does not exist or
    /// is pending deletion.
    pub fn lookup(&self, path: &str) -> Option<ChangeRecord> {
        let record = match self.ledger.get(path) {
            Some(pending) => pending,
            None => {
                let node = self.tree.node(path)?;
                let mut record = ChangeRecord::new(
                    Zxid::COMMITTED,
                    path,
                    node.stat,
                    node.child_count,
                    node.acl.clone(),
                    node.data.clone(),
                );
                record.digest = self.digest.seed(path, &node);
                record
            },
        };
        if record.is_tombstone() { None } else { Some(record) }
    }

    /// Effective live image of `path`.
    ///
    /// # Errors
    ///
    /// Returns `NoNode` when the node does not exist or is pending deletion.
    pub fn resolve(&self, path: &str) -> Result<ChangeRecord, KeeperError> {
        self.lookup(path).ok_or_else(|| KeeperError::NoNode { path: path.to_string() })
    }
}
