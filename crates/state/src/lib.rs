//! Pending state for the arbor prepare stage.
//!
//! This crate sits between the committed tree and the transaction
//! synthesizer, providing:
//!
//! - The pending-change ledger with per-path index, rollback and commit-side
//!   completion
//! - The committed-tree seam and an in-memory reference tree
//! - Node-state resolution through pending changes
//! - Digest strategies for incremental tree digests

#![deny(unsafe_code)]

mod digest;
mod ledger;
mod resolver;
mod tree;

pub use digest::{AdditiveDigest, DigestStrategy, NoDigest, NodeImage};
pub use ledger::{ChangeRecord, PendingLedger, RollbackSet};
pub use resolver::NodeResolver;
pub use tree::{CommittedTree, InMemoryTree, NodeSnapshot};
