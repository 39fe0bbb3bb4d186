//! Core types, errors, codec and digests for the arbor prepare stage.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Identifiers (`SessionId`, `Zxid`), node metadata and the ACL model
//! - Client request records and prepared transaction records
//! - Result codes and the `KeeperError` hierarchy using snafu
//! - Node and tree digest primitives (seahash)
//! - Path validation and prepare-stage configuration

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
pub mod digest;
pub mod error;
pub mod requests;
pub mod txn;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use config::{ConfigError, PrepConfig};
pub use digest::{
    CONFIG_NODE, DIGEST_VERSION, DigestOp, PrecalculatedDigest, RESERVED_ROOT, TxnDigest,
    node_digest,
};
pub use error::{ErrorCode, KeeperError, Result};
pub use txn::{SubTxn, Txn, TxnHeader};
pub use types::*;
