//! Write-path transaction preparation for the arbor coordination service.
//!
//! Every mutating client request passes through this crate before it is
//! replicated. The prepare stage:
//!
//! - Validates the request against the effective node state (pending changes layered over the
//!   committed tree), including version checks and ACLs
//! - Synthesizes the transaction header and body, recording error transactions for rejected
//!   requests
//! - Records the post-image of every touched node in the pending ledger so later requests observe
//!   it before commit
//! - Maintains the incremental tree digest stamped onto each transaction
//! - Coordinates multi-operation batches with all-or-nothing ledger bookkeeping
//! - Serializes all of the above through a single admission loop
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use arbor_prep::{
//!     AtomicTokenSource, ChannelNextProcessor, InMemorySessionTracker, PrepProcessor, Request,
//!     TxnSynthesizer,
//! };
//! use arbor_state::InMemoryTree;
//! use arbor_types::{OpCode, PrepConfig, SessionId, Zxid};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let synthesizer = TxnSynthesizer::builder()
//!     .config(PrepConfig::default())
//!     .tree(Arc::new(InMemoryTree::new()))
//!     .sessions(Arc::new(InMemorySessionTracker::new()))
//!     .tokens(Arc::new(AtomicTokenSource::new(Zxid::new(0))))
//!     .build()?;
//! let (next, mut prepared) = ChannelNextProcessor::new();
//! let (handle, _worker) = PrepProcessor::builder()
//!     .synthesizer(Arc::new(synthesizer))
//!     .next(Arc::new(next))
//!     .build()
//!     .start();
//! handle.submit(Request::new(SessionId::new(1), 1, OpCode::Sync, Vec::new()))?;
//! let _ = prepared.recv().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

mod auth;
mod error;
mod guard;
mod multi;
mod processor;
mod quorum;
mod request;
mod session;
mod synthesizer;
mod token;

pub use auth::{AuthMatch, AuthProvider, AuthProviderRegistry, DigestAuthProvider, IpAuthProvider};
pub use error::{PrepError, Result};
pub use guard::{AclGuard, check_and_inc_version};
pub use processor::{ChannelNextProcessor, NextProcessor, PrepHandle, PrepProcessor, SubmitError};
pub use quorum::{
    LearnerRole, MembershipController, QuorumConfig, QuorumError, QuorumKind, QuorumServer,
    StaticMembership,
};
pub use request::Request;
pub use session::{InMemorySessionTracker, SessionOwner, SessionTracker};
pub use synthesizer::TxnSynthesizer;
pub use token::{AtomicTokenSource, TokenSource};
