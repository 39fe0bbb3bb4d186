//! Transaction records produced by the prepare stage.
//!
//! A prepared request carries a [`TxnHeader`], a [`Txn`] body and, when
//! digests are enabled, a [`crate::TxnDigest`]. Replicas apply the body in
//! zxid order.

use serde::{Deserialize, Serialize};

use crate::{
    codec::{self, CodecError},
    error::ErrorCode,
    types::{Acl, Cxid, OpCode, SessionId, Zxid},
};

/// Transaction header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnHeader {
    /// Session that submitted the request.
    pub client_id: SessionId,
    /// Client correlation id.
    pub cxid: Cxid,
    /// Ordering token.
    pub zxid: Zxid,
    /// Wall-clock time in milliseconds since the epoch.
    pub time: i64,
    /// Operation code; rewritten to [`OpCode::Error`] on failure.
    pub op: OpCode,
}

/// Transaction body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Txn {
    /// Node creation (`create` / `create2`).
    Create {
        /// Final path including any sequential suffix.
        path: String,
        /// Node data.
        data: Vec<u8>,
        /// Effective ACL.
        acl: Vec<Acl>,
        /// Whether the node is owned by the session.
        ephemeral: bool,
        /// Parent's child generation after the create.
        parent_cversion: i32,
    },
    /// Container creation.
    CreateContainer {
        /// Final path.
        path: String,
        /// Node data.
        data: Vec<u8>,
        /// Effective ACL.
        acl: Vec<Acl>,
        /// Parent's child generation after the create.
        parent_cversion: i32,
    },
    /// TTL node creation.
    CreateTtl {
        /// Final path.
        path: String,
        /// Node data.
        data: Vec<u8>,
        /// Effective ACL.
        acl: Vec<Acl>,
        /// Parent's child generation after the create.
        parent_cversion: i32,
        /// Time to live in milliseconds.
        ttl: i64,
    },
    /// Node removal (`delete` and `deleteContainer`).
    Delete {
        /// Removed path.
        path: String,
    },
    /// Data update.
    SetData {
        /// Updated path.
        path: String,
        /// New data.
        data: Vec<u8>,
        /// New data version.
        version: i32,
    },
    /// ACL update.
    SetAcl {
        /// Updated path.
        path: String,
        /// New ACL.
        acl: Vec<Acl>,
        /// New ACL version.
        version: i32,
    },
    /// Version assertion; mutates nothing.
    CheckVersion {
        /// Checked path.
        path: String,
        /// Version the node will have if a later op bumps it.
        version: i32,
    },
    /// Session registration.
    CreateSession {
        /// Session timeout in milliseconds.
        timeout: i32,
    },
    /// Session teardown.
    CloseSession {
        /// Ephemeral paths removed with the session, sorted.
        paths: Vec<String>,
    },
    /// Atomic batch.
    Multi {
        /// One entry per submitted operation.
        txns: Vec<SubTxn>,
    },
    /// Failed request.
    Error {
        /// Numeric [`ErrorCode`].
        err: i32,
    },
}

impl Txn {
    /// Error transaction for `code`.
    pub fn error(code: ErrorCode) -> Self {
        Self::Error { err: code.as_i32() }
    }

    /// Error code carried by an error transaction.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Error { err } => ErrorCode::from_i32(*err),
            _ => None,
        }
    }

    /// Whether this is an error transaction.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// One serialized sub-transaction of a multi-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTxn {
    /// Operation code of the item, or [`OpCode::Error`].
    pub op: OpCode,
    /// Postcard-encoded [`Txn`].
    pub payload: Vec<u8>,
}

impl SubTxn {
    /// Serializes `txn` under `op`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn new(op: OpCode, txn: &Txn) -> Result<Self, CodecError> {
        Ok(Self { op, payload: codec::encode(txn)? })
    }

    /// Decodes the carried transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the payload is malformed.
    pub fn decode(&self) -> Result<Txn, CodecError> {
        codec::decode(&self.payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_error_txn_code() {
        let txn = Txn::error(ErrorCode::NoNode);
        assert!(txn.is_error());
        assert_eq!(txn.error_code(), Some(ErrorCode::NoNode));
        assert_eq!(Txn::Delete { path: "/a".into() }.error_code(), None);
    }

    #[test]
    fn test_sub_txn_carries_body() {
        let body = Txn::SetData { path: "/a".into(), data: b"v".to_vec(), version: 2 };
        let sub = SubTxn::new(OpCode::SetData, &body).expect("encode");
        assert_eq!(sub.op, OpCode::SetData);
        assert_eq!(sub.decode().expect("decode"), body);
    }

    #[test]
    fn test_sub_txn_rejects_garbage() {
        let sub = SubTxn { op: OpCode::Error, payload: vec![0xff, 0xff, 0xff] };
        assert!(sub.decode().is_err());
    }
}
