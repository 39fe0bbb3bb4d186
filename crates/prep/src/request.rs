//! Client request as seen by the prepare stage.

use arbor_types::{
    Cxid, Id, KeeperError, OpCode, SessionId, Txn, TxnDigest, TxnHeader, Zxid, codec,
    codec::CodecError,
};
use serde::Serialize;

use crate::session::SessionOwner;

/// A submitted request and the slots the prepare stage fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Submitting session.
    pub session_id: SessionId,
    /// Client correlation id.
    pub cxid: Cxid,
    /// Operation code.
    pub op: OpCode,
    /// Encoded operation payload.
    pub payload: Vec<u8>,
    /// Identities the connection authenticated with.
    pub auth_info: Vec<Id>,
    /// Connection submitting the request.
    pub owner: SessionOwner,
    /// Whether the session lives only on this server.
    pub is_local_session: bool,
    /// Transaction header, set for mutating operations.
    pub hdr: Option<TxnHeader>,
    /// Transaction body, set for mutating operations.
    pub txn: Option<Txn>,
    /// Tree digest after the transaction, when digests are enabled.
    pub txn_digest: Option<TxnDigest>,
    /// Failure recorded while preparing.
    pub error: Option<KeeperError>,
    /// Newest issued token at the time the request left the prepare stage.
    pub zxid: Zxid,
}

impl Request {
    /// Request carrying a raw payload.
    pub fn new(session_id: SessionId, cxid: Cxid, op: OpCode, payload: Vec<u8>) -> Self {
        Self {
            session_id,
            cxid,
            op,
            payload,
            auth_info: Vec::new(),
            owner: SessionOwner::default(),
            is_local_session: false,
            hdr: None,
            txn: None,
            txn_digest: None,
            error: None,
            zxid: Zxid::COMMITTED,
        }
    }

    /// Request whose payload is `body` encoded with the shared codec.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if `body` cannot be serialized.
    pub fn encoded<T: Serialize>(
        session_id: SessionId,
        cxid: Cxid,
        op: OpCode,
        body: &T,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(session_id, cxid, op, codec::encode(body)?))
    }

    /// Sets the caller identities.
    #[must_use]
    pub fn with_auth(mut self, auth_info: Vec<Id>) -> Self {
        self.auth_info = auth_info;
        self
    }

    /// Sets the owning connection.
    #[must_use]
    pub fn with_owner(mut self, owner: SessionOwner) -> Self {
        self.owner = owner;
        self
    }

    /// Marks the session as local to this server.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.is_local_session = true;
        self
    }

    /// Clears every slot the prepare stage fills in.
    pub fn clear_result(&mut self) {
        self.hdr = None;
        self.txn = None;
        self.txn_digest = None;
        self.error = None;
    }
}
