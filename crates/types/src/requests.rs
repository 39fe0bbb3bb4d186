//! Client request records.
//!
//! Each mutating operation carries one of these as its postcard-encoded
//! payload. The prepare stage decodes them lazily per operation type.

use serde::{Deserialize, Serialize};

use crate::types::{Acl, OpCode};

/// Payload of `create`, `create2` and `createContainer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Requested path (before any sequential suffix).
    pub path: String,
    /// Initial node data.
    pub data: Vec<u8>,
    /// Requested ACL. `None` is rejected as an invalid ACL.
    pub acl: Option<Vec<Acl>>,
    /// Create mode flag, see [`crate::CreateMode::from_flag`].
    pub flags: i32,
}

/// Payload of `createTTL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTtlRequest {
    /// Requested path (before any sequential suffix).
    pub path: String,
    /// Initial node data.
    pub data: Vec<u8>,
    /// Requested ACL.
    pub acl: Option<Vec<Acl>>,
    /// Create mode flag.
    pub flags: i32,
    /// Time to live in milliseconds.
    pub ttl: i64,
}

/// Payload of `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Node to delete.
    pub path: String,
    /// Expected data version, or `-1` for any.
    pub version: i32,
}

/// Payload of `setData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDataRequest {
    /// Node to update.
    pub path: String,
    /// Replacement data.
    pub data: Vec<u8>,
    /// Expected data version, or `-1` for any.
    pub version: i32,
}

/// Payload of `setACL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAclRequest {
    /// Node to update.
    pub path: String,
    /// Replacement ACL.
    pub acl: Option<Vec<Acl>>,
    /// Expected ACL version, or `-1` for any.
    pub version: i32,
}

/// Payload of `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVersionRequest {
    /// Node to check.
    pub path: String,
    /// Expected data version, or `-1` for any.
    pub version: i32,
}

/// Payload of `reconfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigRequest {
    /// Comma-separated `server.N=entry` lines to add (incremental mode).
    pub joining_servers: Option<String>,
    /// Comma-separated server ids to remove (incremental mode).
    pub leaving_servers: Option<String>,
    /// Complete replacement membership (non-incremental mode).
    pub new_members: Option<String>,
    /// Expected current config version, or `-1` for any.
    pub cur_config_id: i64,
}

/// Payload of `createSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Negotiated session timeout in milliseconds.
    pub timeout: i32,
}

/// One operation inside a `multi` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Plain create.
    Create(CreateRequest),
    /// Create returning the stat.
    Create2(CreateRequest),
    /// Container create.
    CreateContainer(CreateRequest),
    /// TTL create.
    CreateTtl(CreateTtlRequest),
    /// Delete.
    Delete(DeleteRequest),
    /// Data update.
    SetData(SetDataRequest),
    /// Version assertion.
    Check(CheckVersionRequest),
}

impl Op {
    /// Operation code of this item.
    pub fn op_code(&self) -> OpCode {
        match self {
            Self::Create(_) => OpCode::Create,
            Self::Create2(_) => OpCode::Create2,
            Self::CreateContainer(_) => OpCode::CreateContainer,
            Self::CreateTtl(_) => OpCode::CreateTtl,
            Self::Delete(_) => OpCode::Delete,
            Self::SetData(_) => OpCode::SetData,
            Self::Check(_) => OpCode::Check,
        }
    }

    /// Target path of this item.
    pub fn path(&self) -> &str {
        match self {
            Self::Create(req) | Self::Create2(req) | Self::CreateContainer(req) => &req.path,
            Self::CreateTtl(req) => &req.path,
            Self::Delete(req) => &req.path,
            Self::SetData(req) => &req.path,
            Self::Check(req) => &req.path,
        }
    }
}

/// Payload of `multi`: an ordered batch applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiRequest {
    /// Operations in submission order.
    pub ops: Vec<Op>,
}
