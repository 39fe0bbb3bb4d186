//! Core type definitions for the arbor prepare stage.
//!
//! These types describe:
//! - Identifier types (SessionId, Zxid)
//! - Node metadata (`Stat`) and access control (`Acl`, `Id`, `Perms`)
//! - Create modes and the ephemeral-owner encoding
//! - Client operation codes

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<inner>` and `Into<inner>` conversions
/// - `Display` with a semantic prefix (e.g., `zxid:0x1f`)
/// - `new()` constructor and `value()` accessor
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{:#x}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Client session identifier.
    ///
    /// The high byte carries the id of the server that created the session, so
    /// real session ids never collide with the container and TTL owner
    /// encodings (see [`EphemeralType`]).
    ///
    /// # Display
    ///
    /// Formats with `session:` prefix in hex: `session:0x1000`.
    SessionId, i64, "session"
);

define_id!(
    /// Ordering token assigned to every prepared transaction.
    ///
    /// Strictly increasing per transaction. All sub-operations of a multi-op
    /// share the token of their batch.
    ///
    /// # Display
    ///
    /// Formats with `zxid:` prefix in hex: `zxid:0x2a`.
    Zxid, u64, "zxid"
);

impl Zxid {
    /// Token stamped on records sourced from committed storage rather than
    /// from an in-flight transaction.
    pub const COMMITTED: Zxid = Zxid(0);
}

/// Client-side transaction correlation id.
pub type Cxid = i32;

// ============================================================================
// Node metadata
// ============================================================================

/// Persisted node metadata.
///
/// The child count and data length are not part of the persisted stat; holders
/// of a `Stat` carry the child count alongside it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Token of the transaction that created the node.
    pub czxid: Zxid,
    /// Token of the transaction that last modified the node's data.
    pub mzxid: Zxid,
    /// Creation time in milliseconds since the epoch.
    pub ctime: i64,
    /// Last data modification time in milliseconds since the epoch.
    pub mtime: i64,
    /// Data version.
    pub version: i32,
    /// Child generation counter. Drives sequential-name suffixes.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owner session for ephemerals, or a container/TTL sentinel.
    pub ephemeral_owner: i64,
    /// Token of the transaction that last added or removed a child.
    pub pzxid: Zxid,
}

impl Stat {
    /// Stat for a node created by the transaction `zxid` at `time`.
    pub fn created(zxid: Zxid, time: i64, ephemeral_owner: i64) -> Self {
        Self {
            czxid: zxid,
            mzxid: zxid,
            ctime: time,
            mtime: time,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner,
            pzxid: zxid,
        }
    }

    /// Returns the ephemeral classification of this node.
    #[inline]
    pub fn ephemeral_type(&self) -> EphemeralType {
        EphemeralType::of(self.ephemeral_owner)
    }
}

// ============================================================================
// Access control
// ============================================================================

/// Permission bit set carried by an ACL entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perms(u32);

impl Perms {
    /// Read data and list children.
    pub const READ: Perms = Perms(1);
    /// Set data.
    pub const WRITE: Perms = Perms(1 << 1);
    /// Create children.
    pub const CREATE: Perms = Perms(1 << 2);
    /// Delete children.
    pub const DELETE: Perms = Perms(1 << 3);
    /// Set the ACL.
    pub const ADMIN: Perms = Perms(1 << 4);
    /// Every permission.
    pub const ALL: Perms = Perms(0x1f);

    /// Creates a permission set from raw bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether any bit of `other` is granted.
    #[inline]
    pub const fn intersects(self, other: Perms) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for Perms {
    type Output = Perms;

    fn bitor(self, rhs: Perms) -> Perms {
        Perms(self.0 | rhs.0)
    }
}

/// Identity within an authentication scheme, e.g. `digest:alice:XrNy..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id {
    /// Scheme name (`world`, `auth`, `digest`, `ip`, `super`, ...).
    pub scheme: String,
    /// Scheme-specific identity string.
    pub id: String,
}

impl Id {
    /// Scheme matching every caller.
    pub const WORLD_SCHEME: &'static str = "world";
    /// Identity matching every caller under the world scheme.
    pub const ANYONE: &'static str = "anyone";
    /// Placeholder scheme expanded to the caller's authenticated identities.
    pub const AUTH_SCHEME: &'static str = "auth";
    /// Scheme that bypasses ACL checks.
    pub const SUPER_SCHEME: &'static str = "super";

    /// Creates an identity.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), id: id.into() }
    }

    /// `world:anyone`.
    pub fn anyone() -> Self {
        Self::new(Self::WORLD_SCHEME, Self::ANYONE)
    }

    /// Whether this is `world:anyone`.
    pub fn is_anyone(&self) -> bool {
        self.scheme == Self::WORLD_SCHEME && self.id == Self::ANYONE
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.id)
    }
}

/// A single access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Granted permissions.
    pub perms: Perms,
    /// Identity the permissions are granted to.
    pub id: Id,
}

impl Acl {
    /// Creates an ACL entry.
    pub fn new(perms: Perms, id: Id) -> Self {
        Self { perms, id }
    }

    /// `world:anyone` with every permission.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, Id::anyone())]
    }

    /// `world:anyone` read-only.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::READ, Id::anyone())]
    }

    /// All permissions for whichever identities the creator authenticated as.
    pub fn creator_all() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, Id::new(Id::AUTH_SCHEME, ""))]
    }
}

// ============================================================================
// Create modes and ephemeral owners
// ============================================================================

/// Owner value marking a container node.
pub const CONTAINER_EPHEMERAL_OWNER: i64 = i64::MIN;

/// High byte marking an extended (TTL) owner encoding.
const EXTENDED_MASK: i64 = 0xff00_0000_0000_0000_u64 as i64;

/// Bits selecting the extended owner type.
const EXTENDED_BIT_MASK: i64 = 0x00ff_ff00_0000_0000;

/// Extended type bits for TTL nodes.
const EXTENDED_BIT_TTL: i64 = 0x0000;

/// Largest TTL in milliseconds representable in the owner encoding.
pub const MAX_TTL: i64 = !(EXTENDED_MASK | EXTENDED_BIT_MASK);

/// How a node's lifetime is governed, decoded from its ephemeral owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralType {
    /// Regular persistent node.
    Void,
    /// Ephemeral node owned by a live session.
    Normal,
    /// Container node, removed by the server once empty.
    Container,
    /// Persistent node with a time-to-live.
    Ttl,
}

impl EphemeralType {
    /// Classifies an ephemeral owner value.
    pub fn of(ephemeral_owner: i64) -> Self {
        if ephemeral_owner == 0 {
            return Self::Void;
        }
        if ephemeral_owner == CONTAINER_EPHEMERAL_OWNER {
            return Self::Container;
        }
        if ephemeral_owner & EXTENDED_MASK == EXTENDED_MASK
            && ephemeral_owner & EXTENDED_BIT_MASK == EXTENDED_BIT_TTL
        {
            return Self::Ttl;
        }
        Self::Normal
    }

    /// Encodes a TTL into an ephemeral owner value.
    pub fn ttl_owner(ttl: i64) -> i64 {
        EXTENDED_MASK | EXTENDED_BIT_TTL | (ttl & MAX_TTL)
    }

    /// Extracts the TTL from an owner encoded by [`EphemeralType::ttl_owner`].
    pub fn ttl_of(ephemeral_owner: i64) -> Option<i64> {
        match Self::of(ephemeral_owner) {
            Self::Ttl => Some(ephemeral_owner & MAX_TTL),
            _ => None,
        }
    }
}

/// Node creation mode requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMode {
    /// Persistent node.
    Persistent,
    /// Ephemeral node tied to the creating session.
    Ephemeral,
    /// Persistent node with a sequential name suffix.
    PersistentSequential,
    /// Ephemeral node with a sequential name suffix.
    EphemeralSequential,
    /// Container node.
    Container,
    /// Persistent node with a TTL.
    PersistentWithTtl,
    /// Persistent sequential node with a TTL.
    PersistentSequentialWithTtl,
}

impl CreateMode {
    /// Decodes the wire flag, returning `None` for unknown values.
    pub fn from_flag(flag: i32) -> Option<Self> {
        match flag {
            0 => Some(Self::Persistent),
            1 => Some(Self::Ephemeral),
            2 => Some(Self::PersistentSequential),
            3 => Some(Self::EphemeralSequential),
            4 => Some(Self::Container),
            5 => Some(Self::PersistentWithTtl),
            6 => Some(Self::PersistentSequentialWithTtl),
            _ => None,
        }
    }

    /// Returns the wire flag.
    pub const fn flag(self) -> i32 {
        match self {
            Self::Persistent => 0,
            Self::Ephemeral => 1,
            Self::PersistentSequential => 2,
            Self::EphemeralSequential => 3,
            Self::Container => 4,
            Self::PersistentWithTtl => 5,
            Self::PersistentSequentialWithTtl => 6,
        }
    }

    /// Whether the node is owned by the creating session.
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    /// Whether the name receives a sequential suffix.
    pub const fn is_sequential(self) -> bool {
        matches!(
            self,
            Self::PersistentSequential
                | Self::EphemeralSequential
                | Self::PersistentSequentialWithTtl
        )
    }

    /// Whether this is a container node.
    pub const fn is_container(self) -> bool {
        matches!(self, Self::Container)
    }

    /// Whether the node carries a TTL.
    pub const fn is_ttl(self) -> bool {
        matches!(self, Self::PersistentWithTtl | Self::PersistentSequentialWithTtl)
    }
}

// ============================================================================
// Operation codes
// ============================================================================

/// Client operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    Notification,
    Create,
    Delete,
    Exists,
    GetData,
    SetData,
    GetAcl,
    SetAcl,
    GetChildren,
    Sync,
    Ping,
    GetChildren2,
    Check,
    Multi,
    Create2,
    Reconfig,
    CheckWatches,
    RemoveWatches,
    CreateContainer,
    DeleteContainer,
    CreateTtl,
    MultiRead,
    Auth,
    SetWatches,
    Sasl,
    GetEphemerals,
    GetAllChildrenNumber,
    SetWatches2,
    AddWatch,
    WhoAmI,
    CreateSession,
    CloseSession,
    Error,
}

impl OpCode {
    /// Returns the numeric wire code.
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Notification => 0,
            Self::Create => 1,
            Self::Delete => 2,
            Self::Exists => 3,
            Self::GetData => 4,
            Self::SetData => 5,
            Self::GetAcl => 6,
            Self::SetAcl => 7,
            Self::GetChildren => 8,
            Self::Sync => 9,
            Self::Ping => 11,
            Self::GetChildren2 => 12,
            Self::Check => 13,
            Self::Multi => 14,
            Self::Create2 => 15,
            Self::Reconfig => 16,
            Self::CheckWatches => 17,
            Self::RemoveWatches => 18,
            Self::CreateContainer => 19,
            Self::DeleteContainer => 20,
            Self::CreateTtl => 21,
            Self::MultiRead => 22,
            Self::Auth => 100,
            Self::SetWatches => 101,
            Self::Sasl => 102,
            Self::GetEphemerals => 103,
            Self::GetAllChildrenNumber => 104,
            Self::SetWatches2 => 105,
            Self::AddWatch => 106,
            Self::WhoAmI => 107,
            Self::CreateSession => -10,
            Self::CloseSession => -11,
            Self::Error => -1,
        }
    }

    /// Converts a numeric wire code, returning `None` for unknown values.
    pub fn from_i32(code: i32) -> Option<Self> {
        let op = match code {
            0 => Self::Notification,
            1 => Self::Create,
            2 => Self::Delete,
            3 => Self::Exists,
            4 => Self::GetData,
            5 => Self::SetData,
            6 => Self::GetAcl,
            7 => Self::SetAcl,
            8 => Self::GetChildren,
            9 => Self::Sync,
            11 => Self::Ping,
            12 => Self::GetChildren2,
            13 => Self::Check,
            14 => Self::Multi,
            15 => Self::Create2,
            16 => Self::Reconfig,
            17 => Self::CheckWatches,
            18 => Self::RemoveWatches,
            19 => Self::CreateContainer,
            20 => Self::DeleteContainer,
            21 => Self::CreateTtl,
            22 => Self::MultiRead,
            100 => Self::Auth,
            101 => Self::SetWatches,
            102 => Self::Sasl,
            103 => Self::GetEphemerals,
            104 => Self::GetAllChildrenNumber,
            105 => Self::SetWatches2,
            106 => Self::AddWatch,
            107 => Self::WhoAmI,
            -10 => Self::CreateSession,
            -11 => Self::CloseSession,
            -1 => Self::Error,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operation produces a transaction.
    pub const fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Create2
                | Self::CreateContainer
                | Self::CreateTtl
                | Self::Delete
                | Self::DeleteContainer
                | Self::SetData
                | Self::SetAcl
                | Self::Check
                | Self::Multi
                | Self::Reconfig
                | Self::CreateSession
                | Self::CloseSession
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
