//! Error types for the arbor prepare stage using snafu.
//!
//! Two layers:
//! - [`ErrorCode`]: the numeric result codes carried in error transactions and
//!   returned to clients.
//! - [`KeeperError`]: the typed failures raised while preparing a request. Each
//!   variant maps to exactly one [`ErrorCode`] through [`KeeperError::code`].
//!
//! A `KeeperError` is a *recognized* failure: the prepare stage turns it into
//! an error transaction instead of dropping the request.

use core::fmt;

use snafu::Snafu;

/// Result type for operations that fail with a [`KeeperError`].
pub type Result<T, E = KeeperError> = std::result::Result<T, E>;

/// Numeric result codes shared with clients and replicas.
///
/// Codes are organized into ranges:
///
/// | Range        | Domain  | Examples                                    |
/// |--------------|---------|---------------------------------------------|
/// | 0            | Success | `Ok`                                        |
/// | -1 ..= -99   | System  | Marshalling, bad arguments, reconfig state  |
/// | -100 ..      | API     | Missing nodes, version conflicts, ACLs      |
///
/// # Wire Format
///
/// Codes travel as their `i32` value inside `Txn::Error`. Use
/// [`ErrorCode::as_i32`] for serialization and [`ErrorCode::from_i32`] for
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Everything is fine.
    Ok = 0,

    // --- System errors ---
    /// Unclassified system failure.
    SystemError = -1,
    /// A sub-operation was not attempted because an earlier one failed.
    RuntimeInconsistency = -2,
    /// Data inconsistency detected.
    DataInconsistency = -3,
    /// Connection to the server was lost.
    ConnectionLoss = -4,
    /// Request payload could not be decoded or encoded.
    MarshallingError = -5,
    /// Operation is not implemented in this configuration.
    Unimplemented = -6,
    /// Operation timed out.
    OperationTimeout = -7,
    /// Invalid arguments.
    BadArguments = -8,
    /// Session is unknown to the server.
    UnknownSession = -12,
    /// No quorum of the proposed configuration is connected and synced.
    NewConfigNoQuorum = -13,
    /// Another reconfiguration is still in progress.
    ReconfigInProgress = -14,

    // --- API errors ---
    /// Generic API error; codes below this are user-level.
    ApiError = -100,
    /// Node does not exist.
    NoNode = -101,
    /// Caller lacks the required permission.
    NoAuth = -102,
    /// Expected version does not match.
    BadVersion = -103,
    /// Ephemeral nodes may not have children.
    NoChildrenForEphemerals = -108,
    /// Node already exists.
    NodeExists = -110,
    /// Node has children.
    NotEmpty = -111,
    /// Session has expired.
    SessionExpired = -112,
    /// ACL is empty or invalid.
    InvalidAcl = -114,
    /// Client authentication failed.
    AuthFailed = -115,
    /// Session moved to another server.
    SessionMoved = -118,
    /// Ephemeral node creation on a local session.
    EphemeralOnLocalSession = -120,
    /// Dynamic reconfiguration is disabled.
    ReconfigDisabled = -123,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            -1 => Some(Self::SystemError),
            -2 => Some(Self::RuntimeInconsistency),
            -3 => Some(Self::DataInconsistency),
            -4 => Some(Self::ConnectionLoss),
            -5 => Some(Self::MarshallingError),
            -6 => Some(Self::Unimplemented),
            -7 => Some(Self::OperationTimeout),
            -8 => Some(Self::BadArguments),
            -12 => Some(Self::UnknownSession),
            -13 => Some(Self::NewConfigNoQuorum),
            -14 => Some(Self::ReconfigInProgress),
            -100 => Some(Self::ApiError),
            -101 => Some(Self::NoNode),
            -102 => Some(Self::NoAuth),
            -103 => Some(Self::BadVersion),
            -108 => Some(Self::NoChildrenForEphemerals),
            -110 => Some(Self::NodeExists),
            -111 => Some(Self::NotEmpty),
            -112 => Some(Self::SessionExpired),
            -114 => Some(Self::InvalidAcl),
            -115 => Some(Self::AuthFailed),
            -118 => Some(Self::SessionMoved),
            -120 => Some(Self::EphemeralOnLocalSession),
            -123 => Some(Self::ReconfigDisabled),
            _ => None,
        }
    }

    /// Whether this code describes a client-caused condition rather than a
    /// server fault.
    #[must_use]
    pub const fn is_user_level(self) -> bool {
        (self as i32) < (Self::ApiError as i32)
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt, typically after
    /// backoff. Non-retryable errors require corrective action before retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss
                | Self::OperationTimeout
                | Self::NewConfigNoQuorum
                | Self::ReconfigInProgress
                | Self::SessionMoved
        )
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::Ok => "Not an error.",
            Self::SystemError | Self::DataInconsistency => {
                "Unexpected server state. Collect context and report as an issue."
            },
            Self::RuntimeInconsistency => {
                "An earlier operation in the same batch failed. Inspect the first error result."
            },
            Self::ConnectionLoss => "Reconnect and retry with backoff.",
            Self::MarshallingError => "Request could not be decoded. Check the client encoding.",
            Self::Unimplemented => "Enable the feature on the server or avoid this operation.",
            Self::OperationTimeout => "Retry with backoff.",
            Self::BadArguments => "Fix the request parameters and resubmit.",
            Self::UnknownSession | Self::SessionExpired => "Establish a new session.",
            Self::NewConfigNoQuorum => {
                "Wait until a quorum of the proposed configuration is connected, then retry."
            },
            Self::ReconfigInProgress => "Wait for the pending reconfiguration to commit, then retry.",
            Self::ApiError => "Inspect the request and the server logs.",
            Self::NoNode => "Create the node or its parent first.",
            Self::NoAuth => "Authenticate with an identity granted the required permission.",
            Self::BadVersion => "Re-read the node and retry with the current version.",
            Self::NoChildrenForEphemerals => "Create the child under a persistent parent.",
            Self::NodeExists => "Use a different path or update the existing node.",
            Self::NotEmpty => "Delete the node's children first.",
            Self::InvalidAcl => "Supply a non-empty ACL with valid identities.",
            Self::AuthFailed => "Check the supplied credentials.",
            Self::SessionMoved => "Reconnect to the server that owns the session.",
            Self::EphemeralOnLocalSession => {
                "Upgrade the session to a global session before creating ephemerals."
            },
            Self::ReconfigDisabled => "Enable dynamic reconfiguration on the server.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Recognized failure raised while preparing a request.
///
/// # Recovery Guide
///
/// | Variant                   | Retryable | Recovery Action                              |
/// | ------------------------- | --------- | -------------------------------------------- |
/// | `BadArguments`            | No        | Fix the path, mode or payload                |
/// | `NoNode`                  | No        | Create the node or its parent                |
/// | `NodeExists`              | No        | Use a different path                         |
/// | `NotEmpty`                | No        | Remove children first                        |
/// | `BadVersion`              | No        | Re-read and retry with the current version   |
/// | `NoAuth`                  | No        | Authenticate with a permitted identity       |
/// | `InvalidAcl`              | No        | Supply a valid, non-empty ACL                |
/// | `NoChildrenForEphemerals` | No        | Use a persistent parent                      |
/// | `Unimplemented`           | No        | Enable the feature                           |
/// | `ReconfigDisabled`        | No        | Enable reconfiguration                       |
/// | `ReconfigInProgress`      | Yes       | Wait for the pending reconfig                |
/// | `NewConfigNoQuorum`       | Yes       | Wait for followers to sync                   |
/// | `RuntimeInconsistency`    | No        | Inspect the first failure of the batch       |
/// | `Marshalling`             | No        | Fix the client encoding                      |
/// | `SessionExpired`          | No        | Open a new session                           |
/// | `SessionMoved`            | Yes       | Reconnect to the owning server               |
/// | `EphemeralOnLocalSession` | No        | Upgrade to a global session                  |
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum KeeperError {
    /// Malformed path, mode, TTL or membership description.
    #[snafu(display("Bad arguments for {path}"))]
    BadArguments {
        /// Offending path (or a short description when no path applies).
        path: String,
    },

    /// Target node or parent does not exist.
    #[snafu(display("No node for {path}"))]
    NoNode {
        /// Missing path.
        path: String,
    },

    /// Create target already exists.
    #[snafu(display("Node exists: {path}"))]
    NodeExists {
        /// Existing path.
        path: String,
    },

    /// Delete target still has children.
    #[snafu(display("Node not empty: {path}"))]
    NotEmpty {
        /// Non-empty path.
        path: String,
    },

    /// Expected version does not match the current one.
    #[snafu(display("Bad version for {path}"))]
    BadVersion {
        /// Path whose version was checked.
        path: String,
    },

    /// Caller lacks the required permission.
    #[snafu(display("No permission for {path}"))]
    NoAuth {
        /// Path whose ACL denied the request.
        path: String,
    },

    /// Supplied ACL is empty or names an invalid identity.
    #[snafu(display("Invalid ACL for {path}"))]
    InvalidAcl {
        /// Path the ACL was supplied for.
        path: String,
    },

    /// Parent of a create target is an ephemeral node.
    #[snafu(display("Ephemeral parent may not have children: {path}"))]
    NoChildrenForEphemerals {
        /// Path of the child being created.
        path: String,
    },

    /// Operation is disabled or has no implementation here.
    #[snafu(display("Unimplemented: {message}"))]
    Unimplemented {
        /// What was requested.
        message: String,
    },

    /// Dynamic reconfiguration is disabled.
    #[snafu(display("Reconfiguration is disabled"))]
    ReconfigDisabled,

    /// The previous reconfiguration has not committed yet.
    #[snafu(display("Reconfiguration in progress"))]
    ReconfigInProgress,

    /// The proposed configuration has no synced quorum.
    #[snafu(display("Proposed configuration has no synced quorum"))]
    NewConfigNoQuorum,

    /// Sub-operation skipped after an earlier failure in the same batch.
    #[snafu(display("Runtime inconsistency"))]
    RuntimeInconsistency,

    /// Payload could not be decoded.
    #[snafu(display("Marshalling error: {message}"))]
    Marshalling {
        /// Decoder message.
        message: String,
    },

    /// Session has expired or is closing.
    #[snafu(display("Session {session_id:#x} expired"))]
    SessionExpired {
        /// Raw session id.
        session_id: i64,
    },

    /// Session is owned by a different connection.
    #[snafu(display("Session {session_id:#x} moved"))]
    SessionMoved {
        /// Raw session id.
        session_id: i64,
    },

    /// Ephemeral creation attempted on a local session.
    #[snafu(display("Ephemeral node on local session {session_id:#x}"))]
    EphemeralOnLocalSession {
        /// Raw session id.
        session_id: i64,
    },
}

impl KeeperError {
    /// Returns the numeric result code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadArguments { .. } => ErrorCode::BadArguments,
            Self::NoNode { .. } => ErrorCode::NoNode,
            Self::NodeExists { .. } => ErrorCode::NodeExists,
            Self::NotEmpty { .. } => ErrorCode::NotEmpty,
            Self::BadVersion { .. } => ErrorCode::BadVersion,
            Self::NoAuth { .. } => ErrorCode::NoAuth,
            Self::InvalidAcl { .. } => ErrorCode::InvalidAcl,
            Self::NoChildrenForEphemerals { .. } => ErrorCode::NoChildrenForEphemerals,
            Self::Unimplemented { .. } => ErrorCode::Unimplemented,
            Self::ReconfigDisabled => ErrorCode::ReconfigDisabled,
            Self::ReconfigInProgress => ErrorCode::ReconfigInProgress,
            Self::NewConfigNoQuorum => ErrorCode::NewConfigNoQuorum,
            Self::RuntimeInconsistency => ErrorCode::RuntimeInconsistency,
            Self::Marshalling { .. } => ErrorCode::MarshallingError,
            Self::SessionExpired { .. } => ErrorCode::SessionExpired,
            Self::SessionMoved { .. } => ErrorCode::SessionMoved,
            Self::EphemeralOnLocalSession { .. } => ErrorCode::EphemeralOnLocalSession,
        }
    }

    /// Path the error refers to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::BadArguments { path }
            | Self::NoNode { path }
            | Self::NodeExists { path }
            | Self::NotEmpty { path }
            | Self::BadVersion { path }
            | Self::NoAuth { path }
            | Self::InvalidAcl { path }
            | Self::NoChildrenForEphemerals { path } => Some(path),
            _ => None,
        }
    }
}
