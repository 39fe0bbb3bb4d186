//! Error types for the prepare stage using snafu.
//!
//! A [`PrepError`] is either *recognized* ([`PrepError::Keeper`]), in which case
//! the request receives an error transaction carrying the specific code, or
//! *unrecognized*, in which case the failure is logged with a dump of the raw
//! payload and downgraded to a marshalling error.

use arbor_types::{ErrorCode, KeeperError, codec::CodecError};
use snafu::Snafu;

/// Result type for prepare-stage operations.
pub type Result<T, E = PrepError> = std::result::Result<T, E>;

/// Failure while preparing a single request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PrepError {
    /// Recognized failure with a specific result code.
    #[snafu(display("{source}"))]
    Keeper {
        /// The typed failure.
        source: KeeperError,
    },

    /// Request payload could not be decoded.
    #[snafu(display("Payload codec failure: {source}"))]
    Codec {
        /// The underlying codec error.
        source: CodecError,
    },

    /// Unexpected condition while preparing.
    #[snafu(display("Internal error: {message}"))]
    Internal {
        /// Error description.
        message: String,
    },
}

impl PrepError {
    /// Whether the failure maps to a specific result code.
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Keeper { .. })
    }

    /// Result code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Keeper { source } => source.code(),
            Self::Codec { .. } | Self::Internal { .. } => ErrorCode::MarshallingError,
        }
    }

    /// Error recorded on the request's result slot.
    pub fn to_keeper_error(&self) -> KeeperError {
        match self {
            Self::Keeper { source } => source.clone(),
            other => KeeperError::Marshalling { message: other.to_string() },
        }
    }
}

impl From<KeeperError> for PrepError {
    fn from(source: KeeperError) -> Self {
        Self::Keeper { source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_keeper_errors_are_recognized() {
        let err = PrepError::from(KeeperError::NoNode { path: "/a".into() });
        assert!(err.is_recognized());
        assert_eq!(err.code(), ErrorCode::NoNode);
        assert_eq!(err.to_keeper_error(), KeeperError::NoNode { path: "/a".into() });
    }

    #[test]
    fn test_codec_errors_downgrade_to_marshalling() {
        let source = arbor_types::codec::decode::<u64>(&[]).unwrap_err();
        let err = PrepError::Codec { source };
        assert!(!err.is_recognized());
        assert_eq!(err.code(), ErrorCode::MarshallingError);
        assert_eq!(err.to_keeper_error().code(), ErrorCode::MarshallingError);
    }

    #[test]
    fn test_internal_display() {
        let err = PrepError::Internal { message: "bad path encoding".into() };
        assert_eq!(err.to_string(), "Internal error: bad path encoding");
    }
}
