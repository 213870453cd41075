use serde_derive::{Deserialize, Serialize};

/// Result alias used throughout the crate.
pub type CResult<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the framework.
///
/// These are the tagged kinds a consensus engine or client can react to.
/// Structural framework violations (double mount, duplicate route, commit
/// failure on a backing engine) are not represented here: they are fatal and
/// panic instead, since the process cannot continue from them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The transaction bytes could not be decoded.
    TxDecode(String),

    /// Unrouted message, empty transaction or unknown query path.
    UnknownRequest(String),

    /// A message failed its basic validity check.
    InvalidSequence(String),

    /// The transaction or block gas meter was exhausted.
    OutOfGas(String),

    /// A handler signalled a failure.
    Internal(String),

    /// A multi-store load was asked for a version that does not exist.
    InvalidVersion(String),
}

impl Error {
    /// Stable numeric code reported on the consensus wire.
    pub fn code(&self) -> u32 {
        match self {
            Error::Internal(_) => 1,
            Error::TxDecode(_) => 2,
            Error::InvalidSequence(_) => 3,
            Error::UnknownRequest(_) => 6,
            Error::OutOfGas(_) => 12,
            Error::InvalidVersion(_) => 14,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    pub fn unknown_request(msg: impl Into<String>) -> Self {
        Error::UnknownRequest(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TxDecode(msg) => write!(f, "tx decode: {}", msg),
            Error::UnknownRequest(msg) => write!(f, "unknown request: {}", msg),
            Error::InvalidSequence(msg) => write!(f, "invalid sequence: {}", msg),
            Error::OutOfGas(msg) => write!(f, "out of gas: {}", msg),
            Error::Internal(msg) => write!(f, "internal: {}", msg),
            Error::InvalidVersion(msg) => write!(f, "invalid version: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
