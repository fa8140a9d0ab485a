//! Resolution outcomes and failure taxonomy
//!
//! Every failure here is recovered by rendering the fallback material; none of
//! them is ever shown to the user.

use bytes::Bytes;
use thiserror::Error;

/// Why a resolution attempt produced no usable bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("panorama has no locator")]
    NoLocator,
    #[error("bytes are not a decodable image")]
    DecodeFailure,
    #[error("no resolution tier produced the image")]
    NotFound,
    #[error("network fetch did not complete before the deadline")]
    NetworkTimeout,
    #[error("network fetch failed: {0}")]
    NetworkError(String),
    #[error("resolution cancelled by a newer session")]
    Cancelled,
}

/// Errors from a `ByteFetcher`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("remote fetching is not available")]
    Unsupported,
}

impl From<FetchError> for ResolveError {
    fn from(e: FetchError) -> Self {
        ResolveError::NetworkError(e.to_string())
    }
}

/// Result of one resolution attempt, kept for the session only
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAsset {
    Bytes(Bytes),
    Failure(ResolveError),
}

impl ResolvedAsset {
    pub fn is_bytes(&self) -> bool {
        matches!(self, ResolvedAsset::Bytes(_))
    }

    pub fn failure(&self) -> Option<&ResolveError> {
        match self {
            ResolvedAsset::Failure(e) => Some(e),
            ResolvedAsset::Bytes(_) => None,
        }
    }
}
