use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Stage of a sync attempt at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    Projection,
    Staging,
    Verification,
    Apply,
    Delete,
    Cleanup,
}

impl Display for SyncStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStage::Projection => write!(f, "projection"),
            SyncStage::Staging => write!(f, "staging"),
            SyncStage::Verification => write!(f, "verification"),
            SyncStage::Apply => write!(f, "apply"),
            SyncStage::Delete => write!(f, "delete"),
            SyncStage::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Failures reported by a [`SyncClient`](crate::SyncClient) implementation
///
/// The orchestrator never inspects these; it only attaches the stage at which
/// they happened.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest_middleware::Error),

    /// Mimir API returned an error response
    #[error("Mimir API error: HTTP {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from Mimir
        message: String,
    },

    /// The configuration document was rejected as invalid
    #[error("configuration rejected: {0}")]
    Rejected(String),

    /// The staged document could not be read
    #[error("failed to read staged document {}: {source}", path.display())]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request payload could not be encoded
    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_yaml::Error),

    /// The endpoint URL cannot carry an API path
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
}

impl RemoteError {
    /// Check if the error is retryable
    ///
    /// Returns `true` for:
    /// - Network/connection errors
    /// - Timeout errors
    /// - Server errors (5xx status codes)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(source) => {
                if let reqwest_middleware::Error::Reqwest(err) = source {
                    return err.is_connect() || err.is_timeout();
                }
                if let Some(reqwest_err) = StdError::source(source) {
                    if let Some(err) = reqwest_err.downcast_ref::<reqwest::Error>() {
                        return err.is_connect() || err.is_timeout();
                    }
                }
                false
            }
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors that can occur while synchronizing a tenant's Alertmanager configuration
#[derive(Debug, Error)]
pub enum SyncError {
    /// The desired configuration could not be encoded as YAML
    #[error("failed to serialize alertmanager configuration: {0}")]
    Serialization(#[source] serde_yaml::Error),

    /// The tenant ID cannot be used as a staging path segment
    #[error("invalid tenant ID {tenant:?}: {reason}")]
    InvalidTenant {
        tenant: String,
        reason: &'static str,
    },

    /// Writing the staged document failed
    #[error("failed to stage configuration at {}: {source}", path.display())]
    StagingWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing the staged document failed
    #[error("failed to remove staged configuration {}: {source}", path.display())]
    StagingCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document was rejected before being applied
    #[error("alertmanager configuration verification failed: {0}")]
    Verification(#[source] RemoteError),

    /// Loading the document into Mimir failed
    #[error("failed to load alertmanager configuration: {0}")]
    Apply(#[source] RemoteError),

    /// Removing the tenant's configuration from Mimir failed
    #[error("failed to delete alertmanager configuration: {0}")]
    Delete(#[source] RemoteError),

    /// The caller cancelled the sync while a remote call was in flight
    #[error("sync cancelled during {stage}")]
    Cancelled { stage: SyncStage },

    /// The sync deadline elapsed while a remote call was in flight
    #[error("sync timed out after {after:?} during {stage}")]
    Timeout { stage: SyncStage, after: Duration },

    /// Failed to build HTTP client
    #[error("Failed to build HTTP client: {0}")]
    BuildHttpClient(#[source] reqwest::Error),
}

impl SyncError {
    /// Stage of the sync attempt this error belongs to
    ///
    /// Returns `None` for errors raised outside of a sync attempt, such as
    /// client construction.
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            Self::Serialization(_) => Some(SyncStage::Projection),
            Self::InvalidTenant { .. } | Self::StagingWrite { .. } => Some(SyncStage::Staging),
            Self::StagingCleanup { .. } => Some(SyncStage::Cleanup),
            Self::Verification(_) => Some(SyncStage::Verification),
            Self::Apply(_) => Some(SyncStage::Apply),
            Self::Delete(_) => Some(SyncStage::Delete),
            Self::Cancelled { stage } | Self::Timeout { stage, .. } => Some(*stage),
            Self::BuildHttpClient(_) => None,
        }
    }

    /// Check if re-running the whole sync may succeed
    ///
    /// Returns `true` for:
    /// - Retryable remote failures (see [`RemoteError::is_retryable`])
    /// - Local I/O failures while staging
    /// - Cancellation and timeouts
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Verification(remote) | Self::Apply(remote) | Self::Delete(remote) => {
                remote.is_retryable()
            }
            Self::StagingWrite { .. } | Self::StagingCleanup { .. } => true,
            Self::Cancelled { .. } | Self::Timeout { .. } => true,
            Self::Serialization(_) | Self::InvalidTenant { .. } | Self::BuildHttpClient(_) => {
                false
            }
        }
    }
}
