use super::transport::{DcId, TransportError};
use service_core::error::AppError;
use thiserror::Error;

/// Errors surfaced by the streaming core to the HTTP layer.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Message missing, empty, or carrying no recognized media kind.
    #[error("file not found")]
    NotFound,

    /// The cross-datacenter authorization import exhausted its retry
    /// budget. The (worker, datacenter) pair keeps no session.
    #[error("authorization import failed for datacenter {0}")]
    AuthorizationFailed(DcId),

    /// A chunk fetch kept timing out after all backoff retries.
    #[error("chunk fetch timed out at offset {offset}")]
    Timeout { offset: u64 },

    /// Any other transport or hub error. Never retried.
    #[error("hub protocol error: {0}")]
    Protocol(#[source] TransportError),

    /// No started worker available to serve the stream.
    #[error("no hub worker available")]
    CapacityUnavailable,

    /// Requested byte window fails `0 <= start <= end < size`.
    #[error("invalid byte range {start}..={end} for file of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        StreamError::Protocol(err)
    }
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound => AppError::NotFound(anyhow::anyhow!("file not found")),
            StreamError::CapacityUnavailable | StreamError::AuthorizationFailed(_) => {
                AppError::ServiceUnavailable
            }
            StreamError::InvalidRange { size, .. } => AppError::RangeNotSatisfiable(size),
            StreamError::Timeout { .. } | StreamError::Protocol(_) => {
                AppError::BadGateway(err.to_string())
            }
        }
    }
}
