//! One framed chunk read, with the bounded timeout retry absorbed here so
//! the assembler above only ever sees hard failures.

use super::error::StreamError;
use super::retry::CHUNK_FETCH_RETRY;
use super::transport::{FileLocation, MediaSession, TransportError};
use bytes::Bytes;
use metrics::counter;
use std::sync::Arc;

/// Fetch `limit` bytes at `offset`. Timeouts are retried with exponential
/// backoff; every other transport error propagates immediately. An empty
/// result means end-of-file, not an error.
pub(crate) async fn fetch_chunk(
    session: &Arc<dyn MediaSession>,
    location: &FileLocation,
    offset: u64,
    limit: u32,
) -> Result<Bytes, StreamError> {
    counter!("hub_chunk_fetches_total").increment(1);

    let result = CHUNK_FETCH_RETRY
        .run(
            |e| matches!(e, TransportError::Timeout),
            || {
                let session = session.clone();
                let location = location.clone();
                async move { session.fetch_chunk(&location, offset, limit).await }
            },
        )
        .await;

    match result {
        Ok(chunk) => Ok(chunk),
        Err(TransportError::Timeout) => {
            counter!("hub_chunk_fetch_timeouts_total").increment(1);
            tracing::error!(offset, "chunk fetch timed out after all retries");
            Err(StreamError::Timeout { offset })
        }
        Err(other) => Err(other.into()),
    }
}
