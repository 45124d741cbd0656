//! What the streaming core consumes from the hub, expressed as traits.
//!
//! The production implementation is [`crate::hub::wire::WireTransport`];
//! tests substitute in-memory fakes. Everything above this module (locator,
//! sessions, fetcher, assembler) is written purely against these traits.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Hub-side datacenter identifier. Sessions and authorization are scoped
/// per datacenter.
pub type DcId = i32;

/// Opaque authorization key material for one datacenter.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(pub Vec<u8>);

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never log key material
        write!(f, "AuthKey({} bytes)", self.0.len())
    }
}

/// Ticket produced by the home datacenter and consumed by a foreign one
/// during the authorization import handshake.
#[derive(Debug, Clone)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Vec<u8>,
}

/// Protocol-level location of a stored file, sufficient for chunk reads.
///
/// The `file_reference` blob can expire hub-side; a stale one surfaces as a
/// protocol error and callers re-resolve after the next cache sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
}

/// The media kinds a channel message can carry. Exactly one applies per
/// stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Document,
    Photo,
    Video,
    Audio,
    Voice,
    VideoNote,
    Sticker,
    Animation,
}

/// One media object attached to a resolved message, as decoded off the
/// wire. Display attributes are optional; the locator defaults them.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub kind: MediaKind,
    pub dc_id: DcId,
    pub media_id: i64,
    pub access_hash: i64,
    pub file_reference: Vec<u8>,
    pub file_unique_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    /// Track title as tagged by the uploader (audio only).
    pub title: Option<String>,
    /// Performer as tagged by the uploader (audio only).
    pub performer: Option<String>,
}

/// A resolved channel message. `media` is empty for service messages and
/// plain-text posts.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub media: Vec<MediaInfo>,
}

/// Errors surfaced by a [`HubTransport`] or [`MediaSession`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// A single request exceeded the protocol deadline. The only error the
    /// chunk fetcher treats as transient.
    #[error("hub request timed out")]
    Timeout,

    /// The foreign datacenter rejected imported authorization bytes. The
    /// only error the authorization handshake retries on.
    #[error("invalid authorization bytes")]
    InvalidAuthBytes,

    /// The hub answered with a protocol-level error.
    #[error("hub rpc error: {0}")]
    Rpc(String),

    /// A frame arrived that does not decode as its opcode promises.
    #[error("malformed hub frame: {0}")]
    Codec(&'static str),

    /// The underlying connection is gone.
    #[error("hub connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One hub client identity. Each worker owns exactly one transport; the
/// transport owns the long-lived home-datacenter connection behind it.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Authenticate and open the home-datacenter connection. Must be called
    /// once before anything else.
    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self);

    /// Home datacenter of this identity. Only valid after `start`.
    fn home_dc(&self) -> DcId;

    /// Resolve a (chat, message) reference. `Ok(None)` means the message is
    /// missing or empty; the caller decides whether that is an error.
    async fn resolve_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<RawMessage>, TransportError>;

    /// Long-lived authorization key for the home datacenter.
    async fn auth_key(&self) -> Result<AuthKey, TransportError>;

    /// Bootstrap a temporary authorization key scoped to a foreign
    /// datacenter.
    async fn bootstrap_auth(&self, dc: DcId) -> Result<AuthKey, TransportError>;

    /// Ask the home datacenter for an export-authorization ticket targeted
    /// at `dc`.
    async fn export_authorization(&self, dc: DcId) -> Result<ExportedAuthorization, TransportError>;

    /// Open an authenticated transport session against one datacenter.
    async fn open_session(
        &self,
        dc: DcId,
        key: AuthKey,
        is_media: bool,
    ) -> Result<Arc<dyn MediaSession>, TransportError>;

    /// Next message pushed by the hub for channels this identity is in.
    /// Returns `None` once the transport is stopped. Only the primary
    /// worker's feed is consumed by the indexer.
    async fn next_message(&self) -> Option<RawMessage>;
}

/// A stateful, authenticated connection to one datacenter, shared by every
/// concurrent stream routed to the same (worker, datacenter) pair.
#[async_trait]
pub trait MediaSession: Send + Sync {
    fn dc_id(&self) -> DcId;

    /// Run the import half of the cross-datacenter authorization handshake.
    async fn import_authorization(
        &self,
        auth: &ExportedAuthorization,
    ) -> Result<(), TransportError>;

    /// One framed file read: `limit` bytes at `offset`. An empty response
    /// means end-of-file.
    async fn fetch_chunk(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, TransportError>;

    async fn stop(&self);
}
