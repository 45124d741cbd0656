//! Client side of the hub, the messaging backend that stores the actual
//! audio bytes. Nothing in here persists media locally: every byte served
//! over HTTP is fetched on demand from the hub's file-transfer protocol.
//!
//! The pieces, bottom up:
//!
//! - [`transport`] — traits describing what we consume from the hub:
//!   message resolution, per-datacenter authenticated sessions, framed
//!   chunk reads.
//! - [`wire`] — the production [`HubTransport`] implementation over the
//!   hub's length-prefixed TCP protocol.
//! - [`descriptor`] — resolving a (chat, message) reference into an
//!   immutable [`FileDescriptor`].
//! - [`session`] — one cached media session per (worker, datacenter),
//!   including the cross-datacenter authorization import handshake.
//! - [`fetch`] — single chunk reads with bounded timeout retry.
//! - [`stream`] — the range-aware chunk assembly consumed by the HTTP
//!   layer.
//! - [`worker`] / [`pool`] — independent client identities and the
//!   least-loaded selection across them.

pub mod descriptor;
pub mod error;
pub mod fetch;
pub mod pool;
pub mod retry;
pub mod session;
pub mod stream;
pub mod transport;
pub mod wire;
pub mod worker;

pub use descriptor::FileDescriptor;
pub use error::StreamError;
pub use pool::HubPool;
pub use stream::ChunkPlan;
pub use transport::{
    AuthKey, DcId, ExportedAuthorization, FileLocation, HubTransport, MediaInfo, MediaKind,
    MediaSession, RawMessage, TransportError,
};
pub use worker::Worker;

/// Chunk size used for all hub file reads, and therefore the alignment the
/// stream assembler works in.
pub const CHUNK_SIZE: u64 = 512 * 1024;
