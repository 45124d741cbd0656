//! Production [`HubTransport`] over the hub's internal file-transfer
//! protocol: length-prefixed frames on TCP, request/response correlation,
//! and per-datacenter authenticated sessions.
//!
//! Frame layout on the wire:
//!
//! ```text
//! u32 LE  frame length (everything after this field)
//! u64 LE  correlation id (0 for server pushes)
//! u8      opcode
//! ...     opcode-specific payload
//! ```

use super::transport::{
    AuthKey, DcId, ExportedAuthorization, FileLocation, HubTransport, MediaInfo, MediaKind,
    MediaSession, RawMessage, TransportError,
};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tokio_util::sync::CancellationToken;

/// Per-request protocol deadline. A request that misses it surfaces as
/// [`TransportError::Timeout`], the one error the chunk fetcher retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunk reads top out at 512 KiB; anything bigger than this is a framing
/// bug, not a payload.
const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

mod opcodes {
    pub const LOGIN: u8 = 0x01;
    pub const RESOLVE: u8 = 0x02;
    pub const BOOTSTRAP_AUTH: u8 = 0x03;
    pub const EXPORT_AUTH: u8 = 0x04;
    pub const IMPORT_AUTH: u8 = 0x05;
    pub const GET_FILE: u8 = 0x06;
    pub const BIND: u8 = 0x07;

    pub const PUSH_MESSAGE: u8 = 0x10;

    pub const LOGIN_OK: u8 = 0x41;
    pub const MESSAGE: u8 = 0x42;
    pub const MESSAGE_EMPTY: u8 = 0x43;
    pub const AUTH_KEY: u8 = 0x44;
    pub const EXPORTED_AUTH: u8 = 0x45;
    pub const IMPORTED: u8 = 0x46;
    pub const FILE_CHUNK: u8 = 0x47;
    pub const BOUND: u8 = 0x48;

    pub const ERROR: u8 = 0x7f;
}

mod error_codes {
    pub const AUTH_BYTES_INVALID: u32 = 0x01;
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub correlation: u64,
    pub opcode: u8,
    pub payload: Bytes,
}

#[derive(Default)]
pub(crate) struct HubCodec;

impl Decoder for HubCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len < 9 || len > MAX_FRAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("frame length {len} out of bounds"),
            ));
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let mut frame = src.split_to(len).freeze();
        let correlation = frame.get_u64_le();
        let opcode = frame.get_u8();
        Ok(Some(Frame {
            correlation,
            opcode,
            payload: frame,
        }))
    }
}

impl Encoder<Frame> for HubCodec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = 9 + frame.payload.len();
        dst.reserve(4 + len);
        dst.put_u32_le(len as u32);
        dst.put_u64_le(frame.correlation);
        dst.put_u8(frame.opcode);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

// ---- payload primitives ----------------------------------------------------

fn put_bytes(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32_le(value.len() as u32);
    buf.extend_from_slice(value);
}

fn put_str(buf: &mut BytesMut, value: &str) {
    put_bytes(buf, value.as_bytes());
}

fn get_u8(buf: &mut Bytes) -> Result<u8, TransportError> {
    if buf.remaining() < 1 {
        return Err(TransportError::Codec("truncated u8"));
    }
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut Bytes) -> Result<u32, TransportError> {
    if buf.remaining() < 4 {
        return Err(TransportError::Codec("truncated u32"));
    }
    Ok(buf.get_u32_le())
}

fn get_i32(buf: &mut Bytes) -> Result<i32, TransportError> {
    if buf.remaining() < 4 {
        return Err(TransportError::Codec("truncated i32"));
    }
    Ok(buf.get_i32_le())
}

fn get_u64(buf: &mut Bytes) -> Result<u64, TransportError> {
    if buf.remaining() < 8 {
        return Err(TransportError::Codec("truncated u64"));
    }
    Ok(buf.get_u64_le())
}

fn get_i64(buf: &mut Bytes) -> Result<i64, TransportError> {
    if buf.remaining() < 8 {
        return Err(TransportError::Codec("truncated i64"));
    }
    Ok(buf.get_i64_le())
}

fn get_blob(buf: &mut Bytes) -> Result<Bytes, TransportError> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(TransportError::Codec("truncated blob"));
    }
    Ok(buf.split_to(len))
}

fn get_str(buf: &mut Bytes) -> Result<String, TransportError> {
    let blob = get_blob(buf)?;
    String::from_utf8(blob.to_vec()).map_err(|_| TransportError::Codec("invalid utf-8"))
}

fn media_kind(tag: u8) -> Result<MediaKind, TransportError> {
    Ok(match tag {
        0 => MediaKind::Document,
        1 => MediaKind::Photo,
        2 => MediaKind::Video,
        3 => MediaKind::Audio,
        4 => MediaKind::Voice,
        5 => MediaKind::VideoNote,
        6 => MediaKind::Sticker,
        7 => MediaKind::Animation,
        _ => return Err(TransportError::Codec("unknown media kind")),
    })
}

fn decode_message(mut payload: Bytes) -> Result<RawMessage, TransportError> {
    let chat_id = get_i64(&mut payload)?;
    let message_id = get_i64(&mut payload)?;
    let count = get_u32(&mut payload)? as usize;
    let mut media = Vec::with_capacity(count);
    for _ in 0..count {
        let kind = media_kind(get_u8(&mut payload)?)?;
        let dc_id = get_i32(&mut payload)?;
        let media_id = get_i64(&mut payload)?;
        let access_hash = get_i64(&mut payload)?;
        let file_reference = get_blob(&mut payload)?.to_vec();
        let file_unique_id = get_str(&mut payload)?;
        let file_name = get_str(&mut payload)?;
        let file_size = get_u64(&mut payload)?;
        let mime_type = get_str(&mut payload)?;
        let title = get_str(&mut payload)?;
        let performer = get_str(&mut payload)?;
        media.push(MediaInfo {
            kind,
            dc_id,
            media_id,
            access_hash,
            file_reference,
            file_unique_id,
            file_name: (!file_name.is_empty()).then_some(file_name),
            file_size: (file_size > 0).then_some(file_size),
            mime_type: (!mime_type.is_empty()).then_some(mime_type),
            title: (!title.is_empty()).then_some(title),
            performer: (!performer.is_empty()).then_some(performer),
        });
    }
    Ok(RawMessage {
        chat_id,
        message_id,
        media,
    })
}

// ---- connection -------------------------------------------------------------

/// One TCP connection with its reader/writer tasks. Requests are matched to
/// responses via the correlation id in a pending map; pushed messages
/// (correlation 0) are routed into the ingestion feed.
struct Connection {
    peer: String,
    tx: mpsc::Sender<Frame>,
    pending: Arc<DashMap<u64, oneshot::Sender<Frame>>>,
    next_correlation: AtomicU64,
    shutdown: CancellationToken,
}

impl Connection {
    async fn open(
        peer: &str,
        pushes: Option<mpsc::Sender<RawMessage>>,
    ) -> Result<Arc<Connection>, TransportError> {
        let stream = TcpStream::connect(peer).await?;
        let (mut sink, mut frames) = Framed::new(stream, HubCodec).split();

        let (tx, mut rx) = mpsc::channel::<Frame>(64);
        let pending: Arc<DashMap<u64, oneshot::Sender<Frame>>> = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        {
            let pending = pending.clone();
            let shutdown = shutdown.clone();
            let peer = peer.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        frame = frames.next() => match frame {
                            Some(Ok(frame)) if frame.opcode == opcodes::PUSH_MESSAGE => {
                                if let Some(pushes) = &pushes {
                                    match decode_message(frame.payload) {
                                        Ok(message) => {
                                            if pushes.send(message).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(err) => {
                                            tracing::warn!(peer = %peer, error = %err, "dropping malformed push");
                                        }
                                    }
                                }
                            }
                            Some(Ok(frame)) => {
                                if let Some((_, waiter)) = pending.remove(&frame.correlation) {
                                    let _ = waiter.send(frame);
                                }
                            }
                            Some(Err(err)) => {
                                tracing::error!(peer = %peer, error = %err, "hub connection read failed");
                                break;
                            }
                            None => break,
                        }
                    }
                }
                // any in-flight request now resolves to Closed
                pending.clear();
            });
        }

        Ok(Arc::new(Connection {
            peer: peer.to_string(),
            tx,
            pending,
            next_correlation: AtomicU64::new(1),
            shutdown,
        }))
    }

    async fn invoke(&self, opcode: u8, payload: Bytes) -> Result<Frame, TransportError> {
        let correlation = self.next_correlation.fetch_add(1, Ordering::Relaxed);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.insert(correlation, waiter_tx);

        let frame = Frame {
            correlation,
            opcode,
            payload,
        };
        if self.tx.send(frame).await.is_err() {
            self.pending.remove(&correlation);
            return Err(TransportError::Closed);
        }

        let frame = match timeout(REQUEST_TIMEOUT, waiter_rx).await {
            Err(_) => {
                self.pending.remove(&correlation);
                tracing::warn!(peer = %self.peer, opcode, "hub request timed out");
                return Err(TransportError::Timeout);
            }
            Ok(Err(_)) => return Err(TransportError::Closed),
            Ok(Ok(frame)) => frame,
        };

        if frame.opcode == opcodes::ERROR {
            let mut payload = frame.payload;
            let code = get_u32(&mut payload)?;
            let message = get_str(&mut payload).unwrap_or_default();
            return Err(match code {
                error_codes::AUTH_BYTES_INVALID => TransportError::InvalidAuthBytes,
                _ => TransportError::Rpc(message),
            });
        }
        Ok(frame)
    }

    fn close(&self) {
        self.shutdown.cancel();
    }
}

fn expect(frame: Frame, opcode: u8) -> Result<Bytes, TransportError> {
    if frame.opcode != opcode {
        return Err(TransportError::Codec("unexpected response opcode"));
    }
    Ok(frame.payload)
}

// ---- transport --------------------------------------------------------------

struct HomeState {
    dc: DcId,
    auth_key: AuthKey,
    conn: Arc<Connection>,
}

/// One hub identity over the wire protocol. Holds the long-lived
/// home-datacenter connection; media sessions get connections of their own.
pub struct WireTransport {
    label: String,
    token: Secret<String>,
    endpoints: HashMap<DcId, String>,
    default_dc: DcId,
    state: RwLock<Option<HomeState>>,
    push_tx: std::sync::Mutex<Option<mpsc::Sender<RawMessage>>>,
    push_rx: tokio::sync::Mutex<mpsc::Receiver<RawMessage>>,
}

impl WireTransport {
    pub fn new(
        label: impl Into<String>,
        token: Secret<String>,
        endpoints: HashMap<DcId, String>,
        default_dc: DcId,
    ) -> WireTransport {
        let (push_tx, push_rx) = mpsc::channel(256);
        WireTransport {
            label: label.into(),
            token,
            endpoints,
            default_dc,
            state: RwLock::new(None),
            push_tx: std::sync::Mutex::new(Some(push_tx)),
            push_rx: tokio::sync::Mutex::new(push_rx),
        }
    }

    fn endpoint(&self, dc: DcId) -> Result<String, TransportError> {
        self.endpoints
            .get(&dc)
            .cloned()
            .ok_or_else(|| TransportError::Rpc(format!("no endpoint configured for datacenter {dc}")))
    }

    fn home(&self) -> Result<(Arc<Connection>, DcId), TransportError> {
        let state = self.state.read().expect("home state lock poisoned");
        match state.as_ref() {
            Some(home) => Ok((home.conn.clone(), home.dc)),
            None => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl HubTransport for WireTransport {
    /// Dial the default datacenter and log in. When the hub answers with a
    /// different home datacenter for this identity, redial there once.
    async fn start(&self) -> Result<(), TransportError> {
        let mut dc = self.default_dc;
        for _ in 0..2 {
            let pushes = self.push_tx.lock().expect("push sender lock poisoned").clone();
            let conn = Connection::open(&self.endpoint(dc)?, pushes).await?;

            let mut payload = BytesMut::new();
            put_str(&mut payload, self.token.expose_secret());
            let frame = conn.invoke(opcodes::LOGIN, payload.freeze()).await?;
            let mut ok = expect(frame, opcodes::LOGIN_OK)?;
            let home_dc = get_i32(&mut ok)?;
            let key = get_blob(&mut ok)?;

            if home_dc != dc {
                tracing::info!(worker = %self.label, from = dc, to = home_dc, "migrating to home datacenter");
                conn.close();
                dc = home_dc;
                continue;
            }

            *self.state.write().expect("home state lock poisoned") = Some(HomeState {
                dc,
                auth_key: AuthKey(key.to_vec()),
                conn,
            });
            tracing::info!(worker = %self.label, dc, "hub transport started");
            return Ok(());
        }
        Err(TransportError::Rpc("datacenter migration did not settle".into()))
    }

    async fn stop(&self) {
        self.push_tx.lock().expect("push sender lock poisoned").take();
        if let Some(home) = self.state.write().expect("home state lock poisoned").take() {
            home.conn.close();
        }
        tracing::info!(worker = %self.label, "hub transport stopped");
    }

    fn home_dc(&self) -> DcId {
        self.state
            .read()
            .expect("home state lock poisoned")
            .as_ref()
            .map(|home| home.dc)
            .unwrap_or(self.default_dc)
    }

    async fn resolve_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<RawMessage>, TransportError> {
        let (conn, _) = self.home()?;
        let mut payload = BytesMut::new();
        payload.put_i64_le(chat_id);
        payload.put_i64_le(message_id);
        let frame = conn.invoke(opcodes::RESOLVE, payload.freeze()).await?;
        match frame.opcode {
            opcodes::MESSAGE_EMPTY => Ok(None),
            opcodes::MESSAGE => Ok(Some(decode_message(frame.payload)?)),
            _ => Err(TransportError::Codec("unexpected response opcode")),
        }
    }

    async fn auth_key(&self) -> Result<AuthKey, TransportError> {
        let state = self.state.read().expect("home state lock poisoned");
        state
            .as_ref()
            .map(|home| home.auth_key.clone())
            .ok_or(TransportError::Closed)
    }

    async fn bootstrap_auth(&self, dc: DcId) -> Result<AuthKey, TransportError> {
        let conn = Connection::open(&self.endpoint(dc)?, None).await?;
        let result = conn.invoke(opcodes::BOOTSTRAP_AUTH, Bytes::new()).await;
        conn.close();
        let mut payload = expect(result?, opcodes::AUTH_KEY)?;
        Ok(AuthKey(get_blob(&mut payload)?.to_vec()))
    }

    async fn export_authorization(&self, dc: DcId) -> Result<ExportedAuthorization, TransportError> {
        let (conn, _) = self.home()?;
        let mut payload = BytesMut::new();
        payload.put_i32_le(dc);
        let frame = conn.invoke(opcodes::EXPORT_AUTH, payload.freeze()).await?;
        let mut ok = expect(frame, opcodes::EXPORTED_AUTH)?;
        Ok(ExportedAuthorization {
            id: get_i64(&mut ok)?,
            bytes: get_blob(&mut ok)?.to_vec(),
        })
    }

    async fn open_session(
        &self,
        dc: DcId,
        key: AuthKey,
        is_media: bool,
    ) -> Result<Arc<dyn MediaSession>, TransportError> {
        let conn = Connection::open(&self.endpoint(dc)?, None).await?;
        let mut payload = BytesMut::new();
        put_bytes(&mut payload, &key.0);
        payload.put_u8(is_media as u8);
        let frame = conn.invoke(opcodes::BIND, payload.freeze()).await?;
        expect(frame, opcodes::BOUND)?;
        Ok(Arc::new(WireSession { dc, conn }))
    }

    async fn next_message(&self) -> Option<RawMessage> {
        self.push_rx.lock().await.recv().await
    }
}

struct WireSession {
    dc: DcId,
    conn: Arc<Connection>,
}

#[async_trait]
impl MediaSession for WireSession {
    fn dc_id(&self) -> DcId {
        self.dc
    }

    async fn import_authorization(
        &self,
        auth: &ExportedAuthorization,
    ) -> Result<(), TransportError> {
        let mut payload = BytesMut::new();
        payload.put_i64_le(auth.id);
        put_bytes(&mut payload, &auth.bytes);
        let frame = self.conn.invoke(opcodes::IMPORT_AUTH, payload.freeze()).await?;
        expect(frame, opcodes::IMPORTED)?;
        Ok(())
    }

    async fn fetch_chunk(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, TransportError> {
        let mut payload = BytesMut::new();
        payload.put_i64_le(location.media_id);
        payload.put_i64_le(location.access_hash);
        put_bytes(&mut payload, &location.file_reference);
        payload.put_u64_le(offset);
        payload.put_u32_le(limit);
        let frame = self.conn.invoke(opcodes::GET_FILE, payload.freeze()).await?;
        let mut ok = expect(frame, opcodes::FILE_CHUNK)?;
        get_blob(&mut ok)
    }

    async fn stop(&self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_waits_for_a_complete_frame() {
        let mut codec = HubCodec;
        let mut payload = BytesMut::new();
        payload.put_u64_le(7); // correlation
        payload.put_u8(opcodes::IMPORTED);
        payload.put_u32_le(0xdeadbeef);

        let mut wire = BytesMut::new();
        wire.put_u32_le(payload.len() as u32);
        wire.extend_from_slice(&payload);

        // feed everything but the last byte: no frame yet
        let mut partial = BytesMut::from(&wire[..wire.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&wire[wire.len() - 1..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.correlation, 7);
        assert_eq!(frame.opcode, opcodes::IMPORTED);
        assert_eq!(frame.payload.len(), 4);
        assert!(partial.is_empty());
    }

    #[test]
    fn decoder_rejects_oversized_frames() {
        let mut codec = HubCodec;
        let mut wire = BytesMut::new();
        wire.put_u32_le((MAX_FRAME_LEN + 1) as u32);
        wire.extend_from_slice(&[0u8; 16]);
        assert!(codec.decode(&mut wire).is_err());
    }

    #[test]
    fn message_payload_roundtrip() {
        let mut payload = BytesMut::new();
        payload.put_i64_le(-100123);
        payload.put_i64_le(42);
        payload.put_u32_le(1);
        payload.put_u8(3); // audio
        payload.put_i32_le(4);
        payload.put_i64_le(777);
        payload.put_i64_le(888);
        put_bytes(&mut payload, &[9, 9, 9]);
        put_str(&mut payload, "uniq-1");
        put_str(&mut payload, "song.mp3");
        payload.put_u64_le(1_000_000);
        put_str(&mut payload, "audio/mpeg");
        put_str(&mut payload, "Song");
        put_str(&mut payload, "Artist");

        let message = decode_message(payload.freeze()).unwrap();
        assert_eq!(message.chat_id, -100123);
        assert_eq!(message.message_id, 42);
        let media = &message.media[0];
        assert_eq!(media.kind, MediaKind::Audio);
        assert_eq!(media.dc_id, 4);
        assert_eq!(media.file_unique_id, "uniq-1");
        assert_eq!(media.file_size, Some(1_000_000));
        assert_eq!(media.performer.as_deref(), Some("Artist"));
    }
}
