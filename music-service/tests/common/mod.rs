//! In-memory hub transport for exercising the streaming core without a
//! network.

use async_trait::async_trait;
use bytes::Bytes;
use music_service::hub::{
    AuthKey, DcId, ExportedAuthorization, FileLocation, HubTransport, MediaInfo, MediaKind,
    MediaSession, RawMessage, TransportError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const HOME_DC: DcId = 1;

pub struct FakeHub {
    home_dc: DcId,
    media_dc: DcId,
    file: Vec<u8>,
    /// Size advertised on resolved messages; may exceed the actual bytes to
    /// model a short read at end-of-file.
    advertised_size: u64,
    messages: Mutex<HashMap<(i64, i64), RawMessage>>,

    start_fails: AtomicBool,
    /// Import attempts that fail with invalid auth bytes before one succeeds.
    import_failures: AtomicU32,
    /// Fetch attempts that time out before one succeeds.
    fetch_timeouts: AtomicU32,

    pub resolve_calls: AtomicU32,
    pub export_calls: AtomicU32,
    pub import_calls: AtomicU32,
    pub sessions_opened: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl FakeHub {
    pub fn new(file: Vec<u8>) -> FakeHub {
        let advertised_size = file.len() as u64;
        FakeHub {
            home_dc: HOME_DC,
            media_dc: HOME_DC,
            file,
            advertised_size,
            messages: Mutex::new(HashMap::new()),
            start_fails: AtomicBool::new(false),
            import_failures: AtomicU32::new(0),
            fetch_timeouts: AtomicU32::new(0),
            resolve_calls: AtomicU32::new(0),
            export_calls: AtomicU32::new(0),
            import_calls: AtomicU32::new(0),
            sessions_opened: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn with_media_dc(mut self, dc: DcId) -> Self {
        self.media_dc = dc;
        self
    }

    pub fn with_advertised_size(mut self, size: u64) -> Self {
        self.advertised_size = size;
        self
    }

    pub fn with_import_failures(self, n: u32) -> Self {
        self.import_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_fetch_timeouts(self, n: u32) -> Self {
        self.fetch_timeouts.store(n, Ordering::SeqCst);
        self
    }

    pub fn failing_to_start(self) -> Self {
        self.start_fails.store(true, Ordering::SeqCst);
        self
    }

    /// Register an audio message whose file is this hub's byte buffer.
    pub fn add_audio_message(&self, chat_id: i64, message_id: i64, file_unique_id: &str) {
        let media = MediaInfo {
            kind: MediaKind::Audio,
            dc_id: self.media_dc,
            media_id: 7000 + message_id,
            access_hash: 1234,
            file_reference: vec![0xaa, 0xbb],
            file_unique_id: file_unique_id.to_string(),
            file_name: Some("song.mp3".to_string()),
            file_size: Some(self.advertised_size),
            mime_type: Some("audio/mpeg".to_string()),
            title: Some("Song".to_string()),
            performer: Some("Artist".to_string()),
        };
        self.messages.lock().unwrap().insert(
            (chat_id, message_id),
            RawMessage {
                chat_id,
                message_id,
                media: vec![media],
            },
        );
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Newtype wrapper so the foreign `HubTransport` trait can be implemented
/// for an owned `Arc<FakeHub>` without violating the orphan rule. Cloning
/// shares the same underlying hub.
#[derive(Clone)]
pub struct FakeTransport(pub Arc<FakeHub>);

#[async_trait]
impl HubTransport for FakeTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.0.start_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Rpc("login rejected".into()));
        }
        Ok(())
    }

    async fn stop(&self) {}

    fn home_dc(&self) -> DcId {
        self.0.home_dc
    }

    async fn resolve_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Option<RawMessage>, TransportError> {
        self.0.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .0
            .messages
            .lock()
            .unwrap()
            .get(&(chat_id, message_id))
            .cloned())
    }

    async fn auth_key(&self) -> Result<AuthKey, TransportError> {
        Ok(AuthKey(vec![1; 8]))
    }

    async fn bootstrap_auth(&self, _dc: DcId) -> Result<AuthKey, TransportError> {
        Ok(AuthKey(vec![2; 8]))
    }

    async fn export_authorization(
        &self,
        dc: DcId,
    ) -> Result<ExportedAuthorization, TransportError> {
        self.0.export_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExportedAuthorization {
            id: dc as i64,
            bytes: vec![3; 16],
        })
    }

    async fn open_session(
        &self,
        dc: DcId,
        _key: AuthKey,
        _is_media: bool,
    ) -> Result<Arc<dyn MediaSession>, TransportError> {
        self.0.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeSession {
            hub: self.0.clone(),
            dc,
        }))
    }

    async fn next_message(&self) -> Option<RawMessage> {
        std::future::pending().await
    }
}

pub struct FakeSession {
    hub: Arc<FakeHub>,
    dc: DcId,
}

#[async_trait]
impl MediaSession for FakeSession {
    fn dc_id(&self) -> DcId {
        self.dc
    }

    async fn import_authorization(
        &self,
        _auth: &ExportedAuthorization,
    ) -> Result<(), TransportError> {
        self.hub.import_calls.fetch_add(1, Ordering::SeqCst);
        if FakeHub::take_one(&self.hub.import_failures) {
            return Err(TransportError::InvalidAuthBytes);
        }
        Ok(())
    }

    async fn fetch_chunk(
        &self,
        _location: &FileLocation,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, TransportError> {
        self.hub.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if FakeHub::take_one(&self.hub.fetch_timeouts) {
            return Err(TransportError::Timeout);
        }
        let start = (offset as usize).min(self.hub.file.len());
        let end = (start + limit as usize).min(self.hub.file.len());
        Ok(Bytes::copy_from_slice(&self.hub.file[start..end]))
    }

    async fn stop(&self) {}
}
