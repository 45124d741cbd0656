//! One independent hub client identity: its transport, its session cache,
//! its descriptor caches, and its in-flight workload counter.

use super::descriptor::{self, FileDescriptor};
use super::error::StreamError;
use super::fetch::fetch_chunk;
use super::session::SessionManager;
use super::stream::ChunkPlan;
use super::transport::{HubTransport, MediaSession};
use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// How often the janitor drops both descriptor caches. Access hashes and
/// file references expire hub-side; bounding cache lifetime is simpler than
/// tracking per-entry expiry.
const CACHE_CLEAN_INTERVAL: Duration = Duration::from_secs(30 * 60);

pub struct Worker {
    index: usize,
    transport: Arc<dyn HubTransport>,
    workload: AtomicI64,
    sessions: SessionManager,
    /// Raw descriptors keyed by message id: the underlying file metadata is
    /// stable once fetched.
    raw_descriptors: DashMap<i64, Arc<FileDescriptor>>,
    /// Request-scoped reuse keyed by (chat id, message id).
    descriptors: DashMap<(i64, i64), Arc<FileDescriptor>>,
    janitor: CancellationToken,
}

impl Worker {
    /// Start the identity's transport and spawn its cache janitor.
    pub async fn start(
        index: usize,
        transport: Arc<dyn HubTransport>,
    ) -> Result<Arc<Worker>, StreamError> {
        transport.start().await?;

        let worker = Arc::new(Worker {
            index,
            sessions: SessionManager::new(transport.clone()),
            transport,
            workload: AtomicI64::new(0),
            raw_descriptors: DashMap::new(),
            descriptors: DashMap::new(),
            janitor: CancellationToken::new(),
        });
        worker.spawn_janitor();
        Ok(worker)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn transport(&self) -> &Arc<dyn HubTransport> {
        &self.transport
    }

    /// Current number of in-flight streams on this identity.
    pub fn workload(&self) -> i64 {
        self.workload.load(Ordering::SeqCst)
    }

    /// Resolve a (chat, message) reference through the two-level descriptor
    /// cache. A miss triggers exactly one backend lookup.
    pub async fn get_file_properties(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<Arc<FileDescriptor>, StreamError> {
        if let Some(descriptor) = self.descriptors.get(&(chat_id, message_id)) {
            return Ok(descriptor.clone());
        }

        let raw = match self.raw_descriptors.get(&message_id) {
            Some(raw) => raw.clone(),
            None => {
                let located =
                    Arc::new(descriptor::locate(self.transport.as_ref(), chat_id, message_id).await?);
                self.raw_descriptors.insert(message_id, located.clone());
                located
            }
        };

        self.descriptors.insert((chat_id, message_id), raw.clone());
        Ok(raw)
    }

    /// Stream the byte window described by `plan`. Chunks come back
    /// strictly in increasing offset order; each fetch waits for the
    /// previous one, because the HTTP consumer needs in-order bytes.
    ///
    /// The returned sequence is forward-only and not restartable: a new
    /// range request builds a new stream. The workload counter is bumped
    /// here and released by the guard inside the stream state, so the
    /// decrement also runs when the consumer drops the stream mid-way.
    pub fn stream(
        self: &Arc<Self>,
        descriptor: Arc<FileDescriptor>,
        plan: ChunkPlan,
    ) -> impl Stream<Item = Result<Bytes, StreamError>> + Send + 'static {
        counter!("hub_streams_total").increment(1);
        tracing::debug!(
            worker = self.index,
            dc = descriptor.dc_id,
            offset = plan.offset,
            parts = plan.part_count,
            "starting stream"
        );

        struct Assembly {
            worker: Arc<Worker>,
            descriptor: Arc<FileDescriptor>,
            plan: ChunkPlan,
            session: Option<Arc<dyn MediaSession>>,
            offset: u64,
            current_part: u64,
            _guard: WorkloadGuard,
        }

        let state = Assembly {
            _guard: WorkloadGuard::acquire(self.clone()),
            worker: self.clone(),
            descriptor,
            plan,
            session: None,
            offset: plan.offset,
            current_part: 1,
        };

        futures::stream::try_unfold(state, |mut state| async move {
            if state.current_part > state.plan.part_count {
                return Ok(None);
            }

            let session = match state.session.clone() {
                Some(session) => session,
                None => {
                    let session = state
                        .worker
                        .sessions
                        .get_or_create(state.descriptor.dc_id)
                        .await?;
                    state.session = Some(session.clone());
                    session
                }
            };

            let chunk = fetch_chunk(
                &session,
                &state.descriptor.location,
                state.offset,
                state.plan.chunk_size as u32,
            )
            .await?;
            if chunk.is_empty() {
                // end of file inside the window: finish cleanly
                return Ok(None);
            }

            let piece = state.plan.slice_part(state.current_part, chunk);
            tracing::trace!(
                worker = state.worker.index,
                part = state.current_part,
                parts = state.plan.part_count,
                offset = state.offset,
                "yielded part"
            );
            state.current_part += 1;
            state.offset += state.plan.chunk_size;
            Ok(Some((piece, state)))
        })
    }

    /// Number of live media sessions, for tests and diagnostics.
    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    fn spawn_janitor(self: &Arc<Self>) {
        let worker = self.clone();
        let token = self.janitor.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(CACHE_CLEAN_INTERVAL) => {
                        worker.raw_descriptors.clear();
                        worker.descriptors.clear();
                        tracing::debug!(worker = worker.index, "cleared descriptor caches");
                    }
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        self.janitor.cancel();
        self.sessions.shutdown().await;
        self.transport.stop().await;
    }
}

/// Scoped workload accounting: increments on acquisition, decrements on
/// drop, so every exit path of a stream releases exactly once.
struct WorkloadGuard {
    worker: Arc<Worker>,
}

impl WorkloadGuard {
    fn acquire(worker: Arc<Worker>) -> WorkloadGuard {
        worker.workload.fetch_add(1, Ordering::SeqCst);
        gauge!("hub_worker_workload", "worker" => worker.index.to_string()).increment(1.0);
        WorkloadGuard { worker }
    }
}

impl Drop for WorkloadGuard {
    fn drop(&mut self) {
        self.worker.workload.fetch_sub(1, Ordering::SeqCst);
        gauge!("hub_worker_workload", "worker" => self.worker.index.to_string()).decrement(1.0);
    }
}
