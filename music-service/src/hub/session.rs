//! One media session per (worker, datacenter), created lazily and cached
//! for the process lifetime. Sessions are expensive to establish and cheap
//! to hold open.

use super::error::StreamError;
use super::retry::AUTH_IMPORT_RETRY;
use super::transport::{DcId, HubTransport, MediaSession, TransportError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub(crate) struct SessionManager {
    transport: Arc<dyn HubTransport>,
    /// Guarded check-then-create: the lock is held across session creation
    /// so two racing first-uses of a datacenter never build two sessions.
    sessions: Mutex<HashMap<DcId, Arc<dyn MediaSession>>>,
}

impl SessionManager {
    pub(crate) fn new(transport: Arc<dyn HubTransport>) -> Self {
        SessionManager {
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached session for `dc`, creating and authorizing it on
    /// first use.
    pub(crate) async fn get_or_create(
        &self,
        dc: DcId,
    ) -> Result<Arc<dyn MediaSession>, StreamError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(&dc) {
            tracing::debug!(dc, "using cached media session");
            return Ok(session.clone());
        }

        let session = if dc == self.transport.home_dc() {
            let key = self.transport.auth_key().await?;
            self.transport.open_session(dc, key, true).await?
        } else {
            self.create_foreign(dc).await?
        };

        tracing::debug!(dc = session.dc_id(), "created media session");
        sessions.insert(dc, session.clone());
        Ok(session)
    }

    /// Foreign datacenter: bootstrap a temporary key, open the session,
    /// then run the export/import authorization handshake. Up to 6 attempts
    /// on invalid authorization bytes; a broken session is stopped, never
    /// cached.
    async fn create_foreign(&self, dc: DcId) -> Result<Arc<dyn MediaSession>, StreamError> {
        let key = self.transport.bootstrap_auth(dc).await?;
        let session = self.transport.open_session(dc, key, true).await?;

        let import = AUTH_IMPORT_RETRY
            .run(
                |e| matches!(e, TransportError::InvalidAuthBytes),
                || {
                    let transport = self.transport.clone();
                    let session = session.clone();
                    async move {
                        let exported = transport.export_authorization(dc).await?;
                        session.import_authorization(&exported).await
                    }
                },
            )
            .await;

        if let Err(err) = import {
            session.stop().await;
            return Err(match err {
                TransportError::InvalidAuthBytes => {
                    tracing::error!(dc, "authorization import exhausted its retries");
                    StreamError::AuthorizationFailed(dc)
                }
                other => other.into(),
            });
        }

        Ok(session)
    }

    /// Number of live sessions, for tests and diagnostics.
    pub(crate) async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub(crate) async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        for (dc, session) in sessions.drain() {
            tracing::debug!(dc, "stopping media session");
            session.stop().await;
        }
    }
}
