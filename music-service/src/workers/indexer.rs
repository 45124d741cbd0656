//! Rate-limited FIFO ingestion: audio posts from the configured music
//! channels get deduplicated, enriched with catalog metadata, and stored.

use crate::hub::{HubTransport, MediaKind, RawMessage};
use crate::services::{CatalogProvider, MongoDb};
use backoff::ExponentialBackoff;
use backoff::future::retry;
use governor::{Quota, RateLimiter};
use metrics::counter;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Indexer {
    db: MongoDb,
    catalog: Arc<dyn CatalogProvider>,
    transport: Arc<dyn HubTransport>,
    channels: HashSet<i64>,
    rate_limit_per_sec: u32,
    shutdown: CancellationToken,
}

impl Indexer {
    pub fn new(
        db: MongoDb,
        catalog: Arc<dyn CatalogProvider>,
        transport: Arc<dyn HubTransport>,
        channels: HashSet<i64>,
        rate_limit_per_sec: u32,
    ) -> Indexer {
        Indexer {
            db,
            catalog,
            transport,
            channels,
            rate_limit_per_sec,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let quota = Quota::per_second(
            NonZeroU32::new(self.rate_limit_per_sec.max(1)).expect("rate limit is non-zero"),
        );
        let limiter = RateLimiter::direct(quota);
        tracing::info!(
            channels = self.channels.len(),
            rate_limit_per_sec = self.rate_limit_per_sec,
            "indexer started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                message = self.transport.next_message() => {
                    let Some(message) = message else { break };
                    limiter.until_ready().await;
                    if let Err(err) = self.handle(message).await {
                        tracing::error!(error = %err, "failed to index message");
                    }
                }
            }
        }
        tracing::info!("indexer stopped");
    }

    async fn handle(&self, message: RawMessage) -> anyhow::Result<()> {
        if !self.channels.contains(&message.chat_id) {
            return Ok(());
        }
        let Some(audio) = message.media.iter().find(|m| m.kind == MediaKind::Audio) else {
            return Ok(());
        };
        let Some(title) = audio.title.clone() else {
            tracing::debug!(
                chat_id = message.chat_id,
                message_id = message.message_id,
                "audio without a title tag, skipping"
            );
            return Ok(());
        };
        let performer = audio.performer.clone().unwrap_or_default();

        if self.db.track_exists(&audio.file_unique_id).await? {
            return Ok(());
        }

        // transient provider failures (token scrape, transport) back off;
        // a definitive miss does not
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..ExponentialBackoff::default()
        };
        let mut metadata = retry(policy, || async {
            self.catalog.search(&title, &performer).await.map_err(|err| {
                if err.is_transient() {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await?;

        metadata.chat_id = Some(message.chat_id);
        metadata.msg_id = Some(message.message_id);
        metadata.file_unique_id = Some(audio.file_unique_id.clone());
        metadata.mime_type = audio.mime_type.clone();
        metadata.file_size = audio.file_size;
        metadata.file_name = audio.file_name.clone();

        self.db.insert_track(&metadata).await?;
        counter!("tracks_indexed_total").increment(1);
        tracing::info!(
            title = %metadata.title,
            artist = %metadata.artist,
            track_id = metadata.track_id.as_deref().unwrap_or_default(),
            "track added"
        );

        if let Some(artist_id) = metadata.artist_id.clone() {
            if !self.db.artist_exists(&artist_id).await? {
                let artist = self.catalog.get_artist(&artist_id, &metadata.artist).await?;
                self.db.insert_artist(&artist).await?;
                tracing::info!(name = %artist.name, artist_id = %artist_id, "artist added");
            }
        }

        if let Some(album_id) = metadata.album_id.clone() {
            if !self.db.album_exists(&album_id).await? {
                let album = self.catalog.get_album(&album_id).await?;
                self.db.insert_album(&album).await?;
                tracing::info!(title = %album.title, album_id = %album_id, "album added");
            }
        }

        Ok(())
    }
}
