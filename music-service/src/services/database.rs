use crate::models::{Album, Artist, Track, User};
use mongodb::{
    Client as MongoClient, Collection, Database, IndexModel, bson::doc, options::IndexOptions,
};
use service_core::error::AppError;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for music-service");

        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };
        let named = |name: &str| IndexOptions::builder().name(name.to_string()).build();

        self.songs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "file_unique_id": 1 })
                    .options(unique("file_unique_id_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.songs()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "track_id": 1 })
                    .options(named("track_id_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.albums()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "album_id": 1 })
                    .options(named("album_id_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.artists()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "artist_id": 1 })
                    .options(named("artist_id_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "username": 1 })
                    .options(unique("username_lookup"))
                    .build(),
                None,
            )
            .await?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn songs(&self) -> Collection<Track> {
        self.db.collection("songs")
    }

    pub fn albums(&self) -> Collection<Album> {
        self.db.collection("albums")
    }

    pub fn artists(&self) -> Collection<Artist> {
        self.db.collection("artists")
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // ---- indexer helpers ---------------------------------------------------

    pub async fn track_exists(&self, file_unique_id: &str) -> Result<bool, AppError> {
        let found = self
            .songs()
            .find_one(doc! { "file_unique_id": file_unique_id }, None)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert_track(&self, track: &Track) -> Result<(), AppError> {
        self.songs().insert_one(track, None).await?;
        Ok(())
    }

    pub async fn artist_exists(&self, artist_id: &str) -> Result<bool, AppError> {
        let found = self
            .artists()
            .find_one(doc! { "artist_id": artist_id }, None)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert_artist(&self, artist: &Artist) -> Result<(), AppError> {
        self.artists().insert_one(artist, None).await?;
        Ok(())
    }

    pub async fn album_exists(&self, album_id: &str) -> Result<bool, AppError> {
        let found = self
            .albums()
            .find_one(doc! { "album_id": album_id }, None)
            .await?;
        Ok(found.is_some())
    }

    pub async fn insert_album(&self, album: &Album) -> Result<(), AppError> {
        self.albums().insert_one(album, None).await?;
        Ok(())
    }
}
