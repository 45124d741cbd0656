pub mod albums;
pub mod artists;
pub mod auth;
pub mod health;
pub mod search;
pub mod songs;
pub mod webdav;

pub use albums::{get_album, get_albums};
pub use artists::{get_artist, get_artists};
pub use auth::{get_me, login, logout, register};
pub use health::{health_check, metrics_endpoint, readiness_check};
pub use search::search_everything;
pub use songs::{get_song, get_songs, stream_song};
pub use webdav::webdav_handler;
