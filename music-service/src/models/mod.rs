pub mod album;
pub mod artist;
pub mod track;
pub mod user;

pub use album::Album;
pub use artist::Artist;
pub use track::Track;
pub use user::User;
