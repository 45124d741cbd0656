pub mod auth;
pub mod common;
pub mod search;

pub use auth::{GenericResponse, LoginRequest, RegisterRequest, TokenResponse, UserResponse};
pub use common::{ListParams, Paging};
pub use search::{SearchParams, SearchResponse};
