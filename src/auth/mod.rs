// Authentication module
// Manages the OAuth2 refresh-token / access-token lifecycle

mod types;
mod credentials;
mod manager;
mod refresh;

pub use credentials::{load_refresh_token, persist_rotations, save_refresh_token};
pub use manager::TokenManager;
pub use types::{Credentials, RotationCallback, TokenData};
