// Authentication types

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Called with the new refresh token whenever the token endpoint rotates it
///
/// Runs on the async runtime while token acquisition is locked, so it must
/// return quickly; hand blocking work off to `tokio::task::spawn_blocking`.
pub type RotationCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// OAuth2 client credentials plus the long-lived refresh token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

// Secrets stay out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Token data from a successful grant
#[derive(Debug, Clone)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Netatmo `/oauth2/token` response
#[derive(Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}
