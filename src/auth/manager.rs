use reqwest::{Client, Url};
use tokio::sync::{Mutex, RwLock};

use super::refresh;
use super::types::{Credentials, RotationCallback};
use crate::error::NetatmoError;

/// Token manager
/// Holds the refresh-token credential and at most one access token.
///
/// The access token carries no expiry; it is kept until a caller reports it
/// stale (see [`TokenManager::discard`]) or [`TokenManager::invalidate`] is
/// called. Acquisition is single-flight: callers that find no token queue on
/// one lock and share the result of a single grant.
pub struct TokenManager {
    /// HTTP client for token requests
    client: Client,

    /// Token endpoint
    token_url: Url,

    /// Current credentials (refresh token may rotate)
    credentials: RwLock<Credentials>,

    /// Current access token
    access_token: RwLock<Option<String>>,

    /// Serializes grants
    acquire_lock: Mutex<()>,

    /// Notified with every rotated refresh token
    on_rotate: Option<RotationCallback>,
}

impl TokenManager {
    /// Create a manager for the API rooted at `base_url`
    pub fn new(
        client: Client,
        base_url: &Url,
        credentials: Credentials,
        on_rotate: Option<RotationCallback>,
    ) -> Result<Self, NetatmoError> {
        Ok(Self {
            client,
            token_url: refresh::token_url(base_url)?,
            credentials: RwLock::new(credentials),
            access_token: RwLock::new(None),
            acquire_lock: Mutex::new(()),
            on_rotate,
        })
    }

    /// Request a fresh access token from the token endpoint
    ///
    /// Always performs a network round trip and replaces the held token.
    pub async fn acquire(&self) -> Result<String, NetatmoError> {
        let _guard = self.acquire_lock.lock().await;
        self.acquire_locked().await
    }

    /// Get the held access token, acquiring one if none is held
    pub async fn access_token(&self) -> Result<String, NetatmoError> {
        if let Some(token) = self.current_token().await {
            return Ok(token);
        }

        let _guard = self.acquire_lock.lock().await;

        // Another caller may have finished a grant while we waited
        if let Some(token) = self.current_token().await {
            tracing::debug!("Reusing access token acquired by a concurrent caller");
            return Ok(token);
        }

        self.acquire_locked().await
    }

    /// Drop the held access token (idempotent)
    pub async fn invalidate(&self) {
        let mut token = self.access_token.write().await;
        if token.take().is_some() {
            tracing::debug!("Access token invalidated");
        }
    }

    /// Drop the held access token only if it is still `stale`
    ///
    /// Returns whether a token was dropped. A token refreshed by a concurrent
    /// caller in the meantime is kept.
    pub async fn discard(&self, stale: &str) -> bool {
        let mut token = self.access_token.write().await;
        if token.as_deref() == Some(stale) {
            *token = None;
            tracing::debug!("Stale access token discarded");
            true
        } else {
            false
        }
    }

    /// Peek at the held access token without acquiring
    pub async fn current_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    /// Current refresh token (the rotated one if rotation happened)
    pub async fn refresh_token(&self) -> String {
        self.credentials.read().await.refresh_token.clone()
    }

    /// Perform the grant; caller must hold `acquire_lock`
    async fn acquire_locked(&self) -> Result<String, NetatmoError> {
        let creds = self.credentials.read().await.clone();
        let token_data = refresh::refresh_access_token(&self.client, &self.token_url, &creds).await?;

        {
            let mut access_token = self.access_token.write().await;
            *access_token = Some(token_data.access_token.clone());
        }

        if let Some(new_refresh_token) = token_data.refresh_token {
            if new_refresh_token != creds.refresh_token {
                {
                    let mut creds = self.credentials.write().await;
                    creds.refresh_token = new_refresh_token.clone();
                }
                tracing::info!("Netatmo rotated the refresh token");
                if let Some(ref on_rotate) = self.on_rotate {
                    on_rotate(&new_refresh_token);
                }
            }
        }

        Ok(token_data.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::sync::{Arc, Mutex as StdMutex};

    fn manager(server: &Server, on_rotate: Option<RotationCallback>) -> TokenManager {
        let base = Url::parse(&server.url()).unwrap();
        TokenManager::new(
            Client::new(),
            &base,
            Credentials::new("client", "secret", "refresh-1"),
            on_rotate,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_access_token_is_reused() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let tokens = manager(&server, None);
        assert_eq!(tokens.current_token().await, None);
        assert_eq!(tokens.access_token().await.unwrap(), "access-1");
        assert_eq!(tokens.access_token().await.unwrap(), "access-1");
        assert_eq!(tokens.access_token().await.unwrap(), "access-1");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_grant() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .expect(2)
            .create_async()
            .await;

        let tokens = manager(&server, None);
        tokens.access_token().await.unwrap();

        tokens.invalidate().await;
        tokens.invalidate().await;
        assert_eq!(tokens.current_token().await, None);

        tokens.access_token().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rotation_updates_credentials_and_notifies() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded(
                "refresh_token".into(),
                "refresh-1".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"access-1","refresh_token":"refresh-2"}"#)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::UrlEncoded(
                "refresh_token".into(),
                "refresh-2".into(),
            ))
            .with_status(200)
            .with_body(r#"{"access_token":"access-2","refresh_token":"refresh-2"}"#)
            .expect(1)
            .create_async()
            .await;

        let rotated = Arc::new(StdMutex::new(Vec::new()));
        let sink = rotated.clone();
        let on_rotate: RotationCallback = Arc::new(move |token: &str| {
            sink.lock().unwrap().push(token.to_string());
        });

        let tokens = manager(&server, Some(on_rotate));
        assert_eq!(tokens.acquire().await.unwrap(), "access-1");
        assert_eq!(tokens.refresh_token().await, "refresh-2");

        // Same refresh token echoed back is not a rotation
        assert_eq!(tokens.acquire().await.unwrap(), "access-2");

        assert_eq!(*rotated.lock().unwrap(), vec!["refresh-2".to_string()]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_grant_keeps_no_token() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let tokens = manager(&server, None);
        let err = tokens.access_token().await.unwrap_err();
        assert!(matches!(err, NetatmoError::Authentication(_)));
        assert_eq!(tokens.current_token().await, None);
        assert_eq!(tokens.refresh_token().await, "refresh-1");
    }

    #[tokio::test]
    async fn test_discard_only_drops_matching_token() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .create_async()
            .await;

        let tokens = manager(&server, None);
        tokens.access_token().await.unwrap();

        assert!(!tokens.discard("some-older-token").await);
        assert_eq!(tokens.current_token().await.as_deref(), Some("access-1"));

        assert!(tokens.discard("access-1").await);
        assert_eq!(tokens.current_token().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_grant() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let tokens = Arc::new(manager(&server, None));
        let (a, b, c) = tokio::join!(
            tokens.access_token(),
            tokens.access_token(),
            tokens.access_token()
        );

        assert_eq!(a.unwrap(), "access-1");
        assert_eq!(b.unwrap(), "access-1");
        assert_eq!(c.unwrap(), "access-1");
        mock.assert_async().await;
    }
}
