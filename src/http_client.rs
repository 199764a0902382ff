use anyhow::{Context, Result};
use reqwest::{Client, Method, Response, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::error::NetatmoError;

/// Attempts per logical call: the first one plus one re-authentication retry
pub const MAX_ATTEMPTS: u32 = 2;

/// Default Netatmo API origin
pub const DEFAULT_API_URL: &str = "https://api.netatmo.com";

/// Build the shared reqwest client
pub fn build_client(connect_timeout: u64, request_timeout: u64) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// Resolve an endpoint path against the API base
///
/// The path is always joined relative to the base, so a base with a path
/// prefix (`https://proxy.example/netatmo`) keeps it for every endpoint.
pub fn endpoint_url(base_url: &Url, path: &str) -> Result<Url, NetatmoError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }

    base.join(path.trim_start_matches('/'))
        .map_err(|e| NetatmoError::Parse(format!("Invalid API path {}: {}", path, e)))
}

/// Bearer-authenticated HTTP client for the Netatmo API
///
/// Every call goes through [`NetatmoHttpClient::authenticated_request`], which
/// injects the access token and re-authenticates once on a 401.
pub struct NetatmoHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Access token source
    tokens: Arc<TokenManager>,

    /// API origin, e.g. `https://api.netatmo.com`
    base_url: Url,

    /// Home the domain operations act on
    home_id: String,
}

impl NetatmoHttpClient {
    pub fn new(
        client: Client,
        tokens: Arc<TokenManager>,
        base_url: Url,
        home_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            base_url,
            home_id: home_id.into(),
        }
    }

    /// Execute a request with bearer authentication
    ///
    /// Flow per logical call:
    /// - acquire a token if none is held (acquisition errors propagate as-is)
    /// - 401 on the first attempt: discard the rejected token and retry once
    /// - any other non-2xx, or a second 401: [`NetatmoError::Api`]
    pub async fn authenticated_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Response, NetatmoError> {
        let url = endpoint_url(&self.base_url, path)?;

        let mut attempt = 0;

        loop {
            attempt += 1;

            let token = self.tokens.access_token().await?;

            tracing::debug!(
                method = %method,
                url = %url,
                attempt = attempt,
                max_attempts = MAX_ATTEMPTS,
                "Sending Netatmo request"
            );

            let response = self
                .client
                .request(method.clone(), url.clone())
                .query(query)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| {
                    log_transport_error(&e, &url, attempt);
                    NetatmoError::Network(e)
                })?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(status = %status, "Netatmo request successful");
                return Ok(response);
            }

            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                attempt = attempt,
                "Netatmo returned error status"
            );

            if status == StatusCode::UNAUTHORIZED && attempt < MAX_ATTEMPTS {
                tracing::warn!("Access token rejected, re-authenticating and retrying...");
                self.tokens.discard(&token).await;
                continue;
            }

            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                url = %url,
                response_body = %error_text,
                attempt = attempt,
                "Netatmo request failed"
            );
            return Err(NetatmoError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }
    }

    /// Home the client is bound to
    pub fn home_id(&self) -> &str {
        &self.home_id
    }

    /// Token manager shared with this client
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }
}

fn log_transport_error(e: &reqwest::Error, url: &Url, attempt: u32) {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection_failed"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else {
        "unknown"
    };

    tracing::error!(
        error_kind = error_kind,
        error = %e,
        url = %url,
        attempt = attempt,
        "Netatmo request error"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> NetatmoHttpClient {
        let base = Url::parse(&server.url()).unwrap();
        let http = Client::new();
        let tokens = Arc::new(
            TokenManager::new(
                http.clone(),
                &base,
                Credentials::new("client", "secret", "refresh"),
                None,
            )
            .unwrap(),
        );
        NetatmoHttpClient::new(http, tokens, base, "home-1")
    }

    #[test]
    fn test_endpoint_url_keeps_base_prefix() {
        let base = Url::parse("https://api.netatmo.com").unwrap();
        assert_eq!(
            endpoint_url(&base, "/api/homestatus").unwrap().as_str(),
            "https://api.netatmo.com/api/homestatus"
        );

        for prefixed in ["http://127.0.0.1:8123/netatmo", "http://127.0.0.1:8123/netatmo/"] {
            let base = Url::parse(prefixed).unwrap();
            assert_eq!(
                endpoint_url(&base, "/api/homestatus").unwrap().as_str(),
                "http://127.0.0.1:8123/netatmo/api/homestatus"
            );
            assert_eq!(
                endpoint_url(&base, "oauth2/token").unwrap().as_str(),
                "http://127.0.0.1:8123/netatmo/oauth2/token"
            );
        }
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(30, 30).is_ok());
    }

    #[tokio::test]
    async fn test_bearer_header_and_query() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .create_async()
            .await;
        let api = server
            .mock("GET", "/api/ping")
            .match_header("authorization", "Bearer access-1")
            .match_query(Matcher::UrlEncoded("home_id".into(), "home-1".into()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&server);
        let response = client
            .authenticated_request(Method::GET, "/api/ping", &[("home_id", "home-1")])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_401_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access-1"}"#)
            .expect(1)
            .create_async()
            .await;
        let api = server
            .mock("GET", "/api/ping")
            .with_status(403)
            .with_body(r#"{"error":{"code":13,"message":"Operation forbidden"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .authenticated_request(Method::GET, "/api/ping", &[])
            .await
            .unwrap_err();

        match err {
            NetatmoError::Api { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("Operation forbidden"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        token.assert_async().await;
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        // Nothing listens on the discard port
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let http = Client::new();
        let tokens = Arc::new(
            TokenManager::new(
                http.clone(),
                &base,
                Credentials::new("client", "secret", "refresh"),
                None,
            )
            .unwrap(),
        );
        let client = NetatmoHttpClient::new(http, tokens, base, "home-1");

        let err = client
            .authenticated_request(Method::GET, "/api/ping", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, NetatmoError::Network(_)));
    }
}
