// Refresh-token grant against the Netatmo token endpoint

use reqwest::header::{CONTENT_TYPE, HOST};
use reqwest::{Client, Url};

use super::types::{Credentials, TokenData, TokenResponse};
use crate::error::NetatmoError;
use crate::http_client::endpoint_url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=UTF-8";

/// Build the token endpoint URL for an API base
pub fn token_url(base_url: &Url) -> Result<Url, NetatmoError> {
    endpoint_url(base_url, "oauth2/token")
}

/// `Host` header value for a URL (host plus non-default port)
pub fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Exchange the refresh token for an access token
///
/// No retry here: a non-2xx answer is returned as
/// [`NetatmoError::Authentication`] carrying the response body.
pub async fn refresh_access_token(
    client: &Client,
    url: &Url,
    creds: &Credentials,
) -> Result<TokenData, NetatmoError> {
    tracing::info!("Requesting Netatmo access token via refresh_token grant...");

    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", creds.refresh_token.as_str()),
        ("client_id", creds.client_id.as_str()),
        ("client_secret", creds.client_secret.as_str()),
    ];

    // Content-Type must be set before `form` so the charset variant wins
    let response = client
        .post(url.clone())
        .header(HOST, host_header(url))
        .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %error_text,
            "Netatmo token refresh failed"
        );
        return Err(NetatmoError::Authentication(error_text));
    }

    let body = response.text().await?;
    let data: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| NetatmoError::Authentication(format!("Invalid token response: {}", e)))?;

    if data.access_token.is_empty() {
        return Err(NetatmoError::Authentication(
            "Token response does not contain access_token".to_string(),
        ));
    }

    tracing::info!(
        "Authentication ok (token: {}..., expires_in: {:?}s)",
        data.access_token.chars().take(8).collect::<String>(),
        data.expires_in
    );

    Ok(TokenData {
        access_token: data.access_token,
        refresh_token: data.refresh_token.filter(|t| !t.is_empty()),
    })
}
