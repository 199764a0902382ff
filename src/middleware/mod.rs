// Authentication and CORS middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Authentication middleware
///
/// Verifies the bridge API key in the Authorization header or x-api-key header.
/// Expects format: "Bearer {BRIDGE_API_KEY}" or just the key in x-api-key.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(auth_header) = request.headers().get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if auth_str.strip_prefix("Bearer ") == Some(state.bridge_api_key.as_str()) {
                return Ok(next.run(request).await);
            }
        }
    }

    if let Some(api_key_header) = request.headers().get("x-api-key") {
        if let Ok(key_str) = api_key_header.to_str() {
            if key_str == state.bridge_api_key {
                return Ok(next.run(request).await);
            }
        }
    }

    tracing::warn!(
        "Access attempt with invalid or missing API key: {} {}",
        request.method(),
        request.uri().path()
    );
    Err(ApiError::AuthError("Invalid or missing API Key".to_string()))
}

/// Create CORS middleware layer
///
/// Allows all origins, methods, and headers so home dashboards can call the bridge.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::create_test_state;
    use axum::{
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::util::ServiceExt;

    async fn test_handler() -> &'static str {
        "OK"
    }

    fn create_test_app(state: AppState) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_auth_with_valid_bearer_token() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("authorization", "Bearer test-key-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_with_valid_x_api_key() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("x-api-key", "test-key-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_with_invalid_key() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_auth_without_key() {
        let app = create_test_app(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_cors_layer_builds() {
        let _layer = cors_layer();
    }
}
