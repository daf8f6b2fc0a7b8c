//! Webhook endpoint for GitHub.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stackhook_core::DeploymentRequest;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}

/// Handle GitHub webhook events.
///
/// Accepted events are handled on their own task; the response only says
/// the event was queued.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // Get event type
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok());
        if !verify_github_signature(secret, &body, signature) {
            warn!(event = %event_type, "Invalid webhook signature");
            return Err(ApiError::Unauthorized("invalid signature".to_string()));
        }
    }

    if event_type == "ping" {
        info!("Ping event received - webhook is configured correctly");
        return Ok(StatusCode::OK);
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let Some(request) = DeploymentRequest::from_github_event(event_type, &payload) else {
        info!(event = %event_type, "Unhandled event");
        return Ok(StatusCode::OK);
    };

    info!(
        request_id = %request.id,
        event = %request.kind,
        repo = %request.repository,
        branch = %request.branch(),
        sha = %request.commit_sha,
        "Received GitHub webhook"
    );

    // Takes its place in line before the response goes out.
    state.lifecycle.enqueue(request);

    Ok(StatusCode::ACCEPTED)
}

/// Check an `X-Hub-Signature-256` header (`sha256=<hex>`) in constant time.
pub fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    // Signature format: "sha256=<hex>"
    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{sign, test_state};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const PUSH: &str = r#"{
        "ref": "refs/heads/main",
        "after": "0123456789abcdef0123456789abcdef01234567",
        "deleted": false,
        "repository": {
            "full_name": "acme/widgets",
            "clone_url": "https://github.com/acme/widgets.git",
            "default_branch": "main"
        }
    }"#;

    #[test]
    fn test_signature_round_trip() {
        let body = b"{\"zen\":\"hi\"}";
        let signature = sign("topsecret", body);
        assert!(verify_github_signature("topsecret", body, Some(&signature)));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let signature = sign("topsecret", b"original");
        assert!(!verify_github_signature("topsecret", b"tampered", Some(&signature)));
        assert!(!verify_github_signature("other", b"original", Some(&signature)));
        assert!(!verify_github_signature("topsecret", b"original", None));
        assert!(!verify_github_signature("topsecret", b"original", Some("sha1=abcd")));
        assert!(!verify_github_signature("topsecret", b"original", Some("sha256=zz")));
    }

    fn webhook(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/webhooks/github").header("X-GitHub-Event", event);
        if let Some(signature) = signature {
            builder = builder.header("X-Hub-Signature-256", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_unsigned_request_rejected_when_secret_set() {
        let (state, _dir) = test_state(Some("topsecret"));
        let app = crate::routes::router(state);

        let response = app.oneshot(webhook("push", PUSH, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_push_accepted() {
        let (state, _dir) = test_state(Some("topsecret"));
        let app = crate::routes::router(state);

        let signature = sign("topsecret", PUSH.as_bytes());
        let response = app
            .oneshot(webhook("push", PUSH, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_ping_and_unhandled_events() {
        let (state, _dir) = test_state(None);
        let app = crate::routes::router(state);

        let response = app
            .clone()
            .oneshot(webhook("ping", "{}", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(webhook("issues", PUSH, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (state, _dir) = test_state(None);
        let app = crate::routes::router(state);

        let response = app.oneshot(webhook("push", "not json", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
