//! Secret bundle upload.

use std::path::Path;

use askama::Template;
use axum::Router;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use stackhook_core::ContentHash;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::ApiError;

#[derive(Template)]
#[template(path = "secrets.html")]
struct UploadTemplate {
    action: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/secrets", get(upload_page))
        .route("/secrets/upload", post(upload))
}

async fn upload_page() -> Result<impl IntoResponse, ApiError> {
    let template = UploadTemplate {
        action: "/secrets/upload",
    };
    match template.render() {
        Ok(html) => Ok(Html(html)),
        Err(e) => {
            error!("Upload template render error: {}", e);
            Err(ApiError::Internal(format!("Template error: {}", e)))
        }
    }
}

/// Replace a repository's secret bundle if the upload evaluates. A
/// rejected upload leaves the previous bundle in place.
///
/// Multipart fields: `url` (clone URL) and `secret` (a `.pkl` file).
async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, &'static str), ApiError> {
    let mut clone_url = None;
    let mut bundle = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("url") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                clone_url = Some(text);
            }
            Some("secret") => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                bundle = Some((file_name, data));
            }
            _ => {}
        }
    }

    let clone_url = clone_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("clone url is missing".to_string()))?;
    let (file_name, data) =
        bundle.ok_or_else(|| ApiError::BadRequest("secret is missing".to_string()))?;
    if !file_name.as_deref().is_some_and(is_pkl) {
        return Err(ApiError::BadRequest(
            "only .pkl files are allowed".to_string(),
        ));
    }

    let hash = ContentHash::of(&clone_url);
    let variables = match state.lifecycle.secrets().install_bundle(&hash, &data).await {
        Ok(variables) => variables,
        Err(e) => {
            warn!(
                repo_hash = %hash.short(12),
                transient = e.is_transient(),
                "Uploaded secret bundle rejected"
            );
            return Err(ApiError::BadRequest(
                "failed to evaluate secret bundle".to_string(),
            ));
        }
    };

    info!(
        clone_url = %clone_url,
        repo_hash = %hash.short(12),
        variables,
        "Secret bundle uploaded"
    );
    Ok((StatusCode::OK, "ok"))
}

fn is_pkl(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext == "pkl")
}
