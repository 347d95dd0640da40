//! HTTP surface for the cache engine: the single path-embedded proxy
//! route plus the error-to-JSON mapping clients expect.

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cachefront_local::engine::{CacheEngine, ServeError};
use cachefront_local::sniff;
use serde_json::json;
use std::sync::Arc;

pub struct AppState {
    pub engine: CacheEngine,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/b/*url", get(serve_asset))
        .with_state(state)
}

async fn serve_asset(
    State(state): State<Arc<AppState>>,
    UrlPath(rest): UrlPath<String>,
) -> Response {
    // One leading separator is stripped; the remainder of the path is
    // the raw URL. The request's own query string never reaches it.
    let raw_url = rest.strip_prefix('/').unwrap_or(rest.as_str());

    match state.engine.serve(raw_url).await {
        Ok(path) => match read_object(&path).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(object = %path.display(), error = %e, "reading cached object failed");
                error_response(&ServeError::Fill(e))
            }
        },
        Err(err) => {
            tracing::warn!(url = raw_url, error = %err.cause(), "proxy request failed");
            error_response(&err)
        }
    }
}

/// The stored object already passed admission; its own bytes decide the
/// response content type, never the URL's claimed extension.
async fn read_object(path: &std::path::Path) -> cachefront_core::Result<Response> {
    let bytes = tokio::fs::read(path).await?;
    let content_type = sniff::classify(&bytes, None);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn error_response(err: &ServeError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({ "code": 500, "msg": err.to_string() })),
    )
        .into_response()
}
