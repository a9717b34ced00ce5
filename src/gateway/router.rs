//! HTTP router and handlers
//!
//! Routing is path-independent: every request is dispatched by method and the
//! `file` query parameter, in this precedence order:
//!
//! 1. `OPTIONS` → CORS preflight, no auth
//! 2. no `file` → service-identity payload, no auth
//! 3. `file` equals the index key → public index read, any verb
//! 4. anything else → bearer-token path; `DELETE` deletes and reindexes,
//!    every other verb streams the object
//!
//! Every response carries `Access-Control-Allow-Origin: *` so browser clients
//! from any origin may consume the API. The header is stamped by an outermost
//! layer rather than per handler, so extractor rejections and panic-path 500s
//! carry it too.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, error, info};

use crate::Error;
use crate::auth::TokenVerifier;
use crate::config::CatalogConfig;
use crate::index::reindex_after_delete;
use crate::store::ObjectStore;

/// Shared application state
pub struct AppState {
    /// Backing object store
    pub store: Arc<dyn ObjectStore>,
    /// Bearer token verifier
    pub verifier: Arc<dyn TokenVerifier>,
    /// Catalog / cache settings
    pub catalog: CatalogConfig,
}

/// Query parameters the gateway understands
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Object key to read or delete
    #[serde(default)]
    pub file: Option<String>,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    // A fallback route makes dispatch path-independent: any path works as
    // long as the query/method combination does. The CORS header layer sits
    // outermost so responses produced below the handlers (extractor
    // rejections, panics converted to 500s) carry the header as well.
    Router::new()
        .fallback(dispatch)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

/// Single entry point — precedence order documented at module level.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    Query(query): Query<FileQuery>,
    headers: HeaderMap,
) -> Response {
    if method == Method::OPTIONS {
        return preflight();
    }

    // An empty `file=` is treated as absent, like the original surface
    let Some(key) = query.file.filter(|f| !f.is_empty()) else {
        return service_status(&state);
    };

    if key == state.catalog.index_key {
        return serve_index(&state).await;
    }

    // Authenticated from here on; auth is checked before any store access
    let Some(token) = bearer_token(&headers) else {
        return error_response(&Error::Unauthorized);
    };
    if let Err(e) = state.verifier.verify(token).await {
        debug!(key = %key, error = %e, "Token rejected");
        return error_response(&Error::InvalidToken(e));
    }

    if method == Method::DELETE {
        delete_track(&state, &key).await
    } else {
        stream_object(&state, &key).await
    }
}

/// CORS preflight response for the allowed verbs.
fn preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, DELETE, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Authorization, Content-Type",
            ),
        ],
    )
        .into_response()
}

/// Service-identity payload for bare requests.
fn service_status(state: &AppState) -> Response {
    json_response(
        StatusCode::OK,
        json!({
            "service": state.catalog.service_name,
            "status": "running",
        }),
    )
}

/// Public index read — intentionally unauthenticated so clients can render
/// the catalog before signing in.
async fn serve_index(state: &AppState) -> Response {
    match state.store.get(&state.catalog.index_key).await {
        Ok(Some(obj)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", state.catalog.index_max_age_secs),
                ),
            ],
            Body::from(obj.data),
        )
            .into_response(),
        // The index 404 body differs from the generic object one
        Ok(None) => json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "Track list not found"}),
        ),
        Err(e) => server_error(&Error::Store(e), "Failed to load track list"),
    }
}

/// Authenticated object read — a pure proxy with no side effects.
async fn stream_object(state: &AppState, key: &str) -> Response {
    match state.store.get(key).await {
        Ok(Some(obj)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type_for(key).to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("private, max-age={}", state.catalog.object_max_age_secs),
                ),
            ],
            Body::from(obj.data),
        )
            .into_response(),
        Ok(None) => error_response(&Error::NotFound(key.to_string())),
        Err(e) => server_error(&Error::Store(e), "Failed to load file"),
    }
}

/// Authenticated delete-and-reindex.
///
/// Two sequential steps; the 500 body names the failed step but never carries
/// the raw store fault, which is only logged.
async fn delete_track(state: &AppState, key: &str) -> Response {
    if let Err(e) = state.store.delete(key).await {
        return server_error(&Error::Store(e), "Failed to delete track");
    }

    if let Err(e) = reindex_after_delete(
        state.store.as_ref(),
        &state.catalog.index_key,
        key,
        state.catalog.reindex_retries,
    )
    .await
    {
        return server_error(&e, "Failed to update track index");
    }

    info!(key = %key, "Track deleted");
    json_response(
        StatusCode::OK,
        json!({"success": true, "message": "Track deleted"}),
    )
}

/// Extract the bearer token, rejecting missing or malformed headers.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Content type derived from the key's file extension.
///
/// Unknown or missing extensions fall back to `application/octet-stream`,
/// never an error.
fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Structured error response from the error taxonomy (401/404 cases).
fn error_response(err: &Error) -> Response {
    json_response(err.status(), json!({"error": err.public_message()}))
}

/// 500 response naming the failed operation; the fault detail is logged only.
fn server_error(err: &Error, public: &str) -> Response {
    error!(error = %err, "{public}");
    json_response(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": public}))
}

/// JSON response; the CORS header is added by the router layer.
fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_the_fixed_table() {
        assert_eq!(content_type_for("song.mp3"), "audio/mpeg");
        assert_eq!(content_type_for("song.flac"), "audio/flac");
        assert_eq!(content_type_for("take.m4a"), "audio/mp4");
        assert_eq!(content_type_for("tracks.json"), "application/json");
    }

    #[test]
    fn unknown_or_missing_extension_falls_back_to_octet_stream() {
        assert_eq!(content_type_for("file.xyz"), "application/octet-stream");
        assert_eq!(content_type_for("noextension"), "application/octet-stream");
        assert_eq!(content_type_for(""), "application/octet-stream");
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert_eq!(content_type_for("SONG.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("a.FlAc"), "audio/flac");
    }

    #[test]
    fn bearer_token_requires_the_bearer_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_scheme_is_case_sensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "bearer abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}
