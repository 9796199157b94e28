//! HTTP request handling.
//!
//! One handler answers every method and path. POST bodies are decoded as
//! LLSD and either echoed back (paths without "fail") or turned into the
//! failure the payload scripts (paths containing "fail"). GET always
//! reports a scripted failure so clients can exercise their error paths
//! without a body.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use llsd::Value;

/// Preallocation bound for request bodies. A content-length above this
/// grows the buffer incrementally instead of reserving it up front.
const MAX_PREALLOC: usize = 10 * 1024 * 1024;

/// Shared handler state.
#[derive(Debug, Clone, Default)]
pub struct PeerState {
    /// Echo every decoded request at debug level.
    pub echo_requests: bool,
}

pub fn routes(state: Arc<PeerState>) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(
    State(state): State<Arc<PeerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match method.as_str() {
        "GET" => {
            debug_echo(&state, &method, uri.path(), None);
            failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Your GET operation requested failure".to_string(),
            )
        }
        "POST" => {
            let raw = read_body(&headers, body).await;
            match llsd::from_xml(&raw) {
                Ok(message) => {
                    debug_echo(&state, &method, uri.path(), Some(&message));
                    answer(uri.path(), &message)
                }
                Err(e) => {
                    tracing::debug!(path = uri.path(), error = %e, "undecodable request body");
                    failure_response(StatusCode::BAD_REQUEST, e.to_string())
                }
            }
        }
        other => failure_response(
            StatusCode::NOT_IMPLEMENTED,
            format!("Unsupported method ('{other}')"),
        ),
    }
}

/// Route one decoded request: echo the reply on the success path, inject
/// the requested failure when the path asks for it.
fn answer(path: &str, message: &Value) -> Response {
    if !path.contains("fail") {
        let payload = message
            .as_map()
            .and_then(|m| m.get("reply"))
            .cloned()
            .unwrap_or_else(|| Value::from("success"));
        let body = llsd::to_xml(&payload);
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, llsd::MEDIA_TYPE)],
            body,
        )
            .into_response();
    }

    let requested = message
        .as_map()
        .and_then(|m| m.get("status"))
        .map(Value::as_integer);
    let reason = message
        .as_map()
        .and_then(|m| m.get("reason"))
        .map(Value::as_string);
    let (status, reason) = resolve_failure(requested, reason);
    failure_response(status, reason)
}

/// Pick the status and reason for an injected failure.
///
/// The canonical reason table is consulted only for statuses the client
/// supplied; a failure request that names no status reports the generic
/// fallback so the caller can tell the two cases apart.
fn resolve_failure(requested: Option<i32>, reason: Option<String>) -> (StatusCode, String) {
    match requested {
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            reason.unwrap_or_else(|| fallback_reason(500)),
        ),
        Some(code) => {
            let status = u16::try_from(code)
                .ok()
                .and_then(|c| StatusCode::from_u16(c).ok());
            match status {
                Some(status) => {
                    let reason = reason
                        .or_else(|| status.canonical_reason().map(str::to_string))
                        .unwrap_or_else(|| fallback_reason(code));
                    (status, reason)
                }
                // not a sendable HTTP status; still name what was asked for
                None => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    reason.unwrap_or_else(|| fallback_reason(code)),
                ),
            }
        }
    }
}

fn fallback_reason(status: i32) -> String {
    format!("Your request specified failure status {status} without providing a reason")
}

/// Build an error response. The reason travels as the plain-text body;
/// hyper does not expose the status line's reason slot.
fn failure_response(status: StatusCode, reason: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reason,
    )
        .into_response()
}

fn debug_echo(state: &PeerState, method: &Method, path: &str, message: Option<&Value>) {
    if !state.echo_requests {
        return;
    }
    match message.map(serde_json::to_string) {
        Some(Ok(rendered)) => tracing::debug!(%method, path, message = %rendered, "request"),
        _ => tracing::debug!(%method, path, "request"),
    }
}

/// Read a request body according to its `content-length` header.
///
/// A missing or unparsable header reads as an empty body. Bytes beyond the
/// declared length are discarded.
async fn read_body(headers: &HeaderMap, body: Body) -> Vec<u8> {
    let Some(declared) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
    else {
        return Vec::new();
    };

    let mut buf = Vec::with_capacity(declared.min(MAX_PREALLOC));
    let mut remaining = declared;
    let mut stream = body.into_data_stream();
    while remaining > 0 {
        match stream.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(remaining);
                buf.extend_from_slice(&chunk[..take]);
                remaining -= take;
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "request body cut short");
                break;
            }
            None => break,
        }
    }
    buf
}
