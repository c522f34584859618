//! Request handlers for `/api/visitors`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Query, State};
use axum::http::header::{ALLOW, CACHE_CONTROL};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::{ErrorResponse, ListResponse, WriteResponse, DEFAULT_LIST_LIMIT};
use crate::error::Result;
use crate::storage::Storage;

use super::AppState;

const NO_STORE: [(axum::http::HeaderName, &str); 1] = [(CACHE_CONTROL, "no-store")];

/// Query string of `GET /api/visitors`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    limit: Option<String>,
}

/// Clamp a raw `limit` into `1..=max`, defaulting when absent or malformed.
#[must_use]
pub fn effective_limit(raw: Option<&str>, max: usize) -> usize {
    let requested = raw
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(i64::try_from(DEFAULT_LIST_LIMIT).unwrap_or(i64::MAX));
    let max_i64 = i64::try_from(max).unwrap_or(i64::MAX);
    let clamped = requested.clamp(1, max_i64.max(1));
    usize::try_from(clamped).unwrap_or(1)
}

fn reply<T: Serialize>(status: StatusCode, body: T) -> Response {
    (status, NO_STORE, Json(body)).into_response()
}

fn reject(status: StatusCode, message: &str) -> Response {
    reply(
        status,
        ErrorResponse {
            error: message.to_string(),
        },
    )
}

/// Run `op` against the store on the blocking pool.
async fn with_storage<T, F>(state: &AppState, op: F) -> std::result::Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&Storage) -> Result<T> + Send + 'static,
{
    let storage = Arc::clone(&state.storage);
    let outcome = tokio::task::spawn_blocking(move || {
        let storage = storage.lock().map_err(|_| {
            error!("visitor storage lock poisoned");
            "storage unavailable"
        })?;
        op(&*storage).map_err(|e| {
            error!(error = %e, "visitor storage operation failed");
            "storage failure"
        })
    })
    .await;

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(reject(StatusCode::INTERNAL_SERVER_ERROR, message)),
        Err(e) => {
            error!(error = %e, "visitor storage task failed");
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "storage failure"))
        }
    }
}

/// GET /livez
pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// GET /api/visitors
pub async fn list_visitors(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = effective_limit(params.limit.as_deref(), state.max_list_limit);
    let result = with_storage(&state, move |storage| {
        Ok((storage.list_recent(limit)?, storage.count()?))
    })
    .await;

    match result {
        Ok((records, count)) => {
            debug!(limit, returned = records.len(), count, "Listed visitors");
            reply(
                StatusCode::OK,
                ListResponse {
                    records,
                    count,
                    stored_file: state.stored_file.clone(),
                },
            )
        }
        Err(response) => response,
    }
}

/// POST /api/visitors
pub async fn append_visitor(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = rejection.status();
            warn!(%status, "Rejected visitor body");
            let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
                "payload too large"
            } else {
                "unreadable body"
            };
            return reject(status, message);
        }
    };

    if body.iter().all(u8::is_ascii_whitespace) {
        return reject(StatusCode::BAD_REQUEST, "empty request body");
    }

    let record: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Visitor body is not JSON");
            return reject(StatusCode::BAD_REQUEST, "invalid json");
        }
    };
    if !record.is_object() {
        return reject(StatusCode::BAD_REQUEST, "expected json object");
    }

    match with_storage(&state, move |storage| {
        storage.insert(&record)?;
        storage.count()
    })
    .await
    {
        Ok(stored) => reply(
            StatusCode::CREATED,
            WriteResponse {
                ok: true,
                stored,
                stored_file: state.stored_file.clone(),
            },
        ),
        Err(response) => response,
    }
}

/// DELETE /api/visitors
pub async fn clear_visitors(State(state): State<AppState>) -> Response {
    match with_storage(&state, Storage::clear).await {
        Ok(removed) => {
            info!(removed, "Visitor log cleared over API");
            reply(
                StatusCode::OK,
                WriteResponse {
                    ok: true,
                    stored: 0,
                    stored_file: state.stored_file.clone(),
                },
            )
        }
        Err(response) => response,
    }
}

/// OPTIONS /api/visitors
pub async fn visitors_options() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (ALLOW, "GET, POST, DELETE, OPTIONS"),
            (CACHE_CONTROL, "no-store"),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_livez() {
        let (status, body) = livez().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[test]
    fn test_effective_limit_defaults() {
        assert_eq!(effective_limit(None, 5000), 1000);
        assert_eq!(effective_limit(Some("abc"), 5000), 1000);
        assert_eq!(effective_limit(Some(""), 5000), 1000);
    }

    #[test]
    fn test_effective_limit_clamps() {
        assert_eq!(effective_limit(Some("0"), 5000), 1);
        assert_eq!(effective_limit(Some("-7"), 5000), 1);
        assert_eq!(effective_limit(Some("25"), 5000), 25);
        assert_eq!(effective_limit(Some("999999"), 5000), 5000);
        assert_eq!(effective_limit(None, 10), 10);
    }
}
