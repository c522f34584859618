//! Wire types and paths of the visitor HTTP API.
//!
//! Shared by the server handlers and [`crate::storage::RemoteStore`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root-served API path.
pub const API_PATH: &str = "/api/visitors";

/// API path when the site is served from the repository root.
pub const CODEX_API_PATH: &str = "/codex/api/visitors";

/// `limit` used when the query omits it or it does not parse.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Body of `GET /api/visitors`.
///
/// Records are the objects as they were posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Most recent first.
    pub records: Vec<Value>,
    /// Total records held by the server.
    #[serde(default)]
    pub count: usize,
    /// Where the server keeps the log.
    #[serde(default)]
    pub stored_file: String,
}

/// Body of a successful `POST` or `DELETE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Always `true` on success.
    pub ok: bool,
    /// Records held after the operation.
    pub stored: usize,
    /// Where the server keeps the log.
    pub stored_file: String,
}

/// Body of a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short reason.
    pub error: String,
}

/// Resolve the API path for a page, relative to the hosting prefix.
///
/// A page under `/<prefix>/<marker>/...` talks to `/<prefix>/<marker>/api/visitors`;
/// a page at `.../<marker>` talks to `.../<marker>/api/visitors`; anything
/// else talks to `/api/visitors`.
#[must_use]
pub fn resolve_api_path(page_path: &str, marker: &str) -> String {
    let inner = format!("/{marker}/");
    if let Some(index) = page_path.find(&inner) {
        return format!("{}/{marker}{API_PATH}", &page_path[..index]);
    }
    let tail = format!("/{marker}");
    if page_path.ends_with(&tail) {
        return format!("{page_path}{API_PATH}");
    }
    API_PATH.to_string()
}

/// Absolute API URL for a page served from `base_url`.
#[must_use]
pub fn api_url(base_url: &str, page_path: &str, marker: &str) -> String {
    format!(
        "{}{}",
        base_url.trim_end_matches('/'),
        resolve_api_path(page_path, marker)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_api_path_inside_marker() {
        assert_eq!(
            resolve_api_path("/codex/visitors.html", "codex"),
            "/codex/api/visitors"
        );
        assert_eq!(
            resolve_api_path("/site/codex/posts/a.html", "codex"),
            "/site/codex/api/visitors"
        );
    }

    #[test]
    fn test_resolve_api_path_marker_tail() {
        assert_eq!(resolve_api_path("/codex", "codex"), "/codex/api/visitors");
        assert_eq!(
            resolve_api_path("/mirror/codex", "codex"),
            "/mirror/codex/api/visitors"
        );
    }

    #[test]
    fn test_resolve_api_path_root() {
        assert_eq!(resolve_api_path("/index.html", "codex"), "/api/visitors");
        assert_eq!(resolve_api_path("", "codex"), "/api/visitors");
        assert_eq!(resolve_api_path("/codexes/x", "codex"), "/api/visitors");
    }

    #[test]
    fn test_api_url_joins_origin() {
        assert_eq!(
            api_url("http://127.0.0.1:8080/", "/codex/visitors.html", "codex"),
            "http://127.0.0.1:8080/codex/api/visitors"
        );
    }

    #[test]
    fn test_list_response_tolerates_missing_counts() {
        let body: ListResponse = serde_json::from_str(r#"{"records": []}"#).unwrap();
        assert!(body.records.is_empty());
        assert_eq!(body.count, 0);
    }

    #[test]
    fn test_stored_file_key_is_snake_case() {
        let body = WriteResponse {
            ok: true,
            stored: 2,
            stored_file: "visitors.db".to_string(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stored_file"], "visitors.db");
        assert!(json.get("storedFile").is_none());

        let list: ListResponse =
            serde_json::from_str(r#"{"records": [], "count": 0, "stored_file": "x.db"}"#).unwrap();
        assert_eq!(list.stored_file, "x.db");
    }

    #[test]
    fn test_list_response_requires_records() {
        assert!(serde_json::from_str::<ListResponse>(r#"{"count": 3}"#).is_err());
    }
}
