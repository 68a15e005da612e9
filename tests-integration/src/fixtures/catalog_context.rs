//! Catalog test context for integration testing
//!
//! Serves a scripted commit history and per-commit table contents over the
//! catalog's REST routes on an ephemeral port, and records every request.

use anyhow::Result;
use axum::Router;
use axum::extract::{OriginalUri, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One commit in the scripted history.
#[derive(Debug, Clone)]
pub struct ScriptedCommit {
    pub hash: String,
    pub message: String,
    pub commit_time: String,
    pub parent: String,
}

impl ScriptedCommit {
    pub fn new(hash: &str, message: &str, parent: &str) -> Self {
        Self {
            hash: hash.to_string(),
            message: message.to_string(),
            commit_time: "2025-08-13T08:00:00Z".to_string(),
            parent: parent.to_string(),
        }
    }
}

/// A request the mock catalog received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Raw request path, percent-encoding intact
    pub path: String,
    pub query: HashMap<String, String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockState {
    branch: String,
    commits: Vec<ScriptedCommit>,
    /// Raw content path -> content body
    contents: HashMap<String, Value>,
    page_size: Option<usize>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Test context for catalog operations
pub struct CatalogTestContext {
    state: MockState,
}

impl Default for CatalogTestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogTestContext {
    pub fn new() -> Self {
        Self {
            state: MockState {
                branch: "main".to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_commit(mut self, commit: ScriptedCommit) -> Self {
        self.state.commits.push(commit);
        self
    }

    /// Serve an Iceberg table under `encoded_key` at commit `hash`.
    pub fn with_table(self, hash: &str, encoded_key: &str, metadata_location: &str) -> Self {
        self.with_content(
            hash,
            encoded_key,
            json!({ "type": "ICEBERG_TABLE", "metadataLocation": metadata_location }),
        )
    }

    pub fn with_content(mut self, hash: &str, encoded_key: &str, content: Value) -> Self {
        self.state.contents.insert(
            format!("/trees/@{hash}/contents/{encoded_key}"),
            json!({ "content": content }),
        );
        self
    }

    /// Split the history into pages of `page_size` entries.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.state.page_size = Some(page_size);
        self
    }

    /// Start serving on an ephemeral port.
    pub async fn start(self) -> Result<RunningCatalog> {
        let state = Arc::new(self.state);
        let router = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                log::error!("Mock catalog stopped: {e}");
            }
        });

        Ok(RunningCatalog {
            base_url: format!("http://{addr}/api/v2"),
            state,
        })
    }
}

/// A mock catalog serving requests.
pub struct RunningCatalog {
    pub base_url: String,
    state: Arc<MockState>,
}

impl RunningCatalog {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Paths of the content lookups, in request order.
    pub fn content_paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.path)
            .filter(|path| path.contains("/contents/"))
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    uri: OriginalUri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let path = uri
        .path()
        .strip_prefix("/api/v2")
        .unwrap_or(uri.path())
        .to_string();

    if let Ok(mut requests) = state.requests.lock() {
        requests.push(RecordedRequest {
            path: path.clone(),
            query: query.clone(),
            authorization: headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });
    }

    if path == format!("/trees/{}/history", state.branch) {
        return history_page(&state, query.get("page-token")).into_response();
    }

    match state.contents.get(&path) {
        Some(body) => axum::Json(body.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "message": format!("Content not found: {path}") })),
        )
            .into_response(),
    }
}

fn history_page(state: &MockState, token: Option<&String>) -> axum::Json<Value> {
    let page_size = state.page_size.unwrap_or(state.commits.len().max(1));
    let page: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);

    let start = (page * page_size).min(state.commits.len());
    let end = (start + page_size).min(state.commits.len());
    let has_more = end < state.commits.len();

    let entries: Vec<Value> = state.commits[start..end]
        .iter()
        .map(|c| {
            json!({
                "commitMeta": {
                    "hash": c.hash,
                    "message": c.message,
                    "commitTime": c.commit_time,
                },
                "parentCommitHash": c.parent,
            })
        })
        .collect();

    let mut body = json!({ "logEntries": entries, "hasMore": has_more });
    if has_more {
        body["token"] = json!((page + 1).to_string());
    }
    axum::Json(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_pages() -> Result<()> {
        let catalog = CatalogTestContext::new()
            .with_commit(ScriptedCommit::new("c1", "DROP TABLE a.b", "c0"))
            .with_commit(ScriptedCommit::new("c2", "DROP TABLE a.c", "c1"))
            .with_commit(ScriptedCommit::new("c3", "DROP TABLE a.d", "c2"))
            .with_page_size(2);

        let first = history_page(&catalog.state, None).0;
        assert_eq!(first["logEntries"].as_array().map(Vec::len), Some(2));
        assert_eq!(first["hasMore"], json!(true));
        assert_eq!(first["token"], json!("1"));

        let second = history_page(&catalog.state, Some(&"1".to_string())).0;
        assert_eq!(second["logEntries"].as_array().map(Vec::len), Some(1));
        assert_eq!(second["hasMore"], json!(false));
        assert!(second.get("token").is_none());
        Ok(())
    }
}
