use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::history::{LogEntry, LogResponse};

/// Errors from the catalog HTTP API
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// API returned a non-success response
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },
    /// JSON deserialization error
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
    /// Content at the requested key is not an Iceberg table
    #[error("could not find ICEBERG_TABLE content for {table} (found {content_type})")]
    UnsupportedContent { table: String, content_type: String },
    /// The drop commit carries no parent to look the table up at
    #[error("drop of {0} has no parent commit")]
    MissingParentCommit(String),
    /// The catalog handed out a continuation token it already returned
    #[error("commit log pagination stalled: token '{0}' was returned twice")]
    RepeatedPageToken(String),
}

/// Error body returned by Nessie-compatible servers
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// `GET /trees/{ref}/contents/{key}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentResponse {
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(rename = "type", default)]
    pub content_type: String,
    pub metadata_location: Option<String>,
}

/// HTTP client for a Nessie-compatible catalog REST API
pub struct NessieClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl NessieClient {
    /// Create a client for `base_url` (e.g. `https://catalog.example.com/api/v2`)
    /// authenticating with a bearer `token`.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            http,
        })
    }

    /// Send a GET request and deserialize the response
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        handle_response(resp).await
    }

    /// Fetch one page of commit history on `branch` matching `filter`.
    pub async fn commit_log_page(
        &self,
        branch: &str,
        filter: &str,
        page_token: Option<&str>,
    ) -> Result<LogResponse, CatalogError> {
        let mut query = vec![("filter", filter)];
        if let Some(token) = page_token {
            query.push(("page-token", token));
        }
        self.get(&format!("/trees/{branch}/history"), &query).await
    }

    /// Fetch the complete commit history on `branch` matching `filter`,
    /// following continuation tokens until the catalog reports no more pages.
    pub async fn commit_log(
        &self,
        branch: &str,
        filter: &str,
    ) -> Result<Vec<LogEntry>, CatalogError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();

        loop {
            let page = self
                .commit_log_page(branch, filter, page_token.as_deref())
                .await?;
            tracing::debug!(
                branch = %branch,
                entries = page.log_entries.len(),
                has_more = page.has_more,
                "Fetched commit log page"
            );
            entries.extend(page.log_entries);

            match page.token {
                Some(token) if page.has_more => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(CatalogError::RepeatedPageToken(token));
                    }
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    /// Fetch the content stored under an already percent-encoded key at
    /// `reference` (a branch name or `@<commit-hash>`).
    pub async fn content(
        &self,
        reference: &str,
        encoded_key: &str,
    ) -> Result<ContentResponse, CatalogError> {
        self.get(&format!("/trees/{reference}/contents/{encoded_key}"), &[])
            .await
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, CatalogError> {
    if resp.status().is_success() {
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    } else {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        Err(CatalogError::Api { status, message })
    }
}
