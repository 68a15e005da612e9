//! Commit log wire types and the history filter.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// Substring every drop commit message contains.
pub const DROP_MARKER: &str = "DROP TABLE";

/// One page of `GET /trees/{ref}/history`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    #[serde(default)]
    pub log_entries: Vec<LogEntry>,
    #[serde(default)]
    pub has_more: bool,
    /// Continuation token for the next page
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub commit_meta: CommitMeta,
    #[serde(default)]
    pub parent_commit_hash: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMeta {
    pub hash: Option<String>,
    #[serde(default)]
    pub message: String,
    pub commit_time: Option<DateTime<Utc>>,
}

/// Catalog filter selecting drop commits newer than `since`.
pub fn filter_expression(since: DateTime<Utc>) -> String {
    format!(
        "commit.message.contains('{DROP_MARKER}') && \
         timestamp(commit.commitTime) > timestamp('{}')",
        since.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}
