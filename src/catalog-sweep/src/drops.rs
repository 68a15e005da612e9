//! Extraction of dropped tables from commit messages.

use crate::history::LogEntry;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static DROP_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^DROP\s+TABLE\s+(.+)").expect("drop pattern is valid"));

/// A table dropped by a single catalog commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEvent {
    pub table_identifier: String,
    pub commit_time: Option<DateTime<Utc>>,
    /// Commit immediately preceding the drop; the table still exists there.
    pub parent_commit_id: String,
}

/// Extract the table identifier from a `DROP TABLE <name>` commit message.
///
/// Matching is case-insensitive and anchored at the start of the trimmed
/// message. Only the first line is considered.
pub fn parse_drop_message(message: &str) -> Option<String> {
    let captures = DROP_TABLE.captures(message.trim())?;
    let identifier = captures.get(1)?.as_str().trim();
    (!identifier.is_empty()).then(|| identifier.to_string())
}

/// Turn commit log entries into drop events, keeping source order.
///
/// Entries whose message is not a drop are skipped. Repeated drops of the
/// same name stay separate events.
pub fn parse_drops(entries: &[LogEntry]) -> Vec<DropEvent> {
    entries
        .iter()
        .filter_map(|entry| {
            let table_identifier = parse_drop_message(&entry.commit_meta.message)?;
            Some(DropEvent {
                table_identifier,
                commit_time: entry.commit_meta.commit_time,
                parent_commit_id: entry.parent_commit_hash.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CommitMeta;

    fn entry(message: &str, parent: &str) -> LogEntry {
        LogEntry {
            commit_meta: CommitMeta {
                message: message.to_string(),
                ..Default::default()
            },
            parent_commit_hash: parent.to_string(),
        }
    }

    #[test]
    fn test_parse_drop_message_variants() {
        assert_eq!(
            parse_drop_message("DROP TABLE db.events").as_deref(),
            Some("db.events")
        );
        assert_eq!(
            parse_drop_message("drop table db.events").as_deref(),
            Some("db.events")
        );
        assert_eq!(
            parse_drop_message("  Drop\tTable \t  db.events  \n").as_deref(),
            Some("db.events")
        );
        assert_eq!(
            parse_drop_message(r#"DROP TABLE "my_folder".subfolder.mytable"#).as_deref(),
            Some(r#""my_folder".subfolder.mytable"#)
        );
    }

    #[test]
    fn test_parse_drop_message_rejects_non_drops() {
        assert_eq!(parse_drop_message("CREATE TABLE db.events"), None);
        assert_eq!(parse_drop_message("DROP VIEW db.events"), None);
        assert_eq!(parse_drop_message("DROP TABLE"), None);
        assert_eq!(parse_drop_message("DROP TABLE    "), None);
        assert_eq!(parse_drop_message("DROPTABLE db.events"), None);
        // Anchored: a drop mentioned later in the message does not count
        assert_eq!(parse_drop_message("Revert \"DROP TABLE db.events\""), None);
    }

    #[test]
    fn test_parse_drop_message_first_line_only() {
        assert_eq!(
            parse_drop_message("DROP TABLE db.events\n\nSigned-off-by: alice").as_deref(),
            Some("db.events")
        );
    }

    #[test]
    fn test_parse_drops_preserves_order_and_duplicates() {
        let entries = vec![
            entry("DROP TABLE db.a", "p1"),
            entry("INSERT INTO db.b", "p2"),
            entry("DROP TABLE db.a", "p3"),
            entry("drop table db.c", "p4"),
        ];

        let drops = parse_drops(&entries);
        let names: Vec<_> = drops.iter().map(|d| d.table_identifier.as_str()).collect();
        let parents: Vec<_> = drops.iter().map(|d| d.parent_commit_id.as_str()).collect();

        assert_eq!(names, vec!["db.a", "db.a", "db.c"]);
        assert_eq!(parents, vec!["p1", "p3", "p4"]);
    }
}
