//! Deletion-target derivation.
//!
//! Turns catalog or warehouse metadata into a [`StoragePrefix`]: the bucket
//! and bucket-relative key prefix whose objects belong to a dropped table.
//!
//! Two derivations exist:
//! - [`data_root_from_metadata_location`] truncates a table-format metadata
//!   pointer at its `/metadata/` segment.
//! - [`PathMapping::derive`] maps a dotted logical path such as
//!   `source.schema.table` onto `schema/table` inside a target bucket.
//!
//! Neither derivation decides whether a prefix is safe to purge. That is
//! [`StoragePrefix::ensure_depth`], which the purger calls before any listing.

use object_store::path::Path as ObjectPath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment separating a table root from its metadata files.
pub const METADATA_SEGMENT: &str = "/metadata/";

const SCHEME_SEPARATOR: &str = "://";

/// Errors raised while deriving or validating a deletion target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrefixError {
    #[error("metadata location '{0}' has no '/metadata/' segment")]
    MissingMetadataSegment(String),
    #[error("'{0}' is not a scheme://bucket/path location")]
    InvalidLocation(String),
    #[error("prefix '{prefix}' has {depth} segment(s), at least {min_depth} required")]
    Degenerate {
        prefix: String,
        depth: usize,
        min_depth: usize,
    },
    #[error("'{location}' is outside storage root '{root}'")]
    OutsideRoot { location: String, root: String },
    #[error("prefix '{prefix}' is not a valid object key: {reason}")]
    InvalidKey { prefix: String, reason: String },
}

/// A deletion target: every object in `bucket` whose key lies under `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePrefix {
    pub scheme: String,
    pub bucket: String,
    /// Bucket-relative key prefix without leading or trailing `/`
    pub prefix: String,
}

impl StoragePrefix {
    /// Build an `s3://` prefix.
    pub fn s3(bucket: impl Into<String>, prefix: &str) -> Self {
        Self {
            scheme: "s3".to_string(),
            bucket: bucket.into(),
            prefix: normalize(prefix),
        }
    }

    /// Parse `scheme://bucket/some/key/prefix`.
    ///
    /// The key part is kept verbatim apart from trimming `/`; no
    /// percent-decoding is applied.
    pub fn parse(location: &str) -> Result<Self, PrefixError> {
        let invalid = || PrefixError::InvalidLocation(location.to_string());

        let (scheme, rest) = location.split_once(SCHEME_SEPARATOR).ok_or_else(invalid)?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid());
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: bucket.to_string(),
            prefix: normalize(prefix),
        })
    }

    /// Number of non-empty `/`-separated segments in the key prefix.
    pub fn depth(&self) -> usize {
        self.prefix.split('/').filter(|s| !s.is_empty()).count()
    }

    /// Reject prefixes shallower than `min_depth`.
    ///
    /// An empty prefix is always rejected: it would address the whole bucket.
    pub fn ensure_depth(&self, min_depth: usize) -> Result<(), PrefixError> {
        let depth = self.depth();
        if depth == 0 || depth < min_depth {
            return Err(PrefixError::Degenerate {
                prefix: self.to_string(),
                depth,
                min_depth: min_depth.max(1),
            });
        }
        Ok(())
    }

    /// True when `other` is this prefix or lies below it, segment-wise.
    pub fn contains(&self, other: &StoragePrefix) -> bool {
        if self.scheme != other.scheme || self.bucket != other.bucket {
            return false;
        }
        if self.prefix.is_empty() {
            return true;
        }
        other.prefix == self.prefix
            || other
                .prefix
                .strip_prefix(&self.prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Resolve `location` as a target that must live under this root.
    pub fn resolve_within(&self, location: &str) -> Result<StoragePrefix, PrefixError> {
        let target = StoragePrefix::parse(location)?;
        if !self.contains(&target) {
            return Err(PrefixError::OutsideRoot {
                location: location.to_string(),
                root: self.to_string(),
            });
        }
        Ok(target)
    }

    /// The key prefix as an object store path.
    ///
    /// The key is taken as stored, without re-encoding, so characters such as
    /// `%` address the same objects the catalog or warehouse points at.
    pub fn object_path(&self) -> Result<ObjectPath, PrefixError> {
        ObjectPath::parse(&self.prefix).map_err(|e| PrefixError::InvalidKey {
            prefix: self.to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for StoragePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

/// Derive a table's data root from its metadata location.
///
/// `s3://bucket/db/table/metadata/00001-abc.metadata.json` becomes
/// `s3://bucket/db/table`. The first `/metadata/` segment wins.
pub fn data_root_from_metadata_location(metadata_location: &str) -> Result<&str, PrefixError> {
    match metadata_location.split_once(METADATA_SEGMENT) {
        Some((root, _)) if !root.is_empty() => Ok(root),
        _ => Err(PrefixError::MissingMetadataSegment(
            metadata_location.to_string(),
        )),
    }
}

/// How a warehouse logical path maps onto an object key prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathMapping {
    /// Character separating logical path segments
    pub delimiter: char,
    /// Leading segments to discard (the source name, by convention)
    pub skip_segments: usize,
}

impl Default for PathMapping {
    fn default() -> Self {
        Self {
            delimiter: '.',
            skip_segments: 1,
        }
    }
}

impl PathMapping {
    /// Map `logical_path` to a prefix inside `bucket`.
    ///
    /// With the defaults, `source.schema.table` becomes `s3://<bucket>/schema/table`.
    /// Leading segments are only discarded while a delimiter remains, so a path
    /// without any delimiter is used unchanged.
    pub fn derive(&self, logical_path: &str, bucket: &str) -> StoragePrefix {
        let mut remainder = logical_path;
        for _ in 0..self.skip_segments {
            match remainder.split_once(self.delimiter) {
                Some((_, rest)) => remainder = rest,
                None => break,
            }
        }

        let key = remainder.replace(self.delimiter, "/");
        StoragePrefix::s3(bucket, &key)
    }
}

fn normalize(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}
