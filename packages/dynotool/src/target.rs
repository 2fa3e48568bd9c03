//! Export/import targets: local files or an object-store bucket.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DynoError, Result};
use crate::types::Segment;

const S3_PREFIX: &str = "s3://";

/// Where an export goes or an import comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Bucket(String),
}

impl Target {
    /// Parse a CLI target. `s3://name` selects a bucket; anything else is
    /// a file path, with `~/` expanded and `default_extension` appended
    /// when the path has none.
    pub fn parse(raw: &str, default_extension: &str) -> Result<Self> {
        if let Some(bucket) = raw.strip_prefix(S3_PREFIX) {
            let bucket = bucket.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(DynoError::InvalidArgument(format!("invalid bucket target '{}'", raw)));
            }
            return Ok(Target::Bucket(bucket.to_string()));
        }
        if raw.trim().is_empty() {
            return Err(DynoError::InvalidArgument("empty target path".to_string()));
        }
        let mut path = expand_home(raw);
        if path.extension().is_none() && !default_extension.is_empty() {
            path.set_extension(default_extension);
        }
        Ok(Target::File(path))
    }

    pub fn is_bucket(&self) -> bool {
        matches!(self, Target::Bucket(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Bucket(bucket) => write!(f, "{}{}", S3_PREFIX, bucket),
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}

/// Per-segment file: `<stem>-<index>.<ext>` next to `base`.
pub fn segment_path(base: &Path, segment: Segment) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}-{}.{}", stem, segment.index, ext.to_string_lossy()),
        None => format!("{}-{}", stem, segment.index),
    };
    base.with_file_name(name)
}

/// Object key of one exported page: `{table}_{page}-{segment}.json`.
///
/// An unsegmented export uses suffix 1, the name existing dump buckets
/// already carry. It matches segment 1 of a segmented run, so the two
/// kinds of export should not share a bucket.
pub fn page_object_key(table: &str, page: u64, segment: Option<Segment>) -> String {
    format!("{}_{}-{}.json", table, page, segment.map_or(UNSEGMENTED_SUFFIX, |s| s.index))
}

const UNSEGMENTED_SUFFIX: u32 = 1;

/// Blocking object-store collaborator.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;

    /// Every key in the bucket, in lexicographic order.
    fn list_objects(&self, bucket: &str) -> Result<Vec<String>>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}
