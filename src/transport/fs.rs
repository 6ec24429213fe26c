use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::constants::files::{PARQUET_EXTENSION, SNAPPY_PARQUET_SUFFIX};
use crate::errors::CleanError;

/// Year (or decade) a dataset shard covers, read from its file name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardYear {
    /// Calendar year, or the first year of the decade.
    pub year: i32,
    /// True for decade shards such as `amazon_reviews_1990s`.
    pub decade: bool,
}

/// Parquet files under `root` whose name starts with `prefix`, in path order.
///
/// When `years` is non-empty only single-year shards for those years are
/// kept; decade shards never match a year filter.
pub fn discover_parquet_files(
    root: &Path,
    prefix: &str,
    years: &[i32],
) -> Result<Vec<PathBuf>, CleanError> {
    if !root.is_dir() {
        return Err(CleanError::SourceUnavailable {
            source_id: root.display().to_string(),
            reason: "data directory does not exist".to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| CleanError::SourceUnavailable {
            source_id: root.display().to_string(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_file() || !is_parquet_file(entry.path()) {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        if !years.is_empty() {
            let wanted = infer_year_from_file_name(name, prefix)
                .is_some_and(|shard| !shard.decade && years.contains(&shard.year));
            if !wanted {
                debug!(file = name, "skipping shard outside selected years");
                continue;
            }
        }
        files.push(entry.into_path());
    }
    files.sort();
    Ok(files)
}

/// True if the path has a `.parquet` extension (case-insensitive).
pub fn is_parquet_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(PARQUET_EXTENSION))
        .unwrap_or(false)
}

/// Parse `<prefix><YYYY>[s].snappy.parquet` (or plain `.parquet`).
pub fn infer_year_from_file_name(name: &str, prefix: &str) -> Option<ShardYear> {
    let rest = name.strip_prefix(prefix)?;
    let stem = rest
        .strip_suffix(SNAPPY_PARQUET_SUFFIX)
        .or_else(|| rest.strip_suffix(&format!(".{PARQUET_EXTENSION}")))?;
    let (digits, decade) = match stem.strip_suffix('s') {
        Some(digits) => (digits, true),
        None => (stem, false),
    };
    if digits.len() != 4 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    Some(ShardYear {
        year: digits.parse().ok()?,
        decade,
    })
}
