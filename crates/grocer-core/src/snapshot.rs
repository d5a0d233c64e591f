//! JSON snapshot persistence for scraped products.
//!
//! A run hands its complete (or explicitly truncated) product list over once,
//! at the end; nothing is written mid-run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::products::GroceryProduct;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the snapshot file name for a run taken at `taken_at`, e.g.
/// `products_2026-10-19T08-00-00-000Z.json`.
#[must_use]
pub fn snapshot_file_name(store_slug: &str, taken_at: DateTime<Utc>) -> String {
    let stamp = taken_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    if store_slug.is_empty() {
        format!("products_{stamp}.json")
    } else {
        format!("products_{store_slug}_{stamp}.json")
    }
}

/// Writes `products` as pretty-printed JSON into `dir`, creating it first.
///
/// Returns the path of the written file.
///
/// # Errors
///
/// Returns [`SnapshotError`] if the directory cannot be created or the file
/// cannot be serialized or written.
pub fn write_snapshot(
    dir: &Path,
    store_slug: &str,
    products: &[GroceryProduct],
    taken_at: DateTime<Utc>,
) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|e| SnapshotError::CreateDir {
        path: dir.display().to_string(),
        source: e,
    })?;

    let path = dir.join(snapshot_file_name(store_slug, taken_at));
    let body = serde_json::to_string_pretty(products)?;
    std::fs::write(&path, body).map_err(|e| SnapshotError::Write {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(path)
}
