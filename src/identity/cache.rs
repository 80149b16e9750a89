//! Durable embedding cache.
//!
//! The cache stores every identity's embedding together with the registry
//! fingerprint it was computed from. It is advisory on read: any problem
//! (missing file, bad JSON, wrong shape) just means a full recompute.
//! Writes replace the whole file atomically so a crashed rebuild can never
//! leave a torn cache behind.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::KnownIdentity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    /// Fingerprint of the registry this cache was built from.
    pub fingerprint: String,
    pub entries: Vec<KnownIdentity>,
}

/// Load the cache, or `None` if it is absent or unreadable.
pub fn load(path: &Path) -> Option<CacheFile> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(path = ?path, error = %e, "Embedding cache not readable");
            return None;
        }
    };

    match serde_json::from_str::<CacheFile>(&content) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Embedding cache malformed, will rebuild");
            None
        }
    }
}

/// Write the cache as a single atomic replace (temp file + rename).
pub fn store(path: &Path, cache: &CacheFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache directory {:?}", parent))?;
    }

    let content = serde_json::to_string(cache)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, content)
        .with_context(|| format!("failed to write embedding cache {:?}", tmp_path))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to replace embedding cache {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CacheFile {
        CacheFile {
            fingerprint: "abc123".to_string(),
            entries: vec![KnownIdentity {
                name: "Alice".to_string(),
                image: "alice.jpg".to_string(),
                embedding: vec![0.1, 0.2, 0.3],
            }],
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        store(&path, &sample()).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.fingerprint, "abc123");
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].name, "Alice");
        assert_eq!(loaded.entries[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).is_none());
    }

    #[test]
    fn malformed_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_none());
    }

    #[test]
    fn store_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        store(&path, &sample()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["embeddings.json".to_string()]);
    }
}
