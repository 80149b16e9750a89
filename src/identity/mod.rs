//! Enrolled identities: registry parsing, fingerprinting and the
//! embedding index used by the matcher.

pub mod cache;
pub mod index;

pub use index::{IdentityIndex, LoadReport};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// One entry of the enrollment registry: a person and their enrollment
/// image. The image path is resolved relative to the registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub name: String,
    pub image: String,
}

/// An enrolled identity with a successfully computed embedding.
///
/// Only identities that made it through the embedding provider appear in
/// the index; entries that failed are skipped during a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownIdentity {
    pub name: String,
    pub image: String,
    pub embedding: Vec<f32>,
}

/// Read the enrollment registry (a JSON array of `{name, image}` records).
pub fn read_registry(path: &Path) -> Result<Vec<EnrollmentRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read enrollment registry {:?}", path))?;
    let records: Vec<EnrollmentRecord> = serde_json::from_str(&content)
        .with_context(|| format!("invalid enrollment registry {:?}", path))?;
    Ok(records)
}

/// Resolve an enrollment image reference against the registry's directory.
pub fn resolve_image_path(registry_path: &Path, image: &str) -> PathBuf {
    let image_path = Path::new(image);
    if image_path.is_absolute() {
        return image_path.to_path_buf();
    }
    registry_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(image_path)
}

/// Content fingerprint of a registry: SHA-256 over the sorted multiset of
/// (lowercased name, image reference) pairs. The cache is valid exactly
/// when its stored fingerprint equals the current registry's.
pub fn registry_fingerprint(records: &[EnrollmentRecord]) -> String {
    let mut pairs: Vec<(String, &str)> = records
        .iter()
        .map(|r| (r.name.to_lowercase(), r.image.as_str()))
        .collect();
    pairs.sort();

    let mut hasher = Sha256::new();
    for (name, image) in pairs {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(image.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}
