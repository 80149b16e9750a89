//! The identity index: a consistent, swappable set of `{name, embedding}`
//! pairs for the matcher.
//!
//! `load` either accepts the durable cache wholesale (fingerprint match) or
//! recomputes every registry entry from scratch; the in-memory set is only
//! ever replaced as a whole, so concurrent readers never observe a partial
//! rebuild.

use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

use crate::embed::EmbeddingProvider;

use super::cache::{self, CacheFile};
use super::{read_registry, registry_fingerprint, resolve_image_path, EnrollmentRecord, KnownIdentity};

/// Summary of one `load` pass, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// The durable cache was accepted; no embeddings were recomputed.
    pub from_cache: bool,
    /// Identities usable for matching after this load.
    pub loaded: usize,
    /// Registry entries dropped (missing image, embedding failure,
    /// duplicate name).
    pub skipped: usize,
}

pub struct IdentityIndex {
    registry_path: PathBuf,
    cache_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    known: RwLock<Arc<Vec<KnownIdentity>>>,
}

impl IdentityIndex {
    pub fn new(
        registry_path: PathBuf,
        cache_path: PathBuf,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            registry_path,
            cache_path,
            provider,
            known: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current known set. The returned `Arc` stays consistent for the
    /// caller even if a reload swaps the set mid-comparison.
    pub fn snapshot(&self) -> Arc<Vec<KnownIdentity>> {
        self.known.read().expect("identity index lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Rebuild from the registry, bypassing the cache. Used after
    /// enrollment or deletion changes.
    pub fn reload(&self) -> LoadReport {
        self.load(true)
    }

    /// Load the known set, serving from the durable cache when its
    /// fingerprint still matches the registry.
    ///
    /// Individual bad entries (missing image, provider failure) are
    /// skipped, never fatal. An unreadable registry empties the index so
    /// matching degrades to "no match" instead of running on stale data.
    pub fn load(&self, force_rebuild: bool) -> LoadReport {
        let records = match read_registry(&self.registry_path) {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Enrollment registry unreadable, clearing identity index");
                self.swap(Vec::new());
                return LoadReport {
                    from_cache: false,
                    loaded: 0,
                    skipped: 0,
                };
            }
        };

        let fingerprint = registry_fingerprint(&records);

        if !force_rebuild {
            if let Some(cache) = cache::load(&self.cache_path) {
                if cache.fingerprint == fingerprint {
                    let loaded = cache.entries.len();
                    debug!(identities = loaded, "Embedding cache accepted");
                    self.swap(cache.entries);
                    return LoadReport {
                        from_cache: true,
                        loaded,
                        skipped: 0,
                    };
                }
                debug!("Embedding cache stale, recomputing all identities");
            }
        }

        let (records, duplicates) = dedup_by_name(records);
        let entries = self.embed_all(&records);
        let skipped = duplicates + records.len() - entries.len();

        if let Err(e) = cache::store(
            &self.cache_path,
            &CacheFile {
                fingerprint,
                entries: entries.clone(),
            },
        ) {
            warn!(error = %e, "Failed to persist embedding cache");
        }

        info!(
            identities = entries.len(),
            skipped, "Identity index rebuilt"
        );

        let loaded = entries.len();
        self.swap(entries);
        LoadReport {
            from_cache: false,
            loaded,
            skipped,
        }
    }

    /// Embed every registry entry, preserving registry order. Entries
    /// whose image is missing or whose embedding fails are dropped.
    fn embed_all(&self, records: &[EnrollmentRecord]) -> Vec<KnownIdentity> {
        records
            .par_iter()
            .map(|record| self.embed_entry(record))
            .collect::<Vec<Option<KnownIdentity>>>()
            .into_iter()
            .flatten()
            .collect()
    }

    fn embed_entry(&self, record: &EnrollmentRecord) -> Option<KnownIdentity> {
        let image_path = resolve_image_path(&self.registry_path, &record.image);

        let bytes = match std::fs::read(&image_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(name = %record.name, path = ?image_path, error = %e,
                    "Enrollment image unreadable, skipping identity");
                return None;
            }
        };

        let mut embeddings = match self.provider.extract(&bytes) {
            Ok(embeddings) => embeddings,
            Err(e) => {
                warn!(name = %record.name, path = ?image_path, error = %e,
                    "Embedding failed, skipping identity");
                return None;
            }
        };

        if embeddings.is_empty() {
            warn!(name = %record.name, path = ?image_path,
                "No face in enrollment image, skipping identity");
            return None;
        }
        if embeddings.len() > 1 {
            warn!(name = %record.name, faces = embeddings.len(),
                "Multiple faces in enrollment image, using the first");
        }

        Some(KnownIdentity {
            name: record.name.clone(),
            image: record.image.clone(),
            embedding: embeddings.swap_remove(0),
        })
    }

    fn swap(&self, entries: Vec<KnownIdentity>) {
        *self.known.write().expect("identity index lock poisoned") = Arc::new(entries);
    }
}

/// Names are unique case-insensitively; the first occurrence wins.
/// Returns the deduplicated records and how many were dropped.
fn dedup_by_name(records: Vec<EnrollmentRecord>) -> (Vec<EnrollmentRecord>, usize) {
    let mut seen = std::collections::HashSet::new();
    let before = records.len();
    let kept: Vec<EnrollmentRecord> = records
        .into_iter()
        .filter(|record| {
            if seen.insert(record.name.to_lowercase()) {
                true
            } else {
                warn!(name = %record.name, "Duplicate enrollment name, keeping first entry");
                false
            }
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbedError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test provider: embeds the image file's text content ("0.1,0.2,...")
    /// and counts how often it is called. "FAIL" errors, "EMPTY" finds no
    /// face.
    struct TextProvider {
        calls: AtomicUsize,
    }

    impl TextProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingProvider for TextProvider {
        fn extract(&self, image: &[u8]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::str::from_utf8(image)
                .map_err(|e| EmbedError::Decode(e.to_string()))?
                .trim();
            match text {
                "FAIL" => Err(EmbedError::Backend("synthetic failure".to_string())),
                "EMPTY" => Ok(Vec::new()),
                _ => {
                    let values: Vec<f32> = text
                        .split(',')
                        .map(|v| v.trim().parse::<f32>().unwrap())
                        .collect();
                    Ok(vec![values])
                }
            }
        }

        fn provider_name(&self) -> &'static str {
            "text"
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        provider: Arc<TextProvider>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                provider: TextProvider::new(),
            }
        }

        fn registry_path(&self) -> PathBuf {
            self.dir.path().join("registry.json")
        }

        fn write_registry(&self, entries: &[(&str, &str)]) {
            let records: Vec<EnrollmentRecord> = entries
                .iter()
                .map(|(name, image)| EnrollmentRecord {
                    name: name.to_string(),
                    image: image.to_string(),
                })
                .collect();
            std::fs::write(
                self.registry_path(),
                serde_json::to_string(&records).unwrap(),
            )
            .unwrap();
        }

        fn write_image(&self, file: &str, content: &str) {
            std::fs::write(self.dir.path().join(file), content).unwrap();
        }

        fn index(&self) -> IdentityIndex {
            IdentityIndex::new(
                self.registry_path(),
                self.dir.path().join("embeddings.json"),
                self.provider.clone(),
            )
        }
    }

    fn names(index: &IdentityIndex) -> Vec<String> {
        index.snapshot().iter().map(|k| k.name.clone()).collect()
    }

    #[test]
    fn unchanged_registry_is_served_from_cache() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg"), ("Bob", "bob.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        fx.write_image("bob.jpg", "0,1");
        let index = fx.index();

        let first = index.load(false);
        assert!(!first.from_cache);
        assert_eq!(first.loaded, 2);
        assert_eq!(fx.provider.call_count(), 2);

        let second = index.load(false);
        assert!(second.from_cache);
        assert_eq!(second.loaded, 2);
        // No recomputation on the second load.
        assert_eq!(fx.provider.call_count(), 2);
        assert_eq!(names(&index), vec!["Alice", "Bob"]);
    }

    #[test]
    fn registry_change_invalidates_cache() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        let index = fx.index();
        index.load(false);
        assert_eq!(fx.provider.call_count(), 1);

        fx.write_registry(&[("Alice", "alice.jpg"), ("Bob", "bob.jpg")]);
        fx.write_image("bob.jpg", "0,1");
        let report = index.load(false);

        assert!(!report.from_cache);
        // Full recompute: both entries embedded fresh.
        assert_eq!(fx.provider.call_count(), 3);
        assert_eq!(names(&index), vec!["Alice", "Bob"]);
    }

    #[test]
    fn force_rebuild_bypasses_cache() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        let index = fx.index();

        index.load(false);
        let report = index.reload();

        assert!(!report.from_cache);
        assert_eq!(fx.provider.call_count(), 2);
    }

    #[test]
    fn missing_image_skips_only_that_identity() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg"), ("Ghost", "ghost.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        let index = fx.index();

        let report = index.load(false);

        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(names(&index), vec!["Alice"]);
    }

    #[test]
    fn embedding_failures_skip_only_that_identity() {
        let fx = Fixture::new();
        fx.write_registry(&[
            ("Alice", "alice.jpg"),
            ("Broken", "broken.jpg"),
            ("Faceless", "faceless.jpg"),
        ]);
        fx.write_image("alice.jpg", "1,0");
        fx.write_image("broken.jpg", "FAIL");
        fx.write_image("faceless.jpg", "EMPTY");
        let index = fx.index();

        let report = index.load(false);

        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(names(&index), vec!["Alice"]);
    }

    #[test]
    fn unreadable_registry_empties_the_index() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        let index = fx.index();
        index.load(false);
        assert_eq!(index.len(), 1);

        std::fs::remove_file(fx.registry_path()).unwrap();
        let report = index.load(false);

        assert_eq!(report.loaded, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_names_keep_the_first_entry() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg"), ("alice", "alice2.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        fx.write_image("alice2.jpg", "0,1");
        let index = fx.index();

        let report = index.load(false);

        assert_eq!(report.loaded, 1);
        assert_eq!(report.skipped, 1);
        let snapshot = index.snapshot();
        assert_eq!(snapshot[0].image, "alice.jpg");
    }

    #[test]
    fn snapshot_stays_consistent_across_reload() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        let index = fx.index();
        index.load(false);

        let held = index.snapshot();
        fx.write_registry(&[("Bob", "bob.jpg")]);
        fx.write_image("bob.jpg", "0,1");
        index.reload();

        // The held snapshot is unchanged; a fresh one sees the new set.
        assert_eq!(held[0].name, "Alice");
        assert_eq!(names(&index), vec!["Bob"]);
    }

    #[test]
    fn cache_file_is_written_atomically_named() {
        let fx = Fixture::new();
        fx.write_registry(&[("Alice", "alice.jpg")]);
        fx.write_image("alice.jpg", "1,0");
        fx.index().load(false);

        assert!(Path::new(&fx.dir.path().join("embeddings.json")).exists());
        assert!(!Path::new(&fx.dir.path().join("embeddings.json.tmp")).exists());
    }
}
