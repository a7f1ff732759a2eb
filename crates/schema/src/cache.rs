//! Disk-backed schema snapshot cache with grace-period retention.
//!
//! Layout mirrors one file pair per graph ref under the cache directory:
//! `{key}.graphql` holds the SDL, `{key}.meta.json` holds provenance.
//! Every failure reading or decoding a pair is treated as a miss: the
//! cache can only ever withhold a snapshot, never surface an error.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, UNIX_EPOCH};

use graphref_registry::SchemaSnapshot;
use graphref_types::GraphRef;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How long a replaced snapshot stays reachable after a newer one lands.
const GRACE_PERIOD: Duration = Duration::from_secs(300);

/// Freshness of a cached snapshot relative to the caller's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL and not invalidated.
    Fresh,
    /// Usable, but the resolver should refresh in the background.
    Stale,
}

/// A cache hit: the snapshot plus how much to trust it.
#[derive(Debug, Clone)]
pub struct CachedSchema {
    pub snapshot: SchemaSnapshot,
    pub freshness: Freshness,
}

#[derive(Debug)]
struct CacheEntry {
    active: SchemaSnapshot,
    /// Replaced snapshot, kept until the grace period elapses.
    previous: Option<(SchemaSnapshot, Instant)>,
    /// Set by `invalidate`; cleared by the next `put`.
    invalidated: bool,
}

/// Sidecar metadata persisted next to the SDL.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotMeta {
    graph_ref: String,
    hash: String,
    fetched_at_secs: u64,
}

/// In-memory snapshot cache with an optional disk mirror.
#[derive(Debug)]
pub struct SchemaCache {
    dir: Option<PathBuf>,
    entries: HashMap<GraphRef, CacheEntry>,
}

impl SchemaCache {
    /// Cache mirrored to the platform cache directory.
    ///
    /// Falls back to memory-only when no cache directory is available.
    #[must_use]
    pub fn new() -> Self {
        let dir = dirs::cache_dir().map(|base| base.join("graphref"));
        Self {
            dir,
            entries: HashMap::new(),
        }
    }

    /// Cache mirrored to a specific directory.
    #[must_use]
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            entries: HashMap::new(),
        }
    }

    /// Memory-only cache (no persistence across restarts).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            entries: HashMap::new(),
        }
    }

    /// Look up the snapshot for `graph_ref`, loading from disk on a memory
    /// miss. `ttl` decides freshness; an invalidated entry is always stale.
    pub fn get(&mut self, graph_ref: &GraphRef, ttl: Duration) -> Option<CachedSchema> {
        self.prune_previous(graph_ref);

        if !self.entries.contains_key(graph_ref) {
            if let Some(snapshot) = self.load_from_disk(graph_ref) {
                self.entries.insert(
                    graph_ref.clone(),
                    CacheEntry {
                        active: snapshot,
                        previous: None,
                        invalidated: false,
                    },
                );
            }
        }

        let entry = self.entries.get(graph_ref)?;
        let freshness = if entry.invalidated || entry.active.age() > ttl {
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        Some(CachedSchema {
            snapshot: entry.active.clone(),
            freshness,
        })
    }

    /// Install a snapshot. Returns `false` (and keeps the current snapshot)
    /// when `snapshot` is older than what is already installed; snapshot
    /// installation is monotonic in fetch time.
    pub fn put(&mut self, snapshot: SchemaSnapshot) -> bool {
        let graph_ref = snapshot.graph_ref().clone();

        if let Some(entry) = self.entries.get_mut(&graph_ref) {
            if !snapshot.is_at_least_as_fresh_as(&entry.active) {
                debug!(graph_ref = %graph_ref, "ignoring snapshot older than installed one");
                return false;
            }
            let replaced = std::mem::replace(&mut entry.active, snapshot);
            entry.previous = Some((replaced, Instant::now()));
            entry.invalidated = false;
        } else {
            self.entries.insert(
                graph_ref.clone(),
                CacheEntry {
                    active: snapshot,
                    previous: None,
                    invalidated: false,
                },
            );
        }

        if let Some(entry) = self.entries.get(&graph_ref) {
            if let Err(e) = self.persist(&entry.active) {
                warn!(graph_ref = %graph_ref, error = %e, "failed to persist schema snapshot");
            }
        }
        true
    }

    /// The snapshot that was replaced by the current one, if the grace
    /// period has not elapsed yet.
    #[must_use]
    pub fn previous(&self, graph_ref: &GraphRef) -> Option<&SchemaSnapshot> {
        let (snapshot, replaced_at) = self.entries.get(graph_ref)?.previous.as_ref()?;
        (replaced_at.elapsed() <= GRACE_PERIOD).then_some(snapshot)
    }

    /// Mark the entry stale without dropping it: the next `get` reports
    /// `Stale` so the resolver refreshes while analysis keeps the snapshot.
    pub fn invalidate(&mut self, graph_ref: &GraphRef) {
        if let Some(entry) = self.entries.get_mut(graph_ref) {
            entry.invalidated = true;
        }
    }

    /// Drop the entry from memory and disk.
    pub fn remove(&mut self, graph_ref: &GraphRef) {
        self.entries.remove(graph_ref);
        if let Some(dir) = &self.dir {
            let key = cache_key(graph_ref);
            let _ = std::fs::remove_file(sdl_path(dir, &key));
            let _ = std::fs::remove_file(meta_path(dir, &key));
        }
    }

    fn prune_previous(&mut self, graph_ref: &GraphRef) {
        if let Some(entry) = self.entries.get_mut(graph_ref) {
            if entry
                .previous
                .as_ref()
                .is_some_and(|(_, replaced_at)| replaced_at.elapsed() > GRACE_PERIOD)
            {
                entry.previous = None;
            }
        }
    }

    fn load_from_disk(&self, graph_ref: &GraphRef) -> Option<SchemaSnapshot> {
        let dir = self.dir.as_ref()?;
        let key = cache_key(graph_ref);
        let meta_file = meta_path(dir, &key);
        let sdl_file = sdl_path(dir, &key);

        let loaded = read_snapshot(&meta_file, &sdl_file, graph_ref);
        if loaded.is_none() && (meta_file.exists() || sdl_file.exists()) {
            // Corrupt or mismatched pair: discard it so it cannot keep
            // shadowing the registry.
            warn!(graph_ref = %graph_ref, "removing unreadable cache entry");
            let _ = std::fs::remove_file(meta_file);
            let _ = std::fs::remove_file(sdl_file);
        }
        loaded
    }

    fn persist(&self, snapshot: &SchemaSnapshot) -> std::io::Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;

        let key = cache_key(snapshot.graph_ref());
        let meta = SnapshotMeta {
            graph_ref: snapshot.graph_ref().to_string(),
            hash: snapshot.hash().to_string(),
            fetched_at_secs: snapshot
                .fetched_at()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(sdl_path(dir, &key), snapshot.sdl().as_ref())?;
        std::fs::write(meta_path(dir, &key), meta_json)?;
        debug!(graph_ref = %snapshot.graph_ref(), key = %key, "persisted schema snapshot");
        Ok(())
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Every read/decode failure is a miss by design of the caller; this helper
/// just returns `None` at the first sign of trouble.
fn read_snapshot(meta_file: &Path, sdl_file: &Path, graph_ref: &GraphRef) -> Option<SchemaSnapshot> {
    let meta_content = std::fs::read_to_string(meta_file).ok()?;
    let meta: SnapshotMeta = serde_json::from_str(&meta_content).ok()?;
    if meta.graph_ref != graph_ref.to_string() {
        return None;
    }
    let sdl = std::fs::read_to_string(sdl_file).ok()?;
    let fetched_at = UNIX_EPOCH + Duration::from_secs(meta.fetched_at_secs);
    Some(SchemaSnapshot::new(
        graph_ref.clone(),
        sdl,
        meta.hash,
        fetched_at,
    ))
}

fn cache_key(graph_ref: &GraphRef) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    graph_ref.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn sdl_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.graphql"))
}

fn meta_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.meta.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    const TTL: Duration = Duration::from_secs(300);

    fn graph_ref() -> GraphRef {
        "my-service@current".parse().unwrap()
    }

    fn snapshot_at(fetched_at: SystemTime, hash: &str) -> SchemaSnapshot {
        SchemaSnapshot::new(graph_ref(), "type Query { a: Int }", hash, fetched_at)
    }

    #[test]
    fn test_miss_on_empty_cache() {
        let mut cache = SchemaCache::in_memory();
        assert!(cache.get(&graph_ref(), TTL).is_none());
    }

    #[test]
    fn test_put_then_get_fresh() {
        let mut cache = SchemaCache::in_memory();
        assert!(cache.put(snapshot_at(SystemTime::now(), "h1")));

        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.freshness, Freshness::Fresh);
        assert_eq!(hit.snapshot.hash().as_ref(), "h1");
    }

    #[test]
    fn test_expired_snapshot_is_stale_not_missing() {
        let mut cache = SchemaCache::in_memory();
        cache.put(snapshot_at(SystemTime::now() - Duration::from_secs(3600), "h1"));

        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.freshness, Freshness::Stale);
    }

    #[test]
    fn test_put_rejects_older_snapshot() {
        let mut cache = SchemaCache::in_memory();
        let now = SystemTime::now();
        assert!(cache.put(snapshot_at(now, "new")));
        assert!(!cache.put(snapshot_at(now - Duration::from_secs(10), "old")));

        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.snapshot.hash().as_ref(), "new");
    }

    #[test]
    fn test_replaced_snapshot_reachable_within_grace() {
        let mut cache = SchemaCache::in_memory();
        let now = SystemTime::now();
        cache.put(snapshot_at(now, "h1"));
        cache.put(snapshot_at(now + Duration::from_secs(1), "h2"));

        assert_eq!(
            cache.previous(&graph_ref()).map(|s| s.hash().as_ref()),
            Some("h1")
        );
        assert_eq!(
            cache.get(&graph_ref(), TTL).unwrap().snapshot.hash().as_ref(),
            "h2"
        );
    }

    #[test]
    fn test_invalidate_marks_stale() {
        let mut cache = SchemaCache::in_memory();
        cache.put(snapshot_at(SystemTime::now(), "h1"));
        cache.invalidate(&graph_ref());

        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.freshness, Freshness::Stale);

        // A fresh put clears the flag.
        cache.put(snapshot_at(SystemTime::now() + Duration::from_secs(1), "h2"));
        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.freshness, Freshness::Fresh);
    }

    #[test]
    fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = SchemaCache::with_dir(dir.path());
            cache.put(snapshot_at(SystemTime::now(), "h1"));
        }

        // A fresh cache instance loads from disk.
        let mut cache = SchemaCache::with_dir(dir.path());
        let hit = cache.get(&graph_ref(), TTL).unwrap();
        assert_eq!(hit.snapshot.hash().as_ref(), "h1");
        assert!(hit.snapshot.schema().types.contains_key("Query"));
    }

    #[test]
    fn test_corrupt_meta_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = SchemaCache::with_dir(dir.path());
            cache.put(snapshot_at(SystemTime::now(), "h1"));
        }
        let key = cache_key(&graph_ref());
        std::fs::write(meta_path(dir.path(), &key), "{not json").unwrap();

        let mut cache = SchemaCache::with_dir(dir.path());
        assert!(cache.get(&graph_ref(), TTL).is_none());
        // The corrupt pair was removed.
        assert!(!meta_path(dir.path(), &key).exists());
        assert!(!sdl_path(dir.path(), &key).exists());
    }

    #[test]
    fn test_missing_sdl_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut cache = SchemaCache::with_dir(dir.path());
            cache.put(snapshot_at(SystemTime::now(), "h1"));
        }
        let key = cache_key(&graph_ref());
        std::fs::remove_file(sdl_path(dir.path(), &key)).unwrap();

        let mut cache = SchemaCache::with_dir(dir.path());
        assert!(cache.get(&graph_ref(), TTL).is_none());
    }

    #[test]
    fn test_remove_drops_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SchemaCache::with_dir(dir.path());
        cache.put(snapshot_at(SystemTime::now(), "h1"));
        cache.remove(&graph_ref());

        assert!(cache.get(&graph_ref(), TTL).is_none());
        let key = cache_key(&graph_ref());
        assert!(!sdl_path(dir.path(), &key).exists());
    }
}
