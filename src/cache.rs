//! A persistent, confidence-gated cache of confirmed categorizations, keyed
//! by normalized transaction description.
//!
//! The cache is the cheapest layer of the pipeline: a repeat merchant is
//! resolved without touching the rule table or the classifier. It is held
//! fully in memory during a run and flushed to a single JSON document by
//! [PatternCache::save] at the end of a successful pipeline invocation.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    Error,
    models::{BudgetType, CategorizationResult},
    normalize::KeyNormalizer,
};

/// The minimum confidence a categorization needs before it is cached.
///
/// Anything below this threshold is never written: a wrong cached answer
/// would silently repeat on every future statement containing the merchant.
pub const MIN_CACHE_CONFIDENCE: f64 = 0.95;

/// Entries whose last cache hit is older than this many days are evicted
/// during [PatternCache::save].
pub const STALE_AFTER_DAYS: i64 = 180;

/// A previously-confirmed categorization stored in the pattern cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCategorization {
    /// The budget type previously assigned to this description.
    pub budget_type: BudgetType,

    /// The subcategory previously assigned, if any.
    pub budget_subcategory: Option<String>,

    /// The confidence the classifier reported when the entry was written.
    /// Always at least [MIN_CACHE_CONFIDENCE].
    pub confidence: f64,

    /// How many cache reads have produced this entry since it was written.
    pub hit_count: u64,

    /// When the entry was last read (or written, if it has never been read).
    #[serde(with = "time::serde::rfc3339")]
    pub last_hit: OffsetDateTime,
}

/// A key-normalized store mapping canonical transaction descriptions to
/// previously-confirmed categorizations, backed by a single JSON document.
///
/// The backing document is read once at construction and written once per
/// pipeline run by [PatternCache::save]. The pipeline assumes exclusive
/// ownership of its cache instance for the duration of one run.
#[derive(Debug)]
pub struct PatternCache {
    path: PathBuf,
    entries: HashMap<String, CachedCategorization>,
    normalizer: KeyNormalizer,
}

impl PatternCache {
    /// Load the cache from the JSON document at `path`.
    ///
    /// Loading is lenient: a missing, empty, or malformed document yields an
    /// empty cache rather than an error. A malformed document is logged as a
    /// warning since it means previously cached categorizations were lost.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::warn!(
                        "Discarding malformed pattern cache {}: {error}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(error) => {
                tracing::warn!("Could not read pattern cache {}: {error}", path.display());
                HashMap::new()
            }
        };

        Self {
            path,
            entries,
            normalizer: KeyNormalizer::default(),
        }
    }

    /// Look up the cached categorization for a transaction description.
    ///
    /// A hit increments the entry's hit count and refreshes its last-hit
    /// timestamp; the returned copy reflects both updates. A miss has no side
    /// effect.
    pub fn get(&mut self, description: &str) -> Option<CachedCategorization> {
        let key = self.normalizer.normalize(description);
        let entry = self.entries.get_mut(&key)?;

        entry.hit_count += 1;
        entry.last_hit = OffsetDateTime::now_utc();

        Some(entry.clone())
    }

    /// Store a categorization under the normalized form of `description`.
    ///
    /// Results below [MIN_CACHE_CONFIDENCE] are silently ignored; the cache
    /// must only ever hold answers confident enough to repeat without asking
    /// the classifier again. A written entry starts with a hit count of zero.
    pub fn put(&mut self, description: &str, result: &CategorizationResult) {
        if result.confidence < MIN_CACHE_CONFIDENCE {
            tracing::debug!(
                "Not caching \"{description}\" at confidence {}",
                result.confidence
            );
            return;
        }

        let key = self.normalizer.normalize(description);
        self.entries.insert(
            key,
            CachedCategorization {
                budget_type: result.budget_type,
                budget_subcategory: result.budget_subcategory.clone(),
                confidence: result.confidence,
                hit_count: 0,
                last_hit: OffsetDateTime::now_utc(),
            },
        );
    }

    /// Evict stale entries, then write the remaining map to the backing file
    /// as a full-document overwrite.
    ///
    /// An entry is stale when its last hit is more than [STALE_AFTER_DAYS]
    /// days ago. Eviction runs before serialization so stale entries are
    /// never persisted past their window.
    ///
    /// # Errors
    /// This function will return an [Error::CacheSave] if the document cannot
    /// be serialized or written.
    pub fn save(&mut self) -> Result<(), Error> {
        let now = OffsetDateTime::now_utc();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.last_hit <= Duration::days(STALE_AFTER_DAYS));

        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {evicted} stale pattern cache entries");
        }

        let contents = serde_json::to_string_pretty(&self.entries)
            .map_err(|error| Error::CacheSave(error.to_string()))?;
        fs::write(&self.path, contents).map_err(|error| Error::CacheSave(error.to_string()))
    }

    /// Empty the in-memory map without touching the backing file.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The number of entries currently held in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod pattern_cache_tests {
    use std::{collections::HashMap, fs};

    use time::{Duration, OffsetDateTime};

    use crate::{
        cache::{CachedCategorization, PatternCache, STALE_AFTER_DAYS},
        models::{BudgetType, CategorizationResult},
    };

    fn result_with_confidence(confidence: f64) -> CategorizationResult {
        CategorizationResult {
            id: 1,
            budget_type: BudgetType::Choice,
            budget_subcategory: Some("Streaming".to_string()),
            confidence,
        }
    }

    fn entry_last_hit_days_ago(days: i64) -> CachedCategorization {
        CachedCategorization {
            budget_type: BudgetType::Choice,
            budget_subcategory: None,
            confidence: 0.97,
            hit_count: 3,
            last_hit: OffsetDateTime::now_utc() - Duration::days(days),
        }
    }

    #[test]
    fn load_missing_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();

        let cache = PatternCache::load(dir.path().join("no_such_cache.json"));

        assert!(cache.is_empty());
    }

    #[test]
    fn load_malformed_file_yields_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = PatternCache::load(&path);

        assert!(cache.is_empty());
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PatternCache::load(dir.path().join("cache.json"));
        cache.put("NETFLIX.COM 12/05", &result_with_confidence(0.97));

        let entry = cache.get("NETFLIX.COM 12/06");

        let entry = entry.expect("expected a cache hit");
        assert_eq!(entry.budget_type, BudgetType::Choice);
        assert_eq!(entry.budget_subcategory, Some("Streaming".to_string()));
        assert_eq!(entry.confidence, 0.97);
    }

    #[test]
    fn put_rejects_low_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PatternCache::load(dir.path().join("cache.json"));

        cache.put("NETFLIX.COM", &result_with_confidence(0.94));

        assert!(cache.is_empty());
        assert_eq!(cache.get("NETFLIX.COM"), None);
    }

    #[test]
    fn put_accepts_confidence_at_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PatternCache::load(dir.path().join("cache.json"));

        cache.put("NETFLIX.COM", &result_with_confidence(0.95));

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_increments_hit_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PatternCache::load(dir.path().join("cache.json"));
        cache.put("NETFLIX.COM", &result_with_confidence(0.99));

        let first = cache.get("NETFLIX.COM").unwrap();
        let second = cache.get("netflix.com").unwrap();

        assert_eq!(first.hit_count, 1);
        assert_eq!(second.hit_count, 2);
    }

    #[test]
    fn get_miss_has_no_side_effect() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = PatternCache::load(dir.path().join("cache.json"));

        assert_eq!(cache.get("UNKNOWN MERCHANT"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn save_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = PatternCache::load(&path);
        cache.put("NETFLIX.COM 12/05", &result_with_confidence(0.97));
        cache.save().expect("Could not save cache");

        let mut reloaded = PatternCache::load(&path);

        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("NETFLIX.COM 01/06").is_some());
    }

    #[test]
    fn save_evicts_entries_older_than_staleness_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let entries = HashMap::from([
            (
                "old merchant".to_string(),
                entry_last_hit_days_ago(STALE_AFTER_DAYS + 20),
            ),
            ("fresh merchant".to_string(), entry_last_hit_days_ago(2)),
        ]);
        fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let mut cache = PatternCache::load(&path);
        assert_eq!(cache.len(), 2);
        cache.save().expect("Could not save cache");

        assert_eq!(cache.len(), 1);
        let mut reloaded = PatternCache::load(&path);
        assert_eq!(reloaded.get("old merchant"), None);
        assert!(reloaded.get("fresh merchant").is_some());
    }

    #[test]
    fn clear_empties_memory_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = PatternCache::load(&path);
        cache.put("NETFLIX.COM", &result_with_confidence(0.99));
        cache.save().expect("Could not save cache");

        cache.clear();

        assert!(cache.is_empty());
        // The backing file still holds the entry until the next save.
        let reloaded = PatternCache::load(&path);
        assert_eq!(reloaded.len(), 1);
    }
}
