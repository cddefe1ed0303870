//! Decoded-image cache with cost-aware LRU eviction
//!
//! Provides in-memory caching of decoded images keyed by canonical file path,
//! with automatic eviction of the least recently used entries when either the
//! entry-count limit or the aggregate byte-cost limit is exceeded.

use image::RgbaImage;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stable identifier for a filesystem image resource.
///
/// Two keys are equal when they name the same canonical path. Construction
/// canonicalizes the path when the file exists; for paths that do not (yet)
/// resolve, the path is kept as given and the later resolve step reports the
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(Arc<PathBuf>);

impl ImageKey {
    /// Create a key for a filesystem path, canonicalizing it when possible.
    pub fn for_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self(Arc::new(canonical))
    }

    /// The canonical path this key names.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A decoded raster image together with its estimated memory cost.
///
/// The cost is computed exactly once, at construction, from the pixel buffer
/// size. The pixel data is shared behind an `Arc`, so cloning a
/// `DecodedImage` never copies pixels and every subscriber of a load observes
/// the identical raster.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbaImage>,
    cost_bytes: u64,
}

impl DecodedImage {
    /// Wrap a decoded RGBA raster, computing its byte cost.
    pub fn from_rgba(image: RgbaImage) -> Self {
        let cost_bytes = image.as_raw().len() as u64;
        Self {
            pixels: Arc::new(image),
            cost_bytes,
        }
    }

    /// Width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Estimated resident memory cost in bytes.
    pub fn cost_bytes(&self) -> u64 {
        self.cost_bytes
    }

    /// The underlying raster.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Configured limits of a cache instance.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheInfo {
    /// Maximum number of entries the cache will hold.
    pub count_limit: usize,

    /// Maximum aggregate cost in bytes.
    pub cost_limit: u64,
}

/// Hit/miss statistics together with the configured limits.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStatistics {
    /// Entry-count limit of the cache.
    pub max_count: usize,

    /// Aggregate cost limit in bytes.
    pub max_cost: u64,

    /// Number of lookups that found an entry.
    pub hits: u64,

    /// Number of lookups that found nothing.
    pub misses: u64,
}

impl CacheStatistics {
    /// Fraction of lookups that were hits, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Receipt for an entry the cache dropped during an insert.
///
/// The cache does not know about the memory budget; whoever drives the cache
/// forwards these receipts to [`MemoryBudgetManager::did_unload_image`] so
/// the two admission layers stay consistent.
///
/// [`MemoryBudgetManager::did_unload_image`]: crate::MemoryBudgetManager::did_unload_image
#[derive(Debug, Clone)]
pub struct Evicted {
    /// Key of the dropped entry.
    pub key: ImageKey,

    /// Cost of the dropped entry in bytes.
    pub cost: u64,
}

struct CacheState {
    entries: HashMap<ImageKey, DecodedImage>,

    /// Least recently used at the front, most recently used at the back.
    lru: VecDeque<ImageKey>,

    total_cost: u64,
    max_count: usize,
    max_cost: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn new(max_count: usize, max_cost: u64) -> Self {
        Self {
            entries: HashMap::new(),
            lru: VecDeque::new(),
            total_cost: 0,
            max_count,
            max_cost,
            hits: 0,
            misses: 0,
        }
    }

    /// Mark a key as most recently used.
    fn touch(&mut self, key: &ImageKey) {
        self.lru.retain(|k| k != key);
        self.lru.push_back(key.clone());
    }

    fn evict_lru(&mut self) -> Option<Evicted> {
        let key = self.lru.pop_front()?;
        let image = self.entries.remove(&key)?;
        self.total_cost = self.total_cost.saturating_sub(image.cost_bytes());
        Some(Evicted {
            key,
            cost: image.cost_bytes(),
        })
    }

    fn over_limit(&self) -> bool {
        self.entries.len() > self.max_count || self.total_cost > self.max_cost
    }
}

/// Bounded, cost-aware LRU cache of decoded images.
///
/// Thread-safe without caller-side locking; every operation takes the single
/// internal lock, so the entry count and aggregate cost always move together.
/// Lookups are infallible: absence is `None`, never an error.
///
/// # Example
///
/// ```
/// use image::RgbaImage;
/// use lightbox_cache::{DecodedImage, ImageCache, ImageKey};
///
/// let cache = ImageCache::new(100, 256 * 1024 * 1024);
///
/// let key = ImageKey::for_path("/photos/a.png");
/// cache.insert(key.clone(), DecodedImage::from_rgba(RgbaImage::new(64, 64)));
///
/// assert!(cache.get(&key).is_some());
/// assert!(cache.statistics().hit_rate() > 0.0);
/// ```
pub struct ImageCache {
    state: Arc<Mutex<CacheState>>,
}

impl ImageCache {
    /// Create a cache bounded by entry count and aggregate byte cost.
    pub fn new(max_count: usize, max_cost: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(max_count, max_cost))),
        }
    }

    /// Create a cache from a [`CacheConfig`](crate::CacheConfig).
    pub fn from_config(config: &crate::CacheConfig) -> Self {
        Self::new(config.max_entries, config.max_cost_bytes)
    }

    /// Look up an image, marking it most recently used on a hit.
    ///
    /// Records a hit or a miss in the statistics either way.
    pub fn get(&self, key: &ImageKey) -> Option<DecodedImage> {
        let mut state = self.state.lock().unwrap();
        if let Some(image) = state.entries.get(key).cloned() {
            state.touch(key);
            state.hits += 1;
            Some(image)
        } else {
            state.misses += 1;
            None
        }
    }

    /// Insert or replace an entry, then evict until both limits hold.
    ///
    /// Eviction drops least-recently-used entries first (ties in insertion
    /// order) and never drops the entry just inserted; an entry whose cost
    /// alone exceeds the cost limit therefore stays until something else
    /// displaces it, and a count limit of zero likewise keeps exactly the
    /// newest entry resident. Replacing an existing key reports the replaced
    /// entry in the receipts so its cost can be debited.
    pub fn insert(&self, key: ImageKey, image: DecodedImage) -> Vec<Evicted> {
        let mut state = self.state.lock().unwrap();
        let mut evicted = Vec::new();

        if let Some(old) = state.entries.remove(&key) {
            state.total_cost = state.total_cost.saturating_sub(old.cost_bytes());
            state.lru.retain(|k| k != &key);
            evicted.push(Evicted {
                key: key.clone(),
                cost: old.cost_bytes(),
            });
        }

        state.total_cost += image.cost_bytes();
        state.entries.insert(key.clone(), image);
        state.lru.push_back(key);

        // The new entry sits at the back of the LRU queue, so it is never the
        // eviction victim while anything older remains.
        while state.over_limit() && state.entries.len() > 1 {
            match state.evict_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }

        evicted
    }

    /// Remove an entry, returning it if it was present.
    pub fn remove(&self, key: &ImageKey) -> Option<DecodedImage> {
        let mut state = self.state.lock().unwrap();
        let image = state.entries.remove(key)?;
        state.total_cost = state.total_cost.saturating_sub(image.cost_bytes());
        state.lru.retain(|k| k != key);
        Some(image)
    }

    /// Drop every entry, returning the total cost freed.
    ///
    /// Hit/miss statistics are left untouched; use
    /// [`reset_statistics`](Self::reset_statistics) for those.
    pub fn clear(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        let freed = state.total_cost;
        state.entries.clear();
        state.lru.clear();
        state.total_cost = 0;
        freed
    }

    /// Check for a key without updating recency or statistics.
    pub fn contains(&self, key: &ImageKey) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(key)
    }

    /// The configured limits.
    pub fn cache_info(&self) -> CacheInfo {
        let state = self.state.lock().unwrap();
        CacheInfo {
            count_limit: state.max_count,
            cost_limit: state.max_cost,
        }
    }

    /// Current hit/miss statistics.
    pub fn statistics(&self) -> CacheStatistics {
        let state = self.state.lock().unwrap();
        CacheStatistics {
            max_count: state.max_count,
            max_cost: state.max_cost,
            hits: state.hits,
            misses: state.misses,
        }
    }

    /// Zero the hit/miss counters without touching stored entries.
    pub fn reset_statistics(&self) {
        let mut state = self.state.lock().unwrap();
        state.hits = 0;
        state.misses = 0;
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate cost of all cached entries in bytes.
    pub fn total_cost(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.total_cost
    }
}
