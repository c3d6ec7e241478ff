use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Thread-safe LRU cache for query embeddings.
///
/// Repeated questions (and expansion variants of popular questions) hit
/// the embedding endpoint with identical text; caching them keeps the
/// round-trips bounded. Eviction is LRU with a fixed capacity.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Look up the embedding for a query text.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries.lock().unwrap().get(text).cloned()
    }

    /// Store an embedding under its query text.
    pub fn put(&self, text: String, embedding: Vec<f32>) {
        self.entries.lock().unwrap().put(text, embedding);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
