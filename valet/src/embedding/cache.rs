//! Bounded embedding cache: LRU eviction, per-entry TTL, and single-flight
//! coalescing so duplicate concurrent misses on the same text produce exactly
//! one outbound embedding call.
//!
//! Keys are a stable 64-bit FNV-1a fingerprint of the normalised text
//! (trimmed, lowercased, whitespace collapsed), so trivially different
//! spellings of the same query share an entry.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;

use crate::embedding::Embedder;
use crate::error::StoreError;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable non-cryptographic fingerprint of normalised text.
pub fn fingerprint(text: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    let mut first = true;
    for token in text.trim().split_whitespace() {
        if !first {
            hash ^= b' ' as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        first = false;
        for b in token.to_lowercase().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

/// Counter snapshot for telemetry.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// LRU + TTL cache from text fingerprint to embedding vector.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<u64, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("max(1) is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the cached vector for `text`, refreshing recency. Entries past
    /// their TTL are evicted and count as misses.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = fingerprint(text);
        let mut entries = self.entries.lock().expect("cache lock");
        let expired = match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.vector.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, text: &str, vector: Vec<f32>) {
        let key = fingerprint(text);
        let mut entries = self.entries.lock().expect("cache lock");
        let entry = CacheEntry {
            vector,
            inserted_at: Instant::now(),
        };
        // push returns the displaced pair: the old value for the same key, or
        // the least-recently-used entry when the cache was full.
        if let Some((evicted_key, _)) = entries.push(key, entry) {
            if evicted_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.lock().expect("cache lock").len(),
        }
    }
}

/// [`Embedder`] wrapper that consults the cache first and coalesces duplicate
/// concurrent misses per fingerprint.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    inflight: DashMap<u64, Arc<tokio::sync::Mutex<()>>>,
    enabled: bool,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>, enabled: bool) -> Self {
        Self {
            inner,
            cache,
            inflight: DashMap::new(),
            enabled,
        }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if !self.enabled {
            let mut vectors = self.inner.embed(&[text]).await?;
            return vectors
                .pop()
                .ok_or_else(|| StoreError::Embedding("no vector returned".into()));
        }

        if let Some(v) = self.cache.get(text) {
            return Ok(v);
        }

        let key = fingerprint(text);
        let gate = self
            .inflight
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // A concurrent caller may have filled the entry while we waited.
        if let Some(v) = self.cache.get(text) {
            self.inflight.remove(&key);
            return Ok(v);
        }

        // The gate entry stays in the map until the result is visible to
        // cache readers; a fresh-entry creator in between would re-embed.
        let outcome = match self.inner.embed(&[text]).await {
            Ok(mut vectors) => match vectors.pop() {
                Some(vector) => {
                    self.cache.put(text, vector.clone());
                    Ok(vector)
                }
                None => Err(StoreError::Embedding("no vector returned".into())),
            },
            Err(e) => Err(e),
        };
        self.inflight.remove(&key);
        outcome
    }
}

#[async_trait::async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedder {
        inner: MockEmbedder,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(texts).await
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[test]
    fn fingerprint_normalises_case_and_spacing() {
        assert_eq!(fingerprint("  Hola   Mundo "), fingerprint("hola mundo"));
        assert_ne!(fingerprint("hola mundo"), fingerprint("hola mundi"));
    }

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let counting = Arc::new(CountingEmbedder {
            inner: MockEmbedder::new(8),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(EmbeddingCache::new(10, Duration::from_secs(60)));
        let cached = CachedEmbedder::new(counting.clone(), cache.clone(), true);

        cached.embed(&["agenda de mañana"]).await.unwrap();
        cached.embed(&["agenda de mañana"]).await.unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn expired_entries_miss_and_evict() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(20));
        cache.put("x", vec![1.0]);
        assert!(cache.get("x").is_some());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("x").is_none());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2, Duration::from_secs(60));
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        // Touch "a" so "b" is the LRU entry.
        assert!(cache.get("a").is_some());
        cache.put("c", vec![3.0]);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce() {
        let counting = Arc::new(CountingEmbedder {
            inner: MockEmbedder::new(8),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(EmbeddingCache::new(10, Duration::from_secs(60)));
        let cached = Arc::new(CachedEmbedder::new(counting.clone(), cache, true));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = cached.clone();
            handles.push(tokio::spawn(async move {
                c.embed(&["misma consulta"]).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }
}
