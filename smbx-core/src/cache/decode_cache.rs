//! src/cache/decode_cache.rs
//! ============================================================================
//! # Decoded Preview Cache
//!
//! Process-lifetime cache of decoded preview images:
//! - LRU eviction bounded by total decoded bytes (weigher), not item count
//! - One in-flight load per key; concurrent misses await the same decode
//! - Fetch and decode run on the blocking pool
//! - Failed loads resolve to "no image" and are never cached

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use image::RgbaImage;
use moka::{future::Cache, notification::RemovalCause, policy::EvictionPolicy};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::CacheConfig;
use crate::error::{CoreError, CoreResult};

/// Remote path string of the image.
pub type ImageKey = Arc<str>;

/// Used when available memory cannot be queried.
pub const FALLBACK_BUDGET_BYTES: u64 = 64 * 1024 * 1024;

// ------------------------------------------------------------
// Payload
// ------------------------------------------------------------

/// RGBA8 pixels of one decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

impl DecodedImage {
    /// Memory footprint counted against the cache budget.
    #[inline]
    #[must_use]
    pub fn cost(&self) -> u64 {
        self.pixels.len() as u64
    }
}

pub trait ImageDecoder: Send + Sync + 'static {
    fn decode(&self, key: &str, raw: &[u8]) -> CoreResult<DecodedImage>;
}

/// Decodes the common raster formats into RGBA8.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, key: &str, raw: &[u8]) -> CoreResult<DecodedImage> {
        let rgba: RgbaImage = image::load_from_memory(raw)
            .map_err(|e: image::ImageError| CoreError::decode(key, &e.to_string()))?
            .to_rgba8();

        Ok(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            pixels: Bytes::from(rgba.into_raw()),
        })
    }
}

/// Ordered images the cache can load by index. `fetch` is blocking.
pub trait ImageSource: Send + Sync + 'static {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, index: usize) -> Option<ImageKey>;

    fn fetch(&self, index: usize) -> CoreResult<Vec<u8>>;
}

// ------------------------------------------------------------
// Statistics
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    total_load_time_ns: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[expect(clippy::cast_possible_truncation, reason = "Load times fit in u64 nanos")]
    pub fn record_load(&self, duration: Duration, success: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.total_load_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        if !success {
            self.load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let loads: u64 = self.loads.load(Ordering::Relaxed);
        let total_load_time_ns: u64 = self.total_load_time_ns.load(Ordering::Relaxed);

        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads,
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            average_load_penalty: if loads > 0 {
                Duration::from_nanos(total_load_time_ns / loads)
            } else {
                Duration::ZERO
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    pub average_load_penalty: Duration,
}

// ------------------------------------------------------------
// Cache
// ------------------------------------------------------------

/// Budget from config, or a fraction of currently available memory.
#[must_use]
pub fn resolve_budget(config: &CacheConfig) -> u64 {
    if let Some(bytes) = config.budget_bytes {
        return bytes.max(1);
    }

    let divisor: u64 = config.heap_fraction_divisor.max(1);

    match sys_info::mem_info() {
        Ok(mem) => (mem.avail.saturating_mul(1024) / divisor).max(1),

        Err(e) => {
            warn!(
                marker = "CACHE_OPERATION",
                operation_type = "budget_fallback",
                error = %e,
                fallback_bytes = FALLBACK_BUDGET_BYTES,
                "Available memory unknown, using fallback budget"
            );
            FALLBACK_BUDGET_BYTES
        }
    }
}

#[derive(Clone)]
pub struct DecodeCache {
    inner: Cache<ImageKey, Arc<DecodedImage>>,
    decoder: Arc<dyn ImageDecoder>,
    stats: Arc<CacheStats>,
    budget: u64,
}

impl DecodeCache {
    #[must_use]
    pub fn with_budget(budget: u64, decoder: Arc<dyn ImageDecoder>, enable_stats: bool) -> Self {
        let stats: Arc<CacheStats> = Arc::new(CacheStats::default());

        let builder = Cache::builder()
            .max_capacity(budget)
            .weigher(|_key: &ImageKey, image: &Arc<DecodedImage>| -> u32 {
                u32::try_from(image.cost()).unwrap_or(u32::MAX)
            })
            .eviction_policy(EvictionPolicy::lru());

        let inner: Cache<ImageKey, Arc<DecodedImage>> = if enable_stats {
            let listener_stats: Arc<CacheStats> = stats.clone();
            builder
                .eviction_listener(
                    move |key: Arc<ImageKey>, _image: Arc<DecodedImage>, cause: RemovalCause| {
                        if cause.was_evicted() {
                            listener_stats.record_eviction();
                            debug!(
                                marker = "CACHE_OPERATION",
                                operation_type = "eviction",
                                cache_key = %key,
                                cause = ?cause,
                                "Decoded image evicted"
                            );
                        }
                    },
                )
                .build()
        } else {
            builder.build()
        };

        info!(
            marker = "CACHE_OPERATION",
            operation_type = "cache_init",
            budget_bytes = budget,
            "Decode cache created"
        );

        Self {
            inner,
            decoder,
            stats,
            budget,
        }
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_budget(
            resolve_budget(config),
            Arc::new(RasterDecoder),
            config.enable_stats,
        )
    }

    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.get(key).await.is_some()
    }

    /// Total cost of cached images after pending maintenance has run.
    pub async fn weighted_size(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.weighted_size()
    }

    /// Image at `index` of `source`, from cache or freshly decoded.
    ///
    /// Any fetch or decode failure resolves to `None`.
    #[instrument(level = "debug", skip(self, source))]
    pub async fn resolve(
        &self,
        source: Arc<dyn ImageSource>,
        index: usize,
    ) -> Option<Arc<DecodedImage>> {
        let key: ImageKey = source.key(index)?;

        if let Some(image) = self.inner.get(&key).await {
            self.stats.record_hit();
            debug!(
                marker = "CACHE_OPERATION",
                operation_type = "cache_hit",
                cache_key = %key,
                "Decoded image served from cache"
            );
            return Some(image);
        }

        self.stats.record_miss();

        let load_start: Instant = Instant::now();
        let stats: Arc<CacheStats> = self.stats.clone();
        let decoder: Arc<dyn ImageDecoder> = self.decoder.clone();
        let loader_key: ImageKey = key.clone();

        let result: Result<Arc<DecodedImage>, Arc<CoreError>> = self
            .inner
            .try_get_with(key.clone(), async move {
                let decoded: CoreResult<DecodedImage> =
                    tokio::task::spawn_blocking(move || -> CoreResult<DecodedImage> {
                        let raw: Vec<u8> = source.fetch(index)?;
                        decoder.decode(&loader_key, &raw)
                    })
                    .await
                    .map_err(CoreError::from)
                    .and_then(|inner: CoreResult<DecodedImage>| inner);

                stats.record_load(load_start.elapsed(), decoded.is_ok());
                decoded.map(Arc::new)
            })
            .await;

        match result {
            Ok(image) => {
                debug!(
                    marker = "CACHE_OPERATION",
                    operation_type = "loader_success",
                    cache_key = %key,
                    cost = image.cost(),
                    load_duration_ms = load_start.elapsed().as_millis() as u64,
                    "Decoded image cached"
                );
                Some(image)
            }

            Err(e) => {
                warn!(
                    marker = "CACHE_OPERATION",
                    operation_type = "loader_failure",
                    cache_key = %key,
                    error = %e,
                    "Preview unavailable, failure not cached"
                );
                None
            }
        }
    }

    /// Resolve in the background and hand the result to `on_loaded`.
    pub fn load<F>(
        &self,
        source: Arc<dyn ImageSource>,
        index: usize,
        on_loaded: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<Arc<DecodedImage>>) + Send + 'static,
    {
        let cache: Self = self.clone();

        tokio::spawn(async move {
            let image: Option<Arc<DecodedImage>> = cache.resolve(source, index).await;
            on_loaded(image);
        })
    }
}

impl std::fmt::Debug for DecodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeCache")
            .field("budget", &self.budget)
            .field("entries", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}
