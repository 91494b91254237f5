//! District resolver: orchestrates the fallback chain.
//!
//! Flow: validate → fresh cache → provider (rate-limited, retried) →
//! stale cache → local heuristic → region default.
//!
//! Concurrent resolutions of the same ZIP are serialized on a per-key lock,
//! so the second caller sees the first caller's cache write instead of issuing
//! its own provider call.

use super::builtin;
use super::cache::CacheStore;
use super::providers::{self, DistrictProvider, GeocodioProvider, ParseError, ProviderError};
use super::types::{DistrictMapping, ResolveError, ResolveOptions};
use crate::config::{ConfigError, GeocoderConfig};
use crate::rate_limit::RateLimiter;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// One step of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Provider,
    /// An expired cache entry still within the relaxed max age.
    StaleCache,
    LocalHeuristic,
    RegionDefault,
}

impl ResolutionStrategy {
    pub const FULL_CHAIN: [ResolutionStrategy; 4] = [
        ResolutionStrategy::Provider,
        ResolutionStrategy::StaleCache,
        ResolutionStrategy::LocalHeuristic,
        ResolutionStrategy::RegionDefault,
    ];

    /// Stale hits are served as-is; everything else refreshes the cache.
    fn writes_cache(self) -> bool {
        self != ResolutionStrategy::StaleCache
    }
}

type InFlightMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Holds the per-ZIP lock; drops the map entry once nobody else is waiting.
struct InFlightSlot<'a> {
    map: &'a InFlightMap,
    zip: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.guard = None;
        let mut map = self.map.lock();
        if map.get(&self.zip).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&self.zip);
        }
    }
}

/// Resolves ZIP codes to district mappings.
pub struct DistrictResolver {
    provider: Arc<dyn DistrictProvider>,
    cache: Arc<CacheStore>,
    limiter: Arc<RateLimiter>,
    request_timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    cache_ttl: Duration,
    stale_max_age: Duration,
    in_flight: InFlightMap,
}

impl DistrictResolver {
    pub fn new(
        provider: Arc<dyn DistrictProvider>,
        cache: Arc<CacheStore>,
        limiter: Arc<RateLimiter>,
        config: &GeocoderConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            limiter,
            request_timeout: config.request_timeout,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            cache_ttl: config.cache_ttl,
            stale_max_age: config.stale_max_age,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// HTTP provider, file cache and rate limiter, all from config.
    pub fn from_config(config: &GeocoderConfig) -> Result<Self, ConfigError> {
        config.require_api_key()?;
        Ok(Self::new(
            Arc::new(GeocodioProvider::from_config(config)),
            Arc::new(CacheStore::open(config.cache_path.clone())),
            Arc::new(RateLimiter::new(config.rate_limit_requests, config.rate_limit_window)),
            config,
        ))
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Resolve with default options.
    pub async fn resolve_zip(&self, zip: &str) -> Result<DistrictMapping, ResolveError> {
        self.resolve(zip, &ResolveOptions::default()).await
    }

    /// Resolve one ZIP code through the cache and fallback chain.
    ///
    /// Errors only for a malformed ZIP, or when `include_fallback` is off and
    /// the provider cannot answer.
    pub async fn resolve(
        &self,
        zip: &str,
        opts: &ResolveOptions,
    ) -> Result<DistrictMapping, ResolveError> {
        let zip = normalize_zip(zip)?;
        let _slot = self.claim(&zip).await;

        let mapping = self.resolve_normalized(&zip, opts).await?;
        Ok(if opts.allow_multi_district {
            mapping
        } else {
            mapping.into_single()
        })
    }

    async fn resolve_normalized(
        &self,
        zip: &str,
        opts: &ResolveOptions,
    ) -> Result<DistrictMapping, ResolveError> {
        if opts.use_cache {
            if let Some(mapping) = self.cache.get(zip, opts.max_age) {
                return Ok(mapping);
            }
        }

        let chain: &[ResolutionStrategy] = if opts.include_fallback {
            &ResolutionStrategy::FULL_CHAIN
        } else {
            &[ResolutionStrategy::Provider]
        };

        let mut last_error: Option<ResolveError> = None;
        for &strategy in chain {
            match self.attempt(strategy, zip).await {
                Ok(mapping) => {
                    if strategy != ResolutionStrategy::Provider {
                        warn!(
                            zip,
                            ?strategy,
                            source = %mapping.source(),
                            accuracy = mapping.accuracy(),
                            "resolved via fallback"
                        );
                    }
                    if strategy.writes_cache() {
                        self.cache.store(zip, mapping.clone(), self.cache_ttl).await;
                    }
                    return Ok(mapping);
                }
                Err(e) => {
                    debug!(zip, ?strategy, error = %e, "resolution strategy failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ResolveError::ZipNotFound(zip.to_string())))
    }

    async fn attempt(
        &self,
        strategy: ResolutionStrategy,
        zip: &str,
    ) -> Result<DistrictMapping, ResolveError> {
        match strategy {
            ResolutionStrategy::Provider => self.fetch_from_provider(zip).await,
            ResolutionStrategy::StaleCache => self
                .cache
                .get_stale(zip, self.stale_max_age)
                .ok_or_else(|| ResolveError::ZipNotFound(zip.to_string())),
            ResolutionStrategy::LocalHeuristic => builtin::local_lookup(zip)
                .ok_or_else(|| ResolveError::ZipNotFound(zip.to_string())),
            ResolutionStrategy::RegionDefault => Ok(builtin::region_default(zip)),
        }
    }

    /// Provider call with timeout, 429 backoff and transient-error retries.
    async fn fetch_from_provider(&self, zip: &str) -> Result<DistrictMapping, ResolveError> {
        let mut attempt: u32 = 0;
        loop {
            if !self.limiter.allow() {
                warn!(zip, "local rate limit reached, skipping provider");
                return Err(ResolveError::ApiLimitExceeded);
            }

            let outcome =
                match tokio::time::timeout(self.request_timeout, self.provider.lookup(zip)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                };

            let delay = match outcome {
                Ok(response) => {
                    return providers::parse_response(zip, &response).map_err(|e| match e {
                        ParseError::NoResults => ResolveError::ZipNotFound(zip.to_string()),
                        ParseError::Incomplete(msg) => ResolveError::InvalidResponse(msg),
                    });
                }
                Err(ProviderError::RateLimited { retry_after }) => {
                    if attempt >= self.max_retries {
                        return Err(ResolveError::ApiLimitExceeded);
                    }
                    retry_after.unwrap_or_else(|| {
                        self.retry_base_delay
                            .saturating_mul(2u32.saturating_pow(attempt))
                    })
                }
                Err(e) if e.is_transient() => {
                    if attempt >= self.max_retries {
                        return Err(match e {
                            ProviderError::Timeout => ResolveError::Timeout(self.request_timeout),
                            other => ResolveError::Network(other.to_string()),
                        });
                    }
                    self.retry_base_delay.saturating_mul(attempt + 1)
                }
                Err(ProviderError::InvalidResponse(msg)) => {
                    return Err(ResolveError::InvalidResponse(msg));
                }
                Err(e) => return Err(ResolveError::Network(e.to_string())),
            };

            attempt += 1;
            warn!(zip, attempt, delay_ms = delay.as_millis() as u64, "retrying provider");
            tokio::time::sleep(delay).await;
        }
    }

    async fn claim(&self, zip: &str) -> InFlightSlot<'_> {
        let lock = self
            .in_flight
            .lock()
            .entry(zip.to_string())
            .or_default()
            .clone();
        // The slot exists before the wait, so a caller that gives up while
        // queued still prunes the entry.
        let mut slot = InFlightSlot {
            map: &self.in_flight,
            zip: zip.to_string(),
            guard: None,
        };
        slot.guard = Some(lock.lock_owned().await);
        slot
    }
}

fn zip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").unwrap_or_else(|e| panic!("invalid ZIP pattern: {e}"))
    })
}

/// Validate `12345` or `12345-6789` exactly and return the five-digit code.
/// Surrounding whitespace is rejected, not stripped.
pub fn normalize_zip(input: &str) -> Result<String, ResolveError> {
    if !zip_pattern().is_match(input) {
        return Err(ResolveError::InvalidZipFormat(input.to_string()));
    }
    Ok(input[..5].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::districts::cache::{CacheEntry, KeyValueStore, MemoryStore};
    use crate::districts::providers::testing::{response, ScriptedProvider};
    use crate::districts::providers::GeocodeResponse;
    use crate::districts::types::{fixtures, MappingSource};
    use chrono::Utc;

    fn test_config() -> GeocoderConfig {
        GeocoderConfig {
            request_timeout: Duration::from_secs(1),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
            ..GeocoderConfig::default()
        }
    }

    fn resolver_with(provider: Arc<ScriptedProvider>) -> DistrictResolver {
        resolver_with_parts(provider, CacheStore::in_memory(), RateLimiter::new(100, Duration::from_secs(60)))
    }

    fn resolver_with_parts(
        provider: Arc<ScriptedProvider>,
        cache: CacheStore,
        limiter: RateLimiter,
    ) -> DistrictResolver {
        DistrictResolver::new(provider, Arc::new(cache), Arc::new(limiter), &test_config())
    }

    fn no_cache() -> ResolveOptions {
        ResolveOptions { use_cache: false, ..ResolveOptions::default() }
    }

    fn provider_only() -> ResolveOptions {
        ResolveOptions { include_fallback: false, ..ResolveOptions::default() }
    }

    #[test]
    fn test_normalize_zip() {
        assert_eq!(normalize_zip("90210").unwrap(), "90210");
        assert_eq!(normalize_zip("90210-1234").unwrap(), "90210");
        assert!(normalize_zip(" 90210").is_err());
    }

    #[tokio::test]
    async fn test_invalid_zip_makes_no_provider_call() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let resolver = resolver_with(provider.clone());

        for bad in ["", "1234", "123456", "abcde", "9021O", "90210-12", "90210-12345", "90210 1234", "٩٠٢١٠",
            " 90210", "90210 ", "90210\n", "\t90210-1234 ", "\r\n90210"] {
            let err = resolver.resolve_zip(bad).await.unwrap_err();
            assert_eq!(err, ResolveError::InvalidZipFormat(bad.to_string()), "input {:?}", bad);
        }
        assert_eq!(provider.calls(), 0);
        assert_eq!(resolver.limiter().remaining(), 100);
    }

    #[tokio::test]
    async fn test_resolve_from_provider() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let resolver = resolver_with(provider.clone());

        let mapping = resolver.resolve("90210", &no_cache()).await.unwrap();
        match mapping {
            DistrictMapping::Single { location, districts } => {
                assert_eq!(districts.congressional_district, 30);
                assert_eq!(location.source, MappingSource::Provider);
                assert_eq!(location.zip_code, "90210");
            }
            other => panic!("expected single mapping, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_second_resolve_hits_cache() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let resolver = resolver_with(provider.clone());

        let first = resolver.resolve_zip("90210-1234").await.unwrap();
        let second = resolver.resolve_zip("90210").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(resolver.cache().stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_same_zip_single_provider_call() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .with_delay(Duration::from_millis(200)),
        );
        let resolver = resolver_with(provider.clone());

        let (a, b) = tokio::join!(resolver.resolve_zip("90210"), resolver.resolve_zip("90210"));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(provider.calls(), 1);
        assert!(resolver.in_flight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_waiter_releases_slot() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let resolver = resolver_with(provider);

        let holder = resolver.claim("90210").await;
        let mut waiter = Box::pin(resolver.claim("90210"));
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        // The holder hands the lock to the queued waiter, which then gives up.
        drop(holder);
        assert_eq!(resolver.in_flight.lock().len(), 1);
        drop(waiter);
        assert!(resolver.in_flight.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_network_error_then_succeeds() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .script("90210", Err(ProviderError::Network("connection reset".into()))),
        );
        let resolver = resolver_with(provider.clone());

        let mapping = resolver.resolve("90210", &provider_only()).await.unwrap();
        assert_eq!(mapping.source(), MappingSource::Provider);
        assert_eq!(provider.calls(), 2);
        assert_eq!(resolver.limiter().remaining(), 98);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_without_fallback() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Network("down".into())));
        let resolver = resolver_with(provider.clone());

        let err = resolver.resolve("90210", &provider_only()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Network(_)));
        assert_eq!(provider.calls(), 3);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_falls_back_to_local() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Network("down".into())));
        let resolver = resolver_with(provider.clone());

        let mapping = resolver.resolve_zip("95814").await.unwrap();
        assert_eq!(mapping.source(), MappingSource::FallbackWithLocal);
        assert_eq!(mapping.location().city, "Sacramento");
        assert!(mapping.is_low_confidence());

        // Fallback answers are cached too.
        resolver.resolve_zip("95814").await.unwrap();
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honors_retry_after() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51])).script(
                "90210",
                Err(ProviderError::RateLimited { retry_after: Some(Duration::from_secs(5)) }),
            ),
        );
        let resolver = resolver_with(provider.clone());

        let start = tokio::time::Instant::now();
        resolver.resolve("90210", &provider_only()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_429_exhausted() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::RateLimited { retry_after: None }));
        let resolver = resolver_with(provider.clone());

        let start = tokio::time::Instant::now();
        let err = resolver.resolve("90210", &provider_only()).await.unwrap_err();
        assert_eq!(err, ResolveError::ApiLimitExceeded);
        // Exponential: 100ms + 200ms between three attempts.
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_local_rate_limit() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let resolver = resolver_with_parts(
            provider.clone(),
            CacheStore::in_memory(),
            RateLimiter::new(0, Duration::from_secs(60)),
        );

        let err = resolver.resolve("90210", &provider_only()).await.unwrap_err();
        assert_eq!(err, ResolveError::ApiLimitExceeded);

        let mapping = resolver.resolve_zip("90210").await.unwrap();
        assert_eq!(mapping.source(), MappingSource::FallbackWithLocal);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_fallback() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .with_delay(Duration::from_secs(30)),
        );
        let resolver = resolver_with(provider.clone());

        let err = resolver.resolve("90210", &provider_only()).await.unwrap_err();
        assert_eq!(err, ResolveError::Timeout(Duration::from_secs(1)));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_stale_cache_fallback() {
        let stored = fixtures::single("90210", 30, 24, 51);
        let mut store = MemoryStore::new();
        store
            .set(
                "90210",
                CacheEntry {
                    zip_code: "90210".into(),
                    mapping: stored.clone(),
                    expires_at: Utc::now().timestamp_millis() - 1,
                },
            );
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Status(503)));
        let resolver = resolver_with_parts(
            provider.clone(),
            CacheStore::new(store),
            RateLimiter::new(100, Duration::from_secs(60)),
        );

        let mapping = resolver.resolve_zip("90210").await.unwrap();
        assert_eq!(mapping, stored);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_region_default_for_unknown_prefix() {
        let provider = Arc::new(ScriptedProvider::answering(GeocodeResponse::default()));
        let resolver = resolver_with(provider.clone());

        let mapping = resolver.resolve_zip("10001").await.unwrap();
        assert_eq!(mapping.source(), MappingSource::Fallback);
        assert!(mapping.accuracy() <= 0.1);
    }

    #[tokio::test]
    async fn test_zip_not_found_without_fallback() {
        let provider = Arc::new(ScriptedProvider::answering(GeocodeResponse::default()));
        let resolver = resolver_with(provider.clone());

        let err = resolver.resolve("90210", &provider_only()).await.unwrap_err();
        assert_eq!(err, ResolveError::ZipNotFound("90210".into()));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_multi_district_collapsed_when_disallowed() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[32, 30], &[24], &[51])));
        let resolver = resolver_with(provider.clone());

        let multi = resolver.resolve_zip("90210").await.unwrap();
        assert!(multi.is_multi());

        let opts = ResolveOptions { allow_multi_district: false, ..ResolveOptions::default() };
        let single = resolver.resolve("90210", &opts).await.unwrap();
        assert!(!single.is_multi());
        assert_eq!(single.primary().congressional_district, 32);

        // The full mapping stays cached.
        assert!(resolver.cache().get("90210", None).unwrap().is_multi());
        assert_eq!(provider.calls(), 1);
    }
}
