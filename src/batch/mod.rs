//! Batch orchestration over many ZIP codes.
//!
//! Codes are processed in fixed-size chunks. Within a chunk every code is
//! resolved concurrently, bounded by a [`ConcurrencyGate`]; chunks run one
//! after another with a pause in between. A failing code becomes a failed
//! [`BatchResult`] and never aborts the run.

pub mod export;
pub mod results;
pub mod validate;

pub use export::{export_results, ExportError, ExportMetadata, ExportRecord, ExportSnapshot};
pub use results::{failed_zip_codes, BatchError, BatchResult, BatchSummary};
pub use validate::{result_issues, validate_results, InvalidResult, ValidationReport};

use crate::config::GeocoderConfig;
use crate::districts::{DistrictResolver, ResolveError, ResolveOptions};
use crate::gate::ConcurrencyGate;
use crate::region;
use crate::representatives::{self, RepresentativeDirectory};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Called after each chunk with (completed, total).
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;
/// Called once per failed code with (error message, zip code).
pub type ErrorCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

pub struct BatchOptions {
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub delay_between_batches: Duration,
    pub resolve: ResolveOptions,
    pub on_progress: Option<ProgressCallback>,
    pub on_error: Option<ErrorCallback>,
    pub cancel: CancellationToken,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            batch_size: 50,
            delay_between_batches: Duration::from_secs(1),
            resolve: ResolveOptions::default(),
            on_progress: None,
            on_error: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &GeocoderConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            batch_size: config.batch_size,
            delay_between_batches: config.delay_between_batches,
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, f: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn with_error_handler(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Drives a [`DistrictResolver`] over many ZIP codes.
pub struct BatchOrchestrator {
    resolver: Arc<DistrictResolver>,
    directory: Option<Arc<dyn RepresentativeDirectory>>,
}

impl BatchOrchestrator {
    pub fn new(resolver: Arc<DistrictResolver>) -> Self {
        Self {
            resolver,
            directory: None,
        }
    }

    /// Also fetch representatives for every resolved code.
    pub fn with_directory(mut self, directory: Arc<dyn RepresentativeDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn resolver(&self) -> &Arc<DistrictResolver> {
        &self.resolver
    }

    /// Process codes with a fresh gate sized from the options.
    pub async fn process_batch(&self, zip_codes: &[String], options: &BatchOptions) -> Vec<BatchResult> {
        let gate = ConcurrencyGate::new(options.max_concurrency);
        self.process_batch_gated(zip_codes, options, &gate).await
    }

    /// Process codes through a caller-supplied gate.
    ///
    /// Results come back in input order. On cancellation, in-flight codes
    /// finish as [`ResolveError::Cancelled`] and later chunks are skipped, so
    /// the returned list may be shorter than the input.
    pub async fn process_batch_gated(
        &self,
        zip_codes: &[String],
        options: &BatchOptions,
        gate: &ConcurrencyGate,
    ) -> Vec<BatchResult> {
        let total = zip_codes.len();
        let batch_size = options.batch_size.max(1);
        let chunk_count = total.div_ceil(batch_size);
        let mut results = Vec::with_capacity(total);
        let started = Instant::now();

        info!(total, batch_size, chunks = chunk_count, permits = gate.permits(), "starting batch");

        for (index, chunk) in zip_codes.chunks(batch_size).enumerate() {
            if options.cancel.is_cancelled() {
                warn!(completed = results.len(), total, "batch cancelled");
                break;
            }

            let chunk_results =
                join_all(chunk.iter().map(|zip| self.process_one(zip, options, gate))).await;

            for result in &chunk_results {
                if let (Some(err), Some(on_error)) = (result.error(), &options.on_error) {
                    on_error(&err.to_string(), &result.zip_code);
                }
            }
            let failed = chunk_results.iter().filter(|r| !r.success()).count();
            results.extend(chunk_results);

            info!(
                chunk = index + 1,
                chunks = chunk_count,
                completed = results.len(),
                total,
                failed,
                "chunk complete"
            );
            if let Some(on_progress) = &options.on_progress {
                on_progress(results.len(), total);
            }

            if index + 1 < chunk_count && !options.delay_between_batches.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(options.delay_between_batches) => {}
                    _ = options.cancel.cancelled() => {}
                }
            }
        }

        info!(
            processed = results.len(),
            failed = results.iter().filter(|r| !r.success()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );
        results
    }

    /// Process every ZIP code in the supported region.
    pub async fn process_all(&self, options: &BatchOptions) -> Vec<BatchResult> {
        let zip_codes = region::supported_zip_codes();
        info!(count = zip_codes.len(), state = region::STATE_CODE, "processing full region");
        self.process_batch(&zip_codes, options).await
    }

    async fn process_one(&self, zip: &str, options: &BatchOptions, gate: &ConcurrencyGate) -> BatchResult {
        let started = Instant::now();

        let work = async {
            let _permit = gate.acquire().await;
            let mapping = self.resolver.resolve(zip, &options.resolve).await?;
            let representatives = match &self.directory {
                Some(directory) => Some(representatives::lookup_all(directory.as_ref(), &mapping).await),
                None => None,
            };
            Ok::<_, ResolveError>((mapping, representatives))
        };

        let outcome = tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Err(ResolveError::Cancelled),
            outcome = work => outcome,
        };

        let (outcome, representatives) = match outcome {
            Ok((mapping, reps)) => (Ok(mapping), reps),
            Err(e) => (Err(e), None),
        };

        BatchResult {
            zip_code: zip.to_string(),
            outcome,
            representatives,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::districts::providers::testing::{response, ScriptedProvider};
    use crate::districts::{CacheStore, GeocodeResponse, MappingSource, ProviderError};
    use crate::rate_limit::RateLimiter;
    use crate::representatives::testing::StubDirectory;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    fn orchestrator(provider: Arc<ScriptedProvider>) -> BatchOrchestrator {
        let config = GeocoderConfig {
            request_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(100),
            ..GeocoderConfig::default()
        };
        let resolver = DistrictResolver::new(
            provider,
            Arc::new(CacheStore::in_memory()),
            Arc::new(RateLimiter::new(10_000, Duration::from_secs(60))),
            &config,
        );
        BatchOrchestrator::new(Arc::new(resolver))
    }

    fn zips(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}", 90001 + i)).collect()
    }

    fn provider_only() -> ResolveOptions {
        ResolveOptions {
            include_fallback: false,
            ..ResolveOptions::default()
        }
    }

    fn quick_options() -> BatchOptions {
        BatchOptions {
            delay_between_batches: Duration::ZERO,
            resolve: provider_only(),
            ..BatchOptions::default()
        }
    }

    #[tokio::test]
    async fn test_partial_failure_summary() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .script("90004", Err(ProviderError::Status(500))),
        );
        let orchestrator = orchestrator(provider);

        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        let options = quick_options()
            .with_error_handler(move |msg, zip| seen.lock().push((msg.to_string(), zip.to_string())));

        let results = orchestrator.process_batch(&zips(10), &options).await;
        let summary = BatchSummary::from_results(&results);

        assert_eq!(summary.processed, 10);
        assert_eq!(summary.successful, 9);
        assert_eq!(summary.failed, 1);
        assert_relative_eq!(summary.success_rate, 0.9);
        assert_eq!(failed_zip_codes(&results), vec!["90004"]);

        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1, "90004");
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_exhausts_retries_in_batch() {
        let down = || -> Result<GeocodeResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        };
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .script("90007", down())
                .script("90007", down())
                .script("90007", down()),
        );
        let orchestrator = orchestrator(provider.clone());

        let results = orchestrator.process_batch(&zips(10), &quick_options()).await;
        let summary = BatchSummary::from_results(&results);

        assert_eq!(summary.successful, 9);
        assert_eq!(summary.failed, 1);
        assert_relative_eq!(summary.success_rate, 0.9);
        assert!(matches!(results[6].error(), Some(ResolveError::Network(_))));
        // Initial attempt plus two retries for the failing code.
        assert_eq!(provider.calls(), 12);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let orchestrator = orchestrator(provider);
        let input = vec!["95814".to_string(), "bad".to_string(), "90210".to_string()];

        let results = orchestrator.process_batch(&input, &quick_options()).await;
        let order: Vec<&str> = results.iter().map(|r| r.zip_code.as_str()).collect();
        assert_eq!(order, vec!["95814", "bad", "90210"]);
        assert!(matches!(results[1].error(), Some(ResolveError::InvalidZipFormat(_))));
        assert_eq!(results[2].mapping().map(|m| m.source()), Some(MappingSource::Provider));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .with_delay(Duration::from_millis(50)),
        );
        let orchestrator = orchestrator(provider.clone());
        let gate = ConcurrencyGate::new(3);
        let options = BatchOptions {
            batch_size: 10,
            ..quick_options()
        };

        let results = orchestrator.process_batch_gated(&zips(20), &options, &gate).await;
        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.success()));
        assert_eq!(gate.peak(), 3);
        assert_eq!(gate.held(), 0);
        assert_eq!(provider.calls(), 20);
    }

    #[tokio::test]
    async fn test_progress_reported_per_chunk() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let orchestrator = orchestrator(provider);

        let progress = Arc::new(Mutex::new(Vec::new()));
        let seen = progress.clone();
        let options = BatchOptions {
            batch_size: 4,
            ..quick_options()
        }
        .with_progress(move |done, total| seen.lock().push((done, total)));

        orchestrator.process_batch(&zips(10), &options).await;
        assert_eq!(*progress.lock(), vec![(4, 10), (8, 10), (10, 10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_chunks_only() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let orchestrator = orchestrator(provider);
        let options = BatchOptions {
            batch_size: 2,
            delay_between_batches: Duration::from_secs(1),
            resolve: provider_only(),
            ..BatchOptions::default()
        };

        let start = Instant::now();
        let results = orchestrator.process_batch(&zips(6), &options).await;
        let elapsed = start.elapsed();

        assert_eq!(results.len(), 6);
        // Three chunks, two pauses.
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_cancel_skips_remaining_chunks() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let orchestrator = orchestrator(provider.clone());
        let token = CancellationToken::new();
        let trigger = token.clone();
        let options = BatchOptions {
            batch_size: 3,
            ..quick_options()
        }
        .with_cancel(token)
        .with_progress(move |_, _| trigger.cancel());

        let results = orchestrator.process_batch(&zips(9), &options).await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success()));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_codes() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .with_delay(Duration::from_secs(3)),
        );
        let orchestrator = orchestrator(provider);
        let token = CancellationToken::new();
        let options = quick_options().with_cancel(token.clone());
        let input = zips(4);

        let (results, _) = tokio::join!(orchestrator.process_batch(&input, &options), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        assert_eq!(results.len(), 4);
        assert!(results
            .iter()
            .all(|r| r.error() == Some(&ResolveError::Cancelled)));
    }

    #[tokio::test]
    async fn test_representatives_attached_to_successes() {
        let provider = Arc::new(
            ScriptedProvider::answering(response(&[30], &[24], &[51]))
                .script("90002", Err(ProviderError::Status(500))),
        );
        let directory = Arc::new(StubDirectory::default());
        let orchestrator = orchestrator(provider).with_directory(directory.clone());

        let results = orchestrator.process_batch(&zips(2), &quick_options()).await;
        let reps = results[0].representatives.as_ref().unwrap();
        assert_eq!(reps.federal[0].district, Some(30));
        assert_eq!(reps.state_assembly[0].district, Some(51));
        assert!(results[1].representatives.is_none());
        assert_eq!(directory.queries.lock().len(), 4);

        let report = validate_results(&results);
        assert_eq!(report.valid.len(), 1);
        assert_eq!(report.reasons, vec![("no_mapping", 1)]);
    }

    #[tokio::test]
    async fn test_process_all_covers_region() {
        let provider = Arc::new(ScriptedProvider::answering(response(&[30], &[24], &[51])));
        let orchestrator = orchestrator(provider);
        let options = BatchOptions {
            batch_size: 500,
            max_concurrency: 50,
            ..quick_options()
        };

        let results = orchestrator.process_all(&options).await;
        assert_eq!(results.len(), region::supported_zip_codes().len());
        assert!(results.iter().all(|r| r.success()));
    }
}
