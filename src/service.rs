/// Public service façades over the batching core.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::aggregate_batching_pool::AggregateBatchingPool;
use crate::cache::{CacheStats, TranslationCache};
use crate::error::ValidationError;
use crate::remap_alignments::combine_pivoted;
use crate::response::{Response, ResponseOptions};
use crate::threadsafe_batching_pool::ThreadsafeBatchingPool;
use crate::translation_model::{Backend, TranslationModel, Workspace};
use crate::CallbackType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncConfig {
    /// Worker translation threads; must be at least one.
    pub num_workers: usize,
    /// Sentence cache budget in bytes; zero disables caching.
    pub cache_size: usize,
    /// Backend memory budget per worker.
    pub workspace_size_in_mb: usize,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            cache_size: 0,
            workspace_size_in_mb: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    /// Sentence cache budget in bytes; zero disables caching.
    pub cache_size: usize,
    /// Backend memory budget.
    pub workspace_size_in_mb: usize,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            cache_size: 0,
            workspace_size_in_mb: 1024,
        }
    }
}

fn build_cache(cache_size: usize) -> Option<Arc<TranslationCache>> {
    (cache_size > 0).then(|| Arc::new(TranslationCache::new(cache_size)))
}

/// Forces the alignment needed internally by the pivot combine step,
/// whatever the client asked for.
fn pivot_stage_options(options: &ResponseOptions) -> ResponseOptions {
    let mut staged = options.clone();
    staged.alignment = true;
    staged
}

/// Single-threaded service: requests queue up in a plain aggregate pool and
/// the batch loop runs inline on the caller, against one backend.
///
/// Prefer [`AsyncService`] when threads are available; batching differences
/// mean outputs are not guaranteed bit-identical between the two.
pub struct BlockingService {
    request_id: u64,
    pool: AggregateBatchingPool,
    backend: Box<dyn Backend>,
    cache: Option<Arc<TranslationCache>>,
}

impl BlockingService {
    pub fn new(config: BlockingConfig, backend: Box<dyn Backend>) -> Self {
        Self {
            request_id: 0,
            pool: AggregateBatchingPool::new(),
            backend,
            cache: build_cache(config.cache_size),
        }
    }

    /// Translates several texts in one call; the returned responses index
    /// 1-to-1 with `sources`, `options` supplies one entry per text.
    #[tracing::instrument(skip_all, fields(texts = sources.len(), model = %model.name()))]
    pub fn translate_multiple(
        &mut self,
        model: &Arc<TranslationModel>,
        sources: Vec<String>,
        options: &[ResponseOptions],
    ) -> Vec<Response> {
        assert_eq!(
            sources.len(),
            options.len(),
            "one ResponseOptions per source text required"
        );
        let slots: Vec<_> = sources
            .into_iter()
            .zip(options)
            .map(|(source, options)| {
                let (slot, callback) = response_slot();
                let request = model.make_request(
                    self.next_request_id(),
                    source,
                    options,
                    callback,
                    self.cache.clone(),
                );
                if request.pending() > 0 {
                    self.pool.enqueue_request(model, &request);
                }
                slot
            })
            .collect();

        self.run_batch_loop();
        collect_slots(slots)
    }

    /// Two-stage translation through a pivot language: source to pivot with
    /// `first`, pivot to target with `second`, combined per input.
    #[tracing::instrument(skip_all, fields(texts = sources.len()))]
    pub fn pivot_multiple(
        &mut self,
        first: &Arc<TranslationModel>,
        second: &Arc<TranslationModel>,
        sources: Vec<String>,
        options: &[ResponseOptions],
    ) -> Vec<Response> {
        assert_eq!(
            sources.len(),
            options.len(),
            "one ResponseOptions per source text required"
        );
        let first_options: Vec<ResponseOptions> =
            options.iter().map(pivot_stage_options).collect();
        let first_halves = self.translate_multiple(first, sources, &first_options);

        let slots: Vec<_> = first_halves
            .iter()
            .zip(options)
            .map(|(first_half, options)| {
                let (slot, callback) = response_slot();
                let request = second.make_pivot_request(
                    self.next_request_id(),
                    &first_half.target,
                    &pivot_stage_options(options),
                    callback,
                    self.cache.clone(),
                );
                if request.pending() > 0 {
                    self.pool.enqueue_request(second, &request);
                }
                slot
            })
            .collect();

        self.run_batch_loop();
        let second_halves = collect_slots(slots);

        first_halves
            .into_iter()
            .zip(second_halves)
            .zip(options)
            .map(|((first_half, second_half), options)| {
                let mut response = combine_pivoted(first_half, second_half);
                if !options.alignment {
                    response.alignments.clear();
                }
                response
            })
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_ref()
            .map(|cache| cache.stats())
            .unwrap_or_default()
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.request_id;
        self.request_id += 1;
        id
    }

    fn run_batch_loop(&mut self) {
        while let Some((model, batch)) = self.pool.generate_batch() {
            batch.log();
            let results = self.backend.translate_batch(&model, &batch);
            batch.complete(results);
        }
    }
}

fn response_slot() -> (Arc<Mutex<Option<Response>>>, CallbackType) {
    let slot = Arc::new(Mutex::new(None));
    let filled = slot.clone();
    let callback: CallbackType = Box::new(move |response| *filled.lock() = Some(response));
    (slot, callback)
}

fn collect_slots(slots: Vec<Arc<Mutex<Option<Response>>>>) -> Vec<Response> {
    slots
        .into_iter()
        .map(|slot| {
            slot.lock()
                .take()
                .expect("blocking batch loop drained without completing a request")
        })
        .collect()
}

/// Shared state of an [`AsyncService`], kept alive by worker threads and by
/// in-flight pivot continuations.
struct ServiceInner {
    pool: ThreadsafeBatchingPool,
    cache: Option<Arc<TranslationCache>>,
    request_id: AtomicU64,
}

impl ServiceInner {
    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn translate_raw(
        &self,
        model: &Arc<TranslationModel>,
        source: String,
        callback: CallbackType,
        options: &ResponseOptions,
    ) {
        let request = model.make_request(
            self.next_request_id(),
            source,
            options,
            callback,
            self.cache.clone(),
        );
        // Fully prefilled (or empty) requests completed inside make_request.
        if request.pending() > 0 {
            self.pool.enqueue_request(model, &request);
        }
    }

    fn pivot_raw(
        self: &Arc<Self>,
        first: &Arc<TranslationModel>,
        second: Arc<TranslationModel>,
        source: String,
        client_callback: CallbackType,
        options: ResponseOptions,
    ) {
        let first_options = pivot_stage_options(&options);
        let inner = self.clone();
        // Stage-1 completion owns the first half until stage 2 finishes.
        let continuation: CallbackType = Box::new(move |first_half: Response| {
            let second_options = pivot_stage_options(&options);
            let pivot_target = first_half.target.clone();
            let joining: CallbackType = Box::new(move |second_half: Response| {
                let mut response = combine_pivoted(first_half, second_half);
                if !options.alignment {
                    response.alignments.clear();
                }
                client_callback(response);
            });
            let request = second.make_pivot_request(
                inner.next_request_id(),
                &pivot_target,
                &second_options,
                joining,
                inner.cache.clone(),
            );
            if request.pending() > 0 {
                inner.pool.enqueue_request(&second, &request);
            }
        });
        self.translate_raw(first, source, continuation, &first_options);
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_ref()
            .map(|cache| cache.stats())
            .unwrap_or_default()
    }
}

/// A translation thread pool: `translate` queues work and returns
/// immediately, the client callback fires on whichever worker completes the
/// request. Dropping the service shuts the pool down, finishes in-flight
/// batches and joins the workers; queued-but-unbatched requests are dropped
/// without their callbacks firing.
pub struct AsyncService {
    inner: Arc<ServiceInner>,
    workers: Vec<JoinHandle<()>>,
}

impl AsyncService {
    /// Spawns `config.num_workers` threads, each owning a backend built by
    /// `backend_factory` from its [`Workspace`].
    pub fn new<B, F>(config: AsyncConfig, mut backend_factory: F) -> Result<Self, ValidationError>
    where
        B: Backend + 'static,
        F: FnMut(Workspace) -> B,
    {
        if config.num_workers == 0 {
            return Err(ValidationError::NoWorkers);
        }
        let inner = Arc::new(ServiceInner {
            pool: ThreadsafeBatchingPool::new(),
            cache: build_cache(config.cache_size),
            request_id: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            let mut backend = backend_factory(Workspace {
                id: worker_id,
                size_in_mb: config.workspace_size_in_mb,
            });
            let inner = inner.clone();
            let handle = thread::Builder::new()
                .name(format!("translation-worker-{worker_id}"))
                .spawn(move || {
                    tracing::info!(worker_id, "translation worker up");
                    while let Some((model, batch)) = inner.pool.generate_batch() {
                        batch.log();
                        let results = backend.translate_batch(&model, &batch);
                        batch.complete(results);
                    }
                    tracing::info!(worker_id, "translation worker exiting");
                })
                .expect("failed to spawn translation worker");
            workers.push(handle);
        }

        Ok(Self { inner, workers })
    }

    /// Queues `source` for translation with `model`; `callback` fires exactly
    /// once with the finished [`Response`]. Concurrent calls are safe.
    #[tracing::instrument(skip_all, fields(model = %model.name()))]
    pub fn translate<F>(
        &self,
        model: &Arc<TranslationModel>,
        source: String,
        callback: F,
        options: &ResponseOptions,
    ) where
        F: FnOnce(Response) + Send + 'static,
    {
        self.inner
            .translate_raw(model, source, Box::new(callback), options);
    }

    /// Translates through a pivot language: `first` takes the source to the
    /// pivot, `second` the pivot to the target; `callback` receives the
    /// combined response.
    #[tracing::instrument(skip_all, fields(first = %first.name(), second = %second.name()))]
    pub fn pivot<F>(
        &self,
        first: &Arc<TranslationModel>,
        second: &Arc<TranslationModel>,
        source: String,
        callback: F,
        options: &ResponseOptions,
    ) where
        F: FnOnce(Response) + Send + 'static,
    {
        self.inner
            .pivot_raw(first, second.clone(), source, Box::new(callback), options.clone());
    }

    /// Drops all pending, not-yet-batched requests; their callbacks will
    /// never fire. In-flight batches still complete.
    pub fn clear(&self) {
        self.inner.pool.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache_stats()
    }
}

impl Drop for AsyncService {
    fn drop(&mut self) {
        self.inner.pool.shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NullBackend;

    #[test]
    fn async_service_rejects_zero_workers() {
        let config = AsyncConfig {
            num_workers: 0,
            ..Default::default()
        };
        let error = AsyncService::new(config, |_| NullBackend).err();
        assert_eq!(error, Some(ValidationError::NoWorkers));
    }

    #[test]
    fn configs_deserialize_with_defaults() {
        let config: AsyncConfig = serde_json::from_str(r#"{ "num_workers": 4 }"#).unwrap();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.cache_size, 0);
        let config: BlockingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.workspace_size_in_mb, 1024);
    }

    #[test]
    fn cache_stats_default_when_disabled() {
        let service = BlockingService::new(BlockingConfig::default(), Box::new(NullBackend));
        assert_eq!(service.cache_stats(), CacheStats::default());
    }
}
