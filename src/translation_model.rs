/// A loaded model as the pipeline sees it: its text processor and its
/// batching pool. Inference state lives with the per-worker [`Backend`].
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::annotation::AnnotatedText;
use crate::batch::Batch;
use crate::batching_pool::{maximum_sentence_length, BatchingPool};
use crate::cache::TranslationCache;
use crate::error::ValidationError;
use crate::request::{Request, SentenceResult};
use crate::response::ResponseOptions;
use crate::response_builder::ResponseBuilder;
use crate::text_processor::{SentenceSplitter, TextProcessor, Vocabulary};
use crate::CallbackType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Identifier used in logs; must not be empty.
    pub name: String,
    /// Upper bound on `(batch size + 1) * max sentence length`, the padded
    /// token budget of one batch.
    pub mini_batch_words: usize,
    /// Sentences are wrapped to at most this many tokens, EOS included.
    pub max_length_break: usize,
    /// Headroom multiplier for pivot-stage sentences, which bypass wrapping.
    pub max_length_factor: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            mini_batch_words: 1024,
            max_length_break: 128,
            max_length_factor: 3.0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        if self.mini_batch_words == 0 {
            return Err(ValidationError::ZeroBatchBudget);
        }
        if self.max_length_break < 2 {
            return Err(ValidationError::LengthBreakTooSmall);
        }
        let longest = maximum_sentence_length(self);
        if longest > self.mini_batch_words {
            return Err(ValidationError::LengthBreakExceedsBudget(
                longest,
                self.mini_batch_words,
            ));
        }
        Ok(())
    }
}

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(0);

pub struct TranslationModel {
    id: u64,
    config: ModelConfig,
    vocabulary: Arc<dyn Vocabulary>,
    text_processor: TextProcessor,
    /// Mutated only under the service's pool lock in the async case; the
    /// mutex makes the model shareable either way.
    pool: Mutex<BatchingPool>,
}

impl TranslationModel {
    pub fn new(
        config: ModelConfig,
        vocabulary: Arc<dyn Vocabulary>,
        splitter: Arc<dyn SentenceSplitter>,
    ) -> Result<Arc<Self>, ValidationError> {
        config.validate()?;
        let text_processor =
            TextProcessor::new(vocabulary.clone(), splitter, config.max_length_break);
        let pool = Mutex::new(BatchingPool::new(&config));
        let model = Arc::new(Self {
            id: NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed),
            config,
            vocabulary,
            text_processor,
            pool,
        });
        tracing::info!(model = %model.config.name, id = model.id, "translation model ready");
        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Arc<dyn Vocabulary> {
        &self.vocabulary
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Shared request-construction path of the blocking and async services:
    /// process the text, bind a response builder, probe the cache.
    pub(crate) fn make_request(
        &self,
        request_id: u64,
        source: String,
        options: &ResponseOptions,
        callback: CallbackType,
        cache: Option<Arc<TranslationCache>>,
    ) -> Arc<Request> {
        let (annotated, segments) = self.text_processor.process(source);
        let builder =
            ResponseBuilder::new(options.clone(), annotated, self.vocabulary.clone(), callback);
        Request::new(request_id, self.id, segments, builder, cache)
    }

    /// Request construction for the second leg of pivoting: the previous
    /// target's sentence structure is kept as-is.
    pub(crate) fn make_pivot_request(
        &self,
        request_id: u64,
        previous_target: &AnnotatedText,
        options: &ResponseOptions,
        callback: CallbackType,
        cache: Option<Arc<TranslationCache>>,
    ) -> Arc<Request> {
        let (annotated, segments) = self.text_processor.process_from_annotation(previous_target);
        let builder =
            ResponseBuilder::new(options.clone(), annotated, self.vocabulary.clone(), callback);
        Request::new(request_id, self.id, segments, builder, cache)
    }

    pub(crate) fn enqueue_request(&self, request: &Arc<Request>) -> usize {
        self.pool.lock().enqueue_request(request)
    }

    pub(crate) fn generate_batch(&self, batch: &mut Batch) -> usize {
        self.pool.lock().generate_batch(batch)
    }

    pub(crate) fn clear_pool(&self) {
        self.pool.lock().clear()
    }
}

/// Per-worker inference state: graph, scorers, workspace memory. Each worker
/// thread owns one instance, so implementations never see cross-thread
/// contention on their mutable state.
pub trait Backend: Send {
    /// Runs inference for `batch`, returning exactly one [`SentenceResult`]
    /// per batch sentence, in batch order. Result conventions: `words` ends
    /// with the forced EOS, `soft_alignment` has a row per produced word over
    /// the sentence's segment tokens, `word_scores` matches `words`.
    fn translate_batch(&mut self, model: &TranslationModel, batch: &Batch) -> Vec<SentenceResult>;
}

/// Identity and memory budget handed to the backend factory for each worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workspace {
    pub id: usize,
    pub size_in_mb: usize,
}
