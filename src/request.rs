/// Sentence-level completion tracking for one user input.
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, TranslationCache};
use crate::response_builder::ResponseBuilder;
use crate::{Segment, WordId};

/// Everything the backend produces for one sentence: the target words, the
/// soft alignment (rows are produced words, columns are source segment
/// tokens, both including the forced EOS), per-word log probabilities and the
/// normalized sequence log probability. This is the unit the cache stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentenceResult {
    pub words: Vec<WordId>,
    pub soft_alignment: Vec<Vec<f32>>,
    pub word_scores: Vec<f32>,
    pub sentence_score: f32,
}

/// One user input, sharded into segments. All [`RequestSentence`] handles
/// living in buckets and batches point back here; whichever thread performs
/// the final decrement builds the response and fires the callback, exactly
/// once.
pub(crate) struct Request {
    id: u64,
    model_id: u64,
    segments: Vec<Segment>,
    /// Segments answered from the cache at construction; these never enter a
    /// batching pool.
    prefilled: Vec<bool>,
    pending: AtomicUsize,
    results: Mutex<Vec<Option<SentenceResult>>>,
    completion: Mutex<Option<ResponseBuilder>>,
    cache: Option<Arc<TranslationCache>>,
}

impl Request {
    /// Creates a request, probing the cache for every segment. Cache hits are
    /// prefilled; if nothing is left to translate (all hits, or no sentences
    /// at all) the callback fires before this returns.
    pub(crate) fn new(
        id: u64,
        model_id: u64,
        segments: Vec<Segment>,
        builder: ResponseBuilder,
        cache: Option<Arc<TranslationCache>>,
    ) -> Arc<Self> {
        let count = segments.len();
        let mut results: Vec<Option<SentenceResult>> = vec![None; count];
        let mut prefilled = vec![false; count];
        if let Some(cache) = &cache {
            for (index, segment) in segments.iter().enumerate() {
                if let Some(hit) = cache.fetch(&CacheKey::new(model_id, segment)) {
                    results[index] = Some(hit);
                    prefilled[index] = true;
                }
            }
        }

        let pending = prefilled.iter().filter(|hit| !**hit).count();
        let request = Arc::new(Self {
            id,
            model_id,
            segments,
            prefilled,
            pending: AtomicUsize::new(pending),
            results: Mutex::new(results),
            completion: Mutex::new(Some(builder)),
            cache,
        });
        if pending == 0 {
            request.complete();
        }
        request
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segment(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    pub(crate) fn is_prefilled(&self, index: usize) -> bool {
        self.prefilled[index]
    }

    /// Sentences still waiting for a result. Zero means the callback has
    /// already fired.
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(AtomicOrdering::Acquire)
    }

    /// Worker-side completion: stores the computed result into the cache and
    /// settles the sentence.
    pub(crate) fn process_result(&self, index: usize, result: SentenceResult) {
        if let Some(cache) = &self.cache {
            cache.store(
                CacheKey::new(self.model_id, &self.segments[index]),
                result.clone(),
            );
        }
        self.set_result(index, result);
    }

    fn set_result(&self, index: usize, result: SentenceResult) {
        {
            let mut results = self.results.lock();
            debug_assert!(results[index].is_none(), "sentence {index} completed twice");
            results[index] = Some(result);
        }
        if self.pending.fetch_sub(1, AtomicOrdering::AcqRel) == 1 {
            self.complete();
        }
    }

    fn complete(&self) {
        let builder = self
            .completion
            .lock()
            .take()
            .expect("request completed twice");
        let results: Vec<SentenceResult> = std::mem::take(&mut *self.results.lock())
            .into_iter()
            .map(|slot| slot.expect("missing sentence result"))
            .collect();
        tracing::trace!(request = self.id, sentences = results.len(), "request complete");
        builder.build_and_dispatch(results);
    }
}

/// A single sentence of a request, as placed into buckets and batches.
/// Ordered by `(num_tokens, request id, sentence index)` so shorter sentences
/// drain first with FIFO tie-breaks.
#[derive(Clone)]
pub struct RequestSentence {
    index: usize,
    request: Arc<Request>,
}

impl RequestSentence {
    pub(crate) fn new(index: usize, request: Arc<Request>) -> Self {
        Self { index, request }
    }

    pub fn num_tokens(&self) -> usize {
        self.request.segment(self.index).len()
    }

    /// The token ids the backend should translate, forced EOS included.
    pub fn tokens(&self) -> &[WordId] {
        self.request.segment(self.index)
    }

    pub(crate) fn complete(self, result: SentenceResult) {
        self.request.process_result(self.index, result);
    }

    fn key(&self) -> (usize, u64, usize) {
        (self.num_tokens(), self.request.id(), self.index)
    }
}

impl PartialEq for RequestSentence {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RequestSentence {}

impl PartialOrd for RequestSentence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestSentence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
