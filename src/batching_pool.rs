/// Length-bucketed, padding-aware batch assembly for a single model.
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::batch::Batch;
use crate::request::{Request, RequestSentence};
use crate::translation_model::ModelConfig;

/// Longest sentence the pool will bucket. Text-processor wrapping keeps
/// regular sentences at `max_length_break`; pivot-stage sentences are not
/// re-wrapped (that would break the 1:1 sentence mapping between halves) and
/// may tokenize longer under the second model, so slack of
/// `(max_length_factor - 1) * max_length_break` tokens is kept on top.
/// Anything beyond aborts on enqueue.
pub(crate) fn maximum_sentence_length(config: &ModelConfig) -> usize {
    let slack = ((config.max_length_factor - 1.0).max(0.0) * config.max_length_break as f32) as usize;
    config.max_length_break + slack
}

pub(crate) struct BatchingPool {
    mini_batch_words: usize,
    buckets: Vec<BTreeSet<RequestSentence>>,
    max_active_bucket_length: usize,
}

impl BatchingPool {
    pub(crate) fn new(config: &ModelConfig) -> Self {
        let bucket_count = maximum_sentence_length(config) + 1;
        assert!(
            bucket_count - 1 <= config.mini_batch_words,
            "sentences of up to {} tokens cannot fit a batch of {} words",
            bucket_count - 1,
            config.mini_batch_words
        );
        Self {
            mini_batch_words: config.mini_batch_words,
            buckets: (0..bucket_count).map(|_| BTreeSet::new()).collect(),
            max_active_bucket_length: 0,
        }
    }

    /// Places every not-yet-answered segment of `request` into the bucket of
    /// its token count, and returns how many were enqueued.
    pub(crate) fn enqueue_request(&mut self, request: &Arc<Request>) -> usize {
        let mut enqueued = 0;
        for index in 0..request.num_segments() {
            if request.is_prefilled(index) {
                continue;
            }
            let sentence = RequestSentence::new(index, request.clone());
            let bucket_id = sentence.num_tokens();
            assert!(
                bucket_id < self.buckets.len(),
                "sentence of {} tokens exceeds the maximum batchable length {}",
                bucket_id,
                self.buckets.len() - 1
            );
            self.buckets[bucket_id].insert(sentence);
            self.max_active_bucket_length = self.max_active_bucket_length.max(bucket_id);
            enqueued += 1;
        }
        enqueued
    }

    /// Drains sentences into `batch`, shortest buckets first, until the next
    /// insertion would push the padded size `(len + 1) * max_length` past
    /// `mini_batch_words`. Returns the batch size.
    pub(crate) fn generate_batch(&mut self, batch: &mut Batch) -> usize {
        batch.clear();
        for length in 0..=self.max_active_bucket_length {
            while !self.buckets[length].is_empty() {
                let padded_batch_size = (batch.len() + 1) * length;
                if padded_batch_size > self.mini_batch_words {
                    debug_assert!(!batch.is_empty());
                    return batch.len();
                }
                let sentence = self.buckets[length].pop_first().unwrap();
                batch.add(sentence);
            }
        }
        batch.len()
    }

    pub(crate) fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.max_active_bucket_length = 0;
    }
}
