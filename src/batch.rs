/// A unit of backend work: sentences from one model, assembled by the
/// batching pool under its padding budget.
use crate::request::{RequestSentence, SentenceResult};

#[derive(Default)]
pub struct Batch {
    sentences: Vec<RequestSentence>,
    token_count: usize,
    max_length: usize,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.sentences.clear();
        self.token_count = 0;
        self.max_length = 0;
    }

    pub(crate) fn add(&mut self, sentence: RequestSentence) {
        self.token_count += sentence.num_tokens();
        self.max_length = self.max_length.max(sentence.num_tokens());
        self.sentences.push(sentence);
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Token count of the longest sentence, the padded width of the batch.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn sentences(&self) -> &[RequestSentence] {
        &self.sentences
    }

    pub fn log(&self) {
        tracing::debug!(
            tokens = self.token_count,
            max_length = self.max_length,
            sentences = self.sentences.len(),
            "batch"
        );
    }

    /// Routes one result per sentence back to the owning requests, firing
    /// request callbacks as they become whole.
    pub fn complete(self, results: Vec<SentenceResult>) {
        assert_eq!(
            results.len(),
            self.sentences.len(),
            "backend produced {} results for a batch of {} sentences",
            results.len(),
            self.sentences.len()
        );
        for (sentence, result) in self.sentences.into_iter().zip(results) {
            sentence.complete(result);
        }
    }
}
