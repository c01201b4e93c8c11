/// Sentence splitting and tokenization ahead of batching.
use std::sync::Arc;

use crate::annotation::{AnnotatedText, ByteRange};
use crate::{Segment, WordId};

/// The sub-word vocabulary of a model. Implementations own their model files;
/// the pipeline only relies on the byte-range bookkeeping spelled out below.
pub trait Vocabulary: Send + Sync {
    /// Tokenizes `line` into sub-word ids, returning the byte range of each
    /// token within `line`. Ranges are contiguous and tile `line` from its
    /// first byte; no EOS is appended. Characters foreign to the vocabulary
    /// are expected to come back as reserved control tokens rather than be
    /// dropped, so they can be passed through verbatim downstream.
    fn encode_with_ranges(&self, line: &str) -> (Segment, Vec<ByteRange>);

    /// Decodes ids into text, returning per-token byte ranges into the
    /// decoded string, contiguous and tiling it. The EOS id produces no
    /// output and no range.
    fn decode_with_ranges(&self, words: &[WordId]) -> (String, Vec<ByteRange>);

    fn eos_id(&self) -> WordId;
}

/// Splits a text blob into sentence byte ranges, ordered and disjoint. Text
/// outside every range is treated as inter-sentence whitespace.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<ByteRange>;
}

/// Turns a raw text blob into an [`AnnotatedText`] plus the segments the
/// backend consumes: split into sentences, tokenize, wrap overlong sentences
/// at `max_length_break` and close every segment with EOS.
pub struct TextProcessor {
    vocabulary: Arc<dyn Vocabulary>,
    splitter: Arc<dyn SentenceSplitter>,
    max_length_break: usize,
}

impl TextProcessor {
    pub fn new(
        vocabulary: Arc<dyn Vocabulary>,
        splitter: Arc<dyn SentenceSplitter>,
        max_length_break: usize,
    ) -> Self {
        debug_assert!(max_length_break >= 2);
        Self {
            vocabulary,
            splitter,
            max_length_break,
        }
    }

    pub fn process(&self, text: String) -> (AnnotatedText, Vec<Segment>) {
        let mut source = AnnotatedText::new(text);
        let sentence_ranges = self.splitter.split(&source.text);
        let mut segments = Vec::new();
        for range in sentence_ranges {
            let (tokens, token_ranges) = self.tokenize(&source, range);
            self.wrap(tokens, &token_ranges, &mut segments, &mut source);
        }
        (source, segments)
    }

    /// Re-tokenizes an already-annotated text, keeping its sentence
    /// boundaries exactly: no re-splitting, no wrapping. Used for the second
    /// leg of pivoting, where the per-input sentence counts of both halves
    /// must stay 1:1 even if this model tokenizes some sentence longer than
    /// `max_length_break` (the batching pool keeps slack for that).
    pub(crate) fn process_from_annotation(
        &self,
        previous: &AnnotatedText,
    ) -> (AnnotatedText, Vec<Segment>) {
        let mut source = AnnotatedText::new(previous.text.clone());
        let mut segments = Vec::with_capacity(previous.num_sentences());
        for sentence_idx in 0..previous.num_sentences() {
            let range = previous.sentence_as_range(sentence_idx);
            let (mut segment, token_ranges) = self.tokenize(&source, range);
            segment.push(self.vocabulary.eos_id());
            source.record_existing_sentence(&token_ranges, range.begin);
            segments.push(segment);
        }
        (source, segments)
    }

    fn tokenize(&self, source: &AnnotatedText, range: ByteRange) -> (Segment, Vec<ByteRange>) {
        let (tokens, mut token_ranges) =
            self.vocabulary.encode_with_ranges(&source.text[range.begin..range.end]);
        debug_assert_eq!(tokens.len(), token_ranges.len());
        for token_range in &mut token_ranges {
            token_range.begin += range.begin;
            token_range.end += range.begin;
        }
        (tokens, token_ranges)
    }

    /// Chunks a tokenized sentence into segments of at most
    /// `max_length_break - 1` tokens, leaving room for the appended EOS, and
    /// records each chunk as a sentence of `source`. A sentence that
    /// tokenized to nothing is dropped.
    fn wrap(
        &self,
        tokens: Segment,
        token_ranges: &[ByteRange],
        segments: &mut Vec<Segment>,
        source: &mut AnnotatedText,
    ) {
        let step = self.max_length_break - 1;
        let mut offset = 0;
        while offset < tokens.len() {
            let take = step.min(tokens.len() - offset);
            let mut segment: Segment = tokens[offset..offset + take].to_vec();
            segment.push(self.vocabulary.eos_id());
            let chunk_ranges = &token_ranges[offset..offset + take];
            source.record_existing_sentence(chunk_ranges, chunk_ranges[0].begin);
            segments.push(segment);
            offset += take;
        }
    }
}
