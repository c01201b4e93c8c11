/// Assembles the final [`Response`] once every sentence of a request has a
/// result.
use std::sync::Arc;

use crate::annotation::AnnotatedText;
use crate::request::SentenceResult;
use crate::response::{Alignment, ConcatStrategy, Quality, Response, ResponseOptions};
use crate::text_processor::Vocabulary;
use crate::{CallbackType, WordId};

pub(crate) struct ResponseBuilder {
    options: ResponseOptions,
    source: AnnotatedText,
    vocabulary: Arc<dyn Vocabulary>,
    callback: CallbackType,
}

impl ResponseBuilder {
    pub(crate) fn new(
        options: ResponseOptions,
        source: AnnotatedText,
        vocabulary: Arc<dyn Vocabulary>,
        callback: CallbackType,
    ) -> Self {
        Self {
            options,
            source,
            vocabulary,
            callback,
        }
    }

    /// Builds the target text, optional metadata, and invokes the callback.
    pub(crate) fn build_and_dispatch(self, results: Vec<SentenceResult>) {
        let Self {
            options,
            source,
            vocabulary,
            callback,
        } = self;
        assert_eq!(
            source.num_sentences(),
            results.len(),
            "mismatch between source sentences and translated results"
        );

        let eos = vocabulary.eos_id();
        let count = results.len();
        let mut target = AnnotatedText::default();
        let mut alignments = Vec::new();
        let mut quality_scores = Vec::new();

        for (sentence_idx, result) in results.iter().enumerate() {
            // The decoder is forced to emit a final EOS; it is dropped from
            // everything user-visible.
            let mut words: &[WordId] = &result.words;
            if words.last() == Some(&eos) {
                words = &words[..words.len() - 1];
            }
            let (decoded, token_ranges) = vocabulary.decode_with_ranges(words);
            let target_words = token_ranges.len();
            let tokens = token_ranges
                .iter()
                .map(|range| &decoded[range.begin..range.end]);

            match options.concat_strategy {
                ConcatStrategy::Faithful => {
                    // Prepend the whitespace between this source sentence and
                    // the one before; after the last sentence, carry over the
                    // trailing run too.
                    target.append_sentence(source.gap(sentence_idx), tokens);
                    if sentence_idx + 1 == count {
                        target.append_ending_whitespace(source.gap(sentence_idx + 1));
                    }
                }
                ConcatStrategy::Space => {
                    let delimiter = if sentence_idx == 0 { "" } else { " " };
                    target.append_sentence(delimiter, tokens);
                }
            }

            if options.alignment {
                alignments.push(trim_alignment(
                    &result.soft_alignment,
                    target_words,
                    source.num_words(sentence_idx),
                ));
            }
            if options.quality_scores {
                let mut words = result.word_scores.clone();
                words.truncate(target_words);
                quality_scores.push(Quality {
                    sequence: result.sentence_score,
                    words,
                });
            }
        }

        tracing::trace!(sentences = count, "response built");
        callback(Response {
            source,
            target,
            alignments,
            quality_scores,
        });
    }
}

/// Restricts a backend alignment matrix to the visible words on both axes,
/// cutting the forced-EOS row and column.
fn trim_alignment(soft: &[Vec<f32>], target_words: usize, source_words: usize) -> Alignment {
    soft.iter()
        .take(target_words)
        .map(|row| row.iter().take(source_words).copied().collect())
        .collect()
}
