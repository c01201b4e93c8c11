/// The translated counterpart of an input blob, plus optional metadata.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::annotation::AnnotatedText;

/// Dense soft alignment for one sentence: row per target word, column per
/// source word, non-negative, each row summing to roughly one.
pub type Alignment = Vec<Vec<f32>>;

/// Sentence-level and word-level translation quality, both as log
/// probabilities; the sentence score is length-normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quality {
    pub sequence: f32,
    pub words: Vec<f32>,
}

/// How target sentences are joined back into a text blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatStrategy {
    /// Reproduce the whitespace between source sentences, including the
    /// trailing run.
    #[default]
    Faithful,
    /// Join sentences with single spaces and drop surrounding whitespace.
    Space,
}

/// Dictates which optional members of a [`Response`] get built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseOptions {
    pub quality_scores: bool,
    pub alignment: bool,
    pub concat_strategy: ConcatStrategy,
    /// Probability floor applied when a soft alignment is collapsed by
    /// [`Response::hard_alignment`].
    pub alignment_threshold: f32,
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self {
            quality_scores: false,
            alignment: false,
            concat_strategy: ConcatStrategy::default(),
            alignment_threshold: 0.2,
        }
    }
}

/// One `(source word, target word)` link of a hard alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPoint {
    pub source: usize,
    pub target: usize,
    pub prob: f32,
}

/// A completed translation: the annotated source it was built from, the
/// annotated target, and per-sentence alignment and quality metadata when
/// requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub source: AnnotatedText,
    pub target: AnnotatedText,
    pub alignments: Vec<Alignment>,
    pub quality_scores: Vec<Quality>,
}

impl Response {
    /// Number of sentences; source and target always agree on it.
    pub fn sentence_count(&self) -> usize {
        self.source.num_sentences()
    }

    /// Collapses the soft alignment of `sentence_idx` into discrete points.
    /// A threshold of one or more keeps only the best source word per target
    /// word; anything lower keeps every link at or above it.
    pub fn hard_alignment(&self, sentence_idx: usize, threshold: f32) -> Vec<AlignmentPoint> {
        let soft = &self.alignments[sentence_idx];
        let mut points = Vec::new();
        for (target, row) in soft.iter().enumerate() {
            if threshold >= 1.0 {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal));
                if let Some((source, &prob)) = best {
                    points.push(AlignmentPoint { source, target, prob });
                }
            } else {
                for (source, &prob) in row.iter().enumerate() {
                    if prob >= threshold {
                        points.push(AlignmentPoint { source, target, prob });
                    }
                }
            }
        }
        points
    }
}
