//! Deterministic collaborators for driving the service end to end: a
//! whitespace sub-word vocabulary, a period sentence splitter and an identity
//! backend that records the shape of every batch it runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use text_translation_service::{
    Backend, Batch, ByteRange, ModelConfig, Segment, SentenceResult, SentenceSplitter,
    TranslationModel, Vocabulary, WordId,
};

/// Whitespace-bound pieces; a piece keeps the spaces that follow it, so the
/// ranges tile the sentence byte for byte. Ids are interned on first sight,
/// id 0 is EOS.
pub struct WhitespaceVocabulary {
    entries: Mutex<(Vec<String>, HashMap<String, WordId>)>,
}

impl WhitespaceVocabulary {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new((Vec::new(), HashMap::new())),
        }
    }

    fn intern(&self, piece: &str) -> WordId {
        let mut entries = self.entries.lock();
        if let Some(&id) = entries.1.get(piece) {
            return id;
        }
        entries.0.push(piece.to_string());
        let id = entries.0.len() as WordId;
        entries.1.insert(piece.to_string(), id);
        id
    }
}

impl Vocabulary for WhitespaceVocabulary {
    fn encode_with_ranges(&self, line: &str) -> (Segment, Vec<ByteRange>) {
        let bytes = line.as_bytes();
        let mut ranges = Vec::new();
        let mut start = 0;
        for i in 1..bytes.len() {
            if bytes[i] != b' ' && bytes[i - 1] == b' ' {
                ranges.push(ByteRange::new(start, i));
                start = i;
            }
        }
        if !line.is_empty() {
            ranges.push(ByteRange::new(start, line.len()));
        }
        let segment = ranges
            .iter()
            .map(|range| self.intern(&line[range.begin..range.end]))
            .collect();
        (segment, ranges)
    }

    fn decode_with_ranges(&self, words: &[WordId]) -> (String, Vec<ByteRange>) {
        let entries = self.entries.lock();
        let mut decoded = String::new();
        let mut ranges = Vec::new();
        for &word in words {
            if word == 0 {
                continue;
            }
            let begin = decoded.len();
            decoded.push_str(&entries.0[word as usize - 1]);
            ranges.push(ByteRange::new(begin, decoded.len()));
        }
        (decoded, ranges)
    }

    fn eos_id(&self) -> WordId {
        0
    }
}

/// Sentences run up to and including a period; surrounding whitespace becomes
/// gaps.
pub struct PeriodSplitter;

impl SentenceSplitter for PeriodSplitter {
    fn split(&self, text: &str) -> Vec<ByteRange> {
        let mut ranges = Vec::new();
        let mut start = None;
        for (i, byte) in text.bytes().enumerate() {
            if byte.is_ascii_whitespace() {
                continue;
            }
            if start.is_none() {
                start = Some(i);
            }
            if byte == b'.' {
                ranges.push(ByteRange::new(start.take().unwrap(), i + 1));
            }
        }
        if let Some(begin) = start {
            ranges.push(ByteRange::new(begin, text.len()));
        }
        ranges
    }
}

/// Shape of one executed batch, as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchShape {
    pub model: String,
    pub sentences: usize,
    pub max_length: usize,
}

/// Identity "translation": every sentence comes back as its own tokens with
/// a diagonal soft alignment. Batch shapes are recorded for assertions, and
/// an optional delay simulates inference cost.
pub struct RecordingBackend {
    batches: Arc<Mutex<Vec<BatchShape>>>,
    delay: Option<Duration>,
}

impl RecordingBackend {
    pub fn new(batches: Arc<Mutex<Vec<BatchShape>>>) -> Self {
        Self {
            batches,
            delay: None,
        }
    }

    pub fn with_delay(batches: Arc<Mutex<Vec<BatchShape>>>, delay: Duration) -> Self {
        Self {
            batches,
            delay: Some(delay),
        }
    }
}

impl Backend for RecordingBackend {
    fn translate_batch(&mut self, model: &TranslationModel, batch: &Batch) -> Vec<SentenceResult> {
        self.batches.lock().push(BatchShape {
            model: model.name().to_string(),
            sentences: batch.len(),
            max_length: batch.max_length(),
        });
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        batch
            .sentences()
            .iter()
            .map(|sentence| identity_result(sentence.tokens()))
            .collect()
    }
}

pub fn identity_result(tokens: &[WordId]) -> SentenceResult {
    let len = tokens.len();
    SentenceResult {
        words: tokens.to_vec(),
        soft_alignment: (0..len)
            .map(|row| (0..len).map(|col| if col == row { 1.0 } else { 0.0 }).collect())
            .collect(),
        word_scores: vec![-0.1; len],
        sentence_score: -0.05,
    }
}

pub fn model(name: &str, mini_batch_words: usize, max_length_break: usize) -> Arc<TranslationModel> {
    let config = ModelConfig {
        name: name.to_string(),
        mini_batch_words,
        max_length_break,
        max_length_factor: 1.0,
    };
    TranslationModel::new(
        config,
        Arc::new(WhitespaceVocabulary::new()),
        Arc::new(PeriodSplitter),
    )
    .expect("valid test model")
}
