/// Shared fixtures for the unit tests: a deterministic sub-word vocabulary,
/// a period-based sentence splitter and small request factories.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::annotation::{AnnotatedText, ByteRange};
use crate::batch::Batch;
use crate::request::{Request, SentenceResult};
use crate::response::{ConcatStrategy, ResponseOptions};
use crate::response_builder::ResponseBuilder;
use crate::text_processor::{SentenceSplitter, Vocabulary};
use crate::translation_model::{Backend, ModelConfig, TranslationModel};
use crate::{Segment, WordId};

/// Splits a sentence into whitespace-bound pieces; a piece keeps the spaces
/// that follow it, so concatenating pieces restores the sentence byte for
/// byte, the way a sub-word vocabulary reports ranges.
pub(crate) fn split_pieces(line: &str) -> Vec<ByteRange> {
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
    ranges
}

#[derive(Default)]
struct Intern {
    pieces: Vec<String>,
    ids: HashMap<String, WordId>,
}

/// Interns whitespace-bound pieces on first sight; id 0 is EOS.
pub(crate) struct StubVocabulary {
    entries: Mutex<Intern>,
}

impl StubVocabulary {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Intern::default()),
        }
    }

    fn intern(&self, piece: &str) -> WordId {
        let mut entries = self.entries.lock();
        if let Some(&id) = entries.ids.get(piece) {
            return id;
        }
        entries.pieces.push(piece.to_string());
        let id = entries.pieces.len() as WordId;
        entries.ids.insert(piece.to_string(), id);
        id
    }
}

impl Vocabulary for StubVocabulary {
    fn encode_with_ranges(&self, line: &str) -> (Segment, Vec<ByteRange>) {
        let ranges = split_pieces(line);
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
            match entries.pieces.get(word as usize - 1) {
                Some(piece) => decoded.push_str(piece),
                None => decoded.push_str("\u{2047}"),
            }
            ranges.push(ByteRange::new(begin, decoded.len()));
        }
        (decoded, ranges)
    }

    fn eos_id(&self) -> WordId {
        0
    }
}

/// Sentences end at a period; whitespace between them becomes gaps.
pub(crate) struct StubSplitter;

impl SentenceSplitter for StubSplitter {
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

/// A backend producing an EOS-only result per sentence.
pub(crate) struct NullBackend;

impl Backend for NullBackend {
    fn translate_batch(&mut self, _model: &TranslationModel, batch: &Batch) -> Vec<SentenceResult> {
        batch
            .sentences()
            .iter()
            .map(|_| SentenceResult {
                words: vec![0],
                soft_alignment: vec![vec![1.0]],
                word_scores: vec![0.0],
                sentence_score: 0.0,
            })
            .collect()
    }
}

fn source_with_sentences(count: usize) -> AnnotatedText {
    let mut source = AnnotatedText::default();
    for idx in 0..count {
        source.append_sentence(if idx == 0 { "" } else { " " }, ["x"]);
    }
    source
}

pub(crate) fn noop_builder(sentences: usize) -> ResponseBuilder {
    ResponseBuilder::new(
        ResponseOptions::default(),
        source_with_sentences(sentences),
        Arc::new(StubVocabulary::new()),
        Box::new(|_| {}),
    )
}

pub(crate) fn builder_counting_calls(sentences: usize, calls: Arc<AtomicUsize>) -> ResponseBuilder {
    ResponseBuilder::new(
        ResponseOptions::default(),
        source_with_sentences(sentences),
        Arc::new(StubVocabulary::new()),
        Box::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

pub(crate) fn builder_capturing_target(
    sentences: usize,
    vocabulary: Arc<StubVocabulary>,
    target: Arc<Mutex<Option<String>>>,
) -> ResponseBuilder {
    let options = ResponseOptions {
        concat_strategy: ConcatStrategy::Space,
        ..Default::default()
    };
    ResponseBuilder::new(
        options,
        source_with_sentences(sentences),
        vocabulary,
        Box::new(move |response| *target.lock() = Some(response.target.text)),
    )
}

/// A request over raw segments of the given token counts; the builder is a
/// no-op, so these suit pool tests that never complete sentences.
pub(crate) fn request_with_lengths(request_id: u64, lengths: &[usize]) -> Arc<Request> {
    let segments: Vec<Segment> = lengths.iter().map(|&len| vec![1; len]).collect();
    Request::new(request_id, 0, segments, noop_builder(lengths.len()), None)
}

pub(crate) fn request_for_model(
    model: &Arc<TranslationModel>,
    request_id: u64,
    lengths: &[usize],
) -> Arc<Request> {
    let segments: Vec<Segment> = lengths.iter().map(|&len| vec![1; len]).collect();
    Request::new(
        request_id,
        model.id(),
        segments,
        noop_builder(lengths.len()),
        None,
    )
}

/// A model with a deliberately small batch budget so tests exercise batch
/// boundaries quickly.
pub(crate) fn test_model(name: &str) -> Arc<TranslationModel> {
    let config = ModelConfig {
        name: name.to_string(),
        mini_batch_words: 20,
        max_length_break: 10,
        max_length_factor: 1.0,
    };
    TranslationModel::new(config, Arc::new(StubVocabulary::new()), Arc::new(StubSplitter)).unwrap()
}
