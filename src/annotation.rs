/// Sentence and token boundary bookkeeping over a text blob.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Half-open `[begin, end)` byte offsets into a text blob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub begin: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(end >= begin);
        Self { begin, end }
    }

    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Annotation expresses sentence and token boundary information as ranges of
/// bytes in a string, but does not itself own the string.
///
/// Text is divided into gaps (whitespace between sentences) and sentences
/// like so:
///
/// ```text
/// gap sentence gap sentence gap
/// ```
///
/// Because gaps appear at the beginning and end of the text, there is always
/// one more gap than there are sentences. The entire text is an unbroken
/// sequence of tokens: the end of a token is the beginning of the next. A gap
/// is exactly one token holding whatever whitespace sits between sentences,
/// and a sentence is a run of tokens. Sub-word tokens may themselves contain
/// whitespace, so "word" here is a loose synonym of token.
///
/// A gap can be empty (no whitespace at the beginning of text, say), and a
/// sentence can be empty too (an empty translation); both are just empty
/// ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Byte offset at which token `i` begins. Token `i` spans
    /// `[token_begin[i], token_begin[i + 1])`; the vector is padded with a
    /// final entry so the indexing is valid even for the last token, making
    /// `token_begin.len()` the number of tokens plus one.
    token_begin: Vec<usize>,

    /// Indices (into tokens) of the gap tokens between sentences.
    /// Gap `g` is the byte range
    /// `[token_begin[gap[g]], token_begin[gap[g] + 1])` and sentence `s` is
    /// `[token_begin[gap[s] + 1], token_begin[gap[s + 1]])`, whitespace at
    /// either end excluded. `gap.len() == num_sentences() + 1`.
    ///
    /// Examples:
    /// - empty text `""`: `token_begin = [0, 0]`, `gap = [0]`
    /// - only a space `" "`: `token_begin = [0, 1]`, `gap = [0]`
    /// - one token `"hi"`: `token_begin = [0, 0, 2, 2]`, `gap = [0, 2]`
    gap: Vec<usize>,

    /// Sparse set of `(sentence, word)` pairs foreign to the vocabulary,
    /// recorded so a replace-unknown-from-source pass can find them again.
    unknowns: BTreeSet<(usize, usize)>,
}

impl Default for Annotation {
    fn default() -> Self {
        Self {
            token_begin: vec![0, 0],
            gap: vec![0],
            unknowns: BTreeSet::new(),
        }
    }
}

impl Annotation {
    pub fn num_sentences(&self) -> usize {
        self.gap.len() - 1
    }

    /// Number of words in the sentence identified by `sentence_idx`.
    pub fn num_words(&self, sentence_idx: usize) -> usize {
        self.gap[sentence_idx + 1] - self.gap[sentence_idx] - 1
    }

    /// Byte range of word `word_idx` (0-based, `< num_words(sentence_idx)`)
    /// in sentence `sentence_idx`.
    pub fn word(&self, sentence_idx: usize, word_idx: usize) -> ByteRange {
        let token_idx = self.gap[sentence_idx] + 1 + word_idx;
        ByteRange::new(self.token_begin[token_idx], self.token_begin[token_idx + 1])
    }

    /// Byte range of sentence `sentence_idx`, surrounding whitespace excluded.
    pub fn sentence(&self, sentence_idx: usize) -> ByteRange {
        ByteRange::new(
            self.token_begin[self.gap[sentence_idx] + 1],
            self.token_begin[self.gap[sentence_idx + 1]],
        )
    }

    /// Byte range of gap `gap_idx`, valid for `0..=num_sentences()`.
    pub fn gap(&self, gap_idx: usize) -> ByteRange {
        let token_idx = self.gap[gap_idx];
        ByteRange::new(self.token_begin[token_idx], self.token_begin[token_idx + 1])
    }

    pub fn is_unknown(&self, sentence_idx: usize, word_idx: usize) -> bool {
        self.unknowns.contains(&(sentence_idx, word_idx))
    }

    pub fn mark_unknown(&mut self, sentence_idx: usize, word_idx: usize) {
        self.unknowns.insert((sentence_idx, word_idx));
    }
}

/// A text blob together with its [`Annotation`], moved around as one unit so
/// the byte ranges stay valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedText {
    pub text: String,
    annotation: Annotation,
}

impl AnnotatedText {
    /// Wraps an existing string with no sentences recorded yet: the whole
    /// text is one gap that [`record_existing_sentence`] calls will break.
    ///
    /// [`record_existing_sentence`]: AnnotatedText::record_existing_sentence
    pub fn new(text: String) -> Self {
        let mut annotation = Annotation::default();
        annotation.token_begin[1] = text.len();
        Self { text, annotation }
    }

    pub fn annotation(&self) -> &Annotation {
        &self.annotation
    }

    pub fn num_sentences(&self) -> usize {
        self.annotation.num_sentences()
    }

    pub fn num_words(&self, sentence_idx: usize) -> usize {
        self.annotation.num_words(sentence_idx)
    }

    pub fn word(&self, sentence_idx: usize, word_idx: usize) -> &str {
        self.slice(self.annotation.word(sentence_idx, word_idx))
    }

    pub fn sentence(&self, sentence_idx: usize) -> &str {
        self.slice(self.annotation.sentence(sentence_idx))
    }

    /// The gap before sentence `sentence_idx`; `num_sentences()` addresses
    /// the trailing gap after the last sentence.
    pub fn gap(&self, sentence_idx: usize) -> &str {
        self.slice(self.annotation.gap(sentence_idx))
    }

    pub fn word_as_range(&self, sentence_idx: usize, word_idx: usize) -> ByteRange {
        self.annotation.word(sentence_idx, word_idx)
    }

    pub fn sentence_as_range(&self, sentence_idx: usize) -> ByteRange {
        self.annotation.sentence(sentence_idx)
    }

    pub fn is_unknown(&self, sentence_idx: usize, word_idx: usize) -> bool {
        self.annotation.is_unknown(sentence_idx, word_idx)
    }

    pub fn mark_unknown(&mut self, sentence_idx: usize, word_idx: usize) {
        self.annotation.mark_unknown(sentence_idx, word_idx);
    }

    /// Marks the supplied word indices of the last recorded sentence as
    /// unknown to the vocabulary.
    pub fn mark_unknowns_in_last_sentence(&mut self, word_idxs: &[usize]) {
        assert!(self.num_sentences() > 0, "no sentence recorded yet");
        let sentence_idx = self.num_sentences() - 1;
        for &word_idx in word_idxs {
            self.annotation.mark_unknown(sentence_idx, word_idx);
        }
    }

    /// Records a sentence that is already part of the text. Sentences must be
    /// recorded in order, each described by the byte ranges of its tokens;
    /// consecutive token ranges must be contiguous. `sentence_begin` anchors
    /// the sentence when `token_ranges` is empty.
    pub fn record_existing_sentence(&mut self, token_ranges: &[ByteRange], sentence_begin: usize) {
        let text_len = self.text.len();
        let annotation = &mut self.annotation;
        assert_eq!(
            annotation.token_begin.last().copied(),
            Some(text_len),
            "sentences must be recorded in order over the full text"
        );
        debug_assert!(sentence_begin <= text_len);
        if let Some(first) = token_ranges.first() {
            debug_assert_eq!(first.begin, sentence_begin);
        }

        // Clip the end-of-text sentinel, lay the sentence tokens down, then
        // open the next gap from the end of the sentence to the end of text.
        annotation.token_begin.pop();
        for (idx, range) in token_ranges.iter().enumerate() {
            debug_assert!(range.end <= text_len);
            if let Some(next) = token_ranges.get(idx + 1) {
                debug_assert_eq!(range.end, next.begin, "token ranges must be contiguous");
            }
            annotation.token_begin.push(range.begin);
        }
        let gap_begin = token_ranges.last().map_or(sentence_begin, |range| range.end);
        annotation.gap.push(annotation.token_begin.len());
        annotation.token_begin.push(gap_begin);
        annotation.token_begin.push(text_len);
    }

    /// Appends a sentence to the text: `prefix` extends the pending gap, the
    /// tokens are appended back to back and recorded. Remember to finish with
    /// [`append_ending_whitespace`] for the trailing gap.
    ///
    /// [`append_ending_whitespace`]: AnnotatedText::append_ending_whitespace
    pub fn append_sentence<'a, I>(&mut self, prefix: &str, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let annotation = &mut self.annotation;
        debug_assert_eq!(annotation.token_begin.last().copied(), Some(self.text.len()));

        self.text.push_str(prefix);
        *annotation.token_begin.last_mut().unwrap() = self.text.len();

        for token in tokens {
            self.text.push_str(token);
            annotation.token_begin.push(self.text.len());
        }

        annotation.gap.push(annotation.token_begin.len() - 1);
        annotation.token_begin.push(self.text.len());
    }

    /// Appends the whitespace after the last sentence, extending the trailing
    /// gap.
    pub fn append_ending_whitespace(&mut self, whitespace: &str) {
        self.text.push_str(whitespace);
        *self.annotation.token_begin.last_mut().unwrap() = self.text.len();
    }

    fn slice(&self, range: ByteRange) -> &str {
        &self.text[range.begin..range.end]
    }
}

/// Converts a byte offset into `text` to a character position, clipping
/// offsets past the end.
pub fn offset_to_position(text: &str, offset: usize) -> usize {
    let clipped = offset.min(text.len());
    text.as_bytes()[..clipped]
        .iter()
        .filter(|byte| (*byte & 0xc0) != 0x80)
        .count()
}

/// Converts a character position into a byte offset, clipping positions past
/// the end.
pub fn position_to_offset(text: &str, position: usize) -> usize {
    text.char_indices()
        .nth(position)
        .map_or(text.len(), |(offset, _)| offset)
}
