use thiserror::Error;

/// Rejections raised at API entry, before any work is queued. Violations of
/// the batching contract itself (out-of-range buckets, pivot sentence-count
/// mismatches) are bugs rather than inputs and abort with a panic instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("model name must not be empty")]
    EmptyModelName,
    #[error("mini_batch_words must be positive")]
    ZeroBatchBudget,
    #[error("max_length_break must be at least 2 to leave room for the end-of-sentence token")]
    LengthBreakTooSmall,
    #[error("longest batchable sentence ({0} tokens) does not fit the {1} word batch budget")]
    LengthBreakExceedsBudget(usize, usize),
    #[error("AsyncService requires at least one worker thread")]
    NoWorkers,
}
