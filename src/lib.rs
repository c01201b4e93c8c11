//! Batched neural machine translation dispatch.
//!
//! The crate accepts textual translation requests, splits them into
//! sentences, groups sentences from many concurrent requests into
//! size-homogeneous batches, executes the batches through a pluggable
//! inference [`Backend`], and reassembles per-request responses with
//! alignment and quality metadata. A content-addressed [`TranslationCache`]
//! short-circuits repeated sentence work.
//!
//! Inference itself, the sub-word vocabulary and the sentence splitter are
//! collaborators supplied by the embedder through the [`Backend`],
//! [`Vocabulary`] and [`SentenceSplitter`] traits. Two façades expose the
//! pipeline: [`AsyncService`] runs a fixed pool of worker threads and fires a
//! callback per request, [`BlockingService`] drives the batch loop inline on
//! the caller.

mod aggregate_batching_pool;
mod annotation;
mod batch;
mod batching_pool;
mod cache;
mod error;
pub mod logging;
mod remap_alignments;
mod request;
mod response;
mod response_builder;
mod service;
mod text_processor;
mod threadsafe_batching_pool;
mod translation_model;

#[cfg(test)]
mod testing;

pub use annotation::{
    offset_to_position, position_to_offset, AnnotatedText, Annotation, ByteRange,
};
pub use batch::Batch;
pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use error::ValidationError;
pub use remap_alignments::{combine_pivoted, remap_alignments};
pub use request::{RequestSentence, SentenceResult};
pub use response::{Alignment, AlignmentPoint, ConcatStrategy, Quality, Response, ResponseOptions};
pub use service::{AsyncConfig, AsyncService, BlockingConfig, BlockingService};
pub use text_processor::{SentenceSplitter, TextProcessor, Vocabulary};
pub use translation_model::{Backend, ModelConfig, TranslationModel, Workspace};

/// Id of a sub-word vocabulary entry.
pub type WordId = u32;

/// Token ids of one sentence, the unit of backend input.
pub type Segment = Vec<WordId>;

/// Client completion callback, invoked exactly once per request.
pub type CallbackType = Box<dyn FnOnce(Response) + Send + 'static>;
