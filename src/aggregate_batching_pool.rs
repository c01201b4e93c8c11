/// Round-robin multiplexing of several models' batching pools.
use std::collections::VecDeque;
use std::sync::Arc;

use crate::batch::Batch;
use crate::request::Request;
use crate::translation_model::TranslationModel;

/// A FIFO of models that currently have pending sentences. Fairness is
/// round-robin at batch granularity: a model is rotated to the back after
/// producing a batch, so a heavy model cannot monopolize the workers, while
/// every batch stays homogeneous (one model per batch, since the backend is
/// per-model). Duplicate queue entries from repeated enqueues are harmless;
/// they collapse through the empty-batch path.
#[derive(Default)]
pub(crate) struct AggregateBatchingPool {
    queue: VecDeque<Arc<TranslationModel>>,
}

impl AggregateBatchingPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn enqueue_request(
        &mut self,
        model: &Arc<TranslationModel>,
        request: &Arc<Request>,
    ) -> usize {
        let enqueued = model.enqueue_request(request);
        if enqueued > 0 {
            self.queue.push_back(model.clone());
        }
        enqueued
    }

    /// Pops models off the queue until one yields a non-empty batch; models
    /// with nothing pending are dropped along the way.
    pub(crate) fn generate_batch(&mut self) -> Option<(Arc<TranslationModel>, Batch)> {
        while let Some(model) = self.queue.pop_front() {
            let mut batch = Batch::new();
            if model.generate_batch(&mut batch) > 0 {
                self.queue.push_back(model.clone());
                return Some((model, batch));
            }
        }
        None
    }

    pub(crate) fn clear(&mut self) {
        for model in self.queue.drain(..) {
            model.clear_pool();
        }
    }
}
