/// Lock + condition-variable wrap around the aggregate pool, shared between
/// the client-facing producer and the worker threads.
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::aggregate_batching_pool::AggregateBatchingPool;
use crate::batch::Batch;
use crate::request::Request;
use crate::translation_model::TranslationModel;

struct State {
    pool: AggregateBatchingPool,
    /// Sentences sitting in buckets, not yet drained into batches.
    enqueued: usize,
    shutdown: bool,
}

pub(crate) struct ThreadsafeBatchingPool {
    state: Mutex<State>,
    work: Condvar,
}

impl ThreadsafeBatchingPool {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                pool: AggregateBatchingPool::new(),
                enqueued: 0,
                shutdown: false,
            }),
            work: Condvar::new(),
        }
    }

    pub(crate) fn enqueue_request(&self, model: &Arc<TranslationModel>, request: &Arc<Request>) {
        let mut state = self.state.lock();
        let enqueued = state.pool.enqueue_request(model, request);
        state.enqueued += enqueued;
        if enqueued > 0 {
            self.work.notify_all();
        }
    }

    /// Blocks until a batch can be produced or shutdown is signalled.
    /// Returns `None` only on shutdown; work still sitting in buckets at that
    /// point is dropped, not drained.
    pub(crate) fn generate_batch(&self) -> Option<(Arc<TranslationModel>, Batch)> {
        let mut state = self.state.lock();
        self.work
            .wait_while(&mut state, |state| state.enqueued == 0 && !state.shutdown);
        if state.shutdown {
            return None;
        }
        match state.pool.generate_batch() {
            Some((model, batch)) => {
                state.enqueued -= batch.len();
                Some((model, batch))
            }
            None => {
                debug_assert!(false, "woken with sentences accounted but none batchable");
                None
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        tracing::info!("batching pool shut down, waking workers");
        self.work.notify_all();
    }

    /// Drops all pending, not-yet-batched sentences. Their requests will
    /// never complete.
    pub(crate) fn clear(&self) {
        let mut state = self.state.lock();
        state.pool.clear();
        state.enqueued = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::testing::{request_for_model, test_model};

    #[test]
    fn produces_enqueued_batches() {
        let pool = ThreadsafeBatchingPool::new();
        let model = test_model("threadsafe-produce");
        pool.enqueue_request(&model, &request_for_model(&model, 0, &[3]));

        let (produced, batch) = pool.generate_batch().expect("batch expected");
        assert_eq!(produced.name(), model.name());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn shutdown_wakes_blocked_workers() {
        let pool = Arc::new(ThreadsafeBatchingPool::new());
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.generate_batch().is_none())
        };

        // Give the worker a moment to block on the condvar.
        thread::sleep(Duration::from_millis(20));
        pool.shutdown();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn shutdown_drops_pending_work() {
        let pool = ThreadsafeBatchingPool::new();
        let model = test_model("threadsafe-drop");
        pool.enqueue_request(&model, &request_for_model(&model, 0, &[3, 3]));
        pool.shutdown();
        assert!(pool.generate_batch().is_none());
    }

    #[test]
    fn clear_forgets_pending_sentences() {
        let pool = ThreadsafeBatchingPool::new();
        let model = test_model("threadsafe-clear");
        pool.enqueue_request(&model, &request_for_model(&model, 0, &[3, 3]));
        pool.clear();
        pool.shutdown();
        assert!(pool.generate_batch().is_none());
    }
}
