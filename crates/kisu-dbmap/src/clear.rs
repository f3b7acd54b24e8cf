//! Cooperative clearing of a [`DatabaseMap`](crate::DatabaseMap).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use kisu_host::{Step, Stepper};

use crate::map::MapInner;

/// Progress of a running [`ClearJob`].
#[derive(Clone, Debug, Default)]
pub struct ClearHandle {
    finished: Arc<AtomicBool>,
    removed: Arc<AtomicUsize>,
}

impl ClearHandle {
    /// Whether every key captured at start has been processed.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Records removed so far.
    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }
}

/// Removes a fixed set of keys, one per step, skipping any key written
/// again after the job was created.
pub struct ClearJob<T> {
    inner: Arc<MapInner<T>>,
    pending: VecDeque<(String, u64)>,
    handle: ClearHandle,
}

impl<T> ClearJob<T> {
    pub(crate) fn new(inner: Arc<MapInner<T>>, keys: Vec<(String, u64)>) -> Self {
        debug!(map = %inner.id, keys = keys.len(), "clear started");
        Self {
            inner,
            pending: keys.into(),
            handle: ClearHandle::default(),
        }
    }

    pub fn handle(&self) -> ClearHandle {
        self.handle.clone()
    }

    fn finish(&self) -> Step {
        self.handle.finished.store(true, Ordering::SeqCst);
        debug!(map = %self.inner.id, removed = self.handle.removed(), "clear finished");
        Step::Done
    }
}

impl<T: Send + Sync> Stepper for ClearJob<T> {
    fn next(&mut self) -> Step {
        let Some((key, generation)) = self.pending.pop_front() else {
            return self.finish();
        };
        match self.inner.remove_unchanged(&key, generation) {
            Ok(true) => {
                self.handle.removed.fetch_add(1, Ordering::SeqCst);
            }
            // Deleted or rewritten in the meantime.
            Ok(false) => {}
            Err(e) => warn!(map = %self.inner.id, key = %key, error = %e, "clear step failed"),
        }
        if self.pending.is_empty() {
            self.finish()
        } else {
            Step::Continue
        }
    }
}
