//! In-process document store, mainly for tests.
//!
//! Clones share storage, so a test can hand one clone to the loader and
//! inspect the other afterwards. Failures can be scripted per call.

use crate::sink::{BulkSink, SinkError, SinkErrorKind, SinkResult};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type CollectionStorage = Arc<Mutex<HashMap<String, Vec<Value>>>>;

#[derive(Clone)]
pub struct MemorySink {
    collection: String,
    collections: CollectionStorage,
    script: Arc<Mutex<VecDeque<SinkErrorKind>>>,
    reject_when: Option<Arc<dyn Fn(&[Value]) -> bool + Send + Sync>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MemorySink {
    #[must_use]
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            collections: Arc::new(Mutex::new(HashMap::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            reject_when: None,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the next calls, in order, with these error kinds.
    #[must_use]
    pub fn with_failures(self, kinds: impl IntoIterator<Item = SinkErrorKind>) -> Self {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .extend(kinds);
        self
    }

    /// Reject every batch matching `predicate` with [`SinkErrorKind::Rejected`].
    #[must_use]
    pub fn rejecting(mut self, predicate: impl Fn(&[Value]) -> bool + Send + Sync + 'static) -> Self {
        self.reject_when = Some(Arc::new(predicate));
        self
    }

    /// Sleep this long inside every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Documents stored in this sink's collection.
    ///
    /// # Panics
    ///
    /// Panics if the storage mutex is poisoned.
    pub fn documents(&self) -> Vec<Value> {
        self.collections
            .lock()
            .expect("collections mutex poisoned")
            .get(&self.collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `insert_many` calls made, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BulkSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn insert_many(&self, records: &[Value]) -> SinkResult<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(kind) = self.script.lock().expect("script mutex poisoned").pop_front() {
            return Err(SinkError::new(kind, "scripted failure"));
        }
        if let Some(reject) = &self.reject_when
            && reject(records)
        {
            return Err(SinkError::new(SinkErrorKind::Rejected, "documents rejected"));
        }
        self.collections
            .lock()
            .expect("collections mutex poisoned")
            .entry(self.collection.clone())
            .or_default()
            .extend_from_slice(records);
        Ok(records.len())
    }
}
