//! In-memory [`BatchWriter`] implementations shared by the sequencer and
//! sink tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bson::Document;
use tokio::sync::watch;

use crate::{BatchWriter, Error, Result};

/// Records every batch it is handed. Batches whose first document carries a
/// `slow` key take noticeably longer, which makes ordering violations
/// observable.
#[derive(Clone)]
pub(crate) struct RecordingWriter {
    written: Arc<Mutex<Vec<Vec<Document>>>>,
    close_calls: Arc<AtomicUsize>,
}

impl RecordingWriter {
    pub(crate) fn new() -> Self {
        RecordingWriter {
            written: Arc::new(Mutex::new(Vec::new())),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn written(&self) -> Vec<Vec<Document>> {
        self.written.lock().unwrap().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl BatchWriter for RecordingWriter {
    async fn write_batch(&self, batch: Vec<Document>) -> Result<()> {
        if batch.first().is_some_and(|d| d.contains_key("slow")) {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.written.lock().unwrap().push(batch);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Holds every write until the gate opens, mimicking a backend whose
/// connection is not ready at submission time.
#[derive(Clone)]
pub(crate) struct GatedWriter {
    written: Arc<Mutex<Vec<Vec<Document>>>>,
    gate: watch::Sender<bool>,
}

impl GatedWriter {
    pub(crate) fn new() -> Self {
        let (gate, _) = watch::channel(false);
        GatedWriter {
            written: Arc::new(Mutex::new(Vec::new())),
            gate,
        }
    }

    pub(crate) fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn written(&self) -> Vec<Vec<Document>> {
        self.written.lock().unwrap().clone()
    }
}

impl BatchWriter for GatedWriter {
    async fn write_batch(&self, batch: Vec<Document>) -> Result<()> {
        let mut ready = self.gate.subscribe();
        while !*ready.borrow() {
            ready.changed().await.map_err(|_| {
                Error::Other("gate dropped while a write was parked".to_string())
            })?;
        }
        self.written.lock().unwrap().push(batch);
        Ok(())
    }

    async fn close(&self) {}
}

/// Rejects batches whose first document carries a `boom` key and records the
/// rest. With `fail_all` set, every batch is rejected, which models a
/// connection that never becomes ready.
#[derive(Clone)]
pub(crate) struct FailingWriter {
    written: Arc<Mutex<Vec<Vec<Document>>>>,
    close_calls: Arc<AtomicUsize>,
    fail_all: bool,
}

impl FailingWriter {
    pub(crate) fn new() -> Self {
        FailingWriter {
            written: Arc::new(Mutex::new(Vec::new())),
            close_calls: Arc::new(AtomicUsize::new(0)),
            fail_all: false,
        }
    }

    pub(crate) fn failing_all() -> Self {
        FailingWriter {
            fail_all: true,
            ..Self::new()
        }
    }

    pub(crate) fn written(&self) -> Vec<Vec<Document>> {
        self.written.lock().unwrap().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl BatchWriter for FailingWriter {
    async fn write_batch(&self, batch: Vec<Document>) -> Result<()> {
        if self.fail_all || batch.first().is_some_and(|d| d.contains_key("boom")) {
            return Err(Error::Other("backend rejected batch".to_string()));
        }
        self.written.lock().unwrap().push(batch);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}
