use bson::Document;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::warn;

use crate::BatchWriter;
use crate::hooks::LifecycleHooks;

type Tail = Shared<BoxFuture<'static, ()>>;

/// The ordering core: batches go to the backend in submission order, and a
/// single tail future accumulates the completion of everything submitted so
/// far.
///
/// Ordering strength is strict single-in-flight: each write first awaits the
/// previous tail, then issues its backend operation, so issuance order equals
/// submission order even when the backend would happily run concurrent
/// operations out of order. Completion bookkeeping and shutdown only need the
/// aggregate tail, never individual writes.
pub struct WriteSequencer<W> {
    writer: W,
    hooks: LifecycleHooks,
    tail: Option<Tail>,
}

impl<W> WriteSequencer<W>
where
    W: BatchWriter + Clone + Send + Sync + 'static,
{
    pub fn new(writer: W, hooks: LifecycleHooks) -> Self {
        WriteSequencer {
            writer,
            hooks,
            tail: None,
        }
    }

    pub(crate) fn writer(&self) -> &W {
        &self.writer
    }

    /// Schedules the batch behind everything submitted so far and returns
    /// immediately; it never awaits the write or the tail.
    ///
    /// A rejected write is routed to the error hook and the batch is dropped;
    /// the tail still resolves so later writes and shutdown never hang on a
    /// failure. The chain link is the spawned task's join handle, which
    /// resolves even if the write panicked.
    pub fn submit(&mut self, batch: Vec<Document>) {
        let writer = self.writer.clone();
        let hooks = self.hooks.clone();
        let previous = self.tail.take();
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            if let Err(error) = writer.write_batch(batch).await {
                warn!(%error, "batch write failed, dropping batch");
                hooks.error(error);
            }
        });
        self.tail = Some(task.map(|_| ()).boxed().shared());
    }

    /// Resolves once every write submitted so far has resolved, successfully
    /// or by recorded failure. Idempotent; an empty sequencer yields an
    /// already-resolved future.
    pub fn drain(&self) -> BoxFuture<'static, ()> {
        match &self.tail {
            Some(tail) => tail.clone().boxed(),
            None => futures::future::ready(()).boxed(),
        }
    }
}
