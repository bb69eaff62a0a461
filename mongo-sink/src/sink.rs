use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bson::Document;
use futures::FutureExt;
use futures::Sink;
use futures::future::BoxFuture;
use tracing::debug;

use crate::hooks::LifecycleHooks;
use crate::sequencer::WriteSequencer;
use crate::session::ConnectionSession;
use crate::{BatchWriter, Error, Result, SinkConfig};

enum SinkState {
    Accepting,
    Draining(BoxFuture<'static, ()>),
    Closed,
}

/// Stream-protocol adapter over [`WriteSequencer`], implementing
/// [`futures::Sink`] for batches of documents.
///
/// Accepting a batch acknowledges it immediately; the sink never stalls the
/// stream while the backend catches up. The flip side is deliberate: a batch
/// whose backend write later fails has already been confirmed upstream, so it
/// is dropped and reported only through the `on_error` hook. Closing the sink
/// resolves once every accepted batch has been resolved and the connection
/// has been released.
pub struct MongoSink<W = ConnectionSession>
where
    W: BatchWriter + Clone + Send + Sync + 'static,
{
    sequencer: WriteSequencer<W>,
    state: SinkState,
}

impl MongoSink<ConnectionSession> {
    /// Opens the backend session and returns a sink ready to accept batches.
    /// The connection is already being established in the background when
    /// this returns.
    pub fn new(config: SinkConfig, hooks: LifecycleHooks) -> Result<Self> {
        let session = ConnectionSession::open(config, hooks.clone())?;
        Ok(Self::with_writer(session, hooks))
    }
}

impl<W> MongoSink<W>
where
    W: BatchWriter + Clone + Send + Sync + 'static,
{
    /// Builds the sink over a custom backend writer.
    pub fn with_writer(writer: W, hooks: LifecycleHooks) -> Self {
        MongoSink {
            sequencer: WriteSequencer::new(writer, hooks),
            state: SinkState::Accepting,
        }
    }
}

impl<W> Sink<Vec<Document>> for MongoSink<W>
where
    W: BatchWriter + Clone + Send + Sync + Unpin + 'static,
{
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Always ready while accepting: backpressure towards the backend is
        // absorbed by the sequencer chain, never surfaced to the stream.
        match self.get_mut().state {
            SinkState::Accepting => Poll::Ready(Ok(())),
            _ => Poll::Ready(Err(Error::Closed)),
        }
    }

    fn start_send(self: Pin<&mut Self>, batch: Vec<Document>) -> Result<()> {
        let this = self.get_mut();
        match this.state {
            SinkState::Accepting => {
                this.sequencer.submit(batch);
                Ok(())
            }
            _ => Err(Error::Closed),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Acceptance is acknowledged at send time; outstanding writes are
        // awaited through the sequencer tail when the sink closes.
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                SinkState::Accepting => {
                    let drained = this.sequencer.drain();
                    let writer = this.sequencer.writer().clone();
                    // Release the connection only after every accepted write
                    // has been resolved.
                    this.state = SinkState::Draining(
                        async move {
                            drained.await;
                            writer.close().await;
                        }
                        .boxed(),
                    );
                }
                SinkState::Draining(shutdown) => {
                    return match shutdown.as_mut().poll(cx) {
                        Poll::Ready(()) => {
                            this.state = SinkState::Closed;
                            debug!("sink drained and closed");
                            Poll::Ready(Ok(()))
                        }
                        Poll::Pending => Poll::Pending,
                    };
                }
                SinkState::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}
