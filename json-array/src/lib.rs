//! JSON-array text framing for object streams.
//!
//! [`JsonArrayStream`] reframes a stream of record batches as chunks of JSON
//! text: `[` before the first record, every record comma-joined across the
//! whole stream lifetime, and `]` once the upstream ends. Concatenating the
//! yielded chunks always produces one valid JSON array, including the `[]`
//! of a stream that never carried a record.
//!
//! This is pure framing logic: order-preserving, stateless beyond the
//! first-record flag, and independent of any backend.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;

/// One unit of records delivered by the upstream parser.
pub type RecordBatch = Vec<Value>;

/// Adapts a `Stream<Item = RecordBatch>` into a `Stream<Item = String>` of
/// JSON-array text chunks.
#[derive(Debug)]
pub struct JsonArrayStream<S> {
    inner: S,
    first: bool,
    done: bool,
}

impl<S> JsonArrayStream<S> {
    pub fn new(inner: S) -> Self {
        JsonArrayStream {
            inner,
            first: true,
            done: false,
        }
    }

    fn frame(&mut self, batch: RecordBatch) -> String {
        let mut chunk = String::new();
        for record in batch {
            chunk.push(if self.first { '[' } else { ',' });
            chunk.push_str(&record.to_string());
            self.first = false;
        }
        chunk
    }
}

impl<S> Stream for JsonArrayStream<S>
where
    S: Stream<Item = RecordBatch> + Unpin,
{
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(batch)) => {
                    let chunk = this.frame(batch);
                    // An empty batch frames to nothing; keep polling.
                    if !chunk.is_empty() {
                        return Poll::Ready(Some(chunk));
                    }
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let closing = if this.first { "[]" } else { "]" };
                    return Poll::Ready(Some(closing.to_string()));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
