//! Streaming write sink for MongoDB.
//!
//! This crate persists an unbounded stream of record batches into a MongoDB
//! collection over a lazily-established, reconnect-capable connection:
//! - [`ConnectionSession`] owns the single shared connection handshake and
//!   surfaces backend lifecycle events through [`LifecycleHooks`].
//! - [`WriteSequencer`] issues batches to the backend in submission order and
//!   folds every completion into a single tail future awaited at shutdown.
//! - [`MongoSink`] adapts the sequencer to the [`futures::Sink`] protocol:
//!   batches are acknowledged immediately, and closing the sink resolves only
//!   after every accepted batch has been resolved and the connection released.
//!
//! Failures never tear down the stream. A rejected batch is reported through
//! the `on_error` hook and dropped; the stream has already acknowledged it.

use bson::Document;

pub mod config;
pub mod hooks;
pub mod sequencer;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{ClientTuning, SinkConfig};
pub use hooks::LifecycleHooks;
pub use sequencer::WriteSequencer;
pub use session::ConnectionSession;
pub use sink::MongoSink;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors are `Clone` because the outcome of the single shared connection
/// attempt is distributed to every pending write through a shared future.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Connecting to MongoDB {server} - {error}")]
    Connection { server: String, error: String },

    #[error("Writing {count} documents to collection {collection} - {error}")]
    Write {
        collection: String,
        count: usize,
        error: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sink is closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}

/// Seam between the write sequencer and the backend connection. The
/// production implementation is [`ConnectionSession`]; tests substitute
/// in-memory writers.
#[trait_variant::make(BatchWriter: Send)]
pub trait LocalBatchWriter {
    /// Persist one batch of documents. Ordering across calls is the
    /// sequencer's responsibility, not the writer's.
    async fn write_batch(&self, batch: Vec<Document>) -> Result<()>;

    /// Release the backend connection once all writes are resolved.
    /// Idempotent.
    async fn close(&self);
}
