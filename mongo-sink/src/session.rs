use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bson::{Document, doc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use mongodb::error::ErrorKind;
use mongodb::event::EventHandler;
use mongodb::event::sdam::SdamEvent;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use tracing::{debug, info};

use crate::hooks::LifecycleHooks;
use crate::{BatchWriter, Error, Result, SinkConfig};

type ReadyFuture = Shared<BoxFuture<'static, Result<(Client, Collection<Document>)>>>;

/// Owns the single connection handshake to MongoDB, shared by every write.
///
/// The handshake starts as soon as the session is opened and is never
/// re-issued: all [`ready`](ConnectionSession::ready) callers await clones of
/// one shared future, so writes submitted before the backend is reachable
/// park on the same attempt and observe the same outcome. Reconnection after
/// a transient disruption is the driver's job; the session only observes it
/// through SDAM events and reports it through the lifecycle hooks.
#[derive(Clone)]
pub struct ConnectionSession {
    ready: ReadyFuture,
    closed: Arc<AtomicBool>,
    hooks: LifecycleHooks,
    collection_name: String,
}

impl ConnectionSession {
    /// Begins connecting immediately and returns without blocking. Must be
    /// called from within a tokio runtime.
    pub fn open(config: SinkConfig, hooks: LifecycleHooks) -> Result<Self> {
        config.validate()?;
        let collection_name = config.collection.clone();
        let ready: ReadyFuture = connect(config, hooks.clone()).boxed().shared();
        // Drive the handshake even if no write ever awaits readiness.
        tokio::spawn(ready.clone().map(|_| ()));
        Ok(ConnectionSession {
            ready,
            closed: Arc::new(AtomicBool::new(false)),
            hooks,
            collection_name,
        })
    }

    /// The eventually-ready collection handle. Every caller observes the
    /// same single attempt; if it failed terminally they all receive the
    /// same cause.
    pub async fn ready(&self) -> Result<Collection<Document>> {
        let (_, collection) = self.ready.clone().await?;
        Ok(collection)
    }

    /// Releases the underlying connection. Idempotent; the first call waits
    /// for the shared handshake to settle so that a shutdown with zero
    /// writes still releases the socket.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok((client, _)) = self.ready.clone().await {
            client.shutdown().await;
            info!("MongoDB connection closed");
        }
        self.hooks.closed();
    }
}

impl BatchWriter for ConnectionSession {
    async fn write_batch(&self, batch: Vec<Document>) -> Result<()> {
        // The driver rejects an empty insert_many.
        if batch.is_empty() {
            return Ok(());
        }
        let collection = self.ready().await?;
        let count = batch.len();
        collection
            .insert_many(batch)
            .await
            .map_err(|e| Error::Write {
                collection: self.collection_name.clone(),
                count,
                error: e.to_string(),
            })?;
        debug!(count, collection = %self.collection_name, "wrote batch");
        Ok(())
    }

    async fn close(&self) {
        ConnectionSession::close(self).await;
    }
}

async fn connect(
    config: SinkConfig,
    hooks: LifecycleHooks,
) -> Result<(Client, Collection<Document>)> {
    let server = config.addr.clone();
    let connection_error = |error: String| Error::Connection {
        server: server.clone(),
        error,
    };

    let mut options = ClientOptions::parse(&config.addr)
        .await
        .map_err(|e| connection_error(e.to_string()))?;
    config.apply(&mut options);
    options.sdam_event_handler = Some(sdam_handler(hooks));

    let client = Client::with_options(options).map_err(|e| connection_error(e.to_string()))?;
    let database = client.database(&config.database);
    // The driver connects lazily; the ping forces the handshake and bounds
    // it by the server selection window.
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|e| connection_error(e.to_string()))?;

    info!(
        server = %config.addr,
        database = %config.database,
        collection = %config.collection,
        "connected to MongoDB"
    );
    let collection = database.collection::<Document>(&config.collection);
    Ok((client, collection))
}

/// Tracks topology disruption across heartbeat events: a failed heartbeat
/// marks the topology disrupted (and reports a timeout when that is the
/// cause), the first successful heartbeat afterwards fires `on_reconnect`
/// exactly once per disruption. Heartbeat failures deliberately do not fire
/// `on_error`; that hook is reserved for writes, which carry the terminal
/// cause themselves.
struct TopologyWatch {
    hooks: LifecycleHooks,
    disrupted: AtomicBool,
}

impl TopologyWatch {
    fn new(hooks: LifecycleHooks) -> Self {
        TopologyWatch {
            hooks,
            disrupted: AtomicBool::new(false),
        }
    }

    fn heartbeat_failed(&self, is_timeout: bool) {
        self.disrupted.store(true, Ordering::SeqCst);
        if is_timeout {
            self.hooks.timed_out();
        }
    }

    fn heartbeat_succeeded(&self) {
        if self.disrupted.swap(false, Ordering::SeqCst) {
            info!("reconnected to MongoDB");
            self.hooks.reconnected();
        }
    }
}

fn sdam_handler(hooks: LifecycleHooks) -> EventHandler<SdamEvent> {
    let watch = Arc::new(TopologyWatch::new(hooks));
    EventHandler::callback(move |event: SdamEvent| match event {
        SdamEvent::ServerHeartbeatFailed(ev) => {
            debug!(error = %ev.failure, "server heartbeat failed");
            watch.heartbeat_failed(is_timeout(&ev.failure));
        }
        SdamEvent::ServerHeartbeatSucceeded(_) => watch.heartbeat_succeeded(),
        _ => {}
    })
}

/// A heartbeat failure counts as a timeout when the driver reports a timed
/// out I/O operation; the message check is only a fallback for error kinds
/// that do not expose the underlying cause.
fn is_timeout(failure: &mongodb::error::Error) -> bool {
    if let ErrorKind::Io(io_error) = &*failure.kind {
        return io_error.kind() == io::ErrorKind::TimedOut;
    }
    let message = failure.to_string();
    message.contains("timed out") || message.contains("timeout")
}
