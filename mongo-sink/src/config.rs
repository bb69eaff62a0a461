use std::time::Duration;

use mongodb::options::ClientOptions;

use crate::{Error, Result};

const DEFAULT_ADDR: &str = "mongodb://localhost:27017";
const DEFAULT_DATABASE: &str = "tsv_to_mongo";
const DEFAULT_COLLECTION: &str = "parsed_tsv";
const DEFAULT_RECONNECT_TRIES: u32 = 300;
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);

/// Configuration for creating a [`MongoSink`](crate::MongoSink).
///
/// The reconnect pair bounds the window in which the driver keeps retrying
/// server selection; the driver performs the actual reconnection natively,
/// there is no retry loop at the sink layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// MongoDB server address.
    pub addr: String,
    /// Logical database the sink writes into.
    pub database: String,
    /// Collection receiving the batches.
    pub collection: String,
    /// Upper bound on reconnection attempts granted to the driver.
    pub reconnect_tries: u32,
    /// Interval between reconnection attempts.
    pub reconnect_interval: Duration,
    /// Driver tuning overrides, merged over the defaults derived from the
    /// reconnect policy.
    pub tuning: ClientTuning,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            addr: DEFAULT_ADDR.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            reconnect_tries: DEFAULT_RECONNECT_TRIES,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            tuning: ClientTuning::default(),
        }
    }
}

impl SinkConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            return Err(Error::InvalidConfig("addr must not be empty".to_string()));
        }
        if self.database.is_empty() || self.collection.is_empty() {
            return Err(Error::InvalidConfig(
                "database and collection must not be empty".to_string(),
            ));
        }
        if self.reconnect_tries == 0 {
            return Err(Error::InvalidConfig(
                "reconnect_tries must be at least 1".to_string(),
            ));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "reconnect_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Window the driver is given to (re)select a reachable server.
    pub(crate) fn selection_window(&self) -> Duration {
        self.reconnect_interval * self.reconnect_tries
    }

    /// Overlays the reconnect policy and tuning overrides on options parsed
    /// from the connection string. Explicit tuning wins over derived values.
    pub(crate) fn apply(&self, options: &mut ClientOptions) {
        options.server_selection_timeout = Some(
            self.tuning
                .server_selection_timeout
                .unwrap_or_else(|| self.selection_window()),
        );
        if let Some(connect_timeout) = self.tuning.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }
        if let Some(heartbeat_interval) = self.tuning.heartbeat_interval {
            options.heartbeat_freq = Some(heartbeat_interval);
        }
        if let Some(app_name) = &self.tuning.app_name {
            options.app_name = Some(app_name.clone());
        }
    }
}

/// Optional driver overrides. Unset fields keep the driver defaults, except
/// the server selection timeout which defaults to the reconnect window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientTuning {
    pub connect_timeout: Option<Duration>,
    pub server_selection_timeout: Option<Duration>,
    pub heartbeat_interval: Option<Duration>,
    pub app_name: Option<String>,
}
