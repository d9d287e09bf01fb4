//! Connection configuration
//!
//! `UpgradeConfig` is consumed by the handshake, `ConnectionConfig` by the
//! connection actor. Both have defaults and can be overridden from the
//! environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ARENA_READ_BUFFER_SIZE` | `UpgradeConfig::read_buffer_size` |
//! | `ARENA_WRITE_BUFFER_SIZE` | `UpgradeConfig::write_buffer_size` |
//! | `ARENA_OUTBOUND_CAPACITY` | `ConnectionConfig::outbound_capacity` |
//! | `ARENA_READ_TIMEOUT_MS` | `ConnectionConfig::read_timeout` |
//! | `ARENA_WRITE_TIMEOUT_MS` | `ConnectionConfig::write_timeout` |

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite::handshake::server::Request;
use tracing::warn;

/// Default handshake read buffer size in bytes
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2048;

/// Default handshake write buffer size in bytes
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 2048;

/// Default outbound queue capacity (frames)
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Predicate deciding whether an upgrade request's origin is accepted
pub type OriginPolicy = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Options for the HTTP -> WebSocket upgrade
#[derive(Clone)]
pub struct UpgradeConfig {
    /// Read buffer size handed to tungstenite
    pub read_buffer_size: usize,
    /// Write buffer size handed to tungstenite
    pub write_buffer_size: usize,
    /// Origin check; a `false` answer rejects the handshake with 403
    pub allow_origin: OriginPolicy,
}

impl UpgradeConfig {
    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(size) = env_parse("ARENA_READ_BUFFER_SIZE") {
            config.read_buffer_size = size;
        }
        if let Some(size) = env_parse("ARENA_WRITE_BUFFER_SIZE") {
            config.write_buffer_size = size;
        }
        config
    }

    /// Replace the origin policy
    pub fn with_origin_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.allow_origin = Arc::new(policy);
        self
    }

    /// Only accept requests whose `Origin` header is in `origins`
    ///
    /// Requests without an `Origin` header (non-browser clients) are accepted.
    pub fn with_allowed_origins<I, S>(self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = origins.into_iter().map(Into::into).collect();
        self.with_origin_policy(move |req: &Request| {
            match req.headers().get("origin").and_then(|v| v.to_str().ok()) {
                Some(origin) => allowed.iter().any(|a| a == origin),
                None => true,
            }
        })
    }
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            allow_origin: Arc::new(|_req: &Request| true),
        }
    }
}

impl std::fmt::Debug for UpgradeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeConfig")
            .field("read_buffer_size", &self.read_buffer_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .finish_non_exhaustive()
    }
}

/// Options for a running connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Capacity of the outbound queue; senders wait once it is full
    pub outbound_capacity: usize,
    /// Close the connection if no frame arrives within this time
    pub read_timeout: Option<Duration>,
    /// Abort the writer if a single frame write takes longer than this
    pub write_timeout: Option<Duration>,
    /// Reply to undecodable frames with an `"error"` envelope
    pub ack_decode_errors: bool,
}

impl ConnectionConfig {
    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = env_parse::<usize>("ARENA_OUTBOUND_CAPACITY") {
            config.outbound_capacity = capacity;
        }
        if let Some(ms) = env_parse::<u64>("ARENA_READ_TIMEOUT_MS") {
            config.read_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("ARENA_WRITE_TIMEOUT_MS") {
            config.write_timeout = Some(Duration::from_millis(ms));
        }
        config
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    pub fn with_decode_error_acks(mut self, enabled: bool) -> Self {
        self.ack_decode_errors = enabled;
        self
    }

    /// Queue capacity as accepted by `mpsc::channel` (at least 1)
    pub(crate) fn queue_capacity(&self) -> usize {
        self.outbound_capacity.max(1)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            read_timeout: None,
            write_timeout: None,
            ack_decode_errors: false,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value '{}' for {}", raw, key);
            None
        }
    }
}
