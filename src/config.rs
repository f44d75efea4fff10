//! Relay configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key has a default, so an empty
//! environment yields a relay on port 8765.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::RelayError;

/// Default relay port.
pub const DEFAULT_PORT: u16 = 8765;

/// Default upper bound for a single read.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Default time a client has to finish its upgrade request head.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`]; tests build it
/// with struct update syntax over [`RelayConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket address the relay listener binds to.
    pub listen_addr: SocketAddr,

    /// Maximum bytes read per receive cycle; also bounds a buffered
    /// handshake request.
    pub max_frame_bytes: usize,

    /// Whether a sender is skipped when its own message is broadcast.
    pub exclude_sender: bool,

    /// Close connections that stay silent this long. `None` disables.
    pub idle_timeout: Option<Duration>,

    /// Deadline for completing a request head once its first bytes have
    /// arrived.
    pub handshake_timeout: Duration,

    /// Number of messages retained by the message log.
    pub message_log_capacity: usize,

    /// Capacity of the event bus broadcast channel.
    pub event_bus_capacity: usize,

    /// Whether the admin HTTP API is served.
    pub admin_enabled: bool,

    /// Socket address of the admin HTTP API.
    pub admin_listen_addr: SocketAddr,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            exclude_sender: false,
            idle_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            message_log_capacity: 1000,
            event_bus_capacity: 1024,
            admin_enabled: true,
            admin_listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT + 1)),
        }
    }
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if an address does not parse or a
    /// size is zero.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Missing or unparsable numeric and boolean values fall back to the
    /// defaults; addresses must parse when present.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if an address does not parse or a
    /// size is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = parse_addr(&lookup, "LISTEN_ADDR", defaults.listen_addr)?;
        let admin_listen_addr =
            parse_addr(&lookup, "ADMIN_LISTEN_ADDR", defaults.admin_listen_addr)?;

        let max_frame_bytes = parse_value(&lookup, "MAX_FRAME_BYTES", defaults.max_frame_bytes);
        let message_log_capacity =
            parse_value(&lookup, "MESSAGE_LOG_CAPACITY", defaults.message_log_capacity);
        let event_bus_capacity =
            parse_value(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity);

        let idle_timeout = match parse_value(&lookup, "IDLE_TIMEOUT_SECS", 0u64) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let handshake_timeout = Duration::from_secs(parse_value(
            &lookup,
            "HANDSHAKE_TIMEOUT_SECS",
            defaults.handshake_timeout.as_secs(),
        ));

        let config = Self {
            listen_addr,
            max_frame_bytes,
            exclude_sender: parse_bool(&lookup, "EXCLUDE_SENDER", defaults.exclude_sender),
            idle_timeout,
            handshake_timeout,
            message_log_capacity,
            event_bus_capacity,
            admin_enabled: parse_bool(&lookup, "ADMIN_ENABLED", defaults.admin_enabled),
            admin_listen_addr,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] naming the first zero-sized setting.
    pub fn validate(&self) -> Result<(), RelayError> {
        for (key, value) in [
            ("MAX_FRAME_BYTES", self.max_frame_bytes),
            ("MESSAGE_LOG_CAPACITY", self.message_log_capacity),
            ("EVENT_BUS_CAPACITY", self.event_bus_capacity),
        ] {
            if value == 0 {
                return Err(RelayError::Config(format!("{key} must be greater than zero")));
            }
        }
        if self.handshake_timeout.is_zero() {
            return Err(RelayError::Config(
                "HANDSHAKE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_addr<F>(lookup: &F, key: &str, default: SocketAddr) -> Result<SocketAddr, RelayError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| RelayError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

/// Parses a value as `T`, returning `default` on missing or invalid input.
fn parse_value<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Accepts `"true"`, `"1"`, `"false"`, `"0"` (case-insensitive).
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
