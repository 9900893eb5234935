//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Pub/sub relay configuration (Redis)
    pub relay: RelaySettings,

    /// Durable log configuration (Redis stream)
    pub log: LogSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Pub/sub relay configuration.
///
/// The relay is a non-durable fan-out channel shared by every gateway
/// process; delivery only reaches currently subscribed processes.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Redis connection URL
    pub url: String,

    /// Channel name for chat fan-out
    pub channel: String,

    /// Maximum consecutive reconnect attempts before the subscriber gives up
    pub reconnect_max_retries: u32,

    /// Initial reconnect delay in milliseconds (doubled per attempt)
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds
    pub reconnect_max_delay_ms: u64,
}

/// Durable log configuration.
///
/// The log is a Redis stream drained by a consumer group, giving the
/// chat message flow a replayable backbone decoupled from the realtime path.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// Redis connection URL
    pub url: String,

    /// Stream key holding the chat records
    pub stream: String,

    /// Consumer group name
    pub group: String,

    /// Consumer name within the group.
    ///
    /// Must be unique per process and stable across restarts: a restarted
    /// process reclaims its own pending entries under this name, so a name
    /// that changes on every start would strand them.
    pub consumer_name: String,

    /// Where a fresh consumer group starts reading
    pub start: StartPosition,

    /// How long the consumer pauses after a persistence failure, in seconds
    pub pause_secs: u64,

    /// Maximum records fetched per read
    pub batch_size: usize,

    /// Blocking read timeout in milliseconds
    pub block_ms: u64,
}

/// Start position for a freshly created consumer group.
///
/// `Earliest` replays the full stream history so no message from before the
/// group existed is ever missed, at the cost of reprocessing on every fresh
/// group name. `Latest` only sees records appended after group creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartPosition {
    Earliest,
    Latest,
}

impl StartPosition {
    /// The stream id the consumer group is created at.
    pub fn stream_id(self) -> &'static str {
        match self {
            StartPosition::Earliest => "0",
            StartPosition::Latest => "$",
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        // Determine the running environment
        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let default_consumer = default_consumer_name();

        Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("relay.channel", "chat")?
            .set_default("relay.reconnect_max_retries", 10)?
            .set_default("relay.reconnect_base_delay_ms", 250)?
            .set_default("relay.reconnect_max_delay_ms", 30000)?
            .set_default("log.stream", "chat-log")?
            .set_default("log.group", "chat-persistence")?
            .set_default("log.consumer_name", default_consumer)?
            .set_default("log.start", "earliest")?
            .set_default("log.pause_secs", 60)?
            .set_default("log.batch_size", 16)?
            .set_default("log.block_ms", 5000)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("relay.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("log.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("log.url", std::env::var("LOG_REDIS_URL").ok())?
            .build()?
            .try_deserialize()
    }
}

/// Default consumer name for the durable log group.
///
/// Derived from the host name so it is unique per host yet stable across
/// restarts; deployments running several processes per host must set
/// `log.consumer_name` explicitly.
fn default_consumer_name() -> String {
    match std::env::var("HOSTNAME") {
        Ok(host) if !host.is_empty() => format!("relay-{host}"),
        _ => "relay-0".into(),
    }
}

impl ServerSettings {
    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> std::net::SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid server address configuration")
    }
}

impl LogSettings {
    /// The consumer pause after a persistence failure.
    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.pause_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_maps_to_stream_ids() {
        assert_eq!(StartPosition::Earliest.stream_id(), "0");
        assert_eq!(StartPosition::Latest.stream_id(), "$");
    }

    #[test]
    fn start_position_deserializes_lowercase() {
        let earliest: StartPosition = serde_json::from_str("\"earliest\"").unwrap();
        let latest: StartPosition = serde_json::from_str("\"latest\"").unwrap();
        assert_eq!(earliest, StartPosition::Earliest);
        assert_eq!(latest, StartPosition::Latest);
    }

    #[test]
    fn socket_addr_combines_host_and_port() {
        let server = ServerSettings {
            host: "127.0.0.1".into(),
            port: 8080,
        };
        assert_eq!(server.socket_addr().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn default_consumer_name_is_stable_across_calls() {
        // The name keys the pending entries list; a restarted process must
        // come back under the same name to reclaim unacked records.
        assert_eq!(default_consumer_name(), default_consumer_name());
        assert!(default_consumer_name().starts_with("relay-"));
    }
}
