//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_UPSTREAM__SAMPLE_RATE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The `__` separator between config levels keeps single `_` available for
//! snake_case field names like `sample_rate`.
//!
//! ## Special environment variables:
//! A few variables that don't follow the APP_ prefix convention are honored
//! because deployment platforms and the upstream provider document them directly:
//! - `HOST` / `PORT`: server bind address
//! - `ASSEMBLYAI_API_KEY`: credential for the upstream transcription service

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, upstream) keeps the
/// bind-address concerns apart from the transcription-service concerns, which
/// are owned by different parts of the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream transcription-service configuration.
///
/// ## Fields:
/// - `endpoint`: WebSocket URL of the real-time speech-to-text API
/// - `api_key`: credential sent in the upgrade `authorization` header
/// - `sample_rate`: audio sample rate advertised to the service (Hz)
/// - `connect_timeout_ms`: bound on how long the upstream handshake may take
/// - `close_grace_ms`: bound on session teardown; after this window any
///   still-running upstream task is forcibly aborted
///
/// ## Why the timeouts exist:
/// The upstream protocol itself imposes no bound on the handshake or on a
/// lingering close. Without these two values a session could sit in its
/// connecting or closing state forever and leak its connection handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub api_key: String,
    pub sample_rate: u32,
    pub connect_timeout_ms: u64,
    pub close_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            upstream: UpstreamConfig {
                // AssemblyAI real-time endpoint; the sample rate is appended
                // as a query parameter by endpoint_url().
                endpoint: "wss://api.assemblyai.com/v2/realtime/ws".to_string(),
                api_key: String::new(),
                sample_rate: 16_000,
                connect_timeout_ms: 5_000,
                close_grace_ms: 3_000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle the special HOST, PORT and ASSEMBLYAI_API_KEY variables
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Example: APP_SERVER__HOST becomes server.host in the config.
            // Levels are split on "__" so field names may contain "_".
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The upstream provider documents this exact variable name, so accept
        // it as-is rather than requiring the APP_ prefixed spelling.
        if let Ok(key) = env::var("ASSEMBLYAI_API_KEY") {
            settings = settings.set_override("upstream.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be bound)
    /// - Upstream endpoint is present
    /// - Sample rate and both timeout bounds are nonzero
    ///
    /// ## Why the API key is not checked here:
    /// An empty credential still lets the server start and serve its health
    /// endpoints; the upstream handshake will fail per-session with a clear
    /// error instead of preventing startup entirely.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.upstream.endpoint.is_empty() {
            return Err(anyhow::anyhow!("Upstream endpoint cannot be empty"));
        }

        if self.upstream.sample_rate == 0 {
            return Err(anyhow::anyhow!("Upstream sample rate must be greater than 0"));
        }

        if self.upstream.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Upstream connect timeout must be greater than 0"));
        }

        if self.upstream.close_grace_ms == 0 {
            return Err(anyhow::anyhow!("Session close grace period must be greater than 0"));
        }

        Ok(())
    }
}

impl UpstreamConfig {
    /// Build the full upstream URL, including the sample-rate query parameter.
    ///
    /// ## Example:
    /// `wss://api.assemblyai.com/v2/realtime/ws?sample_rate=16000`
    pub fn endpoint_url(&self) -> String {
        format!("{}?sample_rate={}", self.endpoint, self.sample_rate)
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_grace(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.close_grace_ms)
    }
}
