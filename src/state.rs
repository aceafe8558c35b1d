//! # Application State Management
//!
//! This module manages shared state that needs to be accessed by multiple HTTP
//! request handlers and relay sessions simultaneously.
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (every handler and session holds a reference)
//! - **RwLock**: Multiple readers OR one writer at a time
//! - **T**: The actual data type being protected
//!
//! Relay sessions themselves share no mutable state with each other — each
//! session owns its client and upstream handles exclusively. The only things
//! held here are the configuration and the observability counters, neither of
//! which influences session control flow.

use crate::config::AppConfig;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, read by every new session
    pub config: Arc<RwLock<AppConfig>>,

    /// Relay counters, updated by middleware and by sessions
    pub metrics: Arc<RwLock<RelayMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Observability counters for the relay.
///
/// ## What these track:
/// - **request_count / error_count**: plain HTTP traffic (health, metrics)
/// - **active_sessions**: currently-open relay sessions
/// - **sessions_started / sessions_failed**: lifetime session totals; a
///   session counts as failed when the upstream handshake never succeeds
/// - **transcripts_relayed**: relay messages forwarded to clients
/// - **malformed_messages**: upstream payloads dropped because they failed to
///   parse (each one is logged but never terminates its session)
#[derive(Debug, Default, Clone)]
pub struct RelayMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub sessions_started: u64,
    pub sessions_failed: u64,
    pub transcripts_relayed: u64,
    pub malformed_messages: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(RelayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other threads aren't
    /// blocked; AppConfig is cheap to clone.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record a new relay session being accepted.
    pub fn session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
        metrics.sessions_started += 1;
    }

    /// Record a relay session ending.
    ///
    /// Includes an underflow guard so a stray double-decrement can never wrap
    /// the counter.
    pub fn session_ended(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    /// Record a session whose upstream handshake failed before it ever
    /// became active.
    pub fn session_failed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_failed += 1;
    }

    /// Record one relay message forwarded to a client.
    pub fn transcript_relayed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.transcripts_relayed += 1;
    }

    /// Record one upstream payload dropped as malformed.
    pub fn malformed_message(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.malformed_messages += 1;
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// Clones the data so the lock isn't held while the HTTP response is
    /// being serialized.
    pub fn get_metrics_snapshot(&self) -> RelayMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let state = AppState::new(AppConfig::default());
        state.session_started();
        state.session_started();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_sessions, 2);
        assert_eq!(snapshot.sessions_started, 2);

        state.session_ended();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 1);
    }

    #[test]
    fn test_session_ended_never_underflows() {
        let state = AppState::new(AppConfig::default());
        state.session_ended();
        state.session_ended();
        assert_eq!(state.get_metrics_snapshot().active_sessions, 0);
    }

    #[test]
    fn test_relay_counters() {
        let state = AppState::new(AppConfig::default());
        state.transcript_relayed();
        state.transcript_relayed();
        state.malformed_message();
        state.session_failed();

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.transcripts_relayed, 2);
        assert_eq!(snapshot.malformed_messages, 1);
        assert_eq!(snapshot.sessions_failed, 1);
    }
}
