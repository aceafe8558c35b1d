//! Outbound connection to the real-time speech-to-text service.

pub mod connection;

pub use connection::UpstreamConnection;
