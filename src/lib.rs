//! Real-time transcription relay: accepts streaming WebSocket audio from
//! clients and bridges each connection to the upstream speech-to-text
//! service, relaying transcript fragments back as they arrive.

pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod relay;
pub mod state;
pub mod upstream;
pub mod websocket;
