//! Session bridging between a client connection and the upstream
//! transcription service.

pub mod bridge;
pub mod translator;

pub use bridge::SessionBridge;
pub use translator::{translate, RelayMessage, TranscriptEvent};
