//! # Upstream Message Translation
//!
//! Turns raw upstream payloads into the minimal downstream envelope the
//! client understands.
//!
//! ## Upstream wire format:
//! The transcription service sends UTF-8 text frames encoding JSON with a
//! `message_type` discriminator and, for transcript events, a `text` field:
//! ```json
//! {"message_type": "PartialTranscript", "text": "hel"}
//! ```
//! Only `PartialTranscript` and `FinalTranscript` are relayed; every other
//! kind (`SessionBegins`, `SessionTerminated`, ...) is dropped silently.
//!
//! ## Downstream wire format:
//! ```json
//! {"transcription": "hel"}
//! ```
//!
//! Translation is a pure function: same input, same output, no hidden state.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// A parsed upstream message.
///
/// Unknown fields are ignored; the relay only interprets the discriminator
/// and the transcript text. `text` defaults to empty because control events
/// don't carry one.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    pub message_type: String,
    #[serde(default)]
    pub text: String,
}

/// The downstream envelope carrying one forwarded transcript fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayMessage {
    pub transcription: String,
}

/// Translate one raw upstream payload.
///
/// ## Returns:
/// - `Ok(Some(message))` for partial and final transcripts — text verbatim,
///   no trimming or normalization
/// - `Ok(None)` for every other message kind (not an error)
/// - `Err(MalformedUpstreamMessage)` when the payload isn't valid JSON of the
///   expected shape; the caller logs it and the session continues
pub fn translate(raw: &str) -> Result<Option<RelayMessage>, RelayError> {
    let event: TranscriptEvent = serde_json::from_str(raw)?;

    match event.message_type.as_str() {
        "PartialTranscript" | "FinalTranscript" => Ok(Some(RelayMessage {
            transcription: event.text,
        })),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_transcript_is_forwarded() {
        let result = translate(r#"{"message_type":"PartialTranscript","text":"hel"}"#).unwrap();
        assert_eq!(
            result,
            Some(RelayMessage {
                transcription: "hel".to_string()
            })
        );
    }

    #[test]
    fn test_final_transcript_is_forwarded() {
        let result = translate(r#"{"message_type":"FinalTranscript","text":"hello"}"#).unwrap();
        assert_eq!(
            result,
            Some(RelayMessage {
                transcription: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_other_kinds_are_dropped_without_error() {
        assert_eq!(translate(r#"{"message_type":"SessionBegins"}"#).unwrap(), None);
        assert_eq!(
            translate(r#"{"message_type":"SessionTerminated"}"#).unwrap(),
            None
        );
        // Unknown future kinds are inert too.
        assert_eq!(
            translate(r#"{"message_type":"SpeakerDiarization","text":"x"}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_payload_is_an_error_not_a_panic() {
        assert!(matches!(
            translate("not json at all"),
            Err(RelayError::MalformedUpstreamMessage(_))
        ));
        assert!(matches!(
            translate(r#"{"text":"missing discriminator"}"#),
            Err(RelayError::MalformedUpstreamMessage(_))
        ));
    }

    #[test]
    fn test_text_is_forwarded_verbatim() {
        // No trimming or normalization beyond what arrives.
        let result =
            translate(r#"{"message_type":"FinalTranscript","text":"  Hello, world!  "}"#).unwrap();
        assert_eq!(result.unwrap().transcription, "  Hello, world!  ");
    }

    #[test]
    fn test_empty_text_still_relays() {
        // The service emits empty partials; they pass through unchanged.
        let result = translate(r#"{"message_type":"PartialTranscript","text":""}"#).unwrap();
        assert_eq!(result.unwrap().transcription, "");
    }

    #[test]
    fn test_unknown_extra_fields_are_ignored() {
        let raw = r#"{"message_type":"FinalTranscript","text":"hi","confidence":0.92,"audio_start":0}"#;
        assert_eq!(translate(raw).unwrap().unwrap().transcription, "hi");
    }

    #[test]
    fn test_relay_message_wire_shape() {
        let msg = RelayMessage {
            transcription: "hello".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"transcription":"hello"}"#
        );
    }
}
