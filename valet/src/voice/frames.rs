//! Wire frames for the voice channel. Client text frames carry either an
//! input (`mode`) or a control message (`type`); server frames are structured
//! events, raw PCM16 chunks, or terminal markers.

use serde::Deserialize;
use serde_json::Value;

/// Input frame: a typed text request or a base64 audio utterance.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum InputFrame {
    Text { text: String },
    Audio { audio_base64: String },
}

/// Control frame: barge-in interrupt or a client-side cancel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlFrame {
    Interrupt,
    Cancel {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Any client frame. Inputs are tagged by `mode`, controls by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClientFrame {
    Input(InputFrame),
    Control(ControlFrame),
}

/// Server-to-client traffic, transport-agnostic. The serve layer maps these
/// onto WebSocket text/binary messages.
#[derive(Debug)]
pub enum Outbound {
    /// Enveloped session event, ready to serialise.
    Event(Value),
    /// Raw PCM16 audio chunk.
    Audio(Vec<u8>),
    /// Session-level cancel (e.g. the nonsense filter declined the input).
    Cancelled { reason: String },
    Complete,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_parses_by_mode() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"mode": "text", "text": "hola"}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::Input(InputFrame::Text { ref text }) if text == "hola"
        ));
    }

    #[test]
    fn audio_frame_parses_by_mode() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"mode": "audio", "audio_base64": "AAAA"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Input(InputFrame::Audio { .. })));
    }

    #[test]
    fn control_frames_parse_by_type() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type": "interrupt"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Control(ControlFrame::Interrupt)));

        let frame: ClientFrame =
            serde_json::from_str(r#"{"type": "cancel", "reason": "user_closed"}"#).unwrap();
        assert!(matches!(
            frame,
            ClientFrame::Control(ControlFrame::Cancel { reason: Some(ref r) }) if r == "user_closed"
        ));
    }

    #[test]
    fn garbage_frame_fails_to_parse() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"what": "ever"}"#).is_err());
    }
}
