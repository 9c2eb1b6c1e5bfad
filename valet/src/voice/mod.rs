//! Real-time voice channel: bidirectional frames, streaming STT/TTS backends
//! and the per-session state machine with barge-in support.

mod frames;
mod session;
mod stt;
mod tts;

pub use frames::{ClientFrame, ControlFrame, InputFrame, Outbound};
pub use session::{is_meaningful, VoiceSession, VoiceSessionConfig};
pub use stt::{HttpSttClient, MockStt, SttClient};
pub use tts::{HttpTtsClient, MockTts, TtsClient};
