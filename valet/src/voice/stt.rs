//! Speech-to-text backends.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::VoiceError;

/// Transcribes one utterance of PCM16 audio.
#[async_trait]
pub trait SttClient: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError>;
}

/// HTTP STT backend: POSTs the raw audio and reads `{"text": ...}` back.
pub struct HttpSttClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSttClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl SttClient for HttpSttClient {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        let mut req = self
            .client
            .post(format!(
                "{}/transcriptions",
                self.base_url.trim_end_matches('/')
            ))
            .header("Content-Type", "application/octet-stream")
            .body(audio.to_vec());
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VoiceError::Stt(format!("HTTP {}", resp.status())));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        body.get("text")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| VoiceError::Stt("response carried no text".into()))
    }
}

/// Scripted STT for tests: pops queued transcriptions in order.
#[derive(Default)]
pub struct MockStt {
    transcriptions: Mutex<VecDeque<String>>,
}

impl MockStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, transcription: impl Into<String>) {
        self.transcriptions
            .lock()
            .expect("mock lock")
            .push_back(transcription.into());
    }
}

#[async_trait]
impl SttClient for MockStt {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, VoiceError> {
        self.transcriptions
            .lock()
            .expect("mock lock")
            .pop_front()
            .ok_or_else(|| VoiceError::Stt("no scripted transcription".into()))
    }
}
