//! Text-to-speech backends. Synthesis is streaming: the backend returns a
//! channel of PCM16 chunks so the session can forward audio as it arrives.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::error::VoiceError;

/// Streaming TTS backend.
#[async_trait]
pub trait TtsClient: Send + Sync {
    /// Backend label for log events.
    fn name(&self) -> &str;

    /// Starts synthesis and returns the chunk stream.
    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<Vec<u8>>, VoiceError>;
}

/// HTTP TTS backend: POSTs the text and forwards the chunked response body.
pub struct HttpTtsClient {
    client: reqwest::Client,
    base_url: String,
    label: String,
}

impl HttpTtsClient {
    pub fn new(base_url: impl Into<String>, label: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            label: label.into(),
        }
    }
}

#[async_trait]
impl TtsClient for HttpTtsClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<Vec<u8>>, VoiceError> {
        let resp = self
            .client
            .post(format!("{}/synthesize", self.base_url.trim_end_matches('/')))
            .json(&serde_json::json!({"text": text, "format": "pcm16"}))
            .send()
            .await
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VoiceError::Tts(format!("HTTP {}", resp.status())));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) if !bytes.is_empty() => {
                        if tx.send(bytes.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });
        Ok(rx)
    }
}

/// Scripted TTS for tests: emits fixed chunks, optionally after a delay (to
/// exercise the first-chunk timeout) and optionally failing outright.
pub struct MockTts {
    label: String,
    chunks: Vec<Vec<u8>>,
    first_chunk_delay: Duration,
    fail: bool,
}

impl MockTts {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            chunks: vec![vec![0u8; 320], vec![1u8; 320]],
            first_chunk_delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn with_first_chunk_delay(mut self, delay: Duration) -> Self {
        self.first_chunk_delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl TtsClient for MockTts {
    fn name(&self) -> &str {
        &self.label
    }

    async fn synthesize(&self, _text: &str) -> Result<mpsc::Receiver<Vec<u8>>, VoiceError> {
        if self.fail {
            return Err(VoiceError::Tts("backend unavailable".into()));
        }
        let (tx, rx) = mpsc::channel(32);
        let chunks = self.chunks.clone();
        let delay = self.first_chunk_delay;
        tokio::spawn(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            for chunk in chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_tts_streams_chunks() {
        let tts = MockTts::new("primary").with_chunks(vec![vec![1], vec![2]]);
        let mut rx = tts.synthesize("hola").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![1]);
        assert_eq!(rx.recv().await.unwrap(), vec![2]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failing_backend_errors_immediately() {
        let tts = MockTts::new("primary").failing();
        assert!(tts.synthesize("hola").await.is_err());
    }
}
