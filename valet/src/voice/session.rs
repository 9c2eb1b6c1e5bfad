//! Voice session: per-connection state machine.
//!
//! Idle -> Transcribing (audio only) -> AgentRunning -> TtsStreaming -> Idle.
//! One request runs at a time; new input during a run either interrupts (when
//! barge-in is enabled) or is rejected with `backend_busy`. An interrupt drops
//! all in-flight work via a cancellation token and commits nothing to the
//! session chat history.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use session_event::{Envelope, SessionEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::message::Message;
use crate::metrics::Metrics;
use crate::pipeline::{EventSink, Orchestrator};
use crate::voice::frames::{ClientFrame, ControlFrame, InputFrame, Outbound};
use crate::voice::stt::SttClient;
use crate::voice::tts::TtsClient;

const FILLER_TOKENS: &[&str] = &[
    "eh", "ah", "um", "uh", "mmm", "hmm", "este", "pues", "vale", "ok", "okay", "like", "so",
];

/// Nonsense filter: the transcription must reach the minimum length and carry
/// at least one non-filler token.
pub fn is_meaningful(transcription: &str, min_chars: usize) -> bool {
    let trimmed = transcription.trim();
    if trimmed.chars().count() < min_chars {
        return false;
    }
    trimmed.split_whitespace().any(|token| {
        let clean: String = token
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        !clean.is_empty() && !FILLER_TOKENS.contains(&clean.as_str())
    })
}

#[derive(Debug, Clone)]
pub struct VoiceSessionConfig {
    pub sample_rate: u32,
    pub min_transcription_chars: usize,
    pub first_chunk_timeout: Duration,
    /// When true, new input during a running request interrupts it; otherwise
    /// the input is rejected with `backend_busy`.
    pub barge_in: bool,
}

impl Default for VoiceSessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            min_transcription_chars: 3,
            first_chunk_timeout: Duration::from_secs(2),
            barge_in: true,
        }
    }
}

struct Shared {
    envelope: Mutex<Envelope>,
    outbound: mpsc::Sender<Outbound>,
    history: Mutex<Vec<Message>>,
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        let wrapped = {
            let mut envelope = self.envelope.lock().expect("envelope lock");
            envelope.wrap(&event)
        };
        match wrapped {
            Ok(value) => {
                let _ = self.outbound.try_send(Outbound::Event(value));
            }
            Err(e) => warn!(error = %e, "event serialisation failed"),
        }
    }
}

pub struct VoiceSession {
    orchestrator: Arc<Orchestrator>,
    stt: Arc<dyn SttClient>,
    tts_primary: Arc<dyn TtsClient>,
    tts_fallback: Option<Arc<dyn TtsClient>>,
    metrics: Arc<Metrics>,
    config: VoiceSessionConfig,
}

impl VoiceSession {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        stt: Arc<dyn SttClient>,
        tts_primary: Arc<dyn TtsClient>,
        tts_fallback: Option<Arc<dyn TtsClient>>,
        metrics: Arc<Metrics>,
        config: VoiceSessionConfig,
    ) -> Self {
        Self {
            orchestrator,
            stt,
            tts_primary,
            tts_fallback,
            metrics,
            config,
        }
    }

    /// Drives one session: frames in, events/audio out. Returns when the
    /// inbound channel closes (client disconnected).
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<ClientFrame>,
        outbound: mpsc::Sender<Outbound>,
    ) {
        let session_id = Uuid::new_v4().to_string();
        let shared = Arc::new(Shared {
            envelope: Mutex::new(Envelope::new(session_id.clone())),
            outbound,
            history: Mutex::new(Vec::new()),
        });
        shared.emit(SessionEvent::BackendReady {
            sample_rate: self.config.sample_rate,
        });
        info!(session = %session_id, "voice session ready");

        let mut current: Option<(CancellationToken, tokio::task::JoinHandle<()>)> = None;

        while let Some(frame) = inbound.recv().await {
            match frame {
                ClientFrame::Control(ControlFrame::Interrupt)
                | ClientFrame::Control(ControlFrame::Cancel { .. }) => {
                    if let Some((token, handle)) = current.take() {
                        debug!(session = %session_id, "interrupt: cancelling in-flight request");
                        token.cancel();
                        let _ = handle.await;
                    }
                }
                ClientFrame::Input(input) => {
                    let busy = current
                        .as_ref()
                        .map(|(_, handle)| !handle.is_finished())
                        .unwrap_or(false);
                    if busy {
                        if self.config.barge_in {
                            if let Some((token, handle)) = current.take() {
                                token.cancel();
                                let _ = handle.await;
                            }
                        } else {
                            shared.emit(SessionEvent::BackendBusy);
                            continue;
                        }
                    }

                    let token = CancellationToken::new();
                    let handle = self.spawn_request(input, Arc::clone(&shared), token.clone());
                    current = Some((token, handle));
                }
            }
        }

        if let Some((token, handle)) = current.take() {
            token.cancel();
            let _ = handle.await;
        }
        shared.emit(SessionEvent::ClientDisconnected);
        info!(session = %session_id, "voice session closed");
    }

    fn spawn_request(
        &self,
        input: InputFrame,
        shared: Arc<Shared>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let stt = Arc::clone(&self.stt);
        let tts_primary = Arc::clone(&self.tts_primary);
        let tts_fallback = self.tts_fallback.clone();
        let metrics = Arc::clone(&self.metrics);
        let config = self.config.clone();

        tokio::spawn(async move {
            let request_started = std::time::Instant::now();
            let query = match input {
                InputFrame::Text { text } => text,
                InputFrame::Audio { audio_base64 } => {
                    let audio = match base64::engine::general_purpose::STANDARD
                        .decode(audio_base64.as_bytes())
                    {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            let _ = shared
                                .outbound
                                .send(Outbound::Error(format!("bad audio frame: {e}")))
                                .await;
                            return;
                        }
                    };
                    shared.emit(SessionEvent::SttStarted);
                    let stt_started = std::time::Instant::now();
                    let transcription = tokio::select! {
                        result = stt.transcribe(&audio) => match result {
                            Ok(t) => t,
                            Err(e) => {
                                shared.emit(SessionEvent::AgentError {
                                    message: e.to_string(),
                                });
                                let _ = shared.outbound.send(Outbound::Error(e.to_string())).await;
                                return;
                            }
                        },
                        _ = token.cancelled() => return,
                    };
                    metrics.observe_ms("voice.stt.duration", stt_started.elapsed().as_millis() as u64);
                    shared.emit(SessionEvent::SttCompleted {
                        transcription: transcription.clone(),
                    });
                    transcription
                }
            };

            if !is_meaningful(&query, config.min_transcription_chars) {
                debug!(query = %query, "nonsense filter declined input");
                let _ = shared
                    .outbound
                    .send(Outbound::Cancelled {
                        reason: "message_no_sense".to_string(),
                    })
                    .await;
                return;
            }

            shared.emit(SessionEvent::AgentProcessingStarted {
                query: query.clone(),
            });

            let history = shared.history.lock().expect("history lock").clone();
            let sink: EventSink = {
                let shared = Arc::clone(&shared);
                Arc::new(move |event| shared.emit(event))
            };

            let agent_started = std::time::Instant::now();
            let outcome = match orchestrator
                .run(&query, history, Some(sink), Some(token.clone()))
                .await
            {
                Ok(outcome) => outcome,
                Err(AgentError::Cancelled(_)) => return,
                Err(e) => {
                    shared.emit(SessionEvent::AgentError {
                        message: e.to_string(),
                    });
                    let _ = shared
                        .outbound
                        .send(Outbound::Error(
                            "Lo siento, ha ocurrido un error procesando tu petición.".into(),
                        ))
                        .await;
                    return;
                }
            };

            metrics.observe_ms(
                "voice.agent.duration",
                agent_started.elapsed().as_millis() as u64,
            );

            let tts_started = std::time::Instant::now();
            let spoken = stream_tts(
                &*tts_primary,
                tts_fallback.as_deref(),
                &outcome.response,
                &shared,
                &token,
                config.first_chunk_timeout,
                &metrics,
            )
            .await;
            metrics.observe_ms("voice.tts.duration", tts_started.elapsed().as_millis() as u64);
            metrics.observe_ms(
                "voice.e2e.duration",
                request_started.elapsed().as_millis() as u64,
            );

            if token.is_cancelled() {
                // Interrupted mid-stream: nothing is committed to history.
                return;
            }

            if spoken {
                // Commit the turn only after a complete, uninterrupted response.
                let mut history = shared.history.lock().expect("history lock");
                history.push(Message::user(query));
                history.push(Message::assistant(outcome.response.clone()));
            }
            let _ = shared.outbound.send(Outbound::Complete).await;
        })
    }
}

/// Streams TTS audio for the response. Primary backend first; when no chunk
/// arrives within `first_chunk_timeout`, emits `tts_error` (with
/// `fallback_available`) and tries the fallback once. Returns whether audio
/// completed without interruption.
#[allow(clippy::too_many_arguments)]
async fn stream_tts(
    primary: &dyn TtsClient,
    fallback: Option<&dyn TtsClient>,
    text: &str,
    shared: &Shared,
    token: &CancellationToken,
    first_chunk_timeout: Duration,
    metrics: &Metrics,
) -> bool {
    shared.emit(SessionEvent::TtsStarted);
    let started = std::time::Instant::now();

    match try_backend(primary, text, shared, token, first_chunk_timeout, started, metrics).await {
        BackendOutcome::Completed => {
            shared.emit(SessionEvent::TtsCompleted);
            true
        }
        BackendOutcome::Cancelled => false,
        BackendOutcome::Failed(message) => {
            shared.emit(SessionEvent::TtsError {
                message,
                fallback_available: fallback.is_some(),
            });
            let Some(fallback) = fallback else {
                return true; // Text response still stands without audio.
            };
            match try_backend(fallback, text, shared, token, first_chunk_timeout, started, metrics)
                .await
            {
                BackendOutcome::Completed => {
                    shared.emit(SessionEvent::TtsCompleted);
                    true
                }
                BackendOutcome::Cancelled => false,
                BackendOutcome::Failed(message) => {
                    // No third backend is attempted.
                    shared.emit(SessionEvent::TtsError {
                        message,
                        fallback_available: false,
                    });
                    true
                }
            }
        }
    }
}

enum BackendOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

#[allow(clippy::too_many_arguments)]
async fn try_backend(
    backend: &dyn TtsClient,
    text: &str,
    shared: &Shared,
    token: &CancellationToken,
    first_chunk_timeout: Duration,
    tts_started: std::time::Instant,
    metrics: &Metrics,
) -> BackendOutcome {
    let mut rx = match backend.synthesize(text).await {
        Ok(rx) => rx,
        Err(e) => return BackendOutcome::Failed(format!("{}: {e}", backend.name())),
    };

    // First chunk under the timeout, or the backend is abandoned.
    let first = tokio::select! {
        chunk = tokio::time::timeout(first_chunk_timeout, rx.recv()) => match chunk {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                return BackendOutcome::Failed(format!("{}: stream ended early", backend.name()))
            }
            Err(_) => {
                return BackendOutcome::Failed(format!(
                    "{}: no chunk within {first_chunk_timeout:?}",
                    backend.name()
                ))
            }
        },
        _ = token.cancelled() => return BackendOutcome::Cancelled,
    };
    metrics.observe_ms(
        "voice.tts.first_chunk_latency",
        tts_started.elapsed().as_millis() as u64,
    );
    shared.emit(SessionEvent::TtsFirstChunkSent);
    if shared.outbound.send(Outbound::Audio(first)).await.is_err() {
        return BackendOutcome::Cancelled;
    }

    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(chunk) => {
                    if shared.outbound.send(Outbound::Audio(chunk)).await.is_err() {
                        return BackendOutcome::Cancelled;
                    }
                }
                None => return BackendOutcome::Completed,
            },
            _ = token.cancelled() => return BackendOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonsense_filter_minimum_length() {
        assert!(!is_meaningful("eh", 3));
        assert!(!is_meaningful("  a ", 3));
        assert!(is_meaningful("qué tengo mañana", 3));
    }

    #[test]
    fn nonsense_filter_rejects_pure_fillers() {
        assert!(!is_meaningful("eh um mmm", 3));
        assert!(!is_meaningful("vale ok", 3));
        assert!(is_meaningful("vale, agenda la reunión", 3));
    }

    #[test]
    fn filter_ignores_punctuation_when_matching_fillers() {
        assert!(!is_meaningful("eh... um!!", 3));
    }
}
