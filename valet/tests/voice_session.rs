//! Voice session behaviour over channel-backed frames: happy path with TTS
//! streaming, nonsense filter, barge-in interrupt timing, and the TTS
//! first-chunk fallback.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::harness;
use tokio::sync::mpsc;
use valet::voice::{
    ClientFrame, MockStt, MockTts, Outbound, VoiceSession, VoiceSessionConfig,
};

fn frame(json: &str) -> ClientFrame {
    serde_json::from_str(json).unwrap()
}

struct SessionUnderTest {
    inbound_tx: mpsc::Sender<ClientFrame>,
    outbound_rx: mpsc::Receiver<Outbound>,
    _task: tokio::task::JoinHandle<()>,
}

fn spawn_session(
    h: &common::Harness,
    stt: Arc<MockStt>,
    primary: MockTts,
    fallback: Option<MockTts>,
) -> SessionUnderTest {
    let session = VoiceSession::new(
        h.orchestrator.clone(),
        stt,
        Arc::new(primary),
        fallback.map(|f| Arc::new(f) as Arc<dyn valet::voice::TtsClient>),
        h.metrics.clone(),
        VoiceSessionConfig {
            first_chunk_timeout: Duration::from_millis(200),
            ..VoiceSessionConfig::default()
        },
    );
    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let task = tokio::spawn(async move { session.run(inbound_rx, outbound_tx).await });
    SessionUnderTest {
        inbound_tx,
        outbound_rx,
        _task: task,
    }
}

async fn drain_until(
    rx: &mut mpsc::Receiver<Outbound>,
    mut pred: impl FnMut(&Outbound) -> bool,
) -> Vec<Outbound> {
    let mut seen = Vec::new();
    loop {
        let item = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for outbound frame")
            .expect("outbound channel closed");
        let done = pred(&item);
        seen.push(item);
        if done {
            return seen;
        }
    }
}

fn event_names(frames: &[Outbound]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| match f {
            Outbound::Event(v) => v["event"].as_str().map(str::to_string),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn text_request_streams_events_and_audio() {
    let h = harness();
    h.llm.push_text("Tienes la agenda libre.");
    let mut s = spawn_session(&h, Arc::new(MockStt::new()), MockTts::new("primary"), None);

    s.inbound_tx
        .send(frame(r#"{"mode": "text", "text": "¿qué tengo en la agenda hoy?"}"#))
        .await
        .unwrap();

    let frames = drain_until(&mut s.outbound_rx, |f| matches!(f, Outbound::Complete)).await;
    let names = event_names(&frames);
    assert!(names.contains(&"backend_ready".to_string()));
    assert!(names.contains(&"agent_processing_started".to_string()));
    assert!(names.contains(&"agent_rag_started".to_string()));
    assert!(names.contains(&"agent_response_ready".to_string()));
    assert!(names.contains(&"tts_started".to_string()));
    assert!(names.contains(&"tts_first_chunk_sent".to_string()));
    assert!(names.contains(&"tts_completed".to_string()));
    assert!(
        frames.iter().any(|f| matches!(f, Outbound::Audio(_))),
        "audio chunks expected"
    );
}

#[tokio::test]
async fn audio_request_goes_through_stt() {
    let h = harness();
    h.llm.push_text("Nada en la agenda.");
    let stt = Arc::new(MockStt::new());
    stt.push("¿qué tengo en la agenda mañana?");
    let mut s = spawn_session(&h, stt, MockTts::new("primary"), None);

    s.inbound_tx
        .send(frame(r#"{"mode": "audio", "audio_base64": "AAAAAA=="}"#))
        .await
        .unwrap();

    let frames = drain_until(&mut s.outbound_rx, |f| matches!(f, Outbound::Complete)).await;
    let names = event_names(&frames);
    assert!(names.contains(&"stt_started".to_string()));
    assert!(names.contains(&"stt_completed".to_string()));
}

#[tokio::test]
async fn nonsense_transcription_cancels_without_agent() {
    let h = harness();
    let stt = Arc::new(MockStt::new());
    stt.push("eh um");
    let mut s = spawn_session(&h, stt, MockTts::new("primary"), None);

    s.inbound_tx
        .send(frame(r#"{"mode": "audio", "audio_base64": "AAAAAA=="}"#))
        .await
        .unwrap();

    let frames = drain_until(&mut s.outbound_rx, |f| {
        matches!(f, Outbound::Cancelled { .. })
    })
    .await;
    match frames.last().unwrap() {
        Outbound::Cancelled { reason } => assert_eq!(reason, "message_no_sense"),
        other => panic!("expected cancel, got {other:?}"),
    }
    let names = event_names(&frames);
    assert!(!names.contains(&"agent_processing_started".to_string()));
}

/// Interrupt during TTS stops audio promptly: no further chunks after the
/// interrupt settles, well inside the 200 ms budget.
#[tokio::test]
async fn interrupt_during_tts_stops_audio_quickly() {
    let h = harness();
    h.llm.push_text("Una respuesta larga para hablar un buen rato.");
    // Many chunks with per-chunk delay: the stream outlives the interrupt.
    let chunks: Vec<Vec<u8>> = (0..200).map(|_| vec![0u8; 64]).collect();
    let mut s = spawn_session(
        &h,
        Arc::new(MockStt::new()),
        MockTts::new("primary").with_chunks(chunks),
        None,
    );

    s.inbound_tx
        .send(frame(r#"{"mode": "text", "text": "cuéntame la agenda"}"#))
        .await
        .unwrap();

    // Wait for audio to start flowing.
    drain_until(&mut s.outbound_rx, |f| matches!(f, Outbound::Audio(_))).await;

    let interrupted_at = std::time::Instant::now();
    s.inbound_tx
        .send(frame(r#"{"type": "interrupt"}"#))
        .await
        .unwrap();

    // Drain whatever was already in flight; the stream must go quiet fast.
    let mut last_audio = interrupted_at;
    loop {
        match tokio::time::timeout(Duration::from_millis(300), s.outbound_rx.recv()).await {
            Ok(Some(Outbound::Audio(_))) => last_audio = std::time::Instant::now(),
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => break,
        }
    }
    assert!(
        last_audio.duration_since(interrupted_at) < Duration::from_millis(200),
        "audio continued past the interrupt budget"
    );
}

/// A primary backend that misses the first-chunk deadline triggers
/// `tts_error` with `fallback_available` and the fallback speaks instead.
#[tokio::test]
async fn slow_primary_falls_back_once() {
    let h = harness();
    h.llm.push_text("Respuesta corta.");
    let slow_primary = MockTts::new("primary").with_first_chunk_delay(Duration::from_secs(5));
    let mut s = spawn_session(
        &h,
        Arc::new(MockStt::new()),
        slow_primary,
        Some(MockTts::new("fallback")),
    );

    s.inbound_tx
        .send(frame(r#"{"mode": "text", "text": "dime la agenda"}"#))
        .await
        .unwrap();

    let frames = drain_until(&mut s.outbound_rx, |f| matches!(f, Outbound::Complete)).await;
    let names = event_names(&frames);
    assert!(names.contains(&"tts_error".to_string()));
    assert!(names.contains(&"tts_completed".to_string()));
    let error_event = frames
        .iter()
        .find_map(|f| match f {
            Outbound::Event(v) if v["event"] == "tts_error" => Some(v.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error_event["fallback_available"], true);
}
