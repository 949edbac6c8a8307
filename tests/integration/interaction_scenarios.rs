//! End-to-end interaction scenarios: controller, segmenter and playback
//! queue wired together with fake capture, backend and synthesizer.

use crate::helpers::{
    BatchReply, LateTranscript, RecordingSynth, ScriptedBackend, controller,
    controller_with_capture, errors, protocol_error, run_to_idle, sentences, statuses,
};
use hevar::api::QueryClient;
use hevar::capture::TextCapture;
use hevar::config::{ApiConfig, FillerPolicy, PipelineConfig, QueryMode, TtsConfig};
use hevar::pipeline::messages::StreamEvent;
use hevar::{InteractionController, InteractionStatus, PlaybackQueue};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use InteractionStatus::{Idle, Listening, Processing, Speaking};

const FILLER: &str = "Let me think about that.";
const JOKE: [&str; 4] = [
    "Why did ",
    "the chicken ",
    "cross the road? ",
    "To get to the other side!",
];
const PUNCHLINES: [&str; 2] = [
    "Why did the chicken cross the road?",
    "To get to the other side!",
];

fn streaming() -> PipelineConfig {
    PipelineConfig::default()
}

fn batch() -> PipelineConfig {
    PipelineConfig {
        mode: QueryMode::Batch,
        ..PipelineConfig::default()
    }
}

fn idle_count(events: &[hevar::AssistantEvent]) -> usize {
    statuses(events).iter().filter(|s| **s == Idle).count()
}

async fn wait_for_status(ctl: &InteractionController, wanted: InteractionStatus) {
    let mut rx = ctl.watch_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == wanted))
        .await
        .expect("status not reached in time")
        .expect("status channel closed");
}

// ────────────────────────────────────────────────────────────────────────────
// Streaming answers
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn joke_is_spoken_as_two_sentences_in_order() {
    let synth = RecordingSynth::new(Duration::from_millis(50));
    let ctl = controller(
        streaming(),
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(synth.finished(), PUNCHLINES);
    assert_eq!(sentences(&events), PUNCHLINES);
    assert_eq!(statuses(&events), vec![Listening, Processing, Speaking, Idle]);
    assert!(errors(&events).is_empty());
    assert_eq!(ctl.status(), Idle);
    assert!(!ctl.playback().is_playing());
}

#[tokio::test]
async fn filler_is_withdrawn_when_content_arrives() {
    let synth = RecordingSynth::new(Duration::from_millis(50));
    let ctl = controller(
        streaming(),
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    run_to_idle(&ctl).await;

    assert!(!synth.finished().iter().any(|t| t == FILLER));
    let started = synth.started();
    assert!(
        started.iter().filter(|t| *t == FILLER).count() <= 1,
        "filler rendered more than once: {started:?}"
    );
}

#[tokio::test]
async fn finish_policy_lets_filler_play_first() {
    let synth = RecordingSynth::new(Duration::from_millis(30));
    let config = PipelineConfig {
        filler_policy: FillerPolicy::Finish,
        ..PipelineConfig::default()
    };
    let ctl = controller(
        config,
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    run_to_idle(&ctl).await;

    assert_eq!(synth.finished(), vec![FILLER, PUNCHLINES[0], PUNCHLINES[1]]);
}

#[tokio::test]
async fn trailing_text_without_punctuation_is_spoken_last() {
    let synth = RecordingSynth::new(Duration::from_millis(10));
    let ctl = controller(
        streaming(),
        "Summarize.",
        ScriptedBackend::deltas(&["First point. Second", " point without a stop"]),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(
        synth.finished(),
        vec!["First point.", "Second point without a stop"]
    );
    assert_eq!(
        sentences(&events),
        vec!["First point.", "Second point without a stop"]
    );
}

#[tokio::test]
async fn failed_last_sentence_still_ends_quietly() {
    let synth = RecordingSynth::failing_on(Duration::from_millis(10), PUNCHLINES[1]);
    let ctl = controller(
        streaming(),
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(synth.started().last().map(String::as_str), Some(PUNCHLINES[1]));
    assert_eq!(synth.finished(), vec![PUNCHLINES[0]]);
    assert_eq!(statuses(&events), vec![Listening, Processing, Speaking, Idle]);
    assert!(errors(&events).is_empty(), "{events:?}");
    assert_eq!(ctl.last_error(), None);
}

#[tokio::test]
async fn failed_sentence_is_skipped_wherever_it_falls() {
    let synth = RecordingSynth::failing_on(Duration::from_millis(10), PUNCHLINES[0]);
    let ctl = controller(
        streaming(),
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(synth.finished(), vec![PUNCHLINES[1]]);
    assert!(errors(&events).is_empty(), "{events:?}");
    assert_eq!(ctl.last_error(), None);
}

#[tokio::test]
async fn transcript_after_end_of_capture_is_answered() {
    let synth = RecordingSynth::new(Duration::from_millis(10));
    let backend = ScriptedBackend::deltas(&JOKE);
    let ctl = controller_with_capture(
        streaming(),
        LateTranscript::new("Tell me a joke.", Duration::from_millis(100)),
        backend.clone(),
        synth.clone(),
    );

    let mut events = ctl.subscribe();
    assert!(ctl.activate());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctl.status(), Processing, "end of capture moves to processing");
    assert!(backend.queries().is_empty(), "no query before the transcript");

    tokio::time::timeout(Duration::from_secs(5), ctl.wait_idle())
        .await
        .expect("interaction did not return to idle");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = crate::helpers::drain(&mut events);

    assert_eq!(statuses(&events), vec![Listening, Processing, Speaking, Idle]);
    assert_eq!(synth.finished(), PUNCHLINES);
    assert_eq!(backend.queries().len(), 1);
    assert_eq!(backend.queries()[0].0, "Tell me a joke.");
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn empty_stream_completes_after_filler() {
    let synth = RecordingSynth::new(Duration::from_millis(20));
    let ctl = controller(
        streaming(),
        "Anything?",
        ScriptedBackend::streaming(vec![(Duration::from_millis(5), StreamEvent::End)]),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(statuses(&events), vec![Listening, Processing, Idle]);
    assert_eq!(synth.finished(), vec![FILLER]);
    assert!(sentences(&events).is_empty());
}

#[tokio::test]
async fn protocol_error_surfaces_service_message_once() {
    let synth = RecordingSynth::new(Duration::from_millis(10));
    let backend = ScriptedBackend::streaming(vec![
        (
            Duration::from_millis(5),
            StreamEvent::Data("Partial answer. ".into()),
        ),
        (Duration::from_millis(5), protocol_error("index offline")),
    ]);
    let ctl = controller(streaming(), "Search the index.", backend, synth);

    let events = run_to_idle(&ctl).await;

    assert_eq!(errors(&events), vec!["index offline"]);
    assert_eq!(idle_count(&events), 1);
    assert_eq!(ctl.last_error().as_deref(), Some("index offline"));
}

// ────────────────────────────────────────────────────────────────────────────
// Batch answers
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_answer_is_spoken_whole() {
    let synth = RecordingSynth::new(Duration::from_millis(10));
    let backend = ScriptedBackend::batch(BatchReply::Answer(Some(
        "Paris. It is the capital of France.".into(),
    )));
    let ctl = controller(batch(), "Capital of France?", backend, synth.clone());

    let events = run_to_idle(&ctl).await;

    assert_eq!(
        synth.finished(),
        vec!["Paris. It is the capital of France."]
    );
    assert_eq!(statuses(&events), vec![Listening, Processing, Speaking, Idle]);
}

#[tokio::test]
async fn batch_transport_failure_reports_once() {
    let synth = RecordingSynth::new(Duration::from_millis(500));
    let backend = ScriptedBackend::batch(BatchReply::Transport("connection reset".into()));
    let ctl = controller(batch(), "Hello?", backend, synth.clone());

    let events = run_to_idle(&ctl).await;

    assert_eq!(errors(&events), vec!["Failed to process query"]);
    assert_eq!(idle_count(&events), 1);
    assert!(synth.finished().is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Against the HTTP client
// ────────────────────────────────────────────────────────────────────────────

fn http_controller(
    config: PipelineConfig,
    api: ApiConfig,
    synth: Arc<RecordingSynth>,
) -> InteractionController {
    let backend = Arc::new(QueryClient::new(api).unwrap());
    controller(config, "Tell me a joke.", backend, synth)
}

#[tokio::test]
async fn streamed_sse_answer_is_spoken() {
    let mock_server = MockServer::start().await;
    let body = "data: Why did \n\ndata: the chicken \n\n: keep-alive\n\n\
                data: cross the road? \n\ndata: To get to the other side!\n\n\
                data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .and(header("accept", "text/event-stream"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(
            json!({"query": "Tell me a joke.", "show_timing": false}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let synth = RecordingSynth::new(Duration::from_millis(100));
    let api = ApiConfig {
        base_url: mock_server.uri(),
        token: Some("secret".into()),
        ..ApiConfig::default()
    };
    let ctl = http_controller(streaming(), api, synth.clone());

    let events = run_to_idle(&ctl).await;

    assert!(errors(&events).is_empty(), "unexpected errors: {events:?}");
    assert_eq!(synth.finished(), PUNCHLINES);
}

#[tokio::test]
async fn empty_batch_answer_goes_straight_to_idle() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": ""})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let synth = RecordingSynth::new(Duration::from_millis(500));
    let api = ApiConfig {
        base_url: mock_server.uri(),
        ..ApiConfig::default()
    };
    let ctl = http_controller(batch(), api, synth.clone());

    let events = run_to_idle(&ctl).await;

    assert_eq!(statuses(&events), vec![Listening, Processing, Idle]);
    assert!(sentences(&events).is_empty());
    assert!(errors(&events).is_empty());
    assert!(synth.finished().is_empty());
}

#[tokio::test]
async fn empty_batch_answer_waits_for_finishing_filler() {
    let synth = RecordingSynth::new(Duration::from_millis(150));
    let config = PipelineConfig {
        filler_policy: FillerPolicy::Finish,
        ..batch()
    };
    let ctl = controller(
        config,
        "Anything?",
        ScriptedBackend::batch(BatchReply::Answer(None)),
        synth.clone(),
    );

    let events = run_to_idle(&ctl).await;

    assert_eq!(statuses(&events), vec![Listening, Processing, Idle]);
    assert_eq!(synth.finished(), vec![FILLER]);
    assert!(!ctl.playback().is_playing());
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn network_error_shows_one_message_and_idles_once() {
    let synth = RecordingSynth::new(Duration::from_millis(500));
    let api = ApiConfig {
        // Nothing listens on port 1.
        base_url: "http://127.0.0.1:1".into(),
        timeout_secs: 5,
        ..ApiConfig::default()
    };
    let ctl = http_controller(streaming(), api, synth.clone());

    let events = run_to_idle(&ctl).await;

    assert_eq!(errors(&events), vec!["Failed to process query"]);
    assert_eq!(idle_count(&events), 1);
    assert_eq!(ctl.last_error().as_deref(), Some("Failed to process query"));
    assert!(synth.finished().is_empty());
}

#[tokio::test]
async fn server_error_status_is_a_transport_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let synth = RecordingSynth::new(Duration::from_millis(500));
    let api = ApiConfig {
        base_url: mock_server.uri(),
        ..ApiConfig::default()
    };
    let ctl = http_controller(streaming(), api, synth);

    let events = run_to_idle(&ctl).await;

    assert_eq!(errors(&events), vec!["Failed to process query"]);
    assert_eq!(idle_count(&events), 1);
}

// ────────────────────────────────────────────────────────────────────────────
// Interruption
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_before_data_enqueues_nothing_but_filler() {
    let synth = RecordingSynth::new(Duration::from_millis(200));
    let backend = ScriptedBackend::streaming(vec![
        (
            Duration::from_millis(300),
            StreamEvent::Data("Too late. ".into()),
        ),
        (Duration::from_millis(5), StreamEvent::End),
    ]);
    let ctl = controller(streaming(), "Slow question", backend, synth.clone());
    let mut events = ctl.subscribe();

    assert!(ctl.activate());
    wait_for_status(&ctl, Processing).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctl.interrupt().await;
    assert_eq!(ctl.status(), Idle);
    assert!(!ctl.playback().is_playing());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let events = crate::helpers::drain(&mut events);

    assert!(
        synth.started().iter().all(|t| t == FILLER),
        "only the filler may render: {:?}",
        synth.started()
    );
    assert!(synth.finished().is_empty());
    assert!(sentences(&events).is_empty());
    assert!(errors(&events).is_empty());
    assert_eq!(idle_count(&events), 1);
    assert_eq!(ctl.status(), Idle);
}

#[tokio::test]
async fn interrupt_while_speaking_stops_playback() {
    let synth = RecordingSynth::new(Duration::from_millis(300));
    let ctl = controller(
        streaming(),
        "Count to three.",
        ScriptedBackend::deltas(&["One. ", "Two. ", "Three."]),
        synth.clone(),
    );

    assert!(ctl.activate());
    wait_for_status(&ctl, Speaking).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    ctl.interrupt().await;

    assert_eq!(ctl.status(), Idle);
    assert!(!ctl.playback().is_playing());
    assert_eq!(ctl.playback().pending_len(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(synth.finished().is_empty(), "{:?}", synth.finished());
    assert_eq!(ctl.status(), Idle);
    assert!(ctl.last_error().is_none());
}

#[tokio::test]
async fn activation_while_busy_is_ignored() {
    let synth = RecordingSynth::new(Duration::from_millis(50));
    let ctl = controller(
        streaming(),
        "Tell me a joke.",
        ScriptedBackend::deltas(&JOKE),
        synth.clone(),
    );

    assert!(ctl.activate());
    assert!(!ctl.activate());
    wait_for_status(&ctl, Speaking).await;
    assert!(!ctl.activate());
    tokio::time::timeout(Duration::from_secs(5), ctl.wait_idle())
        .await
        .unwrap();
    assert_eq!(synth.finished(), PUNCHLINES);
}

// ────────────────────────────────────────────────────────────────────────────
// Session identity
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_session_id_per_controller() {
    let backend = ScriptedBackend::batch(BatchReply::Answer(Some("Yes.".into())));
    let capture = Arc::new(TextCapture::with_transcript("First?"));
    let playback = PlaybackQueue::spawn(
        RecordingSynth::new(Duration::from_millis(5)),
        &TtsConfig::default(),
    );
    let ctl = InteractionController::new(batch(), capture.clone(), backend.clone(), playback);

    run_to_idle(&ctl).await;
    capture.provide("Second?");
    run_to_idle(&ctl).await;

    let queries = backend.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].0, "First?");
    assert_eq!(queries[1].0, "Second?");
    assert_eq!(queries[0].1, queries[1].1);
    assert_eq!(queries[0].1, ctl.session_id().as_str());
    assert!(queries[0].1.starts_with("session_"));
}
