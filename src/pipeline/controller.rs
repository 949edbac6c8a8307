//! Interaction state machine.
//!
//! One interaction runs `idle → listening → processing → speaking → idle`.
//! Each activation gets its own [`CancellationToken`]; every side effect of
//! the interaction task (status change, enqueue, error report) happens under
//! the state lock after checking that token, so once [`interrupt`] returns
//! nothing from the cancelled interaction can reach the user.
//!
//! [`interrupt`]: InteractionController::interrupt

use crate::api::QueryBackend;
use crate::capture::SpeechCapture;
use crate::config::{FillerPolicy, PipelineConfig, QueryMode};
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{
    CaptureEvent, InteractionStatus, SentenceChunk, StreamEvent, Utterance, UtteranceId,
    UtteranceOutcome,
};
use crate::pipeline::playback::PlaybackQueue;
use crate::pipeline::segmenter::SentenceSegmenter;
use crate::runtime::AssistantEvent;
use crate::session::SessionId;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the observer event channel.
const EVENT_CHANNEL_SIZE: usize = 64;

#[derive(Debug)]
struct ControlState {
    status: InteractionStatus,
    cancel: CancellationToken,
    last_error: Option<String>,
}

struct Inner {
    config: PipelineConfig,
    capture: Arc<dyn SpeechCapture>,
    backend: Arc<dyn QueryBackend>,
    playback: PlaybackQueue,
    session: SessionId,
    state: Mutex<ControlState>,
    status_tx: watch::Sender<InteractionStatus>,
    events: broadcast::Sender<AssistantEvent>,
}

/// Drives capture, query, segmentation and playback for one interaction at
/// a time. Clones share the same state.
#[derive(Clone)]
pub struct InteractionController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InteractionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionController")
            .field("session", &self.inner.session)
            .field("status", &self.status())
            .finish()
    }
}

impl InteractionController {
    /// Create a controller. A fresh session id is generated for its lifetime.
    pub fn new(
        config: PipelineConfig,
        capture: Arc<dyn SpeechCapture>,
        backend: Arc<dyn QueryBackend>,
        playback: PlaybackQueue,
    ) -> Self {
        let (status_tx, _) = watch::channel(InteractionStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let session = SessionId::generate();
        info!("interaction controller ready, session {session}");
        Self {
            inner: Arc::new(Inner {
                config,
                capture,
                backend,
                playback,
                session,
                state: Mutex::new(ControlState {
                    status: InteractionStatus::Idle,
                    cancel: CancellationToken::new(),
                    last_error: None,
                }),
                status_tx,
                events,
            }),
        }
    }

    /// Start an interaction. Ignored (returns `false`) unless idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn activate(&self) -> bool {
        let token = {
            let mut state = self.inner.lock();
            if state.status != InteractionStatus::Idle {
                debug!("activation ignored while {}", state.status);
                return false;
            }
            let token = CancellationToken::new();
            state.cancel = token.clone();
            state.last_error = None;
            self.inner.publish(&mut state, InteractionStatus::Listening);
            token
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = inner.run_interaction(&token).await {
                inner.fail(&token, &e);
            }
        });
        true
    }

    /// Cancel the current interaction: halt speech, drop pending utterances
    /// and return to idle. No-op when already idle.
    ///
    /// Status is idle as soon as this is called; the returned future also
    /// waits for playback to stop.
    pub async fn interrupt(&self) {
        let cleared = {
            let mut state = self.inner.lock();
            if state.status == InteractionStatus::Idle {
                return;
            }
            info!("interrupting while {}", state.status);
            state.cancel.cancel();
            let cleared = self.inner.playback.clear();
            self.inner.publish(&mut state, InteractionStatus::Idle);
            cleared
        };
        cleared.await;
    }

    /// Current status.
    pub fn status(&self) -> InteractionStatus {
        self.inner.lock().status
    }

    /// User-facing message of the most recent failed interaction. Cleared
    /// when the next interaction starts.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Receive status, transcript, sentence and error events.
    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.inner.events.subscribe()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<InteractionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Resolve once the controller is idle (immediately if it already is).
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.status_tx.subscribe();
        let _ = rx.wait_for(|s| *s == InteractionStatus::Idle).await;
    }

    /// Session id sent with every query from this controller.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session
    }

    /// The playback queue answers are spoken on.
    pub fn playback(&self) -> &PlaybackQueue {
        &self.inner.playback
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AssistantEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Set the status and notify observers. Caller holds the lock.
    fn publish(&self, state: &mut ControlState, to: InteractionStatus) {
        if state.status == to {
            return;
        }
        debug!("status {} -> {to}", state.status);
        state.status = to;
        self.status_tx.send_replace(to);
        self.emit(AssistantEvent::Status(to));
    }

    /// Transition on behalf of the interaction owning `token`. Returns
    /// `false` (and changes nothing) if that interaction was cancelled.
    fn transition(&self, token: &CancellationToken, to: InteractionStatus) -> bool {
        let mut state = self.lock();
        if token.is_cancelled() {
            return false;
        }
        self.publish(&mut state, to);
        true
    }

    /// Enqueue on behalf of the interaction owning `token`.
    fn enqueue(&self, token: &CancellationToken, utterance: Utterance) -> Option<UtteranceId> {
        let _state = self.lock();
        if token.is_cancelled() {
            return None;
        }
        Some(self.playback.enqueue(utterance))
    }

    /// Report a failure once and force idle. Late failures of a cancelled
    /// interaction are dropped.
    fn fail(&self, token: &CancellationToken, error: &AssistantError) {
        let mut state = self.lock();
        if token.is_cancelled() {
            debug!("ignoring failure of cancelled interaction: {error}");
            return;
        }
        warn!("interaction failed: {error}");
        token.cancel();
        let message = error.user_message();
        state.last_error = Some(message.clone());
        self.emit(AssistantEvent::Error(message));
        // Fire and forget: the filler may still be playing.
        drop(self.playback.clear());
        self.publish(&mut state, InteractionStatus::Idle);
    }

    async fn run_interaction(&self, token: &CancellationToken) -> Result<()> {
        let Some(transcript) = self.listen(token).await? else {
            return Ok(());
        };
        if !self.transition(token, InteractionStatus::Processing) {
            return Ok(());
        }
        info!("transcript: {transcript}");
        self.emit(AssistantEvent::Transcript(transcript.clone()));

        let filler_text = self.config.filler_text.trim();
        let filler = if filler_text.is_empty() {
            None
        } else {
            self.enqueue(token, Utterance::new(filler_text))
        };

        match self.config.mode {
            QueryMode::Batch => self.answer_batch(token, &transcript, filler).await,
            QueryMode::Streaming => self.answer_streaming(token, &transcript, filler).await,
        }
    }

    /// Wait for the transcript. `None` when the interaction was cancelled.
    async fn listen(&self, token: &CancellationToken) -> Result<Option<String>> {
        let mut events = self.capture.start_listening().await?;
        loop {
            let event = events.recv().await;
            if token.is_cancelled() {
                return Ok(None);
            }
            match event {
                Some(CaptureEvent::Result(text)) => return Ok(Some(text)),
                Some(CaptureEvent::End) => {
                    // Capture stopped on its own; a result may still follow.
                    if !self.transition(token, InteractionStatus::Processing) {
                        return Ok(None);
                    }
                }
                Some(CaptureEvent::Error(message)) => {
                    return Err(AssistantError::CaptureFailure(message));
                }
                None => {
                    return Err(AssistantError::CaptureFailure(
                        "no speech was recognized".to_owned(),
                    ));
                }
            }
        }
    }

    async fn answer_batch(
        &self,
        token: &CancellationToken,
        transcript: &str,
        filler: Option<UtteranceId>,
    ) -> Result<()> {
        let answer = self.backend.query(transcript, &self.session).await;
        if token.is_cancelled() {
            return Ok(());
        }
        let Some(answer) = answer?.filter(|a| !a.trim().is_empty()) else {
            info!("empty answer");
            self.withdraw_filler(token, filler);
            // Idle once whatever is still queued has played out.
            return self.speak_final(token, SentenceChunk::placeholder()).await;
        };

        if !self.begin_speaking(token, filler) {
            return Ok(());
        }
        let chunk = SentenceChunk {
            text: answer.trim().to_owned(),
            is_final: true,
        };
        self.speak_final(token, chunk).await
    }

    async fn answer_streaming(
        &self,
        token: &CancellationToken,
        transcript: &str,
        filler: Option<UtteranceId>,
    ) -> Result<()> {
        let mut stream = self.backend.query_stream(transcript, &self.session).await;
        let mut segmenter = SentenceSegmenter::new(self.config.sentence_threshold);
        let mut speaking = false;

        while let Some(event) = stream.next().await {
            if token.is_cancelled() {
                return Ok(());
            }
            match event {
                StreamEvent::Data(delta) => {
                    if !speaking {
                        if !self.begin_speaking(token, filler) {
                            return Ok(());
                        }
                        speaking = true;
                    }
                    for chunk in segmenter.push(&delta) {
                        self.emit(AssistantEvent::Sentence(chunk.clone()));
                        if self.enqueue(token, Utterance::new(chunk.text)).is_none() {
                            return Ok(());
                        }
                    }
                }
                StreamEvent::End => break,
                StreamEvent::Error(failure) => return Err(failure.into()),
            }
        }

        if !speaking {
            debug!("stream ended without data");
        }
        self.speak_final(token, segmenter.finish()).await
    }

    /// First real content arrived: deal with the filler and start speaking.
    fn begin_speaking(&self, token: &CancellationToken, filler: Option<UtteranceId>) -> bool {
        self.withdraw_filler(token, filler);
        self.transition(token, InteractionStatus::Speaking)
    }

    fn withdraw_filler(&self, token: &CancellationToken, filler: Option<UtteranceId>) {
        let Some(id) = filler else { return };
        if self.config.filler_policy != FillerPolicy::Interrupt {
            return;
        }
        let _state = self.lock();
        if !token.is_cancelled() {
            self.playback.cancel(id);
        }
    }

    /// Enqueue the unit carrying the completion and go idle once it has
    /// been rendered.
    async fn speak_final(&self, token: &CancellationToken, chunk: SentenceChunk) -> Result<()> {
        if !chunk.text.is_empty() {
            self.emit(AssistantEvent::Sentence(chunk.clone()));
        }
        let (utterance, done) = Utterance::with_completion(chunk.text);
        if self.enqueue(token, utterance).is_none() {
            return Ok(());
        }
        self.await_final(token, done).await
    }

    async fn await_final(
        &self,
        token: &CancellationToken,
        done: oneshot::Receiver<UtteranceOutcome>,
    ) -> Result<()> {
        match done.await {
            Ok(UtteranceOutcome::Spoken) => {
                self.transition(token, InteractionStatus::Idle);
                Ok(())
            }
            // A unit that fails to render counts as done, like every
            // other sentence of the answer.
            Ok(UtteranceOutcome::Failed(reason)) => {
                warn!("final sentence was not spoken: {reason}");
                self.transition(token, InteractionStatus::Idle);
                Ok(())
            }
            // Discarded by clear(): only expected after an interrupt.
            Err(_) if token.is_cancelled() => Ok(()),
            Err(_) => Err(AssistantError::Channel(
                "playback stopped before the answer finished".to_owned(),
            )),
        }
    }
}
