//! Ordered, one-at-a-time speech playback.
//!
//! [`PlaybackQueue`] is a cheap handle onto a worker task that owns the
//! synthesizer. Commands travel over one unbounded channel, so an enqueue
//! issued after a `cancel` or `clear` is always processed after it.

use crate::config::TtsConfig;
use crate::pipeline::messages::{Utterance, UtteranceId, UtteranceOutcome};
use crate::tts::{SpeechSynthesizer, Voice, VoiceParams, select_voice};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug)]
enum PlaybackCommand {
    Enqueue(UtteranceId, Utterance),
    Cancel(UtteranceId),
    Clear(oneshot::Sender<()>),
}

/// Counters shared between the handle and the worker.
#[derive(Debug, Default)]
struct QueueState {
    playing: AtomicBool,
    pending: AtomicUsize,
}

/// Handle to the playback worker. Clones share the same queue.
#[derive(Debug, Clone)]
pub struct PlaybackQueue {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    next_id: Arc<AtomicU64>,
    state: Arc<QueueState>,
}

impl PlaybackQueue {
    /// Start the playback worker on the current tokio runtime.
    ///
    /// The worker exits once every handle has been dropped.
    pub fn spawn(synth: Arc<dyn SpeechSynthesizer>, tts: &TtsConfig) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let state = Arc::new(QueueState::default());
        let worker = PlaybackWorker {
            synth,
            params: VoiceParams::from(tts),
            preferred_voices: tts.preferred_voices.clone(),
            voice: None,
            pending: Pending {
                items: VecDeque::new(),
                state: Arc::clone(&state),
            },
        };
        tokio::spawn(worker.run(rx));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            state,
        }
    }

    /// Append an utterance. Returns immediately; rendering happens on the
    /// worker in submission order.
    pub fn enqueue(&self, utterance: Utterance) -> UtteranceId {
        let id = UtteranceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if self
            .commands
            .send(PlaybackCommand::Enqueue(id, utterance))
            .is_err()
        {
            warn!("playback worker stopped, dropping utterance {id:?}");
        }
        id
    }

    /// Withdraw one utterance: removed if still pending, halted if rendering.
    /// Its completion is not invoked. Unknown or finished ids are ignored.
    pub fn cancel(&self, id: UtteranceId) {
        let _ = self.commands.send(PlaybackCommand::Cancel(id));
    }

    /// Halt the current utterance and discard everything pending, without
    /// invoking any completion.
    ///
    /// The request is issued immediately, so anything enqueued after this
    /// call survives it. The returned future resolves once the queue is idle.
    pub fn clear(&self) -> impl Future<Output = ()> + Send + 'static {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = self.commands.send(PlaybackCommand::Clear(ack_tx)).is_ok();
        async move {
            if sent {
                let _ = ack_rx.await;
            }
        }
    }

    /// Whether the worker holds work: an utterance rendering or about to
    /// render (voice lookup included). Never false while `pending_len() > 0`.
    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    /// Number of utterances waiting behind the one being rendered.
    pub fn pending_len(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }
}

/// How rendering of the current utterance ended.
enum Rendered {
    Finished(crate::error::Result<()>),
    /// Halted by `cancel`/`clear`. Carries the `clear` ack, if any, to be
    /// sent once the synthesis future has been dropped.
    Halted(Option<oneshot::Sender<()>>),
    Shutdown,
}

struct PlaybackWorker {
    synth: Arc<dyn SpeechSynthesizer>,
    params: VoiceParams,
    preferred_voices: Vec<String>,
    /// Resolved once, on the first utterance that needs a voice.
    voice: Option<Option<Voice>>,
    pending: Pending,
}

/// Utterances waiting behind the one being rendered.
struct Pending {
    items: VecDeque<(UtteranceId, Utterance)>,
    state: Arc<QueueState>,
}

impl Pending {
    fn pop(&mut self) -> Option<(UtteranceId, Utterance)> {
        let next = self.items.pop_front();
        self.sync();
        next
    }

    fn push(&mut self, id: UtteranceId, utterance: Utterance) {
        self.items.push_back((id, utterance));
        self.sync();
    }

    fn remove(&mut self, id: UtteranceId) {
        self.items.retain(|(queued, _)| *queued != id);
        self.sync();
    }

    fn discard(&mut self) {
        if !self.items.is_empty() {
            debug!("discarding {} pending utterance(s)", self.items.len());
        }
        self.items.clear();
        self.sync();
    }

    fn sync(&self) {
        self.state.pending.store(self.items.len(), Ordering::Release);
    }

    /// Mark the worker busy before anything is queued, so observers never
    /// see pending work on an idle queue.
    fn start(&self) {
        self.state.playing.store(true, Ordering::Release);
    }

    /// Drop the busy flag once nothing is left to render.
    fn settle(&self) {
        if self.items.is_empty() {
            self.state.playing.store(false, Ordering::Release);
        }
    }
}

impl PlaybackWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PlaybackCommand>) {
        loop {
            let Some((id, utterance)) = self.pending.pop() else {
                self.pending.settle();
                match rx.recv().await {
                    Some(cmd) => self.handle_idle(cmd),
                    None => break,
                }
                continue;
            };

            if utterance.text.trim().is_empty() {
                self.pending.settle();
                utterance.complete(UtteranceOutcome::Spoken);
                continue;
            }

            self.pending.start();
            self.ensure_voice().await;
            let rendered = self.render(id, &utterance, &mut rx).await;
            self.pending.settle();

            match rendered {
                Rendered::Finished(Ok(())) => {
                    debug!("utterance {id:?} spoken");
                    utterance.complete(UtteranceOutcome::Spoken);
                }
                Rendered::Finished(Err(e)) => {
                    warn!("utterance {id:?} failed: {e}");
                    utterance.complete(UtteranceOutcome::Failed(e.to_string()));
                }
                Rendered::Halted(ack) => {
                    debug!("utterance {id:?} halted");
                    drop(utterance);
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Rendered::Shutdown => break,
            }
        }
        self.pending.state.playing.store(false, Ordering::Release);
        debug!("playback worker exiting");
    }

    /// Speak one utterance while still serving commands.
    async fn render(
        &mut self,
        id: UtteranceId,
        utterance: &Utterance,
        rx: &mut mpsc::UnboundedReceiver<PlaybackCommand>,
    ) -> Rendered {
        let voice = self.voice.as_ref().and_then(Option::as_ref);
        let speak = self.synth.speak(&utterance.text, voice, &self.params);
        tokio::pin!(speak);

        loop {
            tokio::select! {
                result = &mut speak => return Rendered::Finished(result),
                cmd = rx.recv() => match cmd {
                    Some(PlaybackCommand::Enqueue(next, u)) => self.pending.push(next, u),
                    Some(PlaybackCommand::Cancel(target)) if target == id => {
                        return Rendered::Halted(None);
                    }
                    Some(PlaybackCommand::Cancel(target)) => self.pending.remove(target),
                    Some(PlaybackCommand::Clear(ack)) => {
                        self.pending.discard();
                        return Rendered::Halted(Some(ack));
                    }
                    None => return Rendered::Shutdown,
                },
            }
        }
    }

    fn handle_idle(&mut self, cmd: PlaybackCommand) {
        match cmd {
            PlaybackCommand::Enqueue(id, utterance) => {
                self.pending.start();
                self.pending.push(id, utterance);
            }
            PlaybackCommand::Cancel(id) => {
                self.pending.remove(id);
                self.pending.settle();
            }
            PlaybackCommand::Clear(ack) => {
                self.pending.discard();
                self.pending.settle();
                let _ = ack.send(());
            }
        }
    }

    async fn ensure_voice(&mut self) {
        if self.voice.is_some() {
            return;
        }
        let voice = match self.synth.voices().await {
            Ok(voices) => {
                select_voice(&voices, &self.params.language, &self.preferred_voices).cloned()
            }
            Err(e) => {
                warn!("could not list {} voices: {e}", self.synth.name());
                None
            }
        };
        match &voice {
            Some(v) => info!("speaking with voice '{}' ({})", v.name, v.language),
            None => info!("speaking with the {} default voice", self.synth.name()),
        }
        self.voice = Some(voice);
    }
}
