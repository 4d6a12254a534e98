//! Narration engine abstraction.
//!
//! The playback driver depends on [`NarrationEngine`] rather than a concrete
//! speech backend. An engine narrates one utterance at a time and reports
//! completion through a single-shot [`SpeechCompletion`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use crate::protocol_constants::SILENT_WORDS_PER_SECOND;

/// Errors raised by narration engines.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The external speech program could not be started.
    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine cannot narrate right now.
    #[error("Narration engine unavailable: {0}")]
    Unavailable(String),
}

/// Convenient Result alias for narration operations.
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// A voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    /// Identifier passed back to the engine.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Locale tag (e.g. `en-US`, `en-gb`).
    pub language: String,
}

/// A single narration request.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Voice id, or `None` for the engine default.
    pub voice_id: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// How an utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Finished,
    Cancelled,
}

/// Completion of one utterance.
///
/// Resolves exactly once. If the engine drops its side without reporting,
/// the utterance counts as cancelled.
#[derive(Debug)]
pub struct SpeechCompletion {
    rx: oneshot::Receiver<SpeechOutcome>,
}

impl SpeechCompletion {
    /// Creates a completion and the sender the engine resolves it with.
    pub fn channel() -> (oneshot::Sender<SpeechOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for SpeechCompletion {
    type Output = SpeechOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(SpeechOutcome::Cancelled))
    }
}

/// A text-to-speech backend.
#[async_trait]
pub trait NarrationEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Available voices. May be empty while the engine is still enumerating.
    fn voices(&self) -> Vec<Voice>;

    /// Starts narrating `utterance`, cancelling anything still in flight.
    async fn speak(&self, utterance: Utterance) -> PlaybackResult<SpeechCompletion>;

    /// Stops the in-flight utterance. Its completion resolves `Cancelled`.
    fn cancel(&self);

    /// Suspends the in-flight utterance.
    fn pause(&self);

    /// Continues a suspended utterance. Returns false if the engine cannot
    /// resume, in which case the caller restarts the utterance.
    fn resume(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Silent engine
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SilentControl {
    Play,
    Pause,
    Cancel,
}

/// Engine that produces no audio.
///
/// Each utterance completes after its estimated speaking time
/// (words ÷ (2.5 words/s × rate)). Pausing stops the clock.
#[derive(Default)]
pub struct SilentNarrationEngine {
    active: Mutex<Option<watch::Sender<SilentControl>>>,
}

impl SilentNarrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated speaking time for `text` at `rate`.
    pub fn estimate_duration(text: &str, rate: f32) -> Duration {
        let words = text.split_whitespace().count() as f32;
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Duration::from_secs_f32(words / (SILENT_WORDS_PER_SECOND * rate))
    }

    fn signal(&self, control: SilentControl) {
        if let Some(tx) = self.active.lock().as_ref() {
            let _ = tx.send(control);
        }
    }
}

async fn run_silent(
    mut remaining: Duration,
    mut control: watch::Receiver<SilentControl>,
    done: oneshot::Sender<SpeechOutcome>,
) {
    let outcome = loop {
        let state = *control.borrow_and_update();
        match state {
            SilentControl::Cancel => break SpeechOutcome::Cancelled,
            SilentControl::Pause => {
                if control.changed().await.is_err() {
                    break SpeechOutcome::Cancelled;
                }
            }
            SilentControl::Play => {
                let started = Instant::now();
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => break SpeechOutcome::Finished,
                    changed = control.changed() => {
                        remaining = remaining.saturating_sub(started.elapsed());
                        if changed.is_err() {
                            break SpeechOutcome::Cancelled;
                        }
                    }
                }
            }
        }
    };
    let _ = done.send(outcome);
}

#[async_trait]
impl NarrationEngine for SilentNarrationEngine {
    fn name(&self) -> &'static str {
        "silent"
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    async fn speak(&self, utterance: Utterance) -> PlaybackResult<SpeechCompletion> {
        let duration = Self::estimate_duration(&utterance.text, utterance.rate);
        let (control_tx, control_rx) = watch::channel(SilentControl::Play);
        let (done_tx, completion) = SpeechCompletion::channel();

        if let Some(previous) = self.active.lock().replace(control_tx) {
            let _ = previous.send(SilentControl::Cancel);
        }
        tokio::spawn(run_silent(duration, control_rx, done_tx));
        Ok(completion)
    }

    fn cancel(&self) {
        if let Some(tx) = self.active.lock().take() {
            let _ = tx.send(SilentControl::Cancel);
        }
    }

    fn pause(&self) {
        self.signal(SilentControl::Pause);
    }

    fn resume(&self) -> bool {
        self.signal(SilentControl::Play);
        true
    }
}
