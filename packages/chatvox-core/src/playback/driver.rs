//! Drives the narration engine from the queue's playback cue.
//!
//! The driver owns the engine exclusively. It watches the [`PlaybackCue`]
//! published by the [`QueueController`], starts narration for each new
//! current entry and reports completions back with
//! [`QueueController::complete`], which ignores stale ids. At most one
//! utterance is in flight at any time.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::engine::{NarrationEngine, SpeechCompletion, SpeechOutcome, Utterance};
use super::settings::PlaybackSettings;
use crate::events::{EventEmitter, PlaybackEvent};
use crate::queue::{EntryId, PlaybackCue, QueueController, QueueEntry};
use crate::utils::now_millis;

struct ActiveUtterance {
    entry_id: EntryId,
    completion: SpeechCompletion,
    paused: bool,
}

async fn next_outcome(active: &mut Option<ActiveUtterance>) -> SpeechOutcome {
    match active {
        Some(active) => (&mut active.completion).await,
        None => std::future::pending().await,
    }
}

/// Connects the queue to a [`NarrationEngine`].
pub struct PlaybackDriver {
    controller: Arc<QueueController>,
    engine: Arc<dyn NarrationEngine>,
    emitter: Arc<dyn EventEmitter>,
}

impl PlaybackDriver {
    pub fn new(
        controller: Arc<QueueController>,
        engine: Arc<dyn NarrationEngine>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            controller,
            engine,
            emitter,
        }
    }

    /// Runs until `cancel` fires. Any in-flight utterance is cancelled on exit.
    pub async fn run(self, cancel: CancellationToken) {
        let mut cue_rx = self.controller.subscribe_cue();
        let mut active: Option<ActiveUtterance> = None;
        log::info!("[Playback] Driver started with {} engine", self.engine.name());

        let cue = cue_rx.borrow_and_update().clone();
        self.reconcile(&mut active, &cue).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                changed = cue_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let cue = cue_rx.borrow_and_update().clone();
                    self.reconcile(&mut active, &cue).await;
                }

                outcome = next_outcome(&mut active) => {
                    let Some(done) = active.take() else { continue };
                    match outcome {
                        SpeechOutcome::Finished => {
                            self.emitter.emit_playback(PlaybackEvent::Finished {
                                entry_id: done.entry_id,
                                timestamp: now_millis(),
                            });
                            self.controller.complete(done.entry_id);
                        }
                        SpeechOutcome::Cancelled => {
                            log::debug!("[Playback] {} cancelled by the engine", done.entry_id);
                        }
                    }
                }
            }
        }

        if let Some(active) = active.take() {
            self.stop(active);
        }
        log::info!("[Playback] Driver stopped");
    }

    /// Brings the engine in line with the cue.
    async fn reconcile(&self, active: &mut Option<ActiveUtterance>, cue: &PlaybackCue) {
        let target = cue.current_id();

        if active.as_ref().is_some_and(|a| Some(a.entry_id) != target) {
            if let Some(stale) = active.take() {
                self.stop(stale);
            }
        }

        let Some(entry) = &cue.current else {
            return;
        };

        let start = match active.as_mut() {
            None => !cue.paused,
            Some(current) if cue.paused && !current.paused => {
                self.engine.pause();
                current.paused = true;
                log::debug!("[Playback] Paused {}", current.entry_id);
                false
            }
            Some(current) if !cue.paused && current.paused => {
                if self.engine.resume() {
                    current.paused = false;
                    log::debug!("[Playback] Resumed {}", current.entry_id);
                    false
                } else {
                    log::debug!(
                        "[Playback] {} engine cannot resume, restarting {}",
                        self.engine.name(),
                        current.entry_id
                    );
                    self.engine.cancel();
                    true
                }
            }
            Some(_) => false,
        };

        if start {
            *active = self.start(entry, &cue.settings).await;
        }
    }

    fn stop(&self, active: ActiveUtterance) {
        self.engine.cancel();
        self.emitter.emit_playback(PlaybackEvent::Cancelled {
            entry_id: active.entry_id,
            timestamp: now_millis(),
        });
    }

    async fn start(
        &self,
        entry: &QueueEntry,
        settings: &PlaybackSettings,
    ) -> Option<ActiveUtterance> {
        let voice_id = self.resolve_voice(settings);
        let utterance = Utterance {
            text: entry.message.narration_text(settings.include_username),
            voice_id: voice_id.clone(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        };

        match self.engine.speak(utterance).await {
            Ok(completion) => {
                log::debug!("[Playback] Speaking {}", entry.id);
                self.emitter.emit_playback(PlaybackEvent::Started {
                    entry_id: entry.id,
                    voice_id,
                    timestamp: now_millis(),
                });
                Some(ActiveUtterance {
                    entry_id: entry.id,
                    completion,
                    paused: false,
                })
            }
            Err(e) => {
                log::warn!("[Playback] Skipping {}: {}", entry.id, e);
                self.emitter.emit_playback(PlaybackEvent::Failed {
                    entry_id: entry.id,
                    error: e.to_string(),
                    timestamp: now_millis(),
                });
                self.controller.complete(entry.id);
                None
            }
        }
    }

    /// Picks the voice whose id or name matches the setting, then any voice
    /// for the preferred language. `None` leaves the choice to the engine.
    fn resolve_voice(&self, settings: &PlaybackSettings) -> Option<String> {
        let voices = self.engine.voices();
        if !settings.voice.is_empty() {
            if let Some(voice) = voices
                .iter()
                .find(|v| v.id == settings.voice || v.name == settings.voice)
            {
                return Some(voice.id.clone());
            }
        }
        voices
            .iter()
            .find(|v| v.language.eq_ignore_ascii_case(&settings.language))
            .map(|v| v.id.clone())
    }
}
