//! Narration through an external speech program (espeak-ng compatible).

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::{
    NarrationEngine, PlaybackError, PlaybackResult, SpeechCompletion, SpeechOutcome, Utterance,
    Voice,
};
use crate::protocol_constants::BASE_WORDS_PER_MINUTE;

/// Default speech program.
pub const DEFAULT_SPEECH_PROGRAM: &str = "espeak-ng";

struct ActiveProcess {
    serial: u64,
    cancel: CancellationToken,
    pid: Option<u32>,
}

/// Speaks by spawning one speech process per utterance.
///
/// Rate maps to words per minute, pitch to the 0-99 scale and volume to
/// amplitude (100 = normal). Cancel kills the process. Pause and resume send
/// `SIGSTOP`/`SIGCONT` on Unix; elsewhere resume is unsupported.
pub struct CommandNarrationEngine {
    program: String,
    voices: Arc<RwLock<Vec<Voice>>>,
    active: Arc<Mutex<Option<ActiveProcess>>>,
    next_serial: AtomicU64,
}

impl CommandNarrationEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            voices: Arc::new(RwLock::new(Vec::new())),
            active: Arc::new(Mutex::new(None)),
            next_serial: AtomicU64::new(0),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Enumerates voices in the background (`<program> --voices`).
    ///
    /// [`voices`](NarrationEngine::voices) returns an empty list until this
    /// completes.
    pub fn start_voice_discovery(&self) -> JoinHandle<()> {
        let program = self.program.clone();
        let voices = Arc::clone(&self.voices);
        tokio::spawn(async move {
            let output = Command::new(&program)
                .arg("--voices")
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => {
                    let parsed = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
                    log::info!("[Playback] {} voices available from {}", parsed.len(), program);
                    *voices.write() = parsed;
                }
                Ok(output) => {
                    log::warn!(
                        "[Playback] {} --voices exited with {}",
                        program,
                        output.status
                    );
                }
                Err(e) => log::warn!("[Playback] Could not list voices from {}: {}", program, e),
            }
        })
    }

    fn build_command(&self, utterance: &Utterance) -> Command {
        let mut command = Command::new(&self.program);
        if let Some(voice) = &utterance.voice_id {
            command.arg("-v").arg(voice);
        }
        command
            .arg("-s")
            .arg(words_per_minute(utterance.rate).to_string())
            .arg("-p")
            .arg(pitch_arg(utterance.pitch).to_string())
            .arg("-a")
            .arg(amplitude_arg(utterance.volume).to_string())
            .arg("--")
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    #[cfg(unix)]
    fn signal_active(&self, signal: libc::c_int) -> bool {
        let guard = self.active.lock();
        let Some(pid) = guard.as_ref().and_then(|a| a.pid) else {
            return false;
        };
        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
        // to a child we spawned and have not yet reaped.
        let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if result != 0 {
            log::debug!(
                "[Playback] kill({}, {}) failed: {}",
                pid,
                signal,
                std::io::Error::last_os_error()
            );
        }
        result == 0
    }
}

fn words_per_minute(rate: f32) -> u32 {
    (BASE_WORDS_PER_MINUTE * rate).round().max(1.0) as u32
}

fn pitch_arg(pitch: f32) -> u32 {
    (pitch * 50.0).round().clamp(0.0, 99.0) as u32
}

fn amplitude_arg(volume: f32) -> u32 {
    (volume * 100.0).round().clamp(0.0, 200.0) as u32
}

/// Parses `espeak-ng --voices` output.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File          Other Languages
///  5  af              --/M      Afrikaans          gmw/af
/// ```
pub fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(Voice {
                id: fields[1].to_string(),
                name: fields[3].replace('_', " "),
                language: fields[1].to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl NarrationEngine for CommandNarrationEngine {
    fn name(&self) -> &'static str {
        "command"
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.read().clone()
    }

    async fn speak(&self, utterance: Utterance) -> PlaybackResult<SpeechCompletion> {
        self.cancel();

        let mut child = self
            .build_command(&utterance)
            .spawn()
            .map_err(|source| PlaybackError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let token = CancellationToken::new();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let (done_tx, completion) = SpeechCompletion::channel();
        *self.active.lock() = Some(ActiveProcess {
            serial,
            cancel: token.clone(),
            pid: child.id(),
        });

        let program = self.program.clone();
        let active = Arc::clone(&self.active);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        if !status.success() {
                            log::warn!("[Playback] {} exited with {}", program, status);
                        }
                        SpeechOutcome::Finished
                    }
                    Err(e) => {
                        log::warn!("[Playback] Waiting on {} failed: {}", program, e);
                        SpeechOutcome::Finished
                    }
                },
                _ = token.cancelled() => {
                    if let Err(e) = child.kill().await {
                        log::debug!("[Playback] Kill failed: {}", e);
                    }
                    SpeechOutcome::Cancelled
                }
            };
            // the pid is reaped now and must not be signalled again
            let mut active = active.lock();
            if active.as_ref().is_some_and(|a| a.serial == serial) {
                *active = None;
            }
            drop(active);
            let _ = done_tx.send(outcome);
        });

        Ok(completion)
    }

    fn cancel(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
        }
    }

    #[cfg(unix)]
    fn pause(&self) {
        self.signal_active(libc::SIGSTOP);
    }

    #[cfg(not(unix))]
    fn pause(&self) {}

    #[cfg(unix)]
    fn resume(&self) -> bool {
        self.signal_active(libc::SIGCONT)
    }

    #[cfg(not(unix))]
    fn resume(&self) -> bool {
        false
    }
}
