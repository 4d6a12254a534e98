//! User commands against the narration queue.
//!
//! Each [`ControlCommand`] maps onto exactly one [`QueueController`]
//! operation. Execution is synchronous and performs no I/O; the playback
//! driver reacts to the resulting cue change on its own.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::playback::{PlaybackSettings, PlaybackSettingsPatch};
use crate::queue::{EntryId, ForwardOutcome, QueueController};

/// A user-issued queue command.
///
/// Wire form: `{"type": "SKIP"}`, `{"type": "REPLAY", "payload": 3}`,
/// `{"type": "FORWARD_TO", "payload": {"id": 3, "interrupt": true}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    Pause,
    Resume,
    TogglePause,
    Skip,
    Replay(EntryId),
    ReplayCurrent,
    Remove(EntryId),
    Clear,
    ForwardTo {
        id: EntryId,
        #[serde(default)]
        interrupt: bool,
    },
    UpdateSettings(PlaybackSettingsPatch),
}

/// Result of a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "camelCase")]
pub enum ControlOutcome {
    /// The queue changed.
    Applied,
    /// Valid command with nothing to act on (e.g. skip while idle).
    Unchanged,
    /// The referenced entry does not exist where the command needs it.
    NotFound,
    /// Refused because narration is in progress.
    Rejected,
    /// A duplicate entry was queued.
    Queued(EntryId),
    /// Pause flag after the command.
    Paused(bool),
    /// Settings after the command.
    Settings(PlaybackSettings),
}

impl ControlOutcome {
    fn from_change(changed: bool) -> Self {
        if changed {
            Self::Applied
        } else {
            Self::Unchanged
        }
    }

    fn from_lookup(found: bool) -> Self {
        if found {
            Self::Applied
        } else {
            Self::NotFound
        }
    }
}

/// Executes control commands against a [`QueueController`].
#[derive(Clone)]
pub struct ControlSurface {
    controller: Arc<QueueController>,
}

impl ControlSurface {
    pub fn new(controller: Arc<QueueController>) -> Self {
        Self { controller }
    }

    pub fn execute(&self, command: ControlCommand) -> ControlOutcome {
        log::debug!("[Control] {:?}", command);
        match command {
            ControlCommand::Pause => {
                self.controller.set_paused(true);
                ControlOutcome::Paused(true)
            }
            ControlCommand::Resume => {
                self.controller.set_paused(false);
                ControlOutcome::Paused(false)
            }
            ControlCommand::TogglePause => ControlOutcome::Paused(self.controller.toggle_pause()),
            ControlCommand::Skip => ControlOutcome::from_change(self.controller.skip()),
            ControlCommand::Replay(id) => ControlOutcome::from_lookup(self.controller.replay(id)),
            ControlCommand::ReplayCurrent => match self.controller.replay_current() {
                Some(id) => ControlOutcome::Queued(id),
                None => ControlOutcome::Unchanged,
            },
            ControlCommand::Remove(id) => ControlOutcome::from_lookup(self.controller.remove(id)),
            ControlCommand::Clear => {
                self.controller.clear();
                ControlOutcome::Applied
            }
            ControlCommand::ForwardTo { id, interrupt } => {
                match self.controller.forward_to(id, interrupt) {
                    ForwardOutcome::Forwarded => ControlOutcome::Applied,
                    ForwardOutcome::Rejected => ControlOutcome::Rejected,
                    ForwardOutcome::NotFound => ControlOutcome::NotFound,
                }
            }
            ControlCommand::UpdateSettings(patch) => {
                ControlOutcome::Settings(self.controller.update_settings(patch))
            }
        }
    }
}
