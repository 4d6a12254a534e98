//! Narration: voice settings, engines and the driver that feeds them.

mod command_engine;
pub mod driver;
mod engine;
mod settings;

pub use command_engine::{parse_voice_list, CommandNarrationEngine, DEFAULT_SPEECH_PROGRAM};
pub use driver::PlaybackDriver;
pub use engine::{
    NarrationEngine, PlaybackError, PlaybackResult, SilentNarrationEngine, SpeechCompletion,
    SpeechOutcome, Utterance, Voice,
};
pub use settings::{PlaybackSettings, PlaybackSettingsPatch};
