//! Voice parameters applied to every utterance.

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_LANGUAGE, PITCH_RANGE, RATE_RANGE, VOLUME_RANGE};
use crate::utils::clamp_to;

/// Narration settings.
///
/// Values outside the allowed ranges are clamped by [`normalize`](Self::normalize)
/// and [`apply`](Self::apply); a stored `PlaybackSettings` is always in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackSettings {
    /// Voice id or name. Empty selects the engine default.
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// Prefix utterances with "{username}: ".
    pub include_username: bool,
    /// Preferred locale when no voice matches.
    pub language: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            voice: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            include_username: true,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl PlaybackSettings {
    /// Clamps numeric parameters into their allowed ranges.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.rate = clamp_to(self.rate, &RATE_RANGE);
        self.pitch = clamp_to(self.pitch, &PITCH_RANGE);
        self.volume = clamp_to(self.volume, &VOLUME_RANGE);
        self
    }

    /// Applies a partial update. Returns true if anything changed.
    pub fn apply(&mut self, patch: PlaybackSettingsPatch) -> bool {
        let mut next = self.clone();
        if let Some(voice) = patch.voice {
            next.voice = voice;
        }
        if let Some(rate) = patch.rate {
            next.rate = rate;
        }
        if let Some(pitch) = patch.pitch {
            next.pitch = pitch;
        }
        if let Some(volume) = patch.volume {
            next.volume = volume;
        }
        if let Some(include_username) = patch.include_username {
            next.include_username = include_username;
        }
        if let Some(language) = patch.language {
            next.language = language;
        }
        let next = next.normalize();
        if next == *self {
            return false;
        }
        *self = next;
        true
    }
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_username: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut settings = PlaybackSettings::default();
        settings.apply(PlaybackSettingsPatch {
            rate: Some(5.0),
            pitch: Some(0.0),
            volume: Some(-1.0),
            ..Default::default()
        });
        assert_eq!(settings.rate, 2.0);
        assert_eq!(settings.pitch, 0.2);
        assert_eq!(settings.volume, 0.2);
    }

    #[test]
    fn apply_reports_changes_only() {
        let mut settings = PlaybackSettings::default();
        assert!(!settings.apply(PlaybackSettingsPatch::default()));
        assert!(settings.apply(PlaybackSettingsPatch {
            voice: Some("Samantha".to_string()),
            ..Default::default()
        }));
        assert!(!settings.apply(PlaybackSettingsPatch {
            voice: Some("Samantha".to_string()),
            ..Default::default()
        }));
        // clamps to the value already stored
        settings.rate = 2.0;
        assert!(!settings.apply(PlaybackSettingsPatch {
            rate: Some(9.0),
            ..Default::default()
        }));
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let settings: PlaybackSettings =
            serde_json::from_str(r#"{"rate": 1.5, "includeUsername": false}"#).unwrap();
        assert_eq!(settings.rate, 1.5);
        assert!(!settings.include_username);
        assert_eq!(settings.language, "en-US");
        assert_eq!(settings.volume, 1.0);
    }
}
