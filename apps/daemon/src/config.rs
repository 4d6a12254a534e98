//! Daemon configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatvox_core::{Config, EngineKind, PlaybackSettings};
use serde::Deserialize;

/// Daemon configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// WebSocket URL of the chat event source.
    /// Override: `CHATVOX_URL`
    pub url: String,

    /// Port for the control API.
    /// Override: `CHATVOX_PORT`
    pub port: u16,

    /// Disable to run without the control API.
    pub api_enabled: bool,

    /// Maximum entries tracked by the narration queue.
    /// Override: `CHATVOX_QUEUE_CAPACITY`
    pub queue_capacity: usize,

    /// Narration engine (`command` or `silent`).
    /// Override: `CHATVOX_ENGINE`
    pub engine: EngineKind,

    /// Speech synthesizer used by the command engine.
    /// Override: `CHATVOX_SPEECH_PROGRAM`
    pub speech_program: String,

    /// Reconnect delay bounds (milliseconds).
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,

    /// Initial playback settings; a saved session takes precedence.
    pub playback: PlaybackSettings,

    /// Directory for session snapshots.
    /// Override: `CHATVOX_DATA_DIR` (handled by clap)
    pub data_dir: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let core = Config::default();
        Self {
            url: core.channel_url,
            port: core.api_port,
            api_enabled: core.api_enabled,
            queue_capacity: core.queue_capacity,
            engine: core.engine,
            speech_program: core.speech_program,
            reconnect_base_delay_ms: core.reconnect_base_delay_ms,
            reconnect_max_delay_ms: core.reconnect_max_delay_ms,
            playback: core.playback,
            data_dir: None,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `CHATVOX_*` overrides from `lookup`. Unparseable values are
    /// ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CHATVOX_URL") {
            self.url = url;
        }

        if let Some(val) = lookup("CHATVOX_PORT") {
            match val.parse() {
                Ok(port) => self.port = port,
                Err(_) => log::warn!("Ignoring invalid CHATVOX_PORT: {}", val),
            }
        }

        if let Some(val) = lookup("CHATVOX_QUEUE_CAPACITY") {
            match val.parse() {
                Ok(capacity) => self.queue_capacity = capacity,
                Err(_) => log::warn!("Ignoring invalid CHATVOX_QUEUE_CAPACITY: {}", val),
            }
        }

        if let Some(val) = lookup("CHATVOX_ENGINE") {
            match val.parse() {
                Ok(engine) => self.engine = engine,
                Err(e) => log::warn!("Ignoring CHATVOX_ENGINE: {}", e),
            }
        }

        if let Some(program) = lookup("CHATVOX_SPEECH_PROGRAM") {
            self.speech_program = program;
        }

        // Note: CHATVOX_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to chatvox-core's Config type.
    pub fn to_core_config(&self) -> Config {
        Config {
            channel_url: self.url.clone(),
            api_port: self.port,
            api_enabled: self.api_enabled,
            queue_capacity: self.queue_capacity,
            engine: self.engine,
            speech_program: self.speech_program.clone(),
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
            playback: self.playback.clone(),
            data_dir: self.data_dir.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn yaml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatvox.yaml");
        std::fs::write(
            &path,
            "url: wss://chat.example/ws\nengine: silent\nplayback:\n  rate: 1.5\n",
        )
        .unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.url, "wss://chat.example/ws");
        assert_eq!(config.engine, EngineKind::Silent);
        assert_eq!(config.playback.rate, 1.5);
        assert_eq!(config.queue_capacity, 50);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DaemonConfig::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[test]
    fn env_overrides_apply_and_skip_invalid_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CHATVOX_URL", "ws://10.0.0.2:42069/ws"),
            ("CHATVOX_PORT", "not-a-port"),
            ("CHATVOX_ENGINE", "silent"),
            ("CHATVOX_QUEUE_CAPACITY", "20"),
        ]);
        let mut config = DaemonConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.url, "ws://10.0.0.2:42069/ws");
        assert_eq!(config.port, DaemonConfig::default().port);
        assert_eq!(config.engine, EngineKind::Silent);
        assert_eq!(config.queue_capacity, 20);
    }

    #[test]
    fn core_config_carries_daemon_settings() {
        let config = DaemonConfig {
            port: 5000,
            data_dir: Some("/tmp/chatvox".into()),
            ..Default::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.api_port, 5000);
        assert_eq!(core.data_dir, Some(PathBuf::from("/tmp/chatvox")));
        assert!(core.validate().is_ok());
    }
}
