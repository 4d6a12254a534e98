//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root: the single place where all
//! services are instantiated, wired together and their background tasks
//! spawned.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState, ServerError};
use crate::control::ControlSurface;
use crate::error::{ChatvoxError, ChatvoxResult};
use crate::events::{BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::ingest::{ChannelHandle, EventRouter, IngestChannel};
use crate::persistence::{Autosave, SessionStore};
use crate::playback::{
    CommandNarrationEngine, NarrationEngine, PlaybackDriver, SilentNarrationEngine,
};
use crate::queue::QueueController;
use crate::state::{Config, EngineKind};
use crate::stores::{NotificationStore, SongRequestStore};

/// How long shutdown waits for each background task.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Container for all bootstrapped services.
///
/// Background tasks (ingestion, playback driver, autosave, API) are owned
/// here and stopped by [`shutdown`](Self::shutdown).
pub struct BootstrappedServices {
    pub controller: Arc<QueueController>,
    pub control: ControlSurface,
    pub notifications: Arc<NotificationStore>,
    pub songs: Arc<SongRequestStore>,
    /// Ingestion channel state and outbound sends.
    pub channel: ChannelHandle,
    pub engine: Arc<dyn NarrationEngine>,
    /// Event bridge for WebSocket clients and the logging emitter.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Present when a data directory is configured.
    pub session: Option<Arc<SessionStore>>,
    pub config: Arc<Config>,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl BootstrappedServices {
    /// Builds the API state over these services.
    pub fn app_state(&self) -> AppState {
        AppState {
            controller: Arc::clone(&self.controller),
            control: self.control.clone(),
            notifications: Arc::clone(&self.notifications),
            songs: Arc::clone(&self.songs),
            channel: self.channel.clone(),
            engine: Arc::clone(&self.engine),
            event_bridge: Arc::clone(&self.event_bridge),
            config: Arc::clone(&self.config),
            cancel: self.cancel_token.child_token(),
        }
    }

    fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push((name, handle));
    }

    /// Binds the control API and serves it in the background.
    ///
    /// Returns the bound address (useful with port 0).
    pub async fn start_api(&self) -> Result<SocketAddr, ServerError> {
        let (addr, listener) = api::bind(self.config.api_port).await?;
        let state = self.app_state();
        self.track(
            "api",
            tokio::spawn(async move {
                if let Err(e) = api::serve(listener, state).await {
                    log::error!("[Api] Server error: {}", e);
                }
            }),
        );
        Ok(addr)
    }

    /// Initiates graceful shutdown of all services.
    ///
    /// Cancels every task, then waits for each to finish. The autosave task
    /// writes its final snapshot before exiting.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.cancel_token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for (name, handle) in tasks {
            match tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => log::debug!("[Bootstrap] {} stopped", name),
                Ok(Err(e)) => log::warn!("[Bootstrap] {} task failed: {}", name, e),
                Err(_) => log::warn!("[Bootstrap] {} did not stop in time", name),
            }
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

fn create_engine(config: &Config) -> (Arc<dyn NarrationEngine>, Option<JoinHandle<()>>) {
    match config.engine {
        EngineKind::Silent => (Arc::new(SilentNarrationEngine::new()), None),
        EngineKind::Command => {
            let engine = CommandNarrationEngine::new(config.speech_program.clone());
            let discovery = engine.start_voice_discovery();
            (Arc::new(engine), Some(discovery))
        }
    }
}

/// Bootstraps all application services with their dependencies.
///
/// Wiring order:
///
/// 1. Event bridge (with the logging emitter attached)
/// 2. Queue controller, restored from the saved session if any
/// 3. Notification and song request stores
/// 4. Ingestion channel routing into the above
/// 5. Narration engine and playback driver
/// 6. Autosave (when a data directory is configured)
///
/// Must be called from within a Tokio runtime; background tasks start
/// immediately. The control API is started separately with
/// [`BootstrappedServices::start_api`].
///
/// # Errors
///
/// Returns [`ChatvoxError::Configuration`] if the configuration is invalid and
/// [`ChatvoxError::Persistence`] if the data directory cannot be created.
pub fn bootstrap_services(config: Config) -> ChatvoxResult<BootstrappedServices> {
    config.validate().map_err(ChatvoxError::Configuration)?;
    let config = Arc::new(config);
    let cancel_token = CancellationToken::new();

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));
    event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    let emitter: Arc<dyn EventEmitter> = event_bridge.clone();

    let controller = Arc::new(QueueController::new(
        config.queue_capacity,
        config.playback.clone(),
        Arc::clone(&emitter),
    ));

    let session = match &config.data_dir {
        Some(dir) => {
            let store = Arc::new(SessionStore::open(dir)?);
            store.restore_session(&controller);
            log::info!("[Bootstrap] Session snapshots in {}", dir.display());
            Some(store)
        }
        None => None,
    };

    let notifications = Arc::new(NotificationStore::new(config.notification_capacity));
    let songs = Arc::new(SongRequestStore::new(
        config.song_request_capacity,
        Arc::clone(&emitter),
    ));

    let router = Arc::new(EventRouter::new(
        Arc::clone(&controller),
        Arc::clone(&notifications),
        Arc::clone(&songs),
        Arc::clone(&emitter),
    ));
    let (ingest, channel) = IngestChannel::new(
        config.channel_url.clone(),
        config.backoff(),
        router,
        Arc::clone(&emitter),
    );

    let (engine, voice_discovery) = create_engine(&config);
    let driver = PlaybackDriver::new(
        Arc::clone(&controller),
        Arc::clone(&engine),
        Arc::clone(&emitter),
    );

    let services = BootstrappedServices {
        control: ControlSurface::new(Arc::clone(&controller)),
        controller,
        notifications,
        songs,
        channel,
        engine,
        event_bridge,
        session,
        config,
        cancel_token,
        tasks: Mutex::new(Vec::new()),
    };

    services.track(
        "playback",
        tokio::spawn(driver.run(services.cancel_token.child_token())),
    );
    services.track(
        "ingest",
        tokio::spawn(ingest.run(services.cancel_token.child_token())),
    );
    if let Some(handle) = voice_discovery {
        services.track("voices", handle);
    }
    if let Some(store) = &services.session {
        let autosave = Autosave::new(
            Arc::clone(store),
            Arc::clone(&services.controller),
            services.channel.subscribe_state(),
            services.config.channel_url.clone(),
            services.config.autosave_debounce(),
        );
        services.track(
            "autosave",
            tokio::spawn(autosave.run(services.cancel_token.child_token())),
        );
    }

    log::info!(
        "[Bootstrap] Services started (engine: {}, queue capacity: {})",
        services.engine.name(),
        services.config.queue_capacity
    );
    Ok(services)
}
