//! HTTP/WebSocket control API.
//!
//! Thin handlers over the queue controller, control surface and stores.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::control::ControlSurface;
use crate::events::BroadcastEventBridge;
use crate::ingest::ChannelHandle;
use crate::playback::NarrationEngine;
use crate::queue::QueueController;
use crate::state::Config;
use crate::stores::{NotificationStore, SongRequestStore};

pub mod http;
pub mod response;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve on the TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
///
/// Holds references to the running services; all queue logic lives in
/// [`QueueController`].
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<QueueController>,
    pub control: ControlSurface,
    pub notifications: Arc<NotificationStore>,
    pub songs: Arc<SongRequestStore>,
    /// Ingestion channel state and outbound sends.
    pub channel: ChannelHandle,
    pub engine: Arc<dyn NarrationEngine>,
    /// Event bridge feeding WebSocket clients.
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub config: Arc<Config>,
    /// Closes WebSocket sessions on shutdown.
    pub cancel: CancellationToken,
}

/// Binds the control API listener.
pub async fn bind(port: u16) -> Result<(SocketAddr, TcpListener), ServerError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    Ok((local, listener))
}

/// Whether `origin` is one of the trusted origins.
///
/// Scheme and host must match exactly; a trusted entry without a port accepts
/// any explicit port on that host.
pub(crate) fn origin_allowed(trusted_origins: &[String], origin: &str) -> bool {
    trusted_origins
        .iter()
        .any(|allowed| match origin.strip_prefix(allowed.as_str()) {
            Some("") => true,
            Some(rest) => rest.strip_prefix(':').is_some_and(|port| {
                !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
            }),
            None => false,
        })
}

fn cors_layer(trusted_origins: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| origin_allowed(&trusted_origins, origin))
        }))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(false)
}

/// Serves the control API on `listener` until the state's token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ServerError> {
    let cancel = state.cancel.clone();
    let cors = cors_layer(state.config.trusted_origins.clone());
    let app = http::create_router(state).layer(cors);

    if let Ok(addr) = listener.local_addr() {
        log::info!("[Api] Listening on http://{}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    log::info!("[Api] Server stopped");
    Ok(())
}

/// Binds the configured port and serves the control API.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let (_, listener) = bind(state.config.api_port).await?;
    serve(listener, state).await
}
