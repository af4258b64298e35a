//! Live-reload dev server.
//!
//! Serves the output tree over HTTP and pushes [`ReloadEvent`]s to every
//! open page through server-sent events. HTML responses get a small client
//! script injected before `</body>`.
//!
//! The server is an explicit session: a [`DevServer`] is created once,
//! started once and shut down once.
//!
//! ```ignore
//! let reloader = Reloader::new();
//! let mut server = DevServer::new(out_dir, &config.server, reloader.clone());
//! let addr = server.start().await?;
//! reloader.reload();
//! server.shutdown().await?;
//! ```

pub mod client;

use crate::config::ServerConfig;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use client::{inject, CLIENT_JS, CLIENT_PATH, EVENTS_PATH};

/// How long `shutdown` waits for open connections to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Dev server errors.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("dev server is already running")]
    AlreadyStarted,
    #[error("dev server has been shut down")]
    Terminated,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReloadEvent {
    /// Full page refresh
    Reload,
    /// Re-fetch these stylesheets (URL paths) without reloading
    Css { paths: Vec<String> },
    /// Show the error overlay
    Error { message: String },
    /// Hide the error overlay
    ClearError,
}

impl ReloadEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            ReloadEvent::Reload => "reload",
            ReloadEvent::Css { .. } => "css",
            ReloadEvent::Error { .. } => "error",
            ReloadEvent::ClearError => "clear-error",
        }
    }
}

/// URL path of a file relative to the output root.
fn url_path(path: &Path) -> String {
    let parts: Vec<String> =
        path.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    format!("/{}", parts.join("/"))
}

/// Sending half of the reload channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Reloader {
    tx: broadcast::Sender<ReloadEvent>,
}

impl Reloader {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Receive every event sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: ReloadEvent) {
        // No receivers just means no browser is connected.
        let receivers = self.tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(event = event.name(), receivers, "push");
    }

    /// Every connected browser refreshes.
    pub fn reload(&self) {
        self.send(ReloadEvent::Reload);
    }

    /// Push freshly written files (relative to the output root).
    ///
    /// Stylesheets are hot-swapped; any other file forces a full reload.
    /// Source maps are never pushed.
    pub fn stream(&self, paths: &[PathBuf]) {
        let paths: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) != Some("map"))
            .collect();
        if paths.is_empty() {
            return;
        }

        if paths.iter().all(|p| p.extension().and_then(|e| e.to_str()) == Some("css")) {
            self.send(ReloadEvent::Css { paths: paths.iter().map(|p| url_path(p)).collect() });
        } else {
            self.reload();
        }
    }

    /// Show an error overlay.
    pub fn error(&self, message: impl Into<String>) {
        self.send(ReloadEvent::Error { message: message.into() });
    }

    /// Hide the error overlay.
    pub fn clear_error(&self) {
        self.send(ReloadEvent::ClearError);
    }
}

impl Default for Reloader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct AppState {
    reloader: Reloader,
    closing: watch::Receiver<bool>,
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.reloader.subscribe();
    let stream = stream::unfold((rx, state.closing), |(mut rx, mut closing)| async move {
        loop {
            if *closing.borrow() {
                return None;
            }
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        let sse = Event::default().event(event.name()).json_data(&event);
                        return Some((sse, (rx, closing)));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "event stream lagged");
                    }
                    Err(RecvError::Closed) => return None,
                },
                changed = closing.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], CLIENT_JS)
}

/// Inject the client script into successful HTML responses.
async fn inject_client(req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    let is_html = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html || res.status() != StatusCode::OK {
        return res;
    }

    let (mut parts, body) = res.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("failed to buffer HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// HTTP routes: event stream, client script and the output tree.
///
/// Directory requests resolve to their `index.html`.
pub fn router(root: &Path, reloader: Reloader, closing: watch::Receiver<bool>, cors: bool) -> Router {
    let app = Router::new()
        .route(EVENTS_PATH, get(events))
        .route(CLIENT_PATH, get(client_script))
        .with_state(AppState { reloader, closing })
        .fallback_service(ServeDir::new(root).append_index_html_on_directories(true))
        .layer(middleware::from_fn(inject_client))
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Observable lifecycle state of a [`DevServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Serving,
    Terminated,
}

enum Session {
    Uninitialized,
    Serving {
        addr: SocketAddr,
        closing: watch::Sender<bool>,
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<std::io::Result<()>>,
    },
    Terminated,
}

/// The dev server session.
pub struct DevServer {
    root: PathBuf,
    host: String,
    port: u16,
    cors: bool,
    reloader: Reloader,
    session: Session,
}

impl DevServer {
    /// Create an unstarted server for `root`.
    pub fn new(root: PathBuf, config: &ServerConfig, reloader: Reloader) -> Self {
        Self {
            root,
            host: config.host.clone(),
            port: config.port,
            cors: config.cors,
            reloader,
            session: Session::Uninitialized,
        }
    }

    pub fn state(&self) -> ServerState {
        match self.session {
            Session::Uninitialized => ServerState::Uninitialized,
            Session::Serving { .. } => ServerState::Serving,
            Session::Terminated => ServerState::Terminated,
        }
    }

    /// Bound address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.session {
            Session::Serving { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Bind and start serving in the background.
    ///
    /// Fails when called a second time or after shutdown.
    pub async fn start(&mut self) -> Result<SocketAddr, ServeError> {
        match self.session {
            Session::Uninitialized => {}
            Session::Serving { .. } => return Err(ServeError::AlreadyStarted),
            Session::Terminated => return Err(ServeError::Terminated),
        }

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await.map_err(|source| {
            ServeError::Bind { addr: format!("{}:{}", self.host, self.port), source }
        })?;
        let addr = listener.local_addr()?;

        let (closing_tx, closing_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(&self.root, self.reloader.clone(), closing_rx, self.cors);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        tracing::info!("Serving {} at http://{}", self.root.display(), addr);
        self.session =
            Session::Serving { addr, closing: closing_tx, shutdown: shutdown_tx, handle };
        Ok(addr)
    }

    /// Stop accepting connections, close event streams and wait for the
    /// server task to finish. Always leaves the session terminated.
    pub async fn shutdown(&mut self) -> Result<(), ServeError> {
        let session = std::mem::replace(&mut self.session, Session::Terminated);
        let Session::Serving { closing, shutdown, handle, .. } = session else {
            return Ok(());
        };

        let _ = closing.send(true);
        let _ = shutdown.send(());

        match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => tracing::warn!("dev server task failed: {}", join_err),
            Err(_) => tracing::warn!("dev server did not stop within {:?}", SHUTDOWN_GRACE),
        }
        tracing::info!("Dev server stopped");
        Ok(())
    }
}
