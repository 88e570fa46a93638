//! Push channel client.
//!
//! ## Contract
//!
//! - At most one live connection per [`RealtimeChannel`]. `connect()` closes
//!   the current connection and waits for its receive loop to exit before the
//!   new handshake starts, so two connections never overlap.
//! - Exactly one change callback. `on_changed()` replaces whatever was
//!   registered before; there is no fan-out.
//! - The channel never returns errors. Handshake failures, malformed frames
//!   and dropped connections are logged and end in `ChannelStatus::Closed`.
//!   Nothing reconnects until the next explicit `connect()`.
//! - Every connection carries a generation number. A receive loop only
//!   invokes the callback while its generation is current, so frames from a
//!   superseded identity are never delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::frame::PushFrame;
use crate::errors::SyncError;
use crate::gigs::Identity;

/// How long a WebSocket handshake may take before the attempt is abandoned.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for an old receive loop to wind down before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback fired on every `gigs_changed` frame.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle of the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Never connected, or explicitly disconnected
    Idle,
    /// Handshake in progress
    Connecting,
    /// Receive loop running
    Open,
    /// Handshake failed or the server went away
    Closed,
}

/// State shared between the channel handle and its receive loop.
struct Shared {
    callback: RwLock<Option<ChangeCallback>>,
    generation: AtomicU64,
    status: watch::Sender<ChannelStatus>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_status(&self, generation: u64, status: ChannelStatus) {
        if self.is_current(generation) {
            self.status.send_replace(status);
        }
    }

    fn handle_text(&self, generation: u64, identity: &Identity, text: &str) {
        let Some(frame) = PushFrame::parse(text) else {
            return;
        };
        if !frame.is_gigs_changed() {
            tracing::debug!(%identity, ?frame, "ignoring push frame");
            return;
        }
        if !self.is_current(generation) {
            tracing::debug!(%identity, generation, "dropping frame from superseded connection");
            return;
        }
        // Clone out of the lock so the callback may re-register itself.
        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                tracing::debug!(%identity, "gigs changed");
                callback();
            }
            None => tracing::debug!(%identity, "gigs changed, no callback registered"),
        }
    }
}

/// A live connection: its identity and the handle of its receive loop.
struct Connection {
    identity: Identity,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Connection {
    async fn close(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            tracing::warn!(identity = %self.identity, "push receive loop did not stop in time, aborting");
            self.task.abort();
        }
    }
}

/// Push-notification channel bound to one identity at a time.
pub struct RealtimeChannel {
    base_url: Url,
    shared: Arc<Shared>,
    active: Mutex<Option<Connection>>,
}

impl RealtimeChannel {
    /// Create an idle channel for the backend at `base_url` (http or https).
    pub fn new(base_url: Url) -> Self {
        let (status, _) = watch::channel(ChannelStatus::Idle);
        Self {
            base_url,
            shared: Arc::new(Shared {
                callback: RwLock::new(None),
                generation: AtomicU64::new(0),
                status,
            }),
            active: Mutex::new(None),
        }
    }

    /// Register the change callback, replacing any previous one.
    pub fn on_changed<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Observe the connection lifecycle.
    pub fn status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Identity of the connection that is currently held, if any.
    pub async fn identity(&self) -> Option<Identity> {
        self.active.lock().await.as_ref().map(|c| c.identity.clone())
    }

    /// Close any existing connection, then connect as `identity`.
    ///
    /// Returns once the handshake has succeeded or failed; the receive loop
    /// keeps running in the background until the connection ends.
    pub async fn connect(&self, identity: Identity) -> ChannelStatus {
        let mut active = self.active.lock().await;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = active.take() {
            tracing::info!(from = %old.identity, to = %identity, "switching push channel identity");
            old.close().await;
        }

        self.shared.set_status(generation, ChannelStatus::Connecting);
        let stream = match self.handshake(&identity).await {
            Ok(stream) => stream,
            Err(message) => {
                tracing::warn!(%identity, error = %message, "push channel connect failed");
                self.shared.set_status(generation, ChannelStatus::Closed);
                return ChannelStatus::Closed;
            }
        };
        tracing::info!(%identity, "push channel connected");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shared.set_status(generation, ChannelStatus::Open);
        let task = tokio::spawn(receive_loop(
            stream,
            identity.clone(),
            generation,
            self.shared.clone(),
            shutdown_rx,
        ));
        *active = Some(Connection {
            identity,
            shutdown: Some(shutdown_tx),
            task,
        });
        ChannelStatus::Open
    }

    /// Close the current connection, if any, and go idle.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = active.take() {
            tracing::info!(identity = %old.identity, "push channel disconnected");
            old.close().await;
        }
        self.shared.set_status(generation, ChannelStatus::Idle);
    }

    async fn handshake(&self, identity: &Identity) -> Result<WsStream, String> {
        let url = ws_url(&self.base_url, identity).map_err(|e| e.to_string())?;
        tracing::debug!(url = %url, "opening push channel");
        match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
            .await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("handshake timed out after {:?}", CONNECT_TIMEOUT)),
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.try_lock()
            && let Some(conn) = active.take()
        {
            conn.task.abort();
        }
    }
}

/// Read frames until the server closes, the stream errors, or we are told to
/// shut down. Each iteration re-arms the read for the next frame.
async fn receive_loop(
    mut stream: WsStream,
    identity: Identity,
    generation: u64,
    shared: Arc<Shared>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = stream.close(None).await;
                return;
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        shared.handle_text(generation, &identity, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Binary, ping and pong frames carry nothing for us.
                    }
                    Some(Err(e)) => {
                        tracing::debug!(%identity, error = %e, "push channel read failed");
                        break;
                    }
                }
            }
        }
    }
    tracing::info!(%identity, "push channel closed by server");
    shared.set_status(generation, ChannelStatus::Closed);
}

/// `ws[s]://host/.../ws?user_id=<identity>` for an http(s) base URL.
pub fn ws_url(base_url: &Url, identity: &Identity) -> Result<Url, SyncError> {
    let mut url = base_url.clone();
    let scheme = match base_url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| SyncError::InvalidUrl(base_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| SyncError::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .push("ws");
    url.query_pairs_mut()
        .clear()
        .append_pair("user_id", identity.user_id());
    url.set_fragment(None);
    Ok(url)
}
