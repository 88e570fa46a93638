use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::DevState;
use crate::realtime::PushFrame;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-user fan-out of push frames.
///
/// Each `user_id` gets its own broadcast channel; every socket opened with
/// that id subscribes to it.
#[derive(Default)]
pub struct Hub {
    users: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl Hub {
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<String> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }

    /// Forget `user_id` once its last socket has gone.
    ///
    /// Called after a socket's receiver is dropped; a user that still has open
    /// sockets, or that re-subscribed in the meantime, is kept.
    pub fn release(&self, user_id: &str) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.get(user_id).is_some_and(|tx| tx.receiver_count() == 0) {
            users.remove(user_id);
            tracing::debug!(user_id, "released idle push user");
        }
    }

    /// Number of users with a live broadcast channel.
    pub fn user_count(&self) -> usize {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of open sockets for `user_id`.
    pub fn connection_count(&self, user_id: &str) -> usize {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.get(user_id).map_or(0, |tx| tx.receiver_count())
    }

    /// Send `frame` to every socket of `user_id`. Silent if none are open.
    pub fn send(&self, user_id: &str, frame: &PushFrame) {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize push frame");
                return;
            }
        };
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = users.get(user_id) {
            let delivered = tx.send(json).unwrap_or(0);
            tracing::debug!(user_id, delivered, ?frame, "push frame sent");
        }
    }

    /// Tell each listed user that their gigs changed.
    pub fn notify_gigs_changed<I, S>(&self, users: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for user in users {
            self.send(user.as_ref(), &PushFrame::GigsChanged);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<String>,
}

/// `GET /ws?user_id=...`. Sockets without a `user_id` are refused.
///
/// The subscription is taken before the upgrade completes, so a frame sent
/// right after the client sees the handshake is not lost.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<DevState>>,
) -> Response {
    let Some(user_id) = params.user_id.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "user_id is required").into_response();
    };
    let rx = state.hub.subscribe(&user_id);
    tracing::info!(%user_id, "ws connected");
    ws.on_upgrade(move |socket| async move {
        let (sender, receiver) = socket.split();
        let exit = run_socket_loop(&user_id, sender, receiver, rx).await;
        state.hub.release(&user_id);
        tracing::info!(%user_id, ?exit, "ws disconnected");
    })
}

/// Why a push socket stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketExit {
    /// Client sent Close or the stream ended
    ClientClosed,
    /// No Pong within [`PONG_TIMEOUT`] of a Ping
    PongTimeout,
    /// Writing a frame to the socket failed
    SendFailed,
    /// Reading from the socket failed
    ReadFailed,
    /// The user's broadcast sender was dropped
    HubClosed,
}

/// Forward `user_id`'s push frames to one socket until it goes away.
///
/// Pings every [`PING_INTERVAL`]; a Ping left unanswered for [`PONG_TIMEOUT`]
/// ends the socket. Client messages are drained and ignored, since the push
/// protocol is one-way. A client that lags behind the broadcast buffer is
/// sent a single `gigs_changed` in place of the frames it missed, which is
/// enough for it to refetch.
async fn run_socket_loop(
    user_id: &str,
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) -> SocketExit {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    let mut pong_deadline: Option<Instant> = None;
    let mut delivered = 0usize;

    let exit = loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if pong_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    tracing::warn!(user_id, "no pong from push client, dropping socket");
                    break SocketExit::PongTimeout;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break SocketExit::SendFailed;
                }
                pong_deadline.get_or_insert_with(|| Instant::now() + PONG_TIMEOUT);
            }

            result = rx.recv() => {
                let frame = match result {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Closed) => break SocketExit::HubClosed,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(user_id, missed, "push client lagged, collapsing to one refresh");
                        match serde_json::to_string(&PushFrame::GigsChanged) {
                            Ok(frame) => frame,
                            Err(_) => continue,
                        }
                    }
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break SocketExit::SendFailed;
                }
                delivered += 1;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => pong_deadline = None,
                    Some(Ok(Message::Close(_))) | None => break SocketExit::ClientClosed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(user_id, error = %e, "push socket read failed");
                        break SocketExit::ReadFailed;
                    }
                }
            }
        }
    };

    if exit != SocketExit::ClientClosed {
        let _ = sender.send(Message::Close(None)).await;
    }
    tracing::debug!(user_id, delivered, ?exit, "push socket finished");
    exit
}
