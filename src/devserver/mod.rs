//! In-memory development backend.
//!
//! Implements the REST and push contract the client syncs against, so the
//! CLI and the integration tests can run without a real server.
//!
//! ```text
//! ┌──────────────┐   REST   ┌──────────────────────────────────────────┐
//! │  GigClient   │ ───────> │  api.rs   (axum Router, DevState)        │
//! │              │          │    └─ store.rs  (GigStore, assignments)  │
//! │ RealtimeChan │ <─────── │  ws.rs    (Hub: per-user broadcast)      │
//! └──────────────┘    WS    └──────────────────────────────────────────┘
//! ```
//!
//! Mutations notify over `/ws`: a patch tells every assigned gent, an
//! assignment change tells that gent, and create/patch/assign/delete all tell
//! `manager` sockets.
//!
//! ## Usage
//!
//! ```no_run
//! use gigsync::devserver::DevServer;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = DevServer::new(vec!["gent-1".into(), "gent-2".into()]);
//! let base_url = server.start().await?;
//! // Point a GigClient / RealtimeChannel at base_url...
//! server.stop();
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod store;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

pub use api::{DevState, SharedState};

/// Build the full router over `state`.
pub fn build_router(state: SharedState, dev_cors: bool) -> Router {
    let app = api::api_router().with_state(state);
    if dev_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// A dev backend running on a background task.
pub struct DevServer {
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: Option<SocketAddr>,
}

impl DevServer {
    pub fn new(gents: Vec<String>) -> Self {
        Self {
            state: Arc::new(DevState::new(gents)),
            shutdown_tx: None,
            addr: None,
        }
    }

    /// Start on a dynamic localhost port. Returns the base URL.
    pub async fn start(&mut self) -> Result<String> {
        self.start_on("127.0.0.1:0", false).await
    }

    /// Start on `bind_addr`, optionally with permissive CORS.
    pub async fn start_on(&mut self, bind_addr: &str, dev_cors: bool) -> Result<String> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind dev server to {}", bind_addr))?;
        let addr = listener
            .local_addr()
            .context("Failed to get server address")?;
        self.addr = Some(addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = build_router(self.state.clone(), dev_cors);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %e, "dev server error");
            }
        });

        tracing::info!(%addr, "dev server listening");
        Ok(format!("http://{}", addr))
    }

    /// Signal the server to shut down.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.addr = None;
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn base_url(&self) -> Option<String> {
        self.addr.map(|addr| format!("http://{}", addr))
    }

    /// Shared state, for inspecting connections or seeding data.
    pub fn state(&self) -> &SharedState {
        &self.state
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run a dev backend in the foreground until Ctrl+C.
pub async fn serve(port: u16, gents: Vec<String>, dev_cors: bool) -> Result<()> {
    let host = if dev_cors { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;

    let state = Arc::new(DevState::new(gents));
    let app = build_router(state, dev_cors);
    println!("gigsync dev backend running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    println!("\nShutting down...");
}
