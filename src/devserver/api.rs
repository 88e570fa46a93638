use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;

use super::store::{GigStore, StoreError};
use super::ws::{self, Hub};
use crate::gigs::models::MANAGER_USER_ID;
use crate::gigs::{GigList, GigPatch, GigSeed};

// ── Shared application state ──────────────────────────────────────────

pub struct DevState {
    pub store: Mutex<GigStore>,
    pub hub: Hub,
}

pub type SharedState = Arc<DevState>;

impl DevState {
    pub fn new(gents: Vec<String>) -> Self {
        Self {
            store: Mutex::new(GigStore::new(gents)),
            hub: Hub::default(),
        }
    }

    fn store(&self) -> MutexGuard<'_, GigStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Deserialize)]
pub struct AssignGentRequest {
    pub gent_id: String,
    pub assigned: bool,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::GigNotFound | StoreError::UnknownGent => ApiError::NotFound(e.to_string()),
            StoreError::InvalidEmail => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({"detail": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/gigs", get(list_gigs).post(create_gig))
        .route("/gigs/{id}", patch(update_gig).delete(delete_gig))
        .route("/gigs/{id}/assign", post(assign_gent))
        .route("/manager/gigs", get(manager_gigs))
        .route("/gent/{gent_id}/gigs", get(gent_gigs))
        .route("/gent/{gent_id}/state", get(gent_state))
        .route("/ws", get(ws::ws_handler))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn list_gigs(State(state): State<SharedState>) -> Json<GigList> {
    Json(GigList {
        gigs: state.store().manager_gigs(),
    })
}

async fn manager_gigs(state: State<SharedState>) -> Json<GigList> {
    list_gigs(state).await
}

async fn gent_gigs(
    State(state): State<SharedState>,
    Path(gent_id): Path<String>,
) -> Result<Json<GigList>, ApiError> {
    let gigs = state.store().gent_gigs(&gent_id)?;
    Ok(Json(GigList { gigs }))
}

async fn gent_state(
    State(state): State<SharedState>,
    Path(gent_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let gent_state = state.store().gent_state(&gent_id)?;
    Ok(Json(gent_state))
}

async fn create_gig(
    State(state): State<SharedState>,
    Json(seed): Json<GigSeed>,
) -> Result<impl IntoResponse, ApiError> {
    let gig = state.store().create(seed)?;
    tracing::info!(id = %gig.id, "gig created");
    state.hub.notify_gigs_changed([MANAGER_USER_ID]);
    Ok((StatusCode::CREATED, Json(gig)))
}

async fn update_gig(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<GigPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let (gig, gents) = state.store().update(&id, patch)?;
    tracing::info!(%id, notified = gents.len(), "gig updated");
    state.hub.notify_gigs_changed(&gents);
    state.hub.notify_gigs_changed([MANAGER_USER_ID]);
    Ok(Json(gig))
}

async fn assign_gent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<AssignGentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (assignment, changed) = state.store().assign(&id, &req.gent_id, req.assigned)?;
    if changed {
        tracing::info!(%id, gent = %req.gent_id, assigned = req.assigned, "assignment changed");
        state
            .hub
            .notify_gigs_changed([req.gent_id.as_str(), MANAGER_USER_ID]);
    }
    Ok(Json(assignment))
}

async fn delete_gig(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let gents = state.store().delete(&id)?;
    tracing::info!(%id, "gig deleted");
    state.hub.notify_gigs_changed(&gents);
    state.hub.notify_gigs_changed([MANAGER_USER_ID]);
    Ok(StatusCode::NO_CONTENT)
}
