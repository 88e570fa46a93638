//! REST client for the gig backend.
//!
//! `GigRepository` is the seam the sync controller talks to; `GigClient` is
//! the HTTP implementation. The client keeps no state beyond its base URL and
//! a pooled `reqwest::Client`, and never retries: a failed call leaves the
//! caller's state untouched.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::models::{AssignRequest, Assignment, GentState, Gig, GigList, GigPatch, GigSeed, Identity};
use crate::config::ServerConfig;
use crate::errors::SyncError;

/// The three calls the sync controller needs from a backend.
#[async_trait]
pub trait GigRepository: Send + Sync {
    /// `GET /manager/gigs` or `GET /gent/{id}/gigs`, depending on scope.
    async fn list_gigs(&self, scope: &Identity) -> Result<Vec<Gig>, SyncError>;

    /// `POST /gigs`. Returns the created gig with its server-assigned id.
    async fn create_gig(&self, seed: &GigSeed) -> Result<Gig, SyncError>;

    /// `PATCH /gigs/{id}` with only the changed fields.
    ///
    /// Callers skip the call entirely when `diff` is empty.
    async fn patch_gig(&self, id: &str, diff: &GigPatch) -> Result<Gig, SyncError>;
}

/// HTTP implementation of [`GigRepository`] plus the auxiliary endpoints.
#[derive(Debug, Clone)]
pub struct GigClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GigClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let base_url = parse_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gigsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SyncError::Network)?;
        Ok(Self { http, base_url })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, SyncError> {
        Self::new(&config.base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST /gigs/{id}/assign`.
    pub async fn assign_gent(
        &self,
        gig_id: &str,
        gent_id: &str,
        assigned: bool,
    ) -> Result<Assignment, SyncError> {
        let body = AssignRequest {
            gent_id: gent_id.to_string(),
            assigned,
        };
        self.call(Method::POST, &["gigs", gig_id, "assign"], Some(&body))
            .await
    }

    /// `GET /gent/{id}/state`: the legacy "red" signal.
    pub async fn gent_state(&self, gent_id: &str) -> Result<GentState, SyncError> {
        self.call::<GentState, ()>(Method::GET, &["gent", gent_id, "state"], None)
            .await
    }

    /// `GET /health`. Any 2xx answer counts as healthy.
    pub async fn health(&self) -> Result<(), SyncError> {
        self.call::<serde_json::Value, ()>(Method::GET, &["health"], None)
            .await
            .map(|_| ())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SyncError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%method, path = url.path(), "sending request");

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(SyncError::Network)?;
        let status = response.status();
        let text = response.text().await.map_err(SyncError::Network)?;
        tracing::debug!(%method, path = url.path(), status = status.as_u16(), "received response");

        if !status.is_success() {
            return Err(SyncError::Http {
                status: status.as_u16(),
                message: error_detail(&text),
            });
        }
        serde_json::from_str(&text).map_err(SyncError::Decode)
    }
}

#[async_trait]
impl GigRepository for GigClient {
    async fn list_gigs(&self, scope: &Identity) -> Result<Vec<Gig>, SyncError> {
        let list: GigList = match scope {
            Identity::Manager => {
                self.call::<_, ()>(Method::GET, &["manager", "gigs"], None)
                    .await?
            }
            Identity::Gent(id) => {
                self.call::<_, ()>(Method::GET, &["gent", id, "gigs"], None)
                    .await?
            }
        };
        Ok(list.gigs)
    }

    async fn create_gig(&self, seed: &GigSeed) -> Result<Gig, SyncError> {
        self.call(Method::POST, &["gigs"], Some(seed)).await
    }

    async fn patch_gig(&self, id: &str, diff: &GigPatch) -> Result<Gig, SyncError> {
        self.call(Method::PATCH, &["gigs", id], Some(diff)).await
    }
}

/// Parse and check a base URL: it must be http(s) and able to carry paths.
pub fn parse_base_url(raw: &str) -> Result<Url, SyncError> {
    let url = Url::parse(raw.trim()).map_err(|e| SyncError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(SyncError::InvalidUrl(format!(
            "{raw}: expected an http:// or https:// URL"
        )));
    }
    Ok(url)
}

/// Pull a human-readable message out of an error body.
///
/// Understands `{"detail": "..."}` and `{"error": "..."}`; falls back to the
/// raw body when it is short plain text.
fn error_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return ["detail", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .map(str::to_string);
    }
    (body.len() <= 200).then(|| body.to_string())
}
