//! Per-screen sync controller.
//!
//! A `SyncController` is the only owner of a screen's gig state: the
//! collection, the selected gig, the pending-edit flag, edit mode and the
//! save error. Surfaces read it through [`SyncController::subscribe`] and
//! change it only through `refresh`, `create`, `save`, `open` and the edit
//! helpers.
//!
//! ## Update context
//!
//! All mutations happen synchronously under one mutex and are published as a
//! whole [`GigsView`] snapshot on a `watch` channel. Network calls run
//! outside the lock; their results either replace state completely or are
//! dropped.
//!
//! ## Stale responses
//!
//! Each `refresh` takes a sequence number when it is issued. A response is
//! applied only if nothing newer has been applied since: neither a refresh
//! issued later nor a create/save that completed after it was issued. The
//! slower of two racing refreshes is therefore discarded instead of
//! overwriting fresher state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::watch;

use super::selection::{SelectionOutcome, reconcile_selection, retain_if_present};
use crate::errors::SyncError;
use crate::gigs::models::{find_gig, prepend_gig, replace_gig};
use crate::gigs::{Gig, GigPatch, GigRepository, GigSeed, Identity};
use crate::realtime::{ChannelStatus, RealtimeChannel};

/// Called with the server's copy after a successful save.
pub type SavedHook = Arc<dyn Fn(&Gig) + Send + Sync>;

/// Snapshot of a screen's state, as observed by surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GigsView {
    /// Server order, except a just-created gig sits at the front.
    pub gigs: Vec<Gig>,
    pub selection: Option<Gig>,
    /// Gig that should open straight into edit mode.
    pub pending_edit: Option<String>,
    /// Gig currently in edit mode.
    pub editing: Option<String>,
    /// User-visible message from the last failed save.
    pub error: Option<String>,
    /// At least one refresh has been applied for the current scope.
    pub loaded: bool,
}

impl GigsView {
    pub fn selected_id(&self) -> Option<&str> {
        self.selection.as_ref().map(|g| g.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&Gig> {
        find_gig(&self.gigs, id)
    }

    pub fn is_editing(&self, id: &str) -> bool {
        self.editing.as_deref() == Some(id)
    }
}

/// What a `refresh` did with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied,
    /// Newer state was already in place; the response was discarded.
    Stale,
}

/// What a `save` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing differed from the server copy; no request was sent.
    Unchanged,
    /// The server accepted the patch and returned this copy.
    Saved(Gig),
}

struct State {
    scope: Identity,
    view: GigsView,
    /// Sequence number of the newest state applied.
    applied_seq: u64,
}

/// Orchestrates one screen's gig list against a repository and push channel.
pub struct SyncController {
    repo: Arc<dyn GigRepository>,
    channel: Option<RealtimeChannel>,
    placeholder_email: String,
    state: Mutex<State>,
    issued_seq: AtomicU64,
    view_tx: watch::Sender<GigsView>,
    on_saved: RwLock<Option<SavedHook>>,
}

impl SyncController {
    /// Controller for `scope` without a push channel.
    pub fn new(
        scope: Identity,
        repo: Arc<dyn GigRepository>,
        placeholder_email: impl Into<String>,
    ) -> Self {
        let (view_tx, _) = watch::channel(GigsView::default());
        Self {
            repo,
            channel: None,
            placeholder_email: placeholder_email.into(),
            state: Mutex::new(State {
                scope,
                view: GigsView::default(),
                applied_seq: 0,
            }),
            issued_seq: AtomicU64::new(0),
            view_tx,
            on_saved: RwLock::new(None),
        }
    }

    /// Attach the push channel that `bind` will drive.
    pub fn with_channel(mut self, channel: RealtimeChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn channel(&self) -> Option<&RealtimeChannel> {
        self.channel.as_ref()
    }

    pub fn scope(&self) -> Identity {
        self.state().scope.clone()
    }

    /// Observe state snapshots. The receiver always holds the latest one.
    pub fn subscribe(&self) -> watch::Receiver<GigsView> {
        self.view_tx.subscribe()
    }

    pub fn snapshot(&self) -> GigsView {
        self.state().view.clone()
    }

    /// Register the hook run after each successful save, replacing any
    /// previous hook.
    pub fn on_saved<F>(&self, hook: F)
    where
        F: Fn(&Gig) + Send + Sync + 'static,
    {
        *self
            .on_saved
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Make every successful save trigger a full refresh of this screen.
    pub fn refresh_after_save(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.on_saved(move |_| {
            if let Some(controller) = weak.upgrade() {
                tokio::spawn(async move {
                    let _ = controller.refresh().await;
                });
            }
        });
    }

    // ── Push channel ─────────────────────────────────────────────────

    /// Point this screen at `identity`: reset state if the scope changes,
    /// reconnect the push channel (old connection first torn down), wire its
    /// change signal to `refresh`, and load the list.
    ///
    /// Returns the channel status, or `None` when no channel is attached.
    pub async fn bind(self: &Arc<Self>, identity: Identity) -> Option<ChannelStatus> {
        {
            let mut state = self.state();
            if state.scope != identity {
                tracing::info!(from = %state.scope, to = %identity, "switching sync scope");
                state.scope = identity.clone();
                state.view = GigsView::default();
                state.applied_seq = self.issued_seq.load(Ordering::SeqCst);
                self.publish(&state);
            }
        }

        let status = match &self.channel {
            Some(channel) => {
                let weak = Arc::downgrade(self);
                channel.on_changed(move || {
                    if let Some(controller) = weak.upgrade() {
                        tokio::spawn(async move {
                            let _ = controller.refresh().await;
                        });
                    }
                });
                Some(channel.connect(identity).await)
            }
            None => None,
        };

        let _ = self.refresh().await;
        status
    }

    /// Drop the push connection and stop reacting to change signals.
    pub async fn unbind(&self) {
        if let Some(channel) = &self.channel {
            channel.clear_callback();
            channel.disconnect().await;
        }
    }

    // ── Mutators ─────────────────────────────────────────────────────

    /// Reload the collection for the current scope.
    ///
    /// On failure the state is left exactly as it was; the error is logged
    /// and returned for callers that want to show it.
    pub async fn refresh(&self) -> Result<RefreshOutcome, SyncError> {
        let scope = self.scope();
        let seq = self.issued_seq.fetch_add(1, Ordering::SeqCst) + 1;

        match self.repo.list_gigs(&scope).await {
            Ok(gigs) => Ok(self.apply_refresh(seq, &scope, gigs)),
            Err(e) => {
                tracing::warn!(%scope, error = %e, "refresh failed, keeping current gigs");
                Err(e)
            }
        }
    }

    fn apply_refresh(&self, seq: u64, scope: &Identity, gigs: Vec<Gig>) -> RefreshOutcome {
        let mut state = self.state();
        if state.scope != *scope || seq <= state.applied_seq {
            tracing::debug!(%scope, seq, applied = state.applied_seq, "dropping stale refresh");
            return RefreshOutcome::Stale;
        }
        state.applied_seq = seq;

        let previous = state.view.selected_id().map(str::to_string);
        let SelectionOutcome { selection, .. } =
            reconcile_selection(&gigs, previous.as_deref(), None);
        if previous.is_some() && selection.is_none() {
            tracing::debug!(%scope, id = ?previous, "selected gig left the collection");
        }

        let view = &mut state.view;
        view.selection = selection;
        view.pending_edit = retain_if_present(&gigs, view.pending_edit.take());
        view.editing = retain_if_present(&gigs, view.editing.take());
        if view.editing.is_none() {
            view.error = None;
        }
        view.gigs = gigs;
        view.loaded = true;

        tracing::debug!(%scope, seq, count = state.view.gigs.len(), "applied refresh");
        self.publish(&state);
        RefreshOutcome::Applied
    }

    /// Create a gig from placeholder defaults (today, placeholder client, no
    /// fee) and make it the selection, flagged to open in edit mode.
    pub async fn create(&self) -> Result<Gig, SyncError> {
        self.create_with(GigSeed::for_today(&self.placeholder_email))
            .await
    }

    /// Like [`create`](Self::create) with an explicit seed.
    pub async fn create_with(&self, seed: GigSeed) -> Result<Gig, SyncError> {
        let scope = self.scope();
        let gig = match self.repo.create_gig(&seed).await {
            Ok(gig) => gig,
            Err(e) => {
                tracing::warn!(%scope, error = %e, "create failed");
                return Err(e);
            }
        };

        let mut state = self.state();
        if state.scope != scope {
            tracing::debug!(id = %gig.id, "scope changed during create, not inserting");
            return Ok(gig);
        }
        state.applied_seq = self.issued_seq.load(Ordering::SeqCst);
        prepend_gig(&mut state.view.gigs, gig.clone());
        state.view.selection = Some(gig.clone());
        state.view.pending_edit = Some(gig.id.clone());
        tracing::info!(%scope, id = %gig.id, "created gig");
        self.publish(&state);
        Ok(gig)
    }

    /// Save `edits` to gig `id`.
    ///
    /// Only fields that differ from the last server copy are sent. With no
    /// differences, edit mode ends without a request. On failure the error is
    /// stored in the view and edit mode stays on so the user can retry.
    pub async fn save(&self, id: &str, edits: &GigPatch) -> Result<SaveOutcome, SyncError> {
        let server_copy = self.state().view.get(id).cloned();
        let Some(server_copy) = server_copy else {
            let err = SyncError::GigNotFound { id: id.to_string() };
            let mut state = self.state();
            state.view.error = Some(err.to_string());
            self.publish(&state);
            return Err(err);
        };

        let diff = edits.diff_against(&server_copy);
        if diff.is_empty() {
            let mut state = self.state();
            if state.view.is_editing(id) {
                state.view.editing = None;
            }
            state.view.error = None;
            self.publish(&state);
            tracing::debug!(id, "no changes to save");
            return Ok(SaveOutcome::Unchanged);
        }

        tracing::debug!(id, fields = ?diff.field_names(), "saving gig");
        match self.repo.patch_gig(id, &diff).await {
            Ok(gig) => {
                {
                    let mut state = self.state();
                    state.applied_seq = self.issued_seq.load(Ordering::SeqCst);
                    replace_gig(&mut state.view.gigs, &gig);
                    if state.view.selected_id() == Some(gig.id.as_str()) {
                        state.view.selection = Some(gig.clone());
                    }
                    if state.view.is_editing(id) {
                        state.view.editing = None;
                    }
                    state.view.error = None;
                    self.publish(&state);
                }
                let hook = self
                    .on_saved
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(hook) = hook {
                    hook(&gig);
                }
                Ok(SaveOutcome::Saved(gig))
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "save failed");
                let mut state = self.state();
                state.view.editing = Some(id.to_string());
                state.view.error = Some(format!("Could not save changes: {}", e));
                self.publish(&state);
                Err(e)
            }
        }
    }

    /// Open gig `id` for display.
    ///
    /// Selects the collection's copy (or clears the selection if the gig is
    /// gone). If the gig was flagged on creation, edit mode starts now. The
    /// pending-edit flag is consumed either way.
    pub fn open(&self, id: &str) -> SelectionOutcome {
        let mut state = self.state();
        let outcome = reconcile_selection(
            &state.view.gigs,
            Some(id),
            state.view.pending_edit.as_deref(),
        );
        state.view.selection = outcome.selection.clone();
        state.view.pending_edit = None;
        if outcome.enter_edit {
            state.view.editing = Some(id.to_string());
            state.view.error = None;
        }
        self.publish(&state);
        outcome
    }

    pub fn clear_selection(&self) {
        let mut state = self.state();
        state.view.selection = None;
        self.publish(&state);
    }

    /// Enter edit mode for gig `id`.
    pub fn begin_edit(&self, id: &str) -> Result<(), SyncError> {
        let mut state = self.state();
        if state.view.get(id).is_none() {
            return Err(SyncError::GigNotFound { id: id.to_string() });
        }
        state.view.editing = Some(id.to_string());
        state.view.error = None;
        self.publish(&state);
        Ok(())
    }

    /// Leave edit mode, discarding the error message.
    pub fn cancel_edit(&self) {
        let mut state = self.state();
        state.view.editing = None;
        state.view.error = None;
        self.publish(&state);
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &State) {
        self.view_tx.send_replace(state.view.clone());
    }
}
