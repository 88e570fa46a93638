//! Client-side synchronization: the per-screen controller and the selection
//! rule it applies after every change.

pub mod controller;
pub mod selection;

pub use controller::{GigsView, RefreshOutcome, SaveOutcome, SavedHook, SyncController};
pub use selection::{SelectionOutcome, reconcile_selection};
