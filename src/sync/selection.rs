//! Selection consistency after the collection changes underneath a screen.

use crate::gigs::Gig;
use crate::gigs::models::find_gig;

/// Result of reconciling a selection against a fresh collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// The fresh copy of the selected gig, or `None` if it disappeared.
    pub selection: Option<Gig>,
    /// The selected gig was flagged for edit on creation and is being opened.
    pub enter_edit: bool,
}

/// Reconcile `previous` (a gig id) against `collection`.
///
/// - A selection whose id is absent is cleared; the gig was deleted or moved
///   out of this scope.
/// - A selection that is still present is swapped to the collection's copy,
///   so server truth replaces any locally held version.
/// - `enter_edit` is true only when `pending_edit` names the gig that ends up
///   selected. Consuming the flag is the caller's job.
pub fn reconcile_selection(
    collection: &[Gig],
    previous: Option<&str>,
    pending_edit: Option<&str>,
) -> SelectionOutcome {
    let selection = previous.and_then(|id| find_gig(collection, id)).cloned();
    let enter_edit = match (&selection, pending_edit) {
        (Some(gig), Some(pending)) => gig.id == pending,
        _ => false,
    };
    SelectionOutcome {
        selection,
        enter_edit,
    }
}

/// Keep `id` only if it still names a gig in `collection`.
pub fn retain_if_present(collection: &[Gig], id: Option<String>) -> Option<String> {
    id.filter(|id| find_gig(collection, id).is_some())
}
