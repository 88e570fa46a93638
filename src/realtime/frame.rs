use serde::{Deserialize, Serialize};

/// Notifications pushed by the server over `/ws`.
///
/// Only `GigsChanged` matters to sync; `State` is a legacy signal and any
/// other `type` decodes as `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushFrame {
    GigsChanged,
    State {
        red: bool,
    },
    #[serde(other)]
    Unknown,
}

impl PushFrame {
    /// Parse a text frame. Malformed JSON yields `None`.
    pub fn parse(text: &str) -> Option<PushFrame> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed push frame");
                None
            }
        }
    }

    pub fn is_gigs_changed(&self) -> bool {
        matches!(self, PushFrame::GigsChanged)
    }
}
